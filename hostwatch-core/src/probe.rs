//! Live-host implementations of the snapshot traits.
//!
//! Processes, CPU and memory come from sysinfo, filesystem capacity from
//! statvfs(3) and TCP sockets from procfs.

use crate::directory::percent_used;
use crate::error::{HostwatchError, Result};
use crate::snapshot::{
    ConnectionSample, ConnectionSource, ConnectionState, Endpoint, FsUsage, FsUsageSource,
    ProcessSample, ProcessSource, ResourceSource, ResourceUsage,
};
use parking_lot::{Mutex, MutexGuard};
use procfs::net::{TcpNetEntry, TcpState};
use procfs::process::FDTarget;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, ProcessRefreshKind, RefreshKind, System};
use tracing::debug;

/// Name of the local machine as reported by the OS.
pub fn hostname() -> String {
    System::host_name().unwrap_or_else(|| "localhost".to_string())
}

/// CPU, memory and process figures from sysinfo. Every call takes a fresh
/// measurement; CPU percentages are computed over
/// [`sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`], so each call blocks for that long.
pub struct HostProbe {
    system: Mutex<System>,
    fs: StatvfsUsage,
}

impl HostProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            fs: StatvfsUsage,
        }
    }

    fn refreshed(&self) -> MutexGuard<'_, System> {
        let kind = RefreshKind::new()
            .with_processes(ProcessRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything())
            .with_cpu(CpuRefreshKind::everything());

        let mut system = self.system.lock();
        // Rebuild rather than refresh so exited processes do not linger.
        *system = System::new_with_specifics(kind);
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        system.refresh_specifics(kind);
        system
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSource for HostProbe {
    fn resource_usage(&self) -> Result<ResourceUsage> {
        let system = self.refreshed();

        let total_memory = system.total_memory();
        let memory_percent = if total_memory == 0 {
            0.0
        } else {
            system.used_memory() as f64 / total_memory as f64 * 100.0
        };

        let root = self.fs.usage(Path::new("/"))?;
        let root_disk_percent = percent_used(&root).ok_or_else(|| {
            HostwatchError::snapshot("/", "filesystem reports zero capacity")
        })?;

        Ok(ResourceUsage {
            cpu_percent: f64::from(system.global_cpu_usage()),
            memory_percent,
            root_disk_percent,
        })
    }
}

impl ProcessSource for HostProbe {
    fn processes(&self) -> Result<Vec<Result<ProcessSample>>> {
        let system = self.refreshed();
        let total_memory = system.total_memory();

        // sysinfo lists threads alongside processes on Linux; only ids that
        // appear in the /proc directory listing are real processes.
        let listed: HashSet<u32> = fs::read_dir("/proc")
            .map_err(|e| HostwatchError::snapshot("/proc", e))?
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();

        let mut samples = Vec::new();
        for (pid, process) in system.processes() {
            let pid = pid.as_u32();
            if !listed.contains(&pid) {
                continue;
            }

            let memory_percent = (total_memory > 0)
                .then(|| process.memory() as f64 / total_memory as f64 * 100.0);

            samples.push(Ok(ProcessSample {
                pid,
                name: process.name().to_string_lossy().to_string(),
                cpu_percent: Some(f64::from(process.cpu_usage())),
                memory_percent,
            }));
        }

        debug!(count = samples.len(), "process snapshot taken");
        Ok(samples)
    }
}

/// Filesystem capacity via statvfs(3). Used space counts blocks reserved for
/// root, matching what `df` reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsUsage;

impl FsUsageSource for StatvfsUsage {
    fn usage(&self, path: &Path) -> Result<FsUsage> {
        let stat = nix::sys::statvfs::statvfs(path)
            .map_err(|e| HostwatchError::snapshot(path.display().to_string(), e))?;

        let fragment = stat.fragment_size() as u64;
        let blocks = stat.blocks() as u64;
        let free = stat.blocks_free() as u64;

        Ok(FsUsage {
            total_bytes: blocks * fragment,
            used_bytes: blocks.saturating_sub(free) * fragment,
        })
    }
}

/// TCP sockets from `/proc/net/tcp{,6}`, with owning processes resolved by
/// matching socket inodes against `/proc/<pid>/fd`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsConnections;

impl ProcfsConnections {
    /// Socket inode to pid. Processes whose descriptors cannot be read are
    /// left out.
    fn socket_owners() -> HashMap<u64, u32> {
        let mut owners = HashMap::new();

        let processes = match procfs::process::all_processes() {
            Ok(processes) => processes,
            Err(e) => {
                debug!("cannot enumerate processes for socket owners: {}", e);
                return owners;
            }
        };

        for process in processes.flatten() {
            let Ok(fds) = process.fd() else {
                continue;
            };
            for fd in fds.flatten() {
                if let FDTarget::Socket(inode) = fd.target {
                    owners.insert(inode, process.pid as u32);
                }
            }
        }

        owners
    }
}

impl ConnectionSource for ProcfsConnections {
    fn connections(&self) -> Result<Vec<ConnectionSample>> {
        let mut entries = procfs::net::tcp()
            .map_err(|e| HostwatchError::snapshot("/proc/net/tcp", e))?;
        match procfs::net::tcp6() {
            Ok(v6) => entries.extend(v6),
            Err(e) => debug!("no IPv6 sockets: {}", e),
        }

        let owners = Self::socket_owners();

        Ok(entries
            .iter()
            .map(|entry| to_sample(entry, owners.get(&entry.inode).copied()))
            .collect())
    }
}

fn to_sample(entry: &TcpNetEntry, pid: Option<u32>) -> ConnectionSample {
    ConnectionSample {
        local: endpoint(entry.local_address),
        remote: remote_endpoint(entry.remote_address),
        state: convert_state(&entry.state),
        pid,
    }
}

fn endpoint(addr: SocketAddr) -> Endpoint {
    Endpoint {
        ip: addr.ip(),
        port: addr.port(),
    }
}

fn remote_endpoint(addr: SocketAddr) -> Option<Endpoint> {
    if addr.ip().is_unspecified() && addr.port() == 0 {
        None
    } else {
        Some(endpoint(addr))
    }
}

fn convert_state(state: &TcpState) -> ConnectionState {
    match state {
        TcpState::Established => ConnectionState::Established,
        TcpState::SynSent => ConnectionState::SynSent,
        TcpState::SynRecv => ConnectionState::SynRecv,
        TcpState::FinWait1 => ConnectionState::FinWait1,
        TcpState::FinWait2 => ConnectionState::FinWait2,
        TcpState::TimeWait => ConnectionState::TimeWait,
        TcpState::Close => ConnectionState::Close,
        TcpState::CloseWait => ConnectionState::CloseWait,
        TcpState::LastAck => ConnectionState::LastAck,
        TcpState::Listen => ConnectionState::Listen,
        TcpState::Closing => ConnectionState::Closing,
        _ => ConnectionState::Unknown,
    }
}
