//! Snapshot types and the collaborator traits that supply them.
//!
//! Producers never touch the OS directly; they consume these traits so a pass
//! can be driven by the live host (see [`crate::probe`]) or by fixed data in
//! tests. Snapshots may be expensive: process and socket enumeration is linear
//! in the number of processes and sockets on the host.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;

/// Aggregate host usage, each field on a 0–100 scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub root_disk_percent: f64,
}

/// One live process. Either usage figure may be unavailable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
}

impl ProcessSample {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            cpu_percent: None,
            memory_percent: None,
        }
    }

    pub fn with_cpu(mut self, cpu_percent: f64) -> Self {
        self.cpu_percent = Some(cpu_percent);
        self
    }

    pub fn with_memory(mut self, memory_percent: f64) -> Self {
        self.memory_percent = Some(memory_percent);
        self
    }
}

/// Size of the filesystem holding a path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

/// One socket as seen by the connection snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSample {
    pub local: Endpoint,
    pub remote: Option<Endpoint>,
    pub state: ConnectionState,
    pub pid: Option<u32>,
}

/// Live process enumeration. Entries that vanished or denied introspection
/// while the snapshot was taken come back as `Err` items; a failure to
/// enumerate at all is the outer `Err`.
pub trait ProcessSource: Send + Sync {
    fn processes(&self) -> Result<Vec<Result<ProcessSample>>>;
}

pub trait ResourceSource: Send + Sync {
    fn resource_usage(&self) -> Result<ResourceUsage>;
}

pub trait FsUsageSource: Send + Sync {
    /// Usage of the filesystem containing `path`. Missing or inaccessible
    /// paths fail with `SnapshotUnavailable`.
    fn usage(&self, path: &Path) -> Result<FsUsage>;
}

pub trait ConnectionSource: Send + Sync {
    fn connections(&self) -> Result<Vec<ConnectionSample>>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
