use crate::error::Result;
use crate::snapshot::{ConnectionSample, ConnectionSource, ConnectionState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;

pub const DEFAULT_WATCHED_PORTS: [u16; 2] = [22, 8443];

/// An established connection on one of the watched local ports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveConnection {
    pub local_port: u16,
    pub remote_ip: Option<IpAddr>,
    pub remote_port: Option<u16>,
    pub pid: Option<u32>,
}

/// Reports established connections on a watch-list of local ports. Nothing
/// here is persisted or classified.
#[derive(Debug, Clone)]
pub struct ConnectionObserver {
    ports: BTreeSet<u16>,
}

impl ConnectionObserver {
    pub fn new() -> Self {
        Self::with_ports(DEFAULT_WATCHED_PORTS)
    }

    pub fn with_ports(ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            ports: ports.into_iter().collect(),
        }
    }

    pub fn filter(&self, snapshot: &[ConnectionSample]) -> Vec<ActiveConnection> {
        snapshot
            .iter()
            .filter(|conn| {
                conn.state == ConnectionState::Established && self.ports.contains(&conn.local.port)
            })
            .map(|conn| ActiveConnection {
                local_port: conn.local.port,
                remote_ip: conn.remote.map(|r| r.ip),
                remote_port: conn.remote.map(|r| r.port),
                pid: conn.pid,
            })
            .collect()
    }

    pub fn observe(&self, source: &dyn ConnectionSource) -> Result<Vec<ActiveConnection>> {
        let snapshot = source.connections()?;
        Ok(self.filter(&snapshot))
    }
}

impl Default for ConnectionObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Endpoint;
    use std::net::Ipv4Addr;

    fn endpoint(port: u16) -> Endpoint {
        Endpoint {
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            port,
        }
    }

    fn sample(local: u16, remote: Option<u16>, state: ConnectionState) -> ConnectionSample {
        ConnectionSample {
            local: endpoint(local),
            remote: remote.map(endpoint),
            state,
            pid: Some(1000 + local as u32),
        }
    }

    #[test]
    fn keeps_established_connections_on_watched_ports() {
        let observer = ConnectionObserver::new();
        let snapshot = vec![
            sample(22, Some(50000), ConnectionState::Established),
            sample(22, None, ConnectionState::Listen),
            sample(80, Some(50001), ConnectionState::Established),
            sample(8443, Some(50002), ConnectionState::Established),
            sample(8443, Some(50003), ConnectionState::TimeWait),
        ];

        let active = observer.filter(&snapshot);
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].local_port, 22);
        assert_eq!(active[0].remote_port, Some(50000));
        assert_eq!(active[0].pid, Some(1022));
        assert_eq!(active[1].local_port, 8443);
    }

    #[test]
    fn missing_remote_endpoint_is_null() {
        let observer = ConnectionObserver::with_ports([9000]);
        let active = observer.filter(&[sample(9000, None, ConnectionState::Established)]);

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].remote_ip, None);
        assert_eq!(active[0].remote_port, None);
    }
}
