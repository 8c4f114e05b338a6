use crate::error::Result;
use crate::event::{NewEvent, Status};
use crate::snapshot::{Clock, ProcessSample, ProcessSource};
use crate::store::EventStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const HIGH_CPU_METRIC: &str = "high_cpu_process";
pub const HIGH_MEMORY_METRIC: &str = "high_memory_process";

/// Per-process limits. A process strictly above a limit is an anomaly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AnomalyThresholds {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 80.0,
            memory_percent: 80.0,
        }
    }
}

/// Flags individual processes over the CPU or memory limit and records one
/// CRITICAL event per breach. CPU and memory are checked independently, so a
/// single process can produce zero, one or two events.
pub struct ProcessAnomalyDetector {
    store: EventStore,
    hostname: String,
    clock: Arc<dyn Clock>,
    thresholds: AnomalyThresholds,
}

impl ProcessAnomalyDetector {
    pub fn new(store: EventStore, hostname: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            hostname: hostname.into(),
            clock,
            thresholds: AnomalyThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: AnomalyThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Anomaly events for one snapshot. Entries that could not be read are
    /// skipped, as are usage figures that are unavailable.
    pub fn anomalies(&self, snapshot: &[Result<ProcessSample>]) -> Vec<NewEvent> {
        let timestamp = self.clock.now();
        let mut events = Vec::new();

        for entry in snapshot {
            let process = match entry {
                Ok(process) => process,
                Err(e) => {
                    debug!("skipping process: {}", e);
                    continue;
                }
            };

            if let Some(cpu) = process.cpu_percent {
                if cpu > self.thresholds.cpu_percent {
                    info!(pid = process.pid, name = %process.name, cpu, "process over CPU limit");
                    events.push(NewEvent::new(
                        timestamp,
                        &self.hostname,
                        HIGH_CPU_METRIC,
                        cpu,
                        Status::Critical,
                    ));
                }
            }

            if let Some(memory) = process.memory_percent {
                if memory > self.thresholds.memory_percent {
                    info!(
                        pid = process.pid,
                        name = %process.name,
                        memory,
                        "process over memory limit"
                    );
                    events.push(NewEvent::new(
                        timestamp,
                        &self.hostname,
                        HIGH_MEMORY_METRIC,
                        memory,
                        Status::Critical,
                    ));
                }
            }
        }

        events
    }

    pub fn record(&self, snapshot: &[Result<ProcessSample>]) -> Result<usize> {
        let events = self.anomalies(snapshot);
        self.store.append_batch(&events)
    }

    pub fn detect(&self, source: &dyn ProcessSource) -> Result<usize> {
        let snapshot = source.processes()?;
        self.record(&snapshot)
    }
}
