//! One sampling pass and the wiring from configuration to components.

use crate::config::AgentConfig;
use crate::connections::ConnectionObserver;
use crate::detector::ProcessAnomalyDetector;
use crate::directory::DirectoryMonitor;
use crate::error::{HostwatchError, Result};
use crate::event::ThresholdPolicy;
use crate::probe::{HostProbe, ProcfsConnections, StatvfsUsage};
use crate::query::QueryService;
use crate::sampler::MetricSampler;
use crate::snapshot::{
    Clock, ConnectionSource, FsUsageSource, ProcessSource, ResourceSource, SystemClock,
};
use crate::store::EventStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// The external capabilities a pass or a query needs.
#[derive(Clone)]
pub struct Sources {
    pub resources: Arc<dyn ResourceSource>,
    pub processes: Arc<dyn ProcessSource>,
    pub filesystems: Arc<dyn FsUsageSource>,
    pub connections: Arc<dyn ConnectionSource>,
    pub clock: Arc<dyn Clock>,
}

impl Sources {
    /// Sources backed by the running host.
    pub fn live() -> Self {
        let probe = Arc::new(HostProbe::new());
        Self {
            resources: probe.clone(),
            processes: probe,
            filesystems: Arc::new(StatvfsUsage),
            connections: Arc::new(ProcfsConnections),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Rows written by one pass, per producer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassReport {
    pub resource_events: usize,
    pub process_events: usize,
    pub directory_events: usize,
}

impl PassReport {
    pub fn total(&self) -> usize {
        self.resource_events + self.process_events + self.directory_events
    }
}

/// Write side of the agent. Each [`Agent::run_once`] runs the sampler, the
/// process detector and the directory monitor in that order. Nothing guards
/// against two passes running at once.
pub struct Agent {
    store: EventStore,
    sampler: MetricSampler,
    detector: ProcessAnomalyDetector,
    directories: DirectoryMonitor,
    sources: Sources,
}

impl Agent {
    pub fn new(config: &AgentConfig, hostname: &str, sources: Sources) -> Self {
        let store = config.store();

        let sampler = MetricSampler::new(store.clone(), hostname, sources.clock.clone())
            .with_warn_at(config.sampler.warn_at);
        let detector = ProcessAnomalyDetector::new(store.clone(), hostname, sources.clock.clone())
            .with_thresholds(config.processes.thresholds());
        let directories = DirectoryMonitor::new(store.clone(), hostname, sources.clock.clone())
            .with_paths(config.directories.paths.iter().cloned())
            .with_policy(ThresholdPolicy::three_tier(
                config.directories.warn_at,
                config.directories.critical_at,
            ));

        Self {
            store,
            sampler,
            detector,
            directories,
            sources,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Ensure the schema exists, then sample. A producer whose snapshot
    /// cannot be taken records nothing and the pass moves on. A storage
    /// failure stops the pass and is returned; producers that already wrote
    /// keep their rows.
    #[instrument(skip(self))]
    pub fn run_once(&self) -> Result<PassReport> {
        self.store.initialize()?;

        let report = PassReport {
            resource_events: tolerate_snapshot(
                "sampler",
                self.sampler.sample(self.sources.resources.as_ref()),
            )?,
            process_events: tolerate_snapshot(
                "detector",
                self.detector.detect(self.sources.processes.as_ref()),
            )?,
            directory_events: tolerate_snapshot(
                "directories",
                self.directories.scan(self.sources.filesystems.as_ref()),
            )?,
        };

        info!(
            resource = report.resource_events,
            process = report.process_events,
            directory = report.directory_events,
            "sampling pass complete"
        );
        Ok(report)
    }
}

fn tolerate_snapshot(producer: &str, written: Result<usize>) -> Result<usize> {
    match written {
        Err(HostwatchError::SnapshotUnavailable { subject, reason }) => {
            warn!(producer, %subject, %reason, "snapshot unavailable, producer skipped");
            Ok(0)
        }
        other => other,
    }
}

/// Read side wired from the same configuration.
pub fn query_service(config: &AgentConfig, sources: &Sources) -> QueryService {
    QueryService::new(
        config.store(),
        sources.processes.clone(),
        sources.connections.clone(),
        sources.clock.clone(),
    )
    .with_observer(ConnectionObserver::with_ports(
        config.connections.ports.iter().copied(),
    ))
}
