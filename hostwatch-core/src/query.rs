//! Read-only views over the event log.
//!
//! Everything here except [`QueryService::exposition`] takes a [`Grant`] from
//! the access gate. Nothing here writes.

use crate::access::Grant;
use crate::connections::{ActiveConnection, ConnectionObserver};
use crate::error::{HostwatchError, Result};
use crate::event::{round2, Event, Status};
use crate::snapshot::{Clock, ConnectionSource, ProcessSample, ProcessSource};
use crate::store::{EventFilter, EventStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_LIST_LIMIT: u32 = 10;
pub const DEFAULT_TOP_LIMIT: usize = 5;
pub const ROLLING_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RankBy {
    Cpu,
    Memory,
}

impl RankBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankBy::Cpu => "cpu",
            RankBy::Memory => "memory",
        }
    }

    /// The ranking figure; NaN counts as missing.
    fn key(&self, process: &ProcessSample) -> Option<f64> {
        let figure = match self {
            RankBy::Cpu => process.cpu_percent,
            RankBy::Memory => process.memory_percent,
        };
        figure.filter(|v| !v.is_nan())
    }
}

impl FromStr for RankBy {
    type Err = HostwatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpu" => Ok(RankBy::Cpu),
            "memory" => Ok(RankBy::Memory),
            other => Err(HostwatchError::InvalidArgument(format!(
                "ranking key must be 'cpu' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

/// Event counts per status over the rolling window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusSummary {
    #[serde(rename = "OK")]
    pub ok: u64,
    #[serde(rename = "WARN")]
    pub warn: u64,
    #[serde(rename = "CRITICAL")]
    pub critical: u64,
}

impl StatusSummary {
    pub fn get(&self, status: Status) -> u64 {
        match status {
            Status::Ok => self.ok,
            Status::Warn => self.warn,
            Status::Critical => self.critical,
        }
    }

    pub fn total(&self) -> u64 {
        self.ok + self.warn + self.critical
    }

    fn add(&mut self, status: Status, count: u64) {
        match status {
            Status::Ok => self.ok += count,
            Status::Warn => self.warn += count,
            Status::Critical => self.critical += count,
        }
    }
}

/// Highest `limit` processes by `by`, descending. Processes missing the
/// ranking figure sort last; unreadable entries are dropped. Usage figures
/// are rounded to two decimals.
pub fn rank_processes(
    snapshot: Vec<Result<ProcessSample>>,
    by: RankBy,
    limit: usize,
) -> Vec<ProcessSample> {
    let mut processes: Vec<ProcessSample> = snapshot.into_iter().filter_map(|p| p.ok()).collect();

    processes.sort_by(|a, b| {
        let a = by.key(a).unwrap_or(f64::NEG_INFINITY);
        let b = by.key(b).unwrap_or(f64::NEG_INFINITY);
        b.total_cmp(&a)
    });
    processes.truncate(limit);

    for process in &mut processes {
        process.cpu_percent = process.cpu_percent.map(round2);
        process.memory_percent = process.memory_percent.map(round2);
    }
    processes
}

/// Plain-text rendering of the latest value per metric: one
/// `<metric> <value>` line each, no labels.
pub fn render_exposition(latest: &[Event]) -> String {
    let mut out = String::new();
    for event in latest {
        let _ = writeln!(out, "{} {}", event.metric, event.value);
    }
    out
}

pub struct QueryService {
    store: EventStore,
    processes: Arc<dyn ProcessSource>,
    connections: Arc<dyn ConnectionSource>,
    observer: ConnectionObserver,
    clock: Arc<dyn Clock>,
}

impl QueryService {
    pub fn new(
        store: EventStore,
        processes: Arc<dyn ProcessSource>,
        connections: Arc<dyn ConnectionSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            processes,
            connections,
            observer: ConnectionObserver::new(),
            clock,
        }
    }

    pub fn with_observer(mut self, observer: ConnectionObserver) -> Self {
        self.observer = observer;
        self
    }

    fn window_start(&self) -> DateTime<Utc> {
        self.clock.now() - Duration::hours(ROLLING_WINDOW_HOURS)
    }

    /// Filtered events, newest first. Without an explicit limit at most
    /// [`DEFAULT_LIST_LIMIT`] rows come back.
    pub fn list_events(&self, _grant: &Grant, mut filter: EventFilter) -> Result<Vec<Event>> {
        if let Some(metric) = &filter.metric {
            if metric.trim().is_empty() {
                return Err(HostwatchError::InvalidArgument(
                    "metric filter must not be empty".to_string(),
                ));
            }
        }
        filter.limit.get_or_insert(DEFAULT_LIST_LIMIT);

        self.store.query(&filter)
    }

    pub fn latest_per_metric(&self, _grant: &Grant) -> Result<Vec<Event>> {
        self.store.latest_per_metric()
    }

    pub fn summary(&self, _grant: &Grant) -> Result<StatusSummary> {
        let mut summary = StatusSummary::default();
        for (status, count) in self.store.count_by_status(&self.window_start())? {
            summary.add(status, count);
        }
        Ok(summary)
    }

    pub fn critical_alerts(&self, _grant: &Grant) -> Result<Vec<Event>> {
        let filter = EventFilter::new()
            .status(Status::Critical)
            .since(self.window_start());
        self.store.query(&filter)
    }

    /// Ranks a fresh process snapshot; the event log is not consulted.
    pub fn top_processes(
        &self,
        _grant: &Grant,
        by: &str,
        limit: usize,
    ) -> Result<Vec<ProcessSample>> {
        let by: RankBy = by.parse()?;
        let snapshot = self.processes.processes()?;

        debug!(by = ?by, limit, candidates = snapshot.len(), "ranking processes");
        Ok(rank_processes(snapshot, by, limit))
    }

    pub fn active_connections(&self, _grant: &Grant) -> Result<Vec<ActiveConnection>> {
        self.observer.observe(self.connections.as_ref())
    }

    pub fn connection_count(&self, grant: &Grant) -> Result<usize> {
        Ok(self.active_connections(grant)?.len())
    }

    /// Unauthenticated so scrapers can pull it.
    pub fn exposition(&self) -> Result<String> {
        let latest = self.store.latest_per_metric()?;
        Ok(render_exposition(&latest))
    }
}
