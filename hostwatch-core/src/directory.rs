use crate::error::Result;
use crate::event::{round2, NewEvent, ThresholdPolicy};
use crate::snapshot::{Clock, FsUsage, FsUsageSource};
use crate::store::EventStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_WATCHED_DIRECTORIES: [&str; 3] = ["/var/log", "/tmp", "/home"];

pub const DEFAULT_DIRECTORY_POLICY: ThresholdPolicy = ThresholdPolicy::three_tier(80.0, 90.0);

/// Metric key for a watched path: `disk_usage_` followed by the path with
/// every separator replaced by `_`, so `/var/log` becomes
/// `disk_usage__var_log`.
pub fn metric_name(path: &Path) -> String {
    format!("disk_usage_{}", path.to_string_lossy().replace('/', "_"))
}

/// Used share of the filesystem, rounded to two decimals. `None` for
/// filesystems that report no capacity.
pub fn percent_used(usage: &FsUsage) -> Option<f64> {
    if usage.total_bytes == 0 {
        return None;
    }
    Some(round2(usage.used_bytes as f64 / usage.total_bytes as f64 * 100.0))
}

/// Tracks how full the filesystems behind a set of paths are, using its own
/// OK/WARN/CRITICAL bands.
pub struct DirectoryMonitor {
    store: EventStore,
    hostname: String,
    clock: Arc<dyn Clock>,
    paths: Vec<PathBuf>,
    policy: ThresholdPolicy,
}

impl DirectoryMonitor {
    pub fn new(store: EventStore, hostname: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            hostname: hostname.into(),
            clock,
            paths: DEFAULT_WATCHED_DIRECTORIES.iter().map(PathBuf::from).collect(),
            policy: DEFAULT_DIRECTORY_POLICY,
        }
    }

    pub fn with_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// One event per watched path that could be resolved. Paths that are
    /// missing or unreadable produce nothing.
    pub fn events(&self, source: &dyn FsUsageSource) -> Vec<NewEvent> {
        let timestamp = self.clock.now();

        self.paths
            .iter()
            .filter_map(|path| {
                let usage = match source.usage(path) {
                    Ok(usage) => usage,
                    Err(e) => {
                        debug!(path = %path.display(), "skipping directory: {}", e);
                        return None;
                    }
                };
                let percent = percent_used(&usage)?;

                Some(NewEvent::new(
                    timestamp,
                    &self.hostname,
                    metric_name(path),
                    percent,
                    self.policy.classify(percent),
                ))
            })
            .collect()
    }

    pub fn scan(&self, source: &dyn FsUsageSource) -> Result<usize> {
        let events = self.events(source);
        self.store.append_batch(&events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostwatchError;
    use crate::event::Status;
    use crate::store::EventFilter;
    use crate::tests::{temp_store, FixedClock};
    use std::collections::HashMap;

    struct FakeFs(HashMap<PathBuf, FsUsage>);

    impl FakeFs {
        fn with(entries: &[(&str, u64, u64)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(path, total, used)| {
                        (
                            PathBuf::from(path),
                            FsUsage {
                                total_bytes: *total,
                                used_bytes: *used,
                            },
                        )
                    })
                    .collect(),
            )
        }
    }

    impl FsUsageSource for FakeFs {
        fn usage(&self, path: &Path) -> Result<FsUsage> {
            self.0
                .get(path)
                .copied()
                .ok_or_else(|| HostwatchError::snapshot(path.display().to_string(), "not found"))
        }
    }

    #[test]
    fn metric_name_replaces_separators() {
        assert_eq!(metric_name(Path::new("/var/log")), "disk_usage__var_log");
        assert_eq!(metric_name(Path::new("/tmp")), "disk_usage__tmp");
    }

    #[test]
    fn percent_used_rounds_to_two_decimals() {
        let usage = FsUsage {
            total_bytes: 3,
            used_bytes: 1,
        };
        assert_eq!(percent_used(&usage), Some(33.33));
        assert_eq!(
            percent_used(&FsUsage {
                total_bytes: 0,
                used_bytes: 0
            }),
            None
        );
    }

    #[test]
    fn classifies_into_three_tiers() {
        let (_dir, store) = temp_store();
        let monitor = DirectoryMonitor::new(store, "host-a", FixedClock::shared())
            .with_paths(["/a", "/b", "/c", "/d"]);
        let fs = FakeFs::with(&[
            ("/a", 100, 79),
            ("/b", 100, 80),
            ("/c", 100, 90),
            ("/d", 10_000, 8_999),
        ]);

        let statuses: Vec<Status> = monitor.events(&fs).iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![Status::Ok, Status::Warn, Status::Critical, Status::Warn]
        );
    }

    #[test]
    fn missing_paths_are_skipped() {
        let (_dir, store) = temp_store();
        let monitor = DirectoryMonitor::new(store.clone(), "host-a", FixedClock::shared())
            .with_paths(["/tmp", "/does/not/exist"]);
        let fs = FakeFs::with(&[("/tmp", 100, 10)]);

        assert_eq!(monitor.scan(&fs).unwrap(), 1);
        assert_eq!(store.query(&EventFilter::new()).unwrap().len(), 1);
    }

    #[test]
    fn rescans_append_independent_events() {
        let (_dir, store) = temp_store();
        let monitor = DirectoryMonitor::new(store.clone(), "host-a", FixedClock::shared())
            .with_paths(["/tmp"]);
        let fs = FakeFs::with(&[("/tmp", 100, 85)]);

        monitor.scan(&fs).unwrap();
        monitor.scan(&fs).unwrap();

        let events = store
            .query(&EventFilter::new().metric("disk_usage__tmp"))
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.status == Status::Warn && e.value == 85.0));
        assert_ne!(events[0].id, events[1].id);
    }
}
