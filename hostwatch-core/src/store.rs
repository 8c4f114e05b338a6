//! Append-only event log backed by SQLite.
//!
//! Every operation opens its own connection and drops it before returning,
//! so no caller ever holds a database handle between calls. The database runs
//! in WAL mode so readers keep making progress while a sampling pass appends,
//! and each connection waits up to `busy_timeout` for a lock before giving up
//! with [`HostwatchError::Storage`].

use crate::error::{HostwatchError, Result};
use crate::event::{decode_timestamp, encode_timestamp, Event, NewEvent, Status};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS events (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    hostname  TEXT NOT NULL,
    metric    TEXT NOT NULL,
    value     REAL NOT NULL,
    status    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_metric_ts ON events (metric, timestamp);
CREATE INDEX IF NOT EXISTS idx_events_status_ts ON events (status, timestamp);
";

const INSERT_EVENT: &str = "INSERT INTO events (timestamp, hostname, metric, value, status) \
                            VALUES (?1, ?2, ?3, ?4, ?5)";

/// Typed filter for [`EventStore::query`]. Every field is optional; unset
/// fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub metric: Option<String>,
    pub status: Option<Status>,
    /// Inclusive lower bound on the event timestamp.
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = Some(metric.into());
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone)]
pub struct EventStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl EventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).map_err(|e| {
            HostwatchError::Storage(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    /// Create the schema if it is missing. Safe to call on every start.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn initialize(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                HostwatchError::Storage(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let conn = self.open()?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("event store ready");
        Ok(())
    }

    pub fn append(&self, event: &NewEvent) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            INSERT_EVENT,
            params![
                encode_timestamp(&event.timestamp),
                event.hostname,
                event.metric,
                event.value,
                event.status,
            ],
        )?;

        debug!(metric = %event.metric, status = %event.status, "appended event");
        Ok(())
    }

    /// Append several events in one transaction. Either all rows land or none.
    pub fn append_batch(&self, events: &[NewEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare(INSERT_EVENT)?;
            for event in events {
                stmt.execute(params![
                    encode_timestamp(&event.timestamp),
                    event.hostname,
                    event.metric,
                    event.value,
                    event.status,
                ])?;
            }
        }
        tx.commit()?;

        debug!(count = events.len(), "appended event batch");
        Ok(events.len())
    }

    /// Events matching `filter`, newest first. Rows sharing a timestamp come
    /// back in reverse insertion order.
    pub fn query(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, hostname, metric, value, status \
             FROM events \
             WHERE (?1 IS NULL OR metric = ?1) \
               AND (?2 IS NULL OR status = ?2) \
               AND (?3 IS NULL OR timestamp >= ?3) \
             ORDER BY timestamp DESC, id DESC \
             LIMIT ?4",
        )?;

        let since = filter.since.as_ref().map(encode_timestamp);
        // SQLite treats a negative LIMIT as unbounded.
        let limit = filter.limit.map(i64::from).unwrap_or(-1);

        let rows = stmt.query_map(
            params![filter.metric, filter.status, since, limit],
            read_event,
        )?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// The most recent event of every metric, ordered by metric name. Ties on
    /// timestamp resolve to the row inserted last.
    pub fn latest_per_metric(&self) -> Result<Vec<Event>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, hostname, metric, value, status FROM ( \
                 SELECT id, timestamp, hostname, metric, value, status, \
                        ROW_NUMBER() OVER ( \
                            PARTITION BY metric ORDER BY timestamp DESC, id DESC \
                        ) AS rn \
                 FROM events \
             ) \
             WHERE rn = 1 \
             ORDER BY metric",
        )?;

        let rows = stmt.query_map([], read_event)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Number of events per status recorded at or after `since`. Statuses
    /// with no rows are absent.
    pub fn count_by_status(&self, since: &DateTime<Utc>) -> Result<Vec<(Status, u64)>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM events WHERE timestamp >= ?1 GROUP BY status",
        )?;

        let rows = stmt.query_map(params![encode_timestamp(since)], |row| {
            Ok((row.get::<_, Status>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }
}

fn read_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let timestamp: String = row.get(1)?;
    let timestamp = decode_timestamp(&timestamp)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(Event {
        id: row.get(0)?,
        timestamp,
        hostname: row.get(2)?,
        metric: row.get(3)?,
        value: row.get(4)?,
        status: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn store() -> (TempDir, EventStore) {
        let dir = TempDir::new().unwrap();
        let store = EventStore::new(dir.path().join("db").join("events.db"));
        store.initialize().unwrap();
        (dir, store)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn event(secs: i64, metric: &str, value: f64, status: Status) -> NewEvent {
        NewEvent::new(at(secs), "host-a", metric, value, status)
    }

    #[test]
    fn initialize_is_idempotent_and_keeps_rows() {
        let (_dir, store) = store();
        store.append(&event(0, "cpu_percent", 10.0, Status::Ok)).unwrap();

        store.initialize().unwrap();
        store.initialize().unwrap();

        assert_eq!(store.query(&EventFilter::new()).unwrap().len(), 1);
    }

    #[test]
    fn query_orders_by_timestamp_then_id_descending() {
        let (_dir, store) = store();
        store.append(&event(10, "a", 1.0, Status::Ok)).unwrap();
        store.append(&event(30, "b", 2.0, Status::Ok)).unwrap();
        store.append(&event(20, "c", 3.0, Status::Ok)).unwrap();
        store.append(&event(30, "d", 4.0, Status::Ok)).unwrap();

        let events = store.query(&EventFilter::new().limit(10)).unwrap();
        let metrics: Vec<&str> = events.iter().map(|e| e.metric.as_str()).collect();
        assert_eq!(metrics, vec!["d", "b", "c", "a"]);

        let ids: HashSet<i64> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(events[0].timestamp, at(30));
    }

    #[test]
    fn query_applies_every_filter_field() {
        let (_dir, store) = store();
        store
            .append_batch(&[
                event(0, "cpu_percent", 10.0, Status::Ok),
                event(1, "cpu_percent", 85.0, Status::Warn),
                event(2, "memory_percent", 90.0, Status::Warn),
                event(3, "cpu_percent", 95.0, Status::Warn),
            ])
            .unwrap();

        let cpu = store.query(&EventFilter::new().metric("cpu_percent")).unwrap();
        assert_eq!(cpu.len(), 3);

        let warn_cpu = store
            .query(&EventFilter::new().metric("cpu_percent").status(Status::Warn))
            .unwrap();
        assert_eq!(warn_cpu.len(), 2);

        let recent = store.query(&EventFilter::new().since(at(2))).unwrap();
        assert_eq!(recent.len(), 2);

        let limited = store.query(&EventFilter::new().limit(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].value, 95.0);
    }

    #[test]
    fn filter_values_are_bound_not_interpolated() {
        let (_dir, store) = store();
        store.append(&event(0, "cpu_percent", 10.0, Status::Ok)).unwrap();

        let hostile = store
            .query(&EventFilter::new().metric("x' OR '1'='1"))
            .unwrap();
        assert!(hostile.is_empty());
        assert_eq!(store.query(&EventFilter::new()).unwrap().len(), 1);
    }

    #[test]
    fn latest_per_metric_returns_one_row_per_metric() {
        let (_dir, store) = store();
        store
            .append_batch(&[
                event(0, "cpu_percent", 10.0, Status::Ok),
                event(5, "cpu_percent", 20.0, Status::Ok),
                event(5, "cpu_percent", 30.0, Status::Ok),
                event(1, "disk_percent", 50.0, Status::Ok),
            ])
            .unwrap();

        let latest = store.latest_per_metric().unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].metric, "cpu_percent");
        // Same timestamp: the later insert wins.
        assert_eq!(latest[0].value, 30.0);
        assert_eq!(latest[1].metric, "disk_percent");
    }

    #[test]
    fn count_by_status_respects_window() {
        let (_dir, store) = store();
        store
            .append_batch(&[
                event(0, "a", 1.0, Status::Critical),
                event(10, "a", 1.0, Status::Critical),
                event(10, "b", 1.0, Status::Ok),
                event(11, "c", 1.0, Status::Warn),
            ])
            .unwrap();

        let mut counts = store.count_by_status(&at(10)).unwrap();
        counts.sort();
        assert_eq!(
            counts,
            vec![(Status::Ok, 1), (Status::Warn, 1), (Status::Critical, 1)]
        );
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let (_dir, store) = store();
        assert_eq!(store.append_batch(&[]).unwrap(), 0);
    }

    #[test]
    fn unreachable_medium_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        let store = EventStore::new(dir.path().join("missing").join("events.db"));

        let err = store
            .append(&event(0, "cpu_percent", 1.0, Status::Ok))
            .unwrap_err();
        assert!(matches!(err, HostwatchError::Storage(_)));
    }

    #[test]
    fn readers_progress_while_writer_holds_lock() {
        let (_dir, store) = store();
        store.append(&event(0, "cpu_percent", 1.0, Status::Ok)).unwrap();

        let writer = Connection::open(store.path()).unwrap();
        writer.execute_batch("BEGIN IMMEDIATE").unwrap();

        let reads = store.query(&EventFilter::new()).unwrap();
        assert_eq!(reads.len(), 1);

        let contended = store.clone().with_busy_timeout(Duration::from_millis(50));
        let err = contended
            .append(&event(1, "cpu_percent", 2.0, Status::Ok))
            .unwrap_err();
        assert!(matches!(err, HostwatchError::Storage(_)));

        writer.execute_batch("COMMIT").unwrap();
        contended
            .append(&event(1, "cpu_percent", 2.0, Status::Ok))
            .unwrap();
    }
}
