pub mod access;
pub mod agent;
pub mod config;
pub mod connections;
pub mod detector;
pub mod directory;
pub mod error;
pub mod event;
pub mod probe;
pub mod query;
pub mod sampler;
pub mod snapshot;
pub mod store;


pub use access::{AccessGate, Credentials, Grant};
pub use agent::{query_service, Agent, PassReport, Sources};
pub use config::AgentConfig;
pub use connections::{ActiveConnection, ConnectionObserver};
pub use detector::{AnomalyThresholds, ProcessAnomalyDetector};
pub use directory::DirectoryMonitor;
pub use error::{HostwatchError, Result};
pub use event::{Event, NewEvent, Status, ThresholdPolicy};
pub use query::{QueryService, RankBy, StatusSummary};
pub use sampler::MetricSampler;
pub use snapshot::*;
pub use store::{EventFilter, EventStore};
