use crate::access::Credentials;
use crate::connections::DEFAULT_WATCHED_PORTS;
use crate::detector::AnomalyThresholds;
use crate::directory::DEFAULT_WATCHED_DIRECTORIES;
use crate::error::{HostwatchError, Result};
use crate::sampler::DEFAULT_SAMPLER_WARN_AT;
use crate::store::{EventStore, DEFAULT_BUSY_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DATABASE: &str = "HOSTWATCH_DB";
pub const ENV_API_USER: &str = "HOSTWATCH_API_USER";
pub const ENV_API_PASSWORD: &str = "HOSTWATCH_API_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplerConfig {
    pub warn_at: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            warn_at: DEFAULT_SAMPLER_WARN_AT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessConfig {
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        let thresholds = AnomalyThresholds::default();
        Self {
            cpu_threshold: thresholds.cpu_percent,
            memory_threshold: thresholds.memory_percent,
        }
    }
}

impl ProcessConfig {
    pub fn thresholds(&self) -> AnomalyThresholds {
        AnomalyThresholds {
            cpu_percent: self.cpu_threshold,
            memory_percent: self.memory_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DirectoryConfig {
    pub paths: Vec<PathBuf>,
    pub warn_at: f64,
    pub critical_at: f64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            paths: DEFAULT_WATCHED_DIRECTORIES.iter().map(PathBuf::from).collect(),
            warn_at: 80.0,
            critical_at: 90.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub ports: Vec<u16>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ports: DEFAULT_WATCHED_PORTS.to_vec(),
        }
    }
}

/// Agent settings. Every field has a default, so an empty JSON object is a
/// valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub database_path: PathBuf,
    pub busy_timeout_ms: u64,
    pub sampler: SamplerConfig,
    pub processes: ProcessConfig,
    pub directories: DirectoryConfig,
    pub connections: ConnectionConfig,
    /// Credentials the access gate expects. Unset means every gated request
    /// is refused.
    pub credentials: Option<Credentials>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("database/events.db"),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
            sampler: SamplerConfig::default(),
            processes: ProcessConfig::default(),
            directories: DirectoryConfig::default(),
            connections: ConnectionConfig::default(),
            credentials: None,
        }
    }
}

impl AgentConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| HostwatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| HostwatchError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Load `path` if given, otherwise defaults, then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(db) = lookup(ENV_DATABASE) {
            self.database_path = PathBuf::from(db);
        }

        if let (Some(username), Some(password)) = (lookup(ENV_API_USER), lookup(ENV_API_PASSWORD)) {
            self.credentials = Some(Credentials { username, password });
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.directories.critical_at < self.directories.warn_at {
            return Err(HostwatchError::Config(format!(
                "directories.critical_at ({}) is below directories.warn_at ({})",
                self.directories.critical_at, self.directories.warn_at
            )));
        }

        let thresholds = [
            ("sampler.warn_at", self.sampler.warn_at),
            ("processes.cpu_threshold", self.processes.cpu_threshold),
            ("processes.memory_threshold", self.processes.memory_threshold),
            ("directories.warn_at", self.directories.warn_at),
            ("directories.critical_at", self.directories.critical_at),
        ];
        if let Some((name, value)) = thresholds.iter().find(|(_, v)| !v.is_finite()) {
            return Err(HostwatchError::Config(format!("{} must be finite, got {}", name, value)));
        }

        Ok(())
    }

    pub fn store(&self) -> EventStore {
        EventStore::new(&self.database_path)
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}
