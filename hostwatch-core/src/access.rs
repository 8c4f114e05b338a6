//! Credential check in front of the query surface.
//!
//! Gated query operations take a [`Grant`], and the only way to obtain one is
//! a successful [`AccessGate::authorize`]. A rejected caller never reaches the
//! store or a snapshot source.

use crate::error::{HostwatchError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Proof that the caller passed the gate.
#[derive(Debug)]
pub struct Grant {
    _private: (),
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    expected: Option<Credentials>,
}

impl AccessGate {
    pub fn new(expected: Credentials) -> Self {
        Self {
            expected: Some(expected),
        }
    }

    /// A gate with nothing configured. Every request is rejected.
    pub fn closed() -> Self {
        Self { expected: None }
    }

    pub fn from_config(expected: Option<Credentials>) -> Self {
        Self { expected }
    }

    pub fn authorize(&self, presented: &Credentials) -> Result<Grant> {
        let Some(expected) = &self.expected else {
            warn!(user = %presented.username, "rejecting request: no credentials configured");
            return Err(HostwatchError::Unauthorized);
        };

        let user_ok = constant_time_eq(expected.username.as_bytes(), presented.username.as_bytes());
        let pass_ok = constant_time_eq(expected.password.as_bytes(), presented.password.as_bytes());

        if user_ok & pass_ok {
            Ok(Grant { _private: () })
        } else {
            warn!(user = %presented.username, "rejecting request: bad credentials");
            Err(HostwatchError::Unauthorized)
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
