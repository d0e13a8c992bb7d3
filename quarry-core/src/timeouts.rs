//! Operation timeouts
//!
//! Handlers declare default timeouts per operation; the operator may override
//! them with a `timeouts` map on the configuration record.

use std::time::Duration;

use thiserror::Error;

use crate::resource::Resource;

/// Timeout applied when neither the handler nor the operator sets one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Lifecycle operation a timeout bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    /// Key used in the `timeouts` map
    pub fn key(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

#[derive(Debug, Error)]
pub enum TimeoutError {
    #[error("Invalid {operation} timeout '{value}': {source}")]
    Invalid {
        operation: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("Unknown timeout key '{0}', expected one of: create, read, update, delete")]
    UnknownKey(String),
}

/// Default timeouts declared by a handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTimeouts {
    pub create: Option<Duration>,
    pub read: Option<Duration>,
    pub update: Option<Duration>,
    pub delete: Option<Duration>,
}

impl ResourceTimeouts {
    pub fn with_create(mut self, d: Duration) -> Self {
        self.create = Some(d);
        self
    }

    pub fn with_read(mut self, d: Duration) -> Self {
        self.read = Some(d);
        self
    }

    pub fn with_update(mut self, d: Duration) -> Self {
        self.update = Some(d);
        self
    }

    pub fn with_delete(mut self, d: Duration) -> Self {
        self.delete = Some(d);
        self
    }

    fn default_for(&self, op: Operation) -> Duration {
        let declared = match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        };
        declared.unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Effective timeout for `op`: the operator override if present,
    /// otherwise the handler default.
    pub fn resolve(&self, op: Operation, resource: &Resource) -> Result<Duration, TimeoutError> {
        for key in resource.timeouts.keys() {
            if !["create", "read", "update", "delete"].contains(&key.as_str()) {
                return Err(TimeoutError::UnknownKey(key.clone()));
            }
        }

        match resource.timeouts.get(op.key()) {
            Some(value) => {
                humantime::parse_duration(value).map_err(|source| TimeoutError::Invalid {
                    operation: op.key(),
                    value: value.clone(),
                    source,
                })
            }
            None => Ok(self.default_for(op)),
        }
    }
}
