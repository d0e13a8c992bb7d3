//! State backend trait and error types

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::lock::LockInfo;
use crate::state::StateFile;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("State is locked by {who} (lock ID: {lock_id}, operation: {operation})")]
    Locked {
        lock_id: String,
        who: String,
        operation: String,
    },

    #[error("Lock not found: {0}")]
    LockNotFound(String),

    #[error("Lock ID mismatch: expected {expected}, got {actual}")]
    LockMismatch { expected: String, actual: String },

    #[error("Invalid state file: {0}")]
    InvalidState(String),

    /// Guards against overwriting a different state history
    #[error("State lineage mismatch: expected {expected}, got {actual}")]
    LineageMismatch { expected: String, actual: String },

    /// The stored state was written after ours was read
    #[error("Stale state: serial {attempted} is not newer than stored serial {stored}")]
    StaleSerial { stored: u64, attempted: u64 },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BackendError {
    pub fn locked(lock: &LockInfo) -> Self {
        Self::Locked {
            lock_id: lock.id.clone(),
            who: lock.who.clone(),
            operation: lock.operation.clone(),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for the state file and its lock
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// `None` if no state has been written yet
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Persist `state`. Its serial must be newer than the stored one and its
    /// lineage must match.
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Take the lock for a command expected to run for at most `expected`.
    /// Fails with `Locked` while another live lock is held.
    async fn acquire_lock(&self, operation: &str, expected: Duration) -> BackendResult<LockInfo>;

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    /// Remove a lock by ID regardless of its owner
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;
}
