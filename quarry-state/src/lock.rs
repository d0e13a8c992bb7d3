//! State lock records
//!
//! A lock lives as long as the command holding it may run: the outer bounds
//! of its remote calls plus `LOCK_MARGIN`. Once that has passed the holder is
//! presumed dead and the lock may be taken over.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Added to the expected run time for state writes and process startup
pub const LOCK_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Upper bound on any lock lifetime
pub const MAX_LOCK_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Holder of the state lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: String,
    /// Command holding the lock (e.g., "create", "delete")
    pub operation: String,
    /// username@hostname
    pub who: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl LockInfo {
    /// Lock for a command expected to run for at most `expected`
    pub fn new(operation: impl Into<String>, expected: Duration) -> Self {
        let ttl = expected.saturating_add(LOCK_MARGIN).min(MAX_LOCK_TTL);
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(7));
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            who: lock_owner(),
            created: now,
            expires: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }

    pub fn time_remaining(&self) -> chrono::Duration {
        self.expires - Utc::now()
    }
}

/// username@hostname of the current process
fn lock_owner() -> String {
    let username = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    format!("{}@{}", username, hostname)
}
