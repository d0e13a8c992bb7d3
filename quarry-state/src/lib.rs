//! Quarry State Management
//!
//! Records the identifiers providers return so later commands can read and
//! delete what was created. The state file is guarded by a lock for the
//! duration of each command.
//!
//! # Example
//!
//! ```ignore
//! use quarry_state::{LocalBackend, StateBackend, StateFile};
//!
//! let backend = LocalBackend::with_path("quarry.state.json".into());
//! let lock = backend.acquire_lock("create", expected_run_time).await?;
//!
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... record created resources ...
//! state.increment_serial();
//! backend.write_state(&state).await?;
//!
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendError, BackendResult, StateBackend};
pub use backends::LocalBackend;
pub use lock::{LOCK_MARGIN, LockInfo};
pub use state::{ResourceState, StateFile};
