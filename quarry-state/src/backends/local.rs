//! Local file backend
//!
//! State lives in a JSON file (default: quarry.state.json) next to a
//! `.lock` file holding the current `LockInfo`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::backend::{BackendError, BackendResult, StateBackend};
use crate::lock::LockInfo;
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "quarry.state.json";

    pub fn new() -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_STATE_FILE))
    }

    pub fn with_path(state_path: PathBuf) -> Self {
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match fs::read_to_string(&self.lock_path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| BackendError::InvalidState(format!("Failed to parse lock file: {}", e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::Io(format!("Failed to read lock file: {}", e))),
        }
    }

    /// Create the lock file; fails if it already exists
    async fn create_lock_file(&self, lock: &LockInfo) -> std::io::Result<()> {
        let content = serde_json::to_vec_pretty(lock)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await?;
        file.write_all(&content).await?;
        file.flush().await
    }

    async fn remove_lock_file(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to remove lock file: {}", e)))
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::Io(format!("Failed to read state file: {}", e))),
        };

        let state: StateFile = serde_json::from_str(&content).map_err(|e| {
            BackendError::InvalidState(format!("Failed to parse state file: {}", e))
        })?;

        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(stored) = self.read_state().await? {
            if stored.lineage != state.lineage {
                return Err(BackendError::LineageMismatch {
                    expected: stored.lineage,
                    actual: state.lineage.clone(),
                });
            }
            if state.serial <= stored.serial {
                return Err(BackendError::StaleSerial {
                    stored: stored.serial,
                    attempted: state.serial,
                });
            }
        }

        let content = serde_json::to_string_pretty(state).map_err(|e| {
            BackendError::Serialization(format!("Failed to serialize state: {}", e))
        })?;

        // Write then rename so readers never see a partial file
        let tmp_path = self.state_path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;
        fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to replace state file: {}", e)))?;

        debug!(
            "wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(
        &self,
        operation: &str,
        expected: Duration,
    ) -> BackendResult<LockInfo> {
        let lock = LockInfo::new(operation, expected);

        match self.create_lock_file(&lock).await {
            Ok(()) => return Ok(lock),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(BackendError::Io(format!("Failed to write lock file: {}", e))),
        }

        match self.read_lock().await? {
            Some(existing) if !existing.is_expired() => Err(BackendError::locked(&existing)),
            existing => {
                if let Some(existing) = existing {
                    warn!(
                        "taking over expired lock {} held by {}",
                        existing.id, existing.who
                    );
                }
                let _ = fs::remove_file(&self.lock_path).await;
                self.create_lock_file(&lock).await.map_err(|e| {
                    BackendError::Io(format!("Failed to write lock file: {}", e))
                })?;
                Ok(lock)
            }
        }
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;

        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }

        self.remove_lock_file().await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock_id.to_string()))?;

        if existing.id != lock_id {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            });
        }

        self.remove_lock_file().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ResourceState;
    use quarry_core::resource::ResourceId;
    use tempfile::tempdir;

    const MINUTE: Duration = Duration::from_secs(60);

    fn backend_in(dir: &tempfile::TempDir) -> LocalBackend {
        LocalBackend::with_path(dir.path().join("test.state.json"))
    }

    #[tokio::test]
    async fn test_local_backend_read_write() {
        let dir = tempdir().unwrap();
        let backend = backend_in(&dir);

        assert!(backend.read_state().await.unwrap().is_none());

        let mut state = StateFile::new();
        state.upsert_resource(ResourceState::new(
            &ResourceId::new("aws_db_subnet_group", "private"),
            "aws",
            "app",
        ));
        state.increment_serial();
        backend.write_state(&state).await.unwrap();

        let read = backend.read_state().await.unwrap().unwrap();
        assert_eq!(read.serial, 1);
        assert_eq!(read.resources, state.resources);
        assert!(!dir.path().join("test.state.json.tmp").exists());
    }

    #[tokio::test]
    async fn write_refuses_stale_serial_and_foreign_lineage() {
        let dir = tempdir().unwrap();
        let backend = backend_in(&dir);

        let mut state = StateFile::new();
        state.increment_serial();
        backend.write_state(&state).await.unwrap();

        assert!(matches!(
            backend.write_state(&state).await,
            Err(BackendError::StaleSerial {
                stored: 1,
                attempted: 1
            })
        ));

        let mut other = StateFile::new();
        other.increment_serial();
        other.increment_serial();
        assert!(matches!(
            backend.write_state(&other).await,
            Err(BackendError::LineageMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_local_backend_locking() {
        let dir = tempdir().unwrap();
        let backend = backend_in(&dir);

        let lock = backend.acquire_lock("create", MINUTE).await.unwrap();
        assert_eq!(lock.operation, "create");

        let err = backend.acquire_lock("delete", MINUTE).await.unwrap_err();
        assert!(matches!(err, BackendError::Locked { ref lock_id, .. } if *lock_id == lock.id));

        backend.release_lock(&lock).await.unwrap();

        let lock2 = backend.acquire_lock("delete", MINUTE).await.unwrap();
        assert!(matches!(
            backend.release_lock(&lock).await,
            Err(BackendError::LockMismatch { .. })
        ));
        backend.release_lock(&lock2).await.unwrap();
        assert!(!backend.lock_path().exists());
    }

    #[tokio::test]
    async fn expired_lock_is_taken_over() {
        let dir = tempdir().unwrap();
        let backend = backend_in(&dir);

        let mut stale = LockInfo::new("create", MINUTE);
        stale.expires = stale.created - chrono::Duration::seconds(60);
        std::fs::write(backend.lock_path(), serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = backend.acquire_lock("read", MINUTE).await.unwrap();
        assert_ne!(lock.id, stale.id);
        assert_eq!(backend.read_lock().await.unwrap(), Some(lock));
    }

    #[tokio::test]
    async fn lock_lifetime_follows_expected_run() {
        let dir = tempdir().unwrap();
        let backend = backend_in(&dir);

        let lock = backend.acquire_lock("delete", 20 * MINUTE).await.unwrap();

        let stored = backend.read_lock().await.unwrap().unwrap();
        assert_eq!(
            (stored.expires - stored.created).to_std().unwrap(),
            20 * MINUTE + crate::lock::LOCK_MARGIN
        );
        backend.release_lock(&lock).await.unwrap();
    }

    #[tokio::test]
    async fn force_unlock_checks_the_id() {
        let dir = tempdir().unwrap();
        let backend = backend_in(&dir);

        assert!(matches!(
            backend.force_unlock("nope").await,
            Err(BackendError::LockNotFound(_))
        ));

        let lock = backend.acquire_lock("create", MINUTE).await.unwrap();
        assert!(backend.force_unlock("nope").await.is_err());
        backend.force_unlock(&lock.id).await.unwrap();
        assert!(backend.read_lock().await.unwrap().is_none());
    }

    #[test]
    fn default_paths() {
        let backend = LocalBackend::new();
        assert_eq!(backend.state_path(), Path::new("quarry.state.json"));
        assert_eq!(backend.lock_path(), Path::new("quarry.state.lock"));
    }
}
