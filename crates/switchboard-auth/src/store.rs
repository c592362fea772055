// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`CredentialStore`] implementations.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use switchboard_core::{CredentialStore, SwitchboardError};
use tokio::sync::Mutex;

/// Process-local store. Sessions vanish on exit.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, name: &str) -> Result<Option<String>, SwitchboardError> {
        Ok(self.blobs.lock().await.get(name).cloned())
    }

    async fn set(&self, name: &str, blob: &str) -> Result<(), SwitchboardError> {
        self.blobs
            .lock()
            .await
            .insert(name.to_string(), blob.to_string());
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<(), SwitchboardError> {
        self.blobs.lock().await.remove(name);
        Ok(())
    }
}

/// Stores each blob as `<dir>/<name>.json`, readable only by the owner.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

fn io_error(action: &str, e: std::io::Error) -> SwitchboardError {
    SwitchboardError::Internal(format!("credential store {action} failed: {e}"))
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, name: &str) -> Result<Option<String>, SwitchboardError> {
        match tokio::fs::read_to_string(self.path(name)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", e)),
        }
    }

    async fn set(&self, name: &str, blob: &str) -> Result<(), SwitchboardError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error("mkdir", e))?;

        let path = self.path(name);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, blob)
            .await
            .map_err(|e| io_error("write", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| io_error("chmod", e))?;
        }

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error("rename", e))
    }

    async fn clear(&self, name: &str) -> Result<(), SwitchboardError> {
        match tokio::fs::remove_file(self.path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_get_set_clear() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.get("session").await.unwrap(), None);
        store.set("session", "{}").await.unwrap();
        assert_eq!(store.get("session").await.unwrap().as_deref(), Some("{}"));
        store.clear("session").await.unwrap();
        assert_eq!(store.get("session").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested"));
        store.set("session", r#"{"token":"t"}"#).await.unwrap();

        let reopened = FileCredentialStore::new(dir.path().join("nested"));
        assert_eq!(
            reopened.get("session").await.unwrap().as_deref(),
            Some(r#"{"token":"t"}"#)
        );

        reopened.clear("session").await.unwrap();
        reopened.clear("session").await.unwrap();
        assert_eq!(store.get("session").await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        store.set("session", "x").await.unwrap();
        let mode = std::fs::metadata(dir.path().join("session.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
