//! Directory-backed parameter store: one file per key, `"1"` or `"0"`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ParamStore, StoreError};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Parameters persisted as files in a directory
#[derive(Debug, Clone)]
pub struct FileParamStore {
    dir: PathBuf,
    poll_interval: Duration,
}

impl FileParamStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl ParamStore for FileParamStore {
    async fn get_bool(&self, key: &str) -> Result<bool, StoreError> {
        match tokio::fs::read_to_string(self.path(key)?).await {
            Ok(content) => Ok(content.trim() == "1"),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        let path = self.path(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, if value { "1" } else { "0" }).await?;
        debug!(key, value, "Parameter written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn wait_bool(&self, key: &str) -> Result<bool, StoreError> {
        loop {
            if self.get_bool(key).await? {
                return Ok(true);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileParamStore::new(dir.path().join("params"));

        assert!(!store.get_bool("ObdMultiplexingEnabled").await.unwrap());
        store.put_bool("ObdMultiplexingEnabled", true).await.unwrap();
        assert!(store.get_bool("ObdMultiplexingEnabled").await.unwrap());

        let raw = std::fs::read_to_string(store.dir().join("ObdMultiplexingEnabled")).unwrap();
        assert_eq!(raw, "1");

        store.put_bool("ObdMultiplexingEnabled", false).await.unwrap();
        assert!(!store.get_bool("ObdMultiplexingEnabled").await.unwrap());

        store.remove("ObdMultiplexingEnabled").await.unwrap();
        store.remove("ObdMultiplexingEnabled").await.unwrap();
        assert!(!store.dir().join("ObdMultiplexingEnabled").exists());
    }

    #[tokio::test]
    async fn test_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileParamStore::new(dir.path());
        assert!(matches!(
            store.get_bool("../escape").await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_sees_file_written_later() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileParamStore::new(dir.path()).with_poll_interval(Duration::from_millis(2));
        let writer = store.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.put_bool("Changed", true).await.unwrap();
        });

        let result = tokio::time::timeout(Duration::from_secs(2), store.wait_bool("Changed"))
            .await
            .expect("wait should finish");
        assert!(result.unwrap());
    }
}
