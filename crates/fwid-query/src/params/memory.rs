//! In-process parameter store

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;

use super::{ParamStore, StoreError};

/// Parameter store held in memory
///
/// With [`MemoryParamStore::with_acknowledger`] it also plays the part of
/// the daemon that reacts to a parameter: every write to the watched key
/// sets the acknowledgement key.
#[derive(Debug, Default)]
pub struct MemoryParamStore {
    values: RwLock<HashMap<String, bool>>,
    changed: Notify,
    acknowledger: Option<(String, String)>,
    writes: AtomicUsize,
}

impl MemoryParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `ack_key` whenever `watched_key` is written
    pub fn with_acknowledger(watched_key: impl Into<String>, ack_key: impl Into<String>) -> Self {
        Self {
            acknowledger: Some((watched_key.into(), ack_key.into())),
            ..Default::default()
        }
    }

    /// Set a value directly, as an external actor would
    pub fn set(&self, key: &str, value: bool) {
        self.values.write().insert(key.to_string(), value);
        self.changed.notify_waiters();
    }

    /// Number of `put_bool` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn read(&self, key: &str) -> bool {
        self.values.read().get(key).copied().unwrap_or(false)
    }
}

#[async_trait]
impl ParamStore for MemoryParamStore {
    async fn get_bool(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.read(key))
    }

    async fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        {
            let mut values = self.values.write();
            values.insert(key.to_string(), value);
            if let Some((watched, ack)) = &self.acknowledger {
                if watched == key {
                    values.insert(ack.clone(), true);
                }
            }
        }
        self.changed.notify_waiters();
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().remove(key);
        self.changed.notify_waiters();
        Ok(())
    }

    async fn wait_bool(&self, key: &str) -> Result<bool, StoreError> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent write is not missed
            notified.as_mut().enable();
            if self.read(key) {
                return Ok(true);
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_missing_key_reads_false() {
        let store = MemoryParamStore::new();
        assert!(!store.get_bool("Anything").await.unwrap());
        store.put_bool("Anything", true).await.unwrap();
        assert!(store.get_bool("Anything").await.unwrap());
        store.remove("Anything").await.unwrap();
        assert!(!store.get_bool("Anything").await.unwrap());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_acknowledger_sets_ack_key() {
        let store = MemoryParamStore::with_acknowledger("Mode", "ModeChanged");
        store.put_bool("Other", true).await.unwrap();
        assert!(!store.get_bool("ModeChanged").await.unwrap());
        store.put_bool("Mode", false).await.unwrap();
        assert!(store.get_bool("ModeChanged").await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_external_set() {
        let store = Arc::new(MemoryParamStore::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_bool("Ready").await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        store.set("Ready", true);

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
        assert!(result.unwrap());
    }
}
