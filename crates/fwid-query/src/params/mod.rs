//! Persistent key-value parameters
//!
//! The scheduler only uses these to hand the multiplexing mode to the
//! gateway daemon and wait for its acknowledgement.

mod file;
mod memory;

pub use file::FileParamStore;
pub use memory::MemoryParamStore;

use async_trait::async_trait;
use thiserror::Error;

/// Parameter store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Boolean parameters shared with other processes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParamStore: Send + Sync {
    /// Current value; a missing key reads as `false`
    async fn get_bool(&self, key: &str) -> Result<bool, StoreError>;

    async fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError>;

    /// Delete a key; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Resolve once `key` reads `true`.
    ///
    /// This never times out on its own; callers bound it.
    async fn wait_bool(&self, key: &str) -> Result<bool, StoreError>;
}
