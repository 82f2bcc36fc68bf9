//! Scan errors

use std::time::Duration;

use thiserror::Error;

use crate::params::StoreError;

/// Failure to switch the gateway multiplexing mode
#[derive(Debug, Error)]
pub enum MultiplexingError {
    /// The gateway did not acknowledge the change in time
    #[error("Timed out after {timeout:?} waiting for OBD multiplexing change to {enabled}")]
    AckTimeout { enabled: bool, timeout: Duration },

    /// The parameter store failed
    #[error("Parameter store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that abort a scan
///
/// Transport failures are not among them: a failed query contributes no
/// records and the scan moves on.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Multiplexing error: {0}")]
    Multiplexing(#[from] MultiplexingError),
}
