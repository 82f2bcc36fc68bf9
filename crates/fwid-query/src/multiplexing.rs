//! Gateway OBD multiplexing mode control
//!
//! The mode lives in the parameter store. Another process reconfigures the
//! gateway when it changes and then sets the acknowledgement key.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::MultiplexingError;
use crate::params::ParamStore;

/// Persisted multiplexing mode
pub const OBD_MULTIPLEXING_ENABLED: &str = "ObdMultiplexingEnabled";
/// Set by the gateway daemon once a mode change is applied
pub const OBD_MULTIPLEXING_CHANGED: &str = "ObdMultiplexingChanged";

/// Switches the multiplexing mode and waits for the gateway to apply it
#[derive(Clone)]
pub struct MultiplexingController {
    store: Arc<dyn ParamStore>,
    ack_timeout: Duration,
}

impl std::fmt::Debug for MultiplexingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexingController")
            .field("ack_timeout", &self.ack_timeout)
            .finish_non_exhaustive()
    }
}

impl MultiplexingController {
    pub fn new(store: Arc<dyn ParamStore>, ack_timeout: Duration) -> Self {
        Self { store, ack_timeout }
    }

    /// Current persisted mode
    pub async fn mode(&self) -> Result<bool, MultiplexingError> {
        Ok(self.store.get_bool(OBD_MULTIPLEXING_ENABLED).await?)
    }

    /// Switch to `enabled`; returns at once when already in that mode
    pub async fn set_mode(&self, enabled: bool) -> Result<(), MultiplexingError> {
        if self.mode().await? == enabled {
            return Ok(());
        }

        warn!(enabled, "Setting OBD multiplexing");
        self.store.remove(OBD_MULTIPLEXING_CHANGED).await?;
        self.store.put_bool(OBD_MULTIPLEXING_ENABLED, enabled).await?;

        match tokio::time::timeout(
            self.ack_timeout,
            self.store.wait_bool(OBD_MULTIPLEXING_CHANGED),
        )
        .await
        {
            Ok(acknowledged) => {
                acknowledged?;
            }
            Err(_) => {
                return Err(MultiplexingError::AckTimeout {
                    enabled,
                    timeout: self.ack_timeout,
                })
            }
        }

        warn!(enabled, "OBD multiplexing set successfully");
        Ok(())
    }
}
