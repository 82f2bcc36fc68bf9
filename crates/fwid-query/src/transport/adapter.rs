//! Transport collaborator traits and types

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fwid_core::{EcuAddr, EcuAddress};

use super::TransportError;

/// One parallel firmware query on one bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareQuery {
    /// Bus index
    pub bus: u8,
    /// Devices to query in parallel
    pub addrs: Vec<EcuAddr>,
    /// Request frames, sent in sequence to each device
    pub request: Vec<Bytes>,
    /// Expected positive response prefix per request frame
    pub response: Vec<Bytes>,
    /// Offset between request and response address
    pub rx_offset: i32,
    /// How long to wait for responses
    pub timeout: Duration,
    /// Trace individual frames
    pub debug: bool,
}

/// Firmware payload per responding device
pub type FirmwareResponses = BTreeMap<EcuAddr, Bytes>;

/// Queries a batch of devices for their firmware version
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FwQueryTransport: Send + Sync {
    /// Send the request sequence to every address in `query` and collect
    /// the final response payload of each device that answered in time.
    ///
    /// Devices that stay silent are simply absent from the result; an
    /// error means the whole call failed.
    async fn query(&self, query: &FirmwareQuery) -> Result<FirmwareResponses, TransportError>;
}

/// Finds which devices respond on the bus at all
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceProbe: Send + Sync {
    /// Ping every `(address, sub-address, bus)` in `queries` and return the
    /// response addresses seen that are listed in `responses`.
    async fn probe(
        &self,
        queries: &BTreeSet<EcuAddress>,
        responses: &BTreeSet<EcuAddress>,
        timeout: Duration,
    ) -> Result<HashSet<EcuAddress>, TransportError>;
}
