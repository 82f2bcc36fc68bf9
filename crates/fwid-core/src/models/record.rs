//! Observed firmware records

use bytes::Bytes;
use serde::Serialize;

use super::{EcuAddr, EcuType};

/// Firmware reported by one ECU in answer to one request
///
/// Created by the query scheduler and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareRecord {
    /// ECU type as known from the database, `unknown` if not listed
    pub ecu: EcuType,
    /// Request address
    pub address: u32,
    pub sub_address: Option<u8>,
    /// Brand whose request produced this record
    pub brand: String,
    pub bus: u8,
    /// Request frames that produced this response
    pub request: Vec<Bytes>,
    /// Response address, absent for functional requests
    pub response_address: Option<u32>,
    /// Raw firmware version bytes
    pub fw_version: Bytes,
    /// Collected for logging only; excluded from matching
    pub logging: bool,
    /// Multiplexing mode that was active for the request
    pub obd_multiplexing: bool,
}

impl FirmwareRecord {
    pub fn addr(&self) -> EcuAddr {
        (self.address, self.sub_address)
    }
}
