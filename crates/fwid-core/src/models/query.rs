//! Per-brand firmware query configuration

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use serde::Serialize;

use super::{EcuKey, EcuType};
use crate::addressing::DEFAULT_RX_OFFSET;

/// One firmware version request a brand issues
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRequest {
    /// Request frames sent in sequence (e.g. session change, then read)
    pub request: Vec<Bytes>,
    /// Expected positive response prefixes, one per request frame
    pub response: Vec<Bytes>,
    /// Only ECUs of these types are queried; empty means all
    pub whitelist_ecus: BTreeSet<EcuType>,
    /// Offset between request and response address
    pub rx_offset: i32,
    /// Bus index, four per attached adapter
    pub bus: u8,
    /// Responses are collected for logging only, never for matching
    pub logging: bool,
    /// Gateway multiplexing mode this request needs on the secondary bus
    pub obd_multiplexing: bool,
}

impl QueryRequest {
    pub fn new(request: Vec<Bytes>, response: Vec<Bytes>) -> Self {
        Self {
            request,
            response,
            whitelist_ecus: BTreeSet::new(),
            rx_offset: DEFAULT_RX_OFFSET,
            bus: 1,
            logging: false,
            obd_multiplexing: true,
        }
    }

    pub fn with_bus(mut self, bus: u8) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_rx_offset(mut self, rx_offset: i32) -> Self {
        self.rx_offset = rx_offset;
        self
    }

    pub fn with_whitelist(mut self, ecus: impl IntoIterator<Item = EcuType>) -> Self {
        self.whitelist_ecus = ecus.into_iter().collect();
        self
    }

    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_obd_multiplexing(mut self, obd_multiplexing: bool) -> Self {
        self.obd_multiplexing = obd_multiplexing;
        self
    }

    /// Whether an ECU of this type passes the whitelist
    pub fn allows(&self, ecu: EcuType) -> bool {
        self.whitelist_ecus.is_empty() || self.whitelist_ecus.contains(&ecu)
    }
}

/// How firmware is queried for one brand, and which ECUs are optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrandQueryConfig {
    /// Requests in priority order
    pub requests: Vec<QueryRequest>,
    /// ECUs queried for data collection only
    pub extra_ecus: BTreeSet<EcuKey>,
    /// Per ECU type, the models for which that ECU may be missing
    pub non_essential_ecus: BTreeMap<EcuType, BTreeSet<String>>,
}

impl BrandQueryConfig {
    pub fn new(requests: Vec<QueryRequest>) -> Self {
        Self {
            requests,
            ..Default::default()
        }
    }

    pub fn with_extra_ecu(mut self, key: EcuKey) -> Self {
        self.extra_ecus.insert(key);
        self
    }

    pub fn with_non_essential(mut self, ecu: EcuType, model: impl Into<String>) -> Self {
        self.non_essential_ecus
            .entry(ecu)
            .or_default()
            .insert(model.into());
        self
    }

    /// Whether `model` may lack an ECU of type `ecu`
    pub fn is_non_essential(&self, ecu: EcuType, model: &str) -> bool {
        self.non_essential_ecus
            .get(&ecu)
            .is_some_and(|models| models.contains(model))
    }
}
