//! fwid-query - ECU firmware query scheduling
//!
//! Decides which ECU addresses to ask for firmware versions, in which
//! order and batch sizes, and under which gateway multiplexing mode. The
//! bus transport, presence probe and parameter store are collaborators
//! behind traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      QueryScheduler                         │
//! │                                                             │
//! │  ┌──────────────────┐ ┌────────────────┐ ┌───────────────┐  │
//! │  │FingerprintDatabase│ │FingerprintMatcher│ │ BrandRanking │  │
//! │  │ (shared, Arc)    │ │ (early exit)   │ │ (scan order)  │  │
//! │  └──────────────────┘ └────────────────┘ └───────────────┘  │
//! │            │                    │                           │
//! │   ┌────────┴────────┐  ┌────────┴──────────┐                │
//! │   │FwQueryTransport │  │MultiplexingController│             │
//! │   │PresenceProbe    │  │   (ParamStore)     │               │
//! │   └─────────────────┘  └───────────────────┘                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod multiplexing;
pub mod params;
pub mod scheduler;
pub mod transport;

pub use config::ScanConfig;
pub use error::{MultiplexingError, ScanError};
pub use multiplexing::{MultiplexingController, OBD_MULTIPLEXING_CHANGED, OBD_MULTIPLEXING_ENABLED};
pub use params::{FileParamStore, MemoryParamStore, ParamStore, StoreError};
pub use scheduler::{
    EcuTypeTable, Identification, QueryPlan, QueryScheduler, ScanTarget, ScanTargets, ANY_BRAND,
    DEBUG_MODEL,
};
pub use transport::{
    FirmwareQuery, FirmwareResponses, FwQueryTransport, PresenceProbe, SimulatedBus, SimulatedEcu,
    TransportError,
};

// Re-export for convenience
pub use fwid_core::{
    EcuAddress, EcuKey, EcuType, FingerprintDatabase, FingerprintMatcher, FirmwareRecord,
    MatchResult,
};
