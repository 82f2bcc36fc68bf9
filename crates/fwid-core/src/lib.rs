//! fwid-core - Fingerprint database and firmware matching
//!
//! This crate holds everything needed to turn a list of observed ECU
//! firmware responses into a set of candidate vehicle models:
//!
//! - [`FingerprintDatabase`]: brand → model → ECU → known firmware, plus
//!   the per-brand query configuration and derived address indices.
//! - [`FingerprintMatcher`]: exact and fuzzy matching over observed firmware.
//! - [`BrandRanking`]: orders brands by how many of their ECUs answered a
//!   presence probe.
//!
//! The database is built once and shared read-only (`Arc`) by every
//! component; nothing in this crate mutates it after construction.

pub mod addressing;
pub mod catalog;
pub mod database;
pub mod error;
pub mod matching;
pub mod models;
pub mod ranking;

pub use addressing::{rx_addr_for_tx_addr, DEFAULT_RX_OFFSET, FUNCTIONAL_ADDRS};
pub use database::{Brand, FingerprintDatabase, ModelFingerprint};
pub use error::{DatabaseError, DatabaseResult};
pub use matching::{build_fw_dict, FingerprintMatcher, MatchResult, ObservedFirmware};
pub use models::*;
pub use ranking::{BrandMatch, BrandRanking};
