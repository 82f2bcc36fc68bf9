//! Data model shared by the database, matcher and scheduler

mod ecu;
mod query;
mod record;

pub use ecu::{EcuAddr, EcuAddress, EcuKey, EcuType, ESSENTIAL_ECUS, FUZZY_EXCLUDE_ECUS};
pub use query::{BrandQueryConfig, QueryRequest};
pub use record::FirmwareRecord;
