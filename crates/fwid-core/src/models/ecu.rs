//! ECU types and addressing keys

use serde::{Deserialize, Serialize};

/// ECU (address, sub-address) identity used for matching; bus is ignored
pub type EcuAddr = (u32, Option<u8>);

/// Kind of electronic control unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EcuType {
    Engine,
    Eps,
    Abs,
    FwdRadar,
    FwdCamera,
    Transmission,
    Hybrid,
    Srs,
    Gateway,
    Hud,
    CombinationMeter,
    ElectricBrakeBooster,
    ShiftByWire,
    Adas,
    CornerRadar,
    Hvac,
    ParkingAdas,
    Epb,
    Telematics,
    Body,
    Dsu,
    Vsa,
    ProgrammedFuelInjection,
    Debug,
    Unknown,
}

/// ECU types whose firmware must match for an exact fingerprint, unless
/// the brand marks them optional for a given model
pub const ESSENTIAL_ECUS: [EcuType; 6] = [
    EcuType::Engine,
    EcuType::Eps,
    EcuType::Abs,
    EcuType::FwdRadar,
    EcuType::FwdCamera,
    EcuType::Vsa,
];

/// ECU types ignored by fuzzy matching. Cameras, radars and EPS are often
/// shared between models, so they do not discriminate.
pub const FUZZY_EXCLUDE_ECUS: [EcuType; 4] = [
    EcuType::FwdCamera,
    EcuType::FwdRadar,
    EcuType::Eps,
    EcuType::Debug,
];

impl EcuType {
    pub fn is_essential(&self) -> bool {
        ESSENTIAL_ECUS.contains(self)
    }

    pub fn is_fuzzy_excluded(&self) -> bool {
        FUZZY_EXCLUDE_ECUS.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EcuType::Engine => "engine",
            EcuType::Eps => "eps",
            EcuType::Abs => "abs",
            EcuType::FwdRadar => "fwdRadar",
            EcuType::FwdCamera => "fwdCamera",
            EcuType::Transmission => "transmission",
            EcuType::Hybrid => "hybrid",
            EcuType::Srs => "srs",
            EcuType::Gateway => "gateway",
            EcuType::Hud => "hud",
            EcuType::CombinationMeter => "combinationMeter",
            EcuType::ElectricBrakeBooster => "electricBrakeBooster",
            EcuType::ShiftByWire => "shiftByWire",
            EcuType::Adas => "adas",
            EcuType::CornerRadar => "cornerRadar",
            EcuType::Hvac => "hvac",
            EcuType::ParkingAdas => "parkingAdas",
            EcuType::Epb => "epb",
            EcuType::Telematics => "telematics",
            EcuType::Body => "body",
            EcuType::Dsu => "dsu",
            EcuType::Vsa => "vsa",
            EcuType::ProgrammedFuelInjection => "programmedFuelInjection",
            EcuType::Debug => "debug",
            EcuType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EcuType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ECU entry in the fingerprint database: type plus request address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EcuKey {
    pub ecu: EcuType,
    pub address: u32,
    pub sub_address: Option<u8>,
}

impl EcuKey {
    pub fn new(ecu: EcuType, address: u32, sub_address: Option<u8>) -> Self {
        Self {
            ecu,
            address,
            sub_address,
        }
    }

    /// Matching identity of this ECU (type dropped)
    pub fn addr(&self) -> EcuAddr {
        (self.address, self.sub_address)
    }
}

/// A device address observed on a specific bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EcuAddress {
    pub address: u32,
    pub sub_address: Option<u8>,
    pub bus: u8,
}

impl EcuAddress {
    pub fn new(address: u32, sub_address: Option<u8>, bus: u8) -> Self {
        Self {
            address,
            sub_address,
            bus,
        }
    }

    pub fn addr(&self) -> EcuAddr {
        (self.address, self.sub_address)
    }
}
