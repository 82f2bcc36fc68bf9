//! YAML brand catalogs
//!
//! One document per brand:
//!
//! ```yaml
//! brand: toyota
//! requests:
//!   - request: ["3e00", "1a8801"]
//!     response: ["7e00", "5a8801"]
//!     bus: 0
//!     obd_multiplexing: false
//! extra_ecus:
//!   - { ecu: hybrid, address: 0x7d2 }
//! non_essential_ecus:
//!   eps: ["TOYOTA RAV4 2019"]
//! models:
//!   TOYOTA RAV4 2019:
//!     - ecu: engine
//!       address: "0x7e0"
//!       versions: ["8966342T1000", "hex:0138966342t1000"]
//! ```
//!
//! Addresses and offsets accept YAML integers or `0x` strings. Request and
//! response frames are hex. Firmware versions are literal text unless
//! prefixed with `hex:`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use bytes::Bytes;
use serde::Deserialize;

use crate::addressing::DEFAULT_RX_OFFSET;
use crate::database::{Brand, ModelFingerprint};
use crate::error::{DatabaseError, DatabaseResult};
use crate::models::{BrandQueryConfig, EcuKey, EcuType, QueryRequest};

const BUILTIN: [(&str, &str); 3] = [
    ("toyota.yaml", include_str!("../catalogs/toyota.yaml")),
    ("honda.yaml", include_str!("../catalogs/honda.yaml")),
    ("hyundai.yaml", include_str!("../catalogs/hyundai.yaml")),
];

/// Integer written either as a YAML number or as a (possibly negative)
/// `0x` string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum IntLiteral {
    Int(i64),
    Str(String),
}

impl IntLiteral {
    fn value(&self) -> Result<i64, String> {
        match self {
            IntLiteral::Int(v) => Ok(*v),
            IntLiteral::Str(s) => parse_int(s),
        }
    }
}

fn parse_int(s: &str) -> Result<i64, String> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .map_err(|e| format!("'{}' is not an integer: {}", s, e))?;
    Ok(if negative { -value } else { value })
}

#[derive(Debug, Clone, Deserialize)]
struct RawRequest {
    request: Vec<String>,
    #[serde(default)]
    response: Vec<String>,
    #[serde(default)]
    whitelist_ecus: Vec<EcuType>,
    #[serde(default)]
    rx_offset: Option<IntLiteral>,
    #[serde(default = "default_bus")]
    bus: u8,
    #[serde(default)]
    logging: bool,
    #[serde(default = "default_true")]
    obd_multiplexing: bool,
}

fn default_bus() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct RawEcu {
    ecu: EcuType,
    address: IntLiteral,
    #[serde(default)]
    sub_address: Option<IntLiteral>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawModelEcu {
    ecu: EcuType,
    address: IntLiteral,
    #[serde(default)]
    sub_address: Option<IntLiteral>,
    #[serde(default)]
    versions: Vec<String>,
}

/// A parsed, not yet validated, brand catalog
#[derive(Debug, Clone, Deserialize)]
pub struct BrandCatalog {
    brand: String,
    #[serde(default)]
    requests: Vec<RawRequest>,
    #[serde(default)]
    extra_ecus: Vec<RawEcu>,
    #[serde(default)]
    non_essential_ecus: BTreeMap<EcuType, Vec<String>>,
    #[serde(default)]
    models: BTreeMap<String, Vec<RawModelEcu>>,
}

impl BrandCatalog {
    /// Parse one YAML catalog; `name` is used in error messages
    pub fn from_yaml(name: &str, yaml: &str) -> DatabaseResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| DatabaseError::Parse {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    /// Validate literals and convert into a database brand
    pub fn into_brand(self) -> DatabaseResult<Brand> {
        let name = self.brand;
        let invalid = |message: String| DatabaseError::InvalidValue {
            name: name.clone(),
            message,
        };

        let mut requests = Vec::with_capacity(self.requests.len());
        for raw in self.requests {
            let rx_offset = match raw.rx_offset {
                Some(lit) => {
                    let v = lit.value().map_err(&invalid)?;
                    i32::try_from(v).map_err(|_| invalid(format!("rx_offset {} out of range", v)))?
                }
                None => DEFAULT_RX_OFFSET,
            };
            requests.push(QueryRequest {
                request: decode_frames(&raw.request).map_err(&invalid)?,
                response: decode_frames(&raw.response).map_err(&invalid)?,
                whitelist_ecus: raw.whitelist_ecus.into_iter().collect(),
                rx_offset,
                bus: raw.bus,
                logging: raw.logging,
                obd_multiplexing: raw.obd_multiplexing,
            });
        }

        let mut config = BrandQueryConfig::new(requests);
        for raw in self.extra_ecus {
            let key = ecu_key(raw.ecu, &raw.address, raw.sub_address.as_ref()).map_err(&invalid)?;
            config.extra_ecus.insert(key);
        }
        config.non_essential_ecus = self
            .non_essential_ecus
            .into_iter()
            .map(|(ecu, models)| (ecu, models.into_iter().collect::<BTreeSet<_>>()))
            .collect();

        let mut brand = Brand::new(name.clone(), config);
        for (model, ecus) in self.models {
            let mut fingerprint = ModelFingerprint::new();
            for raw in ecus {
                let key =
                    ecu_key(raw.ecu, &raw.address, raw.sub_address.as_ref()).map_err(&invalid)?;
                let versions = raw
                    .versions
                    .iter()
                    .map(|v| decode_firmware(v))
                    .collect::<Result<BTreeSet<_>, _>>()
                    .map_err(&invalid)?;
                fingerprint.entry(key).or_default().extend(versions);
            }
            brand.models.insert(model, fingerprint);
        }

        Ok(brand)
    }
}

fn ecu_key(ecu: EcuType, address: &IntLiteral, sub: Option<&IntLiteral>) -> Result<EcuKey, String> {
    let addr = address.value()?;
    let address =
        u32::try_from(addr).map_err(|_| format!("address 0x{:X} out of range", addr))?;
    let sub_address = match sub {
        Some(lit) => {
            let v = lit.value()?;
            Some(u8::try_from(v).map_err(|_| format!("sub_address {} out of range", v))?)
        }
        None => None,
    };
    Ok(EcuKey::new(ecu, address, sub_address))
}

fn decode_frames(frames: &[String]) -> Result<Vec<Bytes>, String> {
    frames
        .iter()
        .map(|f| {
            hex::decode(f.trim())
                .map(Bytes::from)
                .map_err(|e| format!("invalid hex frame '{}': {}", f, e))
        })
        .collect()
}

/// Decode a firmware literal: `hex:` prefix for binary, text otherwise
pub fn decode_firmware(s: &str) -> Result<Bytes, String> {
    match s.strip_prefix("hex:") {
        Some(h) => hex::decode(h.trim())
            .map(Bytes::from)
            .map_err(|e| format!("invalid hex firmware '{}': {}", s, e)),
        None => Ok(Bytes::copy_from_slice(s.as_bytes())),
    }
}

/// Catalogs shipped with the crate
pub fn builtin_catalogs() -> DatabaseResult<Vec<BrandCatalog>> {
    BUILTIN
        .iter()
        .map(|(name, yaml)| BrandCatalog::from_yaml(name, yaml))
        .collect()
}

/// Parse every `.yaml`/`.yml` file in `dir`, sorted by file name
pub fn load_dir(dir: &Path) -> DatabaseResult<Vec<BrandCatalog>> {
    let io_err = |source| DatabaseError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml");
        if is_yaml {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .iter()
        .map(|path| {
            let content = std::fs::read_to_string(path).map_err(|source| DatabaseError::Io {
                path: path.clone(),
                source,
            })?;
            BrandCatalog::from_yaml(&path.display().to_string(), &content)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const SAMPLE: &str = r#"
brand: sample
requests:
  - request: ["1003", "22f181"]
    response: ["5003", "62f181"]
    whitelist_ecus: [engine, abs]
    rx_offset: "-0x10"
    bus: 0
    obd_multiplexing: false
  - request: ["22f1a0"]
    logging: true
extra_ecus:
  - { ecu: hybrid, address: 0x7d2 }
non_essential_ecus:
  eps: ["SAMPLE CAR"]
models:
  SAMPLE CAR:
    - ecu: engine
      address: "0x7e0"
      versions: ["ENG-1", "hex:00ff"]
    - ecu: fwdRadar
      address: 0x750
      sub_address: "0xf"
      versions: ["RDR-1"]
"#;

    #[rstest]
    #[case("0x7e0", 0x7E0)]
    #[case("0X18DA30F1", 0x18DA30F1)]
    #[case("-0x8", -8)]
    #[case("42", 42)]
    fn test_parse_int(#[case] input: &str, #[case] expected: i64) {
        assert_eq!(parse_int(input).unwrap(), expected);
    }

    #[test]
    fn test_parse_int_rejects_garbage() {
        assert!(parse_int("0xZZ").is_err());
        assert!(parse_int("seven").is_err());
    }

    #[test]
    fn test_catalog_into_brand() {
        let brand = BrandCatalog::from_yaml("sample.yaml", SAMPLE)
            .unwrap()
            .into_brand()
            .unwrap();

        assert_eq!(brand.name, "sample");
        assert_eq!(brand.config.requests.len(), 2);

        let first = &brand.config.requests[0];
        assert_eq!(first.request[1].as_ref(), &[0x22, 0xF1, 0x81]);
        assert_eq!(first.rx_offset, -0x10);
        assert_eq!(first.bus, 0);
        assert!(!first.obd_multiplexing);
        assert!(first.allows(EcuType::Abs));
        assert!(!first.allows(EcuType::Eps));

        let second = &brand.config.requests[1];
        assert_eq!(second.rx_offset, DEFAULT_RX_OFFSET);
        assert_eq!(second.bus, 1);
        assert!(second.logging);
        assert!(second.obd_multiplexing);
        assert!(second.allows(EcuType::Eps));

        assert!(brand
            .config
            .extra_ecus
            .contains(&EcuKey::new(EcuType::Hybrid, 0x7D2, None)));
        assert!(brand.config.is_non_essential(EcuType::Eps, "SAMPLE CAR"));

        let fw = &brand.models["SAMPLE CAR"];
        let engine = &fw[&EcuKey::new(EcuType::Engine, 0x7E0, None)];
        assert!(engine.contains(&Bytes::from_static(b"ENG-1")));
        assert!(engine.contains(&Bytes::from_static(&[0x00, 0xFF])));
        assert!(fw.contains_key(&EcuKey::new(EcuType::FwdRadar, 0x750, Some(0xF))));
    }

    #[test]
    fn test_invalid_sub_address_reported() {
        let yaml = r#"
brand: bad
models:
  BAD CAR:
    - ecu: engine
      address: 0x7e0
      sub_address: 300
      versions: ["x"]
"#;
        let err = BrandCatalog::from_yaml("bad.yaml", yaml)
            .unwrap()
            .into_brand()
            .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidValue { ref name, .. } if name == "bad"));
    }

    #[test]
    fn test_unknown_ecu_type_is_parse_error() {
        let yaml = "brand: bad\nextra_ecus:\n  - { ecu: toaster, address: 1 }\n";
        let err = BrandCatalog::from_yaml("bad.yaml", yaml).unwrap_err();
        assert!(matches!(err, DatabaseError::Parse { .. }));
    }

    #[test]
    fn test_load_dir_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yaml"), "brand: bravo\n").unwrap();
        std::fs::write(dir.path().join("a.yml"), "brand: alpha\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a catalog").unwrap();

        let catalogs = load_dir(dir.path()).unwrap();
        let names: Vec<&str> = catalogs.iter().map(|c| c.brand()).collect();
        assert_eq!(names, vec!["alpha", "bravo"]);
    }
}
