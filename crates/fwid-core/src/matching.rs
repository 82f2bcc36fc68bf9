//! Firmware fingerprint matching
//!
//! Exact matching keeps every model whose essential ECUs all report a known
//! firmware version. Fuzzy matching looks for firmware versions that only
//! one model in the database has, and accepts a model once two different
//! ECUs point at it and nothing points elsewhere.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::database::FingerprintDatabase;
use crate::models::{EcuAddr, EcuType, FirmwareRecord};

/// Observed firmware per (address, sub-address)
pub type ObservedFirmware = BTreeMap<EcuAddr, BTreeSet<Bytes>>;

/// Group records by address, keeping one brand (or all when `None`) and
/// dropping logging-only records
pub fn build_fw_dict(records: &[FirmwareRecord], filter_brand: Option<&str>) -> ObservedFirmware {
    let mut observed = ObservedFirmware::new();
    for record in records {
        let brand_ok = filter_brand.map_or(true, |b| record.brand == b);
        if brand_ok && !record.logging {
            observed
                .entry(record.addr())
                .or_default()
                .insert(record.fw_version.clone());
        }
    }
    observed
}

/// Outcome of an identification attempt
///
/// `exact == true` with no candidates means the vehicle was not identified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub exact: bool,
    pub candidates: BTreeSet<String>,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            exact: true,
            candidates: BTreeSet::new(),
        }
    }

    /// The single identified model, if exactly one candidate remains
    pub fn unique(&self) -> Option<&str> {
        if self.candidates.len() == 1 {
            self.candidates.iter().next().map(String::as_str)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Exact,
    Fuzzy,
}

/// Matches observed firmware against a shared fingerprint database
#[derive(Debug, Clone)]
pub struct FingerprintMatcher {
    db: Arc<FingerprintDatabase>,
}

impl FingerprintMatcher {
    pub fn new(db: Arc<FingerprintDatabase>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<FingerprintDatabase> {
        &self.db
    }

    /// Every model whose ECUs agree with `observed`.
    ///
    /// A missing ECU is tolerated when it is not essential, is the debug
    /// ECU, or the brand lists it as optional for that model. A present ECU
    /// must report at least one known version; debug ECUs are never
    /// compared.
    pub fn match_exact(&self, observed: &ObservedFirmware) -> BTreeSet<String> {
        let mut candidates = BTreeSet::new();

        'models: for (brand, model, fws) in self.db.models() {
            for (key, expected) in fws {
                if key.ecu == EcuType::Debug {
                    continue;
                }

                let found = observed.get(&key.addr()).filter(|f| !f.is_empty());
                match found {
                    None => {
                        let optional = !key.ecu.is_essential()
                            || brand.config.is_non_essential(key.ecu, model);
                        if !optional {
                            continue 'models;
                        }
                    }
                    Some(found) => {
                        if !found.iter().any(|v| expected.contains(v)) {
                            continue 'models;
                        }
                    }
                }
            }
            candidates.insert(model.to_string());
        }

        candidates
    }

    /// Fuzzy match, ignoring model `exclude` when building the lookup.
    ///
    /// Returns at most one model.
    pub fn match_fuzzy(
        &self,
        observed: &ObservedFirmware,
        exclude: Option<&str>,
        log: bool,
    ) -> BTreeSet<String> {
        // (address, sub-address, firmware) -> models that list it
        let mut owners: HashMap<(u32, Option<u8>, Bytes), Vec<&str>> = HashMap::new();
        for (_, model, fws) in self.db.models() {
            if Some(model) == exclude {
                continue;
            }
            for (key, versions) in fws {
                if key.ecu.is_fuzzy_excluded() {
                    continue;
                }
                for version in versions {
                    owners
                        .entry((key.address, key.sub_address, version.clone()))
                        .or_default()
                        .push(model);
                }
            }
        }

        let mut matched_ecus: BTreeSet<EcuAddr> = BTreeSet::new();
        let mut candidate: Option<&str> = None;

        for (&(addr, sub_addr), versions) in observed {
            for version in versions {
                let Some(models) = owners.get(&(addr, sub_addr, version.clone())) else {
                    continue;
                };
                if let [only] = models.as_slice() {
                    let only = *only;
                    matched_ecus.insert((addr, sub_addr));
                    match candidate {
                        None => candidate = Some(only),
                        Some(current) if current != only => {
                            debug!(
                                first = current,
                                second = only,
                                "Fuzzy match ambiguous: ECUs uniquely match different models"
                            );
                            return BTreeSet::new();
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        // The model's other ECUs need not be present once two agree
        match candidate {
            Some(model) if matched_ecus.len() >= 2 => {
                if log {
                    warn!(
                        model,
                        matching_ecus = matched_ecus.len(),
                        "Fingerprinted using fuzzy match"
                    );
                }
                BTreeSet::from([model.to_string()])
            }
            _ => BTreeSet::new(),
        }
    }

    /// Identify from scan records: exact per brand first, then fuzzy per
    /// brand. The first strategy that yields any candidate wins.
    pub fn match_records(
        &self,
        records: &[FirmwareRecord],
        allow_exact: bool,
        allow_fuzzy: bool,
        log: bool,
    ) -> MatchResult {
        let mut strategies = Vec::with_capacity(2);
        if allow_exact {
            strategies.push(Strategy::Exact);
        }
        if allow_fuzzy {
            strategies.push(Strategy::Fuzzy);
        }

        for strategy in strategies {
            let mut matches = BTreeSet::new();
            for brand in self.db.brands() {
                let observed = build_fw_dict(records, Some(&brand.name));
                matches.extend(match strategy {
                    Strategy::Exact => self.match_exact(&observed),
                    Strategy::Fuzzy => self.match_fuzzy(&observed, None, log),
                });
            }

            if !matches.is_empty() {
                return MatchResult {
                    exact: strategy == Strategy::Exact,
                    candidates: matches,
                };
            }
        }

        MatchResult::no_match()
    }
}
