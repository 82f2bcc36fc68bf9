//! Brand ranking from ECUs that answered a presence probe

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::addressing::rx_addr_for_tx_addr;
use crate::database::FingerprintDatabase;
use crate::models::{EcuAddr, EcuAddress};

/// Known addresses of one brand that answered the probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrandMatch {
    pub brand: String,
    pub matched: BTreeSet<EcuAddr>,
}

impl BrandMatch {
    pub fn count(&self) -> usize {
        self.matched.len()
    }
}

/// Per-brand probe matches, in database brand order
///
/// Only orders the scan; never used for the final identification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrandRanking {
    matches: Vec<BrandMatch>,
}

impl BrandRanking {
    /// Score every brand that has requests against the responding ECUs.
    ///
    /// Which request an ECU answered is unknown, so each response address is
    /// mapped back through every rx offset the brand uses.
    pub fn from_present_ecus(db: &FingerprintDatabase, present: &HashSet<EcuAddress>) -> Self {
        let matches = db
            .brands()
            .iter()
            .filter(|brand| !brand.config.requests.is_empty())
            .map(|brand| {
                let offsets: BTreeSet<i32> =
                    brand.config.requests.iter().map(|r| r.rx_offset).collect();
                let known = db.brand_addrs(&brand.name);

                let mut matched = BTreeSet::new();
                for ecu in present {
                    for &offset in &offsets {
                        let Some(tx_addr) = rx_addr_for_tx_addr(ecu.address, -offset) else {
                            continue;
                        };
                        let addr = (tx_addr, ecu.sub_address);
                        if known.is_some_and(|k| k.contains(&addr)) {
                            matched.insert(addr);
                        }
                    }
                }

                BrandMatch {
                    brand: brand.name.clone(),
                    matched,
                }
            })
            .collect();

        Self { matches }
    }

    pub fn matches(&self) -> &[BrandMatch] {
        &self.matches
    }

    pub fn count(&self, brand: &str) -> usize {
        self.matches
            .iter()
            .find(|m| m.brand == brand)
            .map_or(0, BrandMatch::count)
    }

    /// Brands with at least one match, most matches first; ties keep
    /// database order
    pub fn ranked(&self) -> Vec<&BrandMatch> {
        let mut ranked: Vec<&BrandMatch> = self.matches.iter().filter(|m| m.count() > 0).collect();
        ranked.sort_by(|a, b| b.count().cmp(&a.count()));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Brand, ModelFingerprint};
    use crate::models::{BrandQueryConfig, EcuKey, EcuType, QueryRequest};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn model(keys: &[(u32, Option<u8>)]) -> ModelFingerprint {
        keys.iter()
            .map(|(addr, sub)| {
                (
                    EcuKey::new(EcuType::Engine, *addr, *sub),
                    [Bytes::from_static(b"fw")].into_iter().collect(),
                )
            })
            .collect()
    }

    fn request(rx_offset: i32) -> QueryRequest {
        QueryRequest::new(vec![Bytes::from_static(b"\x22\xf1\x81")], vec![]).with_rx_offset(rx_offset)
    }

    fn db() -> FingerprintDatabase {
        FingerprintDatabase::new(vec![
            Brand::new("alpha", BrandQueryConfig::new(vec![request(0x8)]))
                .with_model("A1", model(&[(0x7E0, None)])),
            Brand::new(
                "bravo",
                BrandQueryConfig::new(vec![request(0x8), request(0x6A)])
                    .with_extra_ecu(EcuKey::new(EcuType::Hybrid, 0x7D2, None)),
            )
            .with_model("B1", model(&[(0x7E0, None), (0x750, Some(0xF)), (0x18DA30F1, None)])),
            Brand::new("charlie", BrandQueryConfig::default())
                .with_model("C1", model(&[(0x7E0, None)])),
        ])
        .unwrap()
    }

    #[test]
    fn test_ranking_reverses_every_offset() {
        let present: HashSet<EcuAddress> = [
            EcuAddress::new(0x7E8, None, 1),
            EcuAddress::new(0x7BA, Some(0xF), 0),
            EcuAddress::new(0x18DAF130, None, 1),
            EcuAddress::new(0x7DA, None, 1),
            EcuAddress::new(0x123, None, 1),
        ]
        .into_iter()
        .collect();

        let ranking = BrandRanking::from_present_ecus(&db(), &present);

        // Brands without requests are not ranked
        let brands: Vec<&str> = ranking.matches().iter().map(|m| m.brand.as_str()).collect();
        assert_eq!(brands, vec!["alpha", "bravo"]);

        assert_eq!(ranking.count("alpha"), 1);
        assert_eq!(ranking.count("bravo"), 4);
        assert_eq!(ranking.count("charlie"), 0);

        let ranked: Vec<&str> = ranking.ranked().iter().map(|m| m.brand.as_str()).collect();
        assert_eq!(ranked, vec!["bravo", "alpha"]);
    }

    #[test]
    fn test_ranking_ties_keep_database_order_and_skip_zero() {
        let present: HashSet<EcuAddress> = [EcuAddress::new(0x7E8, None, 0)].into_iter().collect();
        let ranking = BrandRanking::from_present_ecus(&db(), &present);
        let ranked: Vec<&str> = ranking.ranked().iter().map(|m| m.brand.as_str()).collect();
        assert_eq!(ranked, vec!["alpha", "bravo"]);

        let empty = BrandRanking::from_present_ecus(&db(), &HashSet::new());
        assert!(empty.ranked().is_empty());
    }
}
