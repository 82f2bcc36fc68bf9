//! Firmware query scheduling
//!
//! A scan walks every target address, grouped so that devices without a
//! sub-address are queried together and each sub-addressed device is
//! queried alone. Each group is chunked, and every chunk is offered to every
//! configured request in priority order.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use fwid_core::{
    build_fw_dict, rx_addr_for_tx_addr, Brand, BrandRanking, EcuAddr, EcuAddress, EcuKey, EcuType,
    FingerprintDatabase, FingerprintMatcher, FirmwareRecord, MatchResult, QueryRequest,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::multiplexing::MultiplexingController;
use crate::params::ParamStore;
use crate::transport::{FirmwareQuery, FirmwareResponses, FwQueryTransport, PresenceProbe};

/// Wildcard brand: its targets are offered to every brand's requests
pub const ANY_BRAND: &str = "any";

/// Pseudo model under which a brand's extra ECUs are scanned
pub const DEBUG_MODEL: &str = "debug";

/// One address to scan, owned by a brand (or [`ANY_BRAND`])
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanTarget {
    pub brand: String,
    pub address: u32,
    pub sub_address: Option<u8>,
}

impl ScanTarget {
    pub fn addr(&self) -> EcuAddr {
        (self.address, self.sub_address)
    }
}

/// ECUs to scan, per brand, in discovery order
#[derive(Debug, Clone, Default)]
pub struct ScanTargets {
    entries: Vec<(String, String, EcuKey)>,
}

impl ScanTargets {
    /// Every model ECU of every brand (or only `query_brand`), followed by
    /// each brand's extra ECUs as the [`DEBUG_MODEL`]
    pub fn from_database(db: &FingerprintDatabase, query_brand: Option<&str>) -> Self {
        let mut entries = Vec::new();
        for brand in db.brands() {
            if query_brand.is_some_and(|q| q != brand.name) {
                continue;
            }
            for (model, fingerprint) in &brand.models {
                for key in fingerprint.keys() {
                    entries.push((brand.name.clone(), model.clone(), *key));
                }
            }
            for key in &brand.config.extra_ecus {
                entries.push((brand.name.clone(), DEBUG_MODEL.to_string(), *key));
            }
        }
        Self { entries }
    }

    /// Add ECUs under `brand`, usually [`ANY_BRAND`]
    pub fn with_extra(mut self, brand: &str, keys: impl IntoIterator<Item = EcuKey>) -> Self {
        self.entries.extend(
            keys.into_iter()
                .map(|key| (brand.to_string(), DEBUG_MODEL.to_string(), key)),
        );
        self
    }

    /// Wildcard targets covering the common diagnostic address ranges
    pub fn exploratory() -> Self {
        Self::default().with_extra(ANY_BRAND, Self::exploratory_keys())
    }

    /// Address ranges swept by an exploratory scan
    pub fn exploratory_keys() -> Vec<EcuKey> {
        let mut keys = Vec::with_capacity(3 * 256);
        for i in 0..=255u8 {
            keys.push(EcuKey::new(EcuType::Unknown, 0x18DA00F1 + (u32::from(i) << 8), None));
            keys.push(EcuKey::new(EcuType::Unknown, 0x700 + u32::from(i), None));
            keys.push(EcuKey::new(EcuType::Unknown, 0x750, Some(i)));
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Partition into query groups and record each target's ECU type
    pub fn plan(&self) -> QueryPlan {
        let mut parallel: Vec<ScanTarget> = Vec::new();
        let mut seen_parallel: HashSet<ScanTarget> = HashSet::new();
        let mut serial: Vec<Vec<ScanTarget>> = Vec::new();
        let mut seen_serial: HashSet<ScanTarget> = HashSet::new();
        let mut ecu_types = EcuTypeTable::default();

        for (brand, _model, key) in &self.entries {
            let target = ScanTarget {
                brand: brand.clone(),
                address: key.address,
                sub_address: key.sub_address,
            };
            ecu_types.insert_first(&target, key.ecu);

            if target.sub_address.is_none() {
                if seen_parallel.insert(target.clone()) {
                    parallel.push(target);
                }
            } else if seen_serial.insert(target.clone()) {
                serial.push(vec![target]);
            }
        }

        let mut groups = Vec::with_capacity(serial.len() + 1);
        groups.push(parallel);
        groups.extend(serial);

        QueryPlan { groups, ecu_types }
    }
}

/// ECU type per scan target, first seen wins; unlisted targets are
/// [`EcuType::Unknown`]
#[derive(Debug, Clone, Default)]
pub struct EcuTypeTable {
    types: HashMap<ScanTarget, EcuType>,
}

impl EcuTypeTable {
    fn insert_first(&mut self, target: &ScanTarget, ecu: EcuType) {
        self.types.entry(target.clone()).or_insert(ecu);
    }

    pub fn get(&self, brand: &str, address: u32, sub_address: Option<u8>) -> EcuType {
        let target = ScanTarget {
            brand: brand.to_string(),
            address,
            sub_address,
        };
        self.types.get(&target).copied().unwrap_or(EcuType::Unknown)
    }
}

/// Query groups for one scan
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Parallel group first, then one group per sub-addressed target
    pub groups: Vec<Vec<ScanTarget>>,
    pub ecu_types: EcuTypeTable,
}

impl QueryPlan {
    /// Every group split into batches of at most `chunk_size` targets, in
    /// order
    pub fn batches(&self, chunk_size: usize) -> impl Iterator<Item = &[ScanTarget]> + '_ {
        let size = chunk_size.max(1);
        self.groups.iter().flat_map(move |group| group.chunks(size))
    }
}

/// Records gathered by an identification run and the resulting match
#[derive(Debug, Clone, Serialize)]
pub struct Identification {
    pub present: BTreeSet<EcuAddress>,
    /// Brand order the scan followed
    pub ranking: BrandRanking,
    pub records: Vec<FirmwareRecord>,
    pub result: MatchResult,
}

/// Schedules firmware queries over the transport collaborators
pub struct QueryScheduler {
    db: Arc<FingerprintDatabase>,
    matcher: FingerprintMatcher,
    transport: Arc<dyn FwQueryTransport>,
    probe: Arc<dyn PresenceProbe>,
    multiplexing: MultiplexingController,
    config: ScanConfig,
}

impl QueryScheduler {
    pub fn new(
        db: Arc<FingerprintDatabase>,
        transport: Arc<dyn FwQueryTransport>,
        probe: Arc<dyn PresenceProbe>,
        params: Arc<dyn ParamStore>,
        config: ScanConfig,
    ) -> Self {
        let multiplexing = MultiplexingController::new(params, config.multiplexing_ack_timeout());
        Self {
            matcher: FingerprintMatcher::new(db.clone()),
            db,
            transport,
            probe,
            multiplexing,
            config,
        }
    }

    pub fn database(&self) -> &Arc<FingerprintDatabase> {
        &self.db
    }

    pub fn matcher(&self) -> &FingerprintMatcher {
        &self.matcher
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Query firmware for every known ECU, or only `query_brand`'s, plus
    /// optional extra targets
    pub async fn get_fw_versions(
        &self,
        query_brand: Option<&str>,
        extra: Option<ScanTargets>,
    ) -> Result<Vec<FirmwareRecord>, ScanError> {
        let mut targets = ScanTargets::from_database(&self.db, query_brand);
        if let Some(extra) = extra {
            targets.entries.extend(extra.entries);
        }
        self.scan(&targets, query_brand).await
    }

    /// Query firmware for `targets` using the requests of `query_brand`
    /// (all brands when `None`)
    pub async fn scan(
        &self,
        targets: &ScanTargets,
        query_brand: Option<&str>,
    ) -> Result<Vec<FirmwareRecord>, ScanError> {
        let plan = targets.plan();
        let requests: Vec<(&Brand, &QueryRequest)> = self
            .db
            .requests()
            .filter(|(brand, _)| query_brand.map_or(true, |q| brand.name == q))
            .collect();

        debug!(
            brand = query_brand.unwrap_or("all"),
            targets = targets.len(),
            groups = plan.groups.len(),
            requests = requests.len(),
            "Starting firmware scan"
        );

        let mut records = Vec::new();
        let mut applied_mode: Option<bool> = None;

        for chunk in plan.batches(self.config.chunk_size) {
            for &(brand, request) in &requests {
                if !self.config.bus_available(request.bus) {
                    continue;
                }

                if request.bus % 4 == 1 && applied_mode != Some(request.obd_multiplexing) {
                    self.multiplexing.set_mode(request.obd_multiplexing).await?;
                    applied_mode = Some(request.obd_multiplexing);
                }

                let addrs: Vec<EcuAddr> = chunk
                    .iter()
                    .filter(|t| t.brand == brand.name || t.brand == ANY_BRAND)
                    .filter(|t| {
                        request.allows(plan.ecu_types.get(&t.brand, t.address, t.sub_address))
                    })
                    .map(ScanTarget::addr)
                    .collect();
                if addrs.is_empty() {
                    continue;
                }

                let query = FirmwareQuery {
                    bus: request.bus,
                    addrs,
                    request: request.request.clone(),
                    response: request.response.clone(),
                    rx_offset: request.rx_offset,
                    timeout: self.config.timeout(),
                    debug: self.config.debug,
                };

                match self.transport.query(&query).await {
                    Ok(responses) => {
                        records.extend(build_records(brand, request, &plan, responses));
                    }
                    Err(e) => {
                        warn!(
                            brand = %brand.name,
                            bus = request.bus,
                            addrs = query.addrs.len(),
                            error = %e,
                            "FW query failed"
                        );
                    }
                }
            }
        }

        debug!(records = records.len(), "Firmware scan complete");
        Ok(records)
    }

    /// Probe every address any brand might query and return the response
    /// addresses that answered
    pub async fn get_present_ecus(&self) -> Result<HashSet<EcuAddress>, ScanError> {
        // Indexed by multiplexing mode: [disabled, enabled]
        let mut parallel: [Vec<EcuAddress>; 2] = [Vec::new(), Vec::new()];
        let mut serial: [Vec<EcuAddress>; 2] = [Vec::new(), Vec::new()];
        let mut responses = BTreeSet::new();

        for (brand, request) in self.db.requests() {
            if !self.config.bus_available(request.bus) {
                continue;
            }
            let mode = usize::from(request.obd_multiplexing);

            let keys = brand
                .models
                .values()
                .flat_map(|fw| fw.keys())
                .chain(brand.config.extra_ecus.iter());
            for key in keys {
                if !request.allows(key.ecu) {
                    continue;
                }

                let target = EcuAddress::new(key.address, key.sub_address, request.bus);
                let group = if key.sub_address.is_none() {
                    &mut parallel[mode]
                } else {
                    &mut serial[mode]
                };
                if !group.contains(&target) {
                    group.push(target);
                }

                if let Some(rx) = rx_addr_for_tx_addr(key.address, request.rx_offset) {
                    responses.insert(EcuAddress::new(rx, key.sub_address, request.bus));
                }
            }
        }

        let mut present = HashSet::new();
        for enabled in [true, false] {
            let mode = usize::from(enabled);
            let mut groups: Vec<BTreeSet<EcuAddress>> = Vec::new();
            if !parallel[mode].is_empty() {
                groups.push(parallel[mode].iter().copied().collect());
            }
            groups.extend(serial[mode].iter().map(|t| BTreeSet::from([*t])));
            if groups.is_empty() {
                continue;
            }

            self.multiplexing.set_mode(enabled).await?;
            for group in &groups {
                match self
                    .probe
                    .probe(group, &responses, self.config.probe_timeout())
                    .await
                {
                    Ok(found) => present.extend(found),
                    Err(e) => warn!(
                        obd_multiplexing = enabled,
                        targets = group.len(),
                        error = %e,
                        "Presence probe failed"
                    ),
                }
            }
        }

        info!(count = present.len(), "Present ECUs found");
        Ok(present)
    }

    /// Query brands in order of likelihood, stopping as soon as one brand's
    /// own records give a single exact match
    pub async fn get_fw_versions_ordered(
        &self,
        present: &HashSet<EcuAddress>,
    ) -> Result<Vec<FirmwareRecord>, ScanError> {
        let ranking = BrandRanking::from_present_ecus(&self.db, present);
        self.scan_ranked(&ranking).await
    }

    async fn scan_ranked(
        &self,
        ranking: &BrandRanking,
    ) -> Result<Vec<FirmwareRecord>, ScanError> {
        let mut all_records = Vec::new();

        for brand_match in ranking.ranked() {
            info!(
                brand = %brand_match.brand,
                matched_ecus = brand_match.count(),
                "Querying brand"
            );
            let records = self.get_fw_versions(Some(&brand_match.brand), None).await?;
            let matches = self
                .matcher
                .match_exact(&build_fw_dict(&records, Some(&brand_match.brand)));
            all_records.extend(records);

            if matches.len() == 1 {
                info!(
                    brand = %brand_match.brand,
                    model = matches.iter().next().map(String::as_str).unwrap_or_default(),
                    "Exact match found, skipping remaining brands"
                );
                break;
            }
        }

        Ok(all_records)
    }

    /// Probe, scan brands in ranked order, then match over all records
    pub async fn identify(&self) -> Result<Identification, ScanError> {
        let present = self.get_present_ecus().await?;
        let ranking = BrandRanking::from_present_ecus(&self.db, &present);
        let records = self.scan_ranked(&ranking).await?;
        let result = self.matcher.match_records(&records, true, true, true);
        Ok(Identification {
            present: present.into_iter().collect(),
            ranking,
            records,
            result,
        })
    }
}

/// Turn one transport response into records for `brand`/`request`
fn build_records(
    brand: &Brand,
    request: &QueryRequest,
    plan: &QueryPlan,
    responses: FirmwareResponses,
) -> Vec<FirmwareRecord> {
    responses
        .into_iter()
        .map(|((address, sub_address), fw_version)| {
            let ecu = plan.ecu_types.get(&brand.name, address, sub_address);
            let extra = brand
                .config
                .extra_ecus
                .contains(&EcuKey::new(ecu, address, sub_address));
            FirmwareRecord {
                ecu,
                address,
                sub_address,
                brand: brand.name.clone(),
                bus: request.bus,
                request: request.request.clone(),
                response_address: rx_addr_for_tx_addr(address, request.rx_offset),
                fw_version,
                logging: request.logging || extra,
                obd_multiplexing: request.obd_multiplexing,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::MemoryParamStore;
    use crate::transport::{MockFwQueryTransport, MockPresenceProbe, TransportError};
    use fwid_core::{BrandQueryConfig, ModelFingerprint};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn key(ecu: EcuType, address: u32, sub: Option<u8>) -> EcuKey {
        EcuKey::new(ecu, address, sub)
    }

    fn model(keys: &[EcuKey]) -> ModelFingerprint {
        keys.iter()
            .map(|k| (*k, [bytes::Bytes::from_static(b"fw")].into_iter().collect()))
            .collect()
    }

    fn db() -> FingerprintDatabase {
        FingerprintDatabase::new(vec![
            Brand::new(
                "alpha",
                BrandQueryConfig::default().with_extra_ecu(key(EcuType::Hybrid, 0x7D2, None)),
            )
            .with_model(
                "A1",
                model(&[
                    key(EcuType::Engine, 0x7E0, None),
                    key(EcuType::FwdRadar, 0x750, Some(0xF)),
                ]),
            )
            .with_model(
                "A2",
                model(&[
                    key(EcuType::Engine, 0x7E0, None),
                    key(EcuType::FwdCamera, 0x750, Some(0x6D)),
                    key(EcuType::FwdRadar, 0x750, Some(0xF)),
                ]),
            ),
            Brand::new("bravo", BrandQueryConfig::default())
                .with_model("B1", model(&[key(EcuType::Abs, 0x7B0, None)])),
        ])
        .unwrap()
    }

    #[test]
    fn test_plan_groups_parallel_first_then_serial() {
        let plan = ScanTargets::from_database(&db(), None).plan();
        let groups: Vec<Vec<(String, EcuAddr)>> = plan
            .groups
            .iter()
            .map(|g| g.iter().map(|t| (t.brand.clone(), t.addr())).collect())
            .collect();

        assert_eq!(
            groups,
            vec![
                vec![
                    ("alpha".to_string(), (0x7E0, None)),
                    ("alpha".to_string(), (0x7D2, None)),
                    ("bravo".to_string(), (0x7B0, None)),
                ],
                vec![("alpha".to_string(), (0x750, Some(0xF)))],
                vec![("alpha".to_string(), (0x750, Some(0x6D)))],
            ]
        );
    }

    #[test]
    fn test_plan_restricted_to_brand_with_extra_targets() {
        let targets = ScanTargets::from_database(&db(), Some("bravo"))
            .with_extra(ANY_BRAND, [key(EcuType::Unknown, 0x7E0, None)]);
        let plan = targets.plan();
        assert_eq!(plan.groups.len(), 1);
        let brands: Vec<&str> = plan.groups[0].iter().map(|t| t.brand.as_str()).collect();
        assert_eq!(brands, vec!["bravo", ANY_BRAND]);
    }

    #[test]
    fn test_ecu_type_table_defaults_to_unknown() {
        let plan = ScanTargets::from_database(&db(), None).plan();
        assert_eq!(plan.ecu_types.get("alpha", 0x7E0, None), EcuType::Engine);
        assert_eq!(plan.ecu_types.get("alpha", 0x7D2, None), EcuType::Hybrid);
        assert_eq!(plan.ecu_types.get("bravo", 0x7E0, None), EcuType::Unknown);
        assert_eq!(plan.ecu_types.get("alpha", 0x750, Some(0x6D)), EcuType::FwdCamera);
    }

    #[test]
    fn test_exploratory_keys() {
        let keys = ScanTargets::exploratory_keys();
        assert_eq!(keys.len(), 768);
        assert!(keys.contains(&key(EcuType::Unknown, 0x18DAFFF1, None)));
        assert!(keys.contains(&key(EcuType::Unknown, 0x7FF, None)));
        assert!(keys.contains(&key(EcuType::Unknown, 0x750, Some(0xFF))));

        let plan = ScanTargets::exploratory().plan();
        // 512 parallel targets in one group, 256 sub-addressed singletons
        assert_eq!(plan.groups.len(), 257);
        assert_eq!(plan.groups[0].len(), 512);
    }

    #[rstest]
    #[case(0, 128, 0)]
    #[case(1, 128, 1)]
    #[case(128, 128, 1)]
    #[case(129, 128, 2)]
    #[case(300, 128, 3)]
    #[case(10, 3, 4)]
    fn test_batches(#[case] n: u32, #[case] size: usize, #[case] expected: usize) {
        let keys = (0..n).map(|i| key(EcuType::Unknown, 0x1000 + i, None));
        let plan = ScanTargets::default().with_extra(ANY_BRAND, keys).plan();

        let batches: Vec<&[ScanTarget]> = plan.batches(size).collect();
        assert_eq!(batches.len(), expected);
        assert!(batches.iter().all(|b| b.len() <= size));

        let flattened: Vec<u32> = batches.concat().iter().map(|t| t.address).collect();
        let original: Vec<u32> = (0..n).map(|i| 0x1000 + i).collect();
        assert_eq!(flattened, original);
    }

    #[test]
    fn test_batches_keep_serial_targets_apart() {
        let plan = ScanTargets::from_database(&db(), None).plan();
        let sizes: Vec<usize> = plan.batches(2).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 1, 1, 1]);
    }

    fn single_brand_scheduler(
        requests: Vec<QueryRequest>,
        transport: MockFwQueryTransport,
        presence: MockPresenceProbe,
    ) -> QueryScheduler {
        let db = FingerprintDatabase::new(vec![Brand::new(
            "alpha",
            BrandQueryConfig::new(requests),
        )
        .with_model(
            "A1",
            model(&[
                key(EcuType::Engine, 0x7E0, None),
                key(EcuType::FwdRadar, 0x750, Some(0xF)),
            ]),
        )])
        .unwrap();

        QueryScheduler::new(
            Arc::new(db),
            Arc::new(transport),
            Arc::new(presence),
            Arc::new(MemoryParamStore::new()),
            ScanConfig::default(),
        )
    }

    fn request(bus: u8) -> QueryRequest {
        QueryRequest::new(vec![bytes::Bytes::from_static(b"\x3e\x00")], vec![])
            .with_bus(bus)
            .with_obd_multiplexing(false)
    }

    #[tokio::test]
    async fn test_failed_presence_group_contributes_nothing() {
        let mut transport = MockFwQueryTransport::new();
        transport.expect_query().never();

        let mut presence = MockPresenceProbe::new();
        let mut seq = mockall::Sequence::new();
        presence
            .expect_probe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|queries, _, _| {
                assert_eq!(queries, &BTreeSet::from([EcuAddress::new(0x7E0, None, 0)]));
                Err(TransportError::SendFailed("bus off".to_string()))
            });
        presence
            .expect_probe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|queries, responses, _| {
                assert_eq!(
                    queries,
                    &BTreeSet::from([EcuAddress::new(0x750, Some(0xF), 0)])
                );
                assert!(responses.contains(&EcuAddress::new(0x758, Some(0xF), 0)));
                Ok(HashSet::from([EcuAddress::new(0x758, Some(0xF), 0)]))
            });

        let scheduler = single_brand_scheduler(vec![request(0)], transport, presence);
        let present = scheduler.get_present_ecus().await.unwrap();

        assert_eq!(present, HashSet::from([EcuAddress::new(0x758, Some(0xF), 0)]));
    }

    #[tokio::test]
    async fn test_failed_query_contributes_no_records() {
        let mut transport = MockFwQueryTransport::new();
        transport
            .expect_query()
            .withf(|q| q.bus == 0)
            .times(2)
            .returning(|_| Err(TransportError::ReceiveFailed("no response".to_string())));
        transport
            .expect_query()
            .withf(|q| q.bus == 2)
            .times(2)
            .returning(|q| {
                Ok(q.addrs
                    .iter()
                    .map(|addr| (*addr, bytes::Bytes::from_static(b"fw")))
                    .collect())
            });
        let mut presence = MockPresenceProbe::new();
        presence.expect_probe().never();

        let scheduler = single_brand_scheduler(vec![request(0), request(2)], transport, presence);
        let records = scheduler.get_fw_versions(None, None).await.unwrap();

        let got: Vec<(u8, EcuAddr, EcuType)> = records
            .iter()
            .map(|r| (r.bus, r.addr(), r.ecu))
            .collect();
        assert_eq!(
            got,
            vec![
                (2, (0x7E0, None), EcuType::Engine),
                (2, (0x750, Some(0xF)), EcuType::FwdRadar),
            ]
        );
    }
}
