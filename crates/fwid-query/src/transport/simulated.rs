//! Simulated vehicle bus for demos and testing

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fwid_core::{rx_addr_for_tx_addr, EcuAddr, EcuAddress, FingerprintDatabase, DEFAULT_RX_OFFSET};
use parking_lot::RwLock;

use super::{FirmwareQuery, FirmwareResponses, FwQueryTransport, PresenceProbe, TransportError};

/// One simulated ECU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedEcu {
    pub address: u32,
    pub sub_address: Option<u8>,
    /// Bus the ECU sits on; `None` answers on every bus
    pub bus: Option<u8>,
    pub rx_offset: i32,
    pub fw_version: Bytes,
    /// Request sequences this ECU understands; empty accepts any
    pub accepts: Vec<Vec<Bytes>>,
}

impl SimulatedEcu {
    pub fn new(address: u32, sub_address: Option<u8>, fw_version: impl Into<Bytes>) -> Self {
        Self {
            address,
            sub_address,
            bus: None,
            rx_offset: DEFAULT_RX_OFFSET,
            fw_version: fw_version.into(),
            accepts: Vec::new(),
        }
    }

    pub fn on_bus(mut self, bus: u8) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_rx_offset(mut self, rx_offset: i32) -> Self {
        self.rx_offset = rx_offset;
        self
    }

    pub fn accepting(mut self, request: Vec<Bytes>) -> Self {
        self.accepts.push(request);
        self
    }

    fn reachable(&self, addr: EcuAddr, bus: u8) -> bool {
        (self.address, self.sub_address) == addr && self.bus.map_or(true, |b| b == bus)
    }

    fn understands(&self, request: &[Bytes]) -> bool {
        self.accepts.is_empty() || self.accepts.iter().any(|r| r.as_slice() == request)
    }
}

/// Vehicle bus answering firmware queries and presence probes from a fixed
/// set of simulated ECUs
///
/// Every call is recorded so tests can assert what was queried.
#[derive(Debug, Default)]
pub struct SimulatedBus {
    ecus: Vec<SimulatedEcu>,
    failing_buses: RwLock<HashSet<u8>>,
    queries: RwLock<Vec<FirmwareQuery>>,
    probes: RwLock<Vec<BTreeSet<EcuAddress>>>,
}

impl SimulatedBus {
    pub fn new(ecus: Vec<SimulatedEcu>) -> Self {
        Self {
            ecus,
            ..Default::default()
        }
    }

    /// A vehicle reporting the first known firmware of every ECU of `model`,
    /// answering only its brand's request patterns
    pub fn from_model(db: &FingerprintDatabase, model: &str) -> Option<Self> {
        let brand = db.model_brand(model)?;
        let fingerprint = brand.models.get(model)?;
        let rx_offset = brand
            .config
            .requests
            .first()
            .map_or(DEFAULT_RX_OFFSET, |r| r.rx_offset);

        let ecus = fingerprint
            .iter()
            .filter_map(|(key, versions)| {
                let fw = versions.iter().next()?.clone();
                let mut ecu =
                    SimulatedEcu::new(key.address, key.sub_address, fw).with_rx_offset(rx_offset);
                for request in &brand.config.requests {
                    ecu = ecu.accepting(request.request.clone());
                }
                Some(ecu)
            })
            .collect();

        Some(Self::new(ecus))
    }

    pub fn ecus(&self) -> &[SimulatedEcu] {
        &self.ecus
    }

    /// Make every query on `bus` fail until [`Self::restore_bus`]
    pub fn fail_bus(&self, bus: u8) {
        self.failing_buses.write().insert(bus);
    }

    pub fn restore_bus(&self, bus: u8) {
        self.failing_buses.write().remove(&bus);
    }

    /// Firmware queries received so far, in order
    pub fn queries(&self) -> Vec<FirmwareQuery> {
        self.queries.read().clone()
    }

    /// Every address that appeared in any firmware query
    pub fn queried_addrs(&self) -> BTreeSet<EcuAddr> {
        self.queries
            .read()
            .iter()
            .flat_map(|q| q.addrs.iter().copied())
            .collect()
    }

    /// Presence probe target sets received so far, in order
    pub fn probes(&self) -> Vec<BTreeSet<EcuAddress>> {
        self.probes.read().clone()
    }
}

#[async_trait]
impl FwQueryTransport for SimulatedBus {
    async fn query(&self, query: &FirmwareQuery) -> Result<FirmwareResponses, TransportError> {
        self.queries.write().push(query.clone());

        if self.failing_buses.read().contains(&query.bus) {
            return Err(TransportError::Timeout(format!(
                "Simulated failure on bus {}",
                query.bus
            )));
        }

        let responses: FirmwareResponses = query
            .addrs
            .iter()
            .filter_map(|&addr| {
                self.ecus
                    .iter()
                    .find(|e| e.reachable(addr, query.bus) && e.understands(&query.request))
                    .map(|e| (addr, e.fw_version.clone()))
            })
            .collect();

        if query.debug {
            for ((addr, sub), fw) in &responses {
                tracing::debug!(
                    bus = query.bus,
                    address = format!("0x{:X}", addr),
                    sub_address = ?sub,
                    fw = %hex::encode(fw),
                    "Simulated bus: firmware response"
                );
            }
        }

        Ok(responses)
    }
}

#[async_trait]
impl PresenceProbe for SimulatedBus {
    async fn probe(
        &self,
        queries: &BTreeSet<EcuAddress>,
        responses: &BTreeSet<EcuAddress>,
        _timeout: Duration,
    ) -> Result<HashSet<EcuAddress>, TransportError> {
        self.probes.write().push(queries.clone());

        let mut seen = HashSet::new();
        for target in queries {
            if self.failing_buses.read().contains(&target.bus) {
                continue;
            }
            for ecu in self
                .ecus
                .iter()
                .filter(|e| e.reachable(target.addr(), target.bus))
            {
                let Some(rx) = rx_addr_for_tx_addr(ecu.address, ecu.rx_offset) else {
                    continue;
                };
                let response = EcuAddress::new(rx, ecu.sub_address, target.bus);
                if responses.contains(&response) {
                    seen.insert(response);
                }
            }
        }
        Ok(seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(bus: u8, addrs: Vec<EcuAddr>, request: Vec<Bytes>) -> FirmwareQuery {
        FirmwareQuery {
            bus,
            addrs,
            request,
            response: vec![],
            rx_offset: DEFAULT_RX_OFFSET,
            timeout: Duration::from_millis(100),
            debug: true,
        }
    }

    #[tokio::test]
    async fn test_query_answers_reachable_ecus_only() {
        let bus = SimulatedBus::new(vec![
            SimulatedEcu::new(0x7E0, None, Bytes::from_static(b"ENG")),
            SimulatedEcu::new(0x750, Some(0xF), Bytes::from_static(b"RDR")).on_bus(0),
        ]);

        let got = bus
            .query(&query(1, vec![(0x7E0, None), (0x750, Some(0xF)), (0x7B0, None)], vec![]))
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[&(0x7E0, None)], Bytes::from_static(b"ENG"));

        let got = bus
            .query(&query(0, vec![(0x750, Some(0xF))], vec![]))
            .await
            .unwrap();
        assert_eq!(got[&(0x750, Some(0xF))], Bytes::from_static(b"RDR"));
        assert_eq!(bus.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_query_respects_request_patterns() {
        let read = vec![Bytes::from_static(&[0x22, 0xF1, 0x81])];
        let bus = SimulatedBus::new(vec![
            SimulatedEcu::new(0x7E0, None, Bytes::from_static(b"ENG")).accepting(read.clone())
        ]);

        let other = vec![Bytes::from_static(&[0x1A, 0x88])];
        assert!(bus
            .query(&query(1, vec![(0x7E0, None)], other))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            bus.query(&query(1, vec![(0x7E0, None)], read))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_failing_bus() {
        let bus = SimulatedBus::new(vec![SimulatedEcu::new(0x7E0, None, Bytes::from_static(b"E"))]);
        bus.fail_bus(1);
        let err = bus
            .query(&query(1, vec![(0x7E0, None)], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));

        bus.restore_bus(1);
        assert!(bus.query(&query(1, vec![(0x7E0, None)], vec![])).await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_reports_expected_responses() {
        let bus = SimulatedBus::new(vec![
            SimulatedEcu::new(0x7E0, None, Bytes::from_static(b"E")),
            SimulatedEcu::new(0x18DA30F1, None, Bytes::from_static(b"S")),
        ]);

        let queries: BTreeSet<EcuAddress> = [
            EcuAddress::new(0x7E0, None, 1),
            EcuAddress::new(0x18DA30F1, None, 1),
            EcuAddress::new(0x7B0, None, 1),
        ]
        .into_iter()
        .collect();
        let responses: BTreeSet<EcuAddress> = [
            EcuAddress::new(0x7E8, None, 1),
            EcuAddress::new(0x7B8, None, 1),
        ]
        .into_iter()
        .collect();

        let seen = bus
            .probe(&queries, &responses, Duration::from_millis(100))
            .await
            .unwrap();
        // 0x18DAF130 answered but was not expected
        assert_eq!(seen, [EcuAddress::new(0x7E8, None, 1)].into_iter().collect());
        assert_eq!(bus.probes().len(), 1);
    }

    #[test]
    fn test_from_model() {
        let db = FingerprintDatabase::builtin().unwrap();
        let bus = SimulatedBus::from_model(&db, "TOYOTA RAV4 2019").unwrap();
        let fingerprint = db.model("TOYOTA RAV4 2019").unwrap();
        assert_eq!(bus.ecus().len(), fingerprint.len());
        assert!(bus.ecus().iter().all(|e| !e.accepts.is_empty()));
        assert!(SimulatedBus::from_model(&db, "NOT A CAR").is_none());
    }
}
