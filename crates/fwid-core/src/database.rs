//! Fingerprint database
//!
//! Built once from per-brand catalogs and shared read-only afterwards.
//! Brand order is preserved: it determines request priority.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use bytes::Bytes;
use tracing::{debug, info};

use crate::catalog::{self, BrandCatalog};
use crate::error::{DatabaseError, DatabaseResult};
use crate::models::{BrandQueryConfig, EcuAddr, EcuKey, QueryRequest};

/// Known firmware per ECU for one model
pub type ModelFingerprint = BTreeMap<EcuKey, BTreeSet<Bytes>>;

/// One brand: its query configuration and its models
#[derive(Debug, Clone)]
pub struct Brand {
    pub name: String,
    pub config: BrandQueryConfig,
    pub models: BTreeMap<String, ModelFingerprint>,
}

impl Brand {
    pub fn new(name: impl Into<String>, config: BrandQueryConfig) -> Self {
        Self {
            name: name.into(),
            config,
            models: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>, fingerprint: ModelFingerprint) -> Self {
        self.models.insert(model.into(), fingerprint);
        self
    }

    /// Every (address, sub-address) this brand knows: models plus extra ECUs
    pub fn addrs(&self) -> BTreeSet<EcuAddr> {
        self.config
            .extra_ecus
            .iter()
            .chain(self.models.values().flat_map(|fw| fw.keys()))
            .map(EcuKey::addr)
            .collect()
    }
}

/// Immutable brand → model → ECU → firmware database with derived indices
#[derive(Debug, Clone)]
pub struct FingerprintDatabase {
    brands: Vec<Brand>,
    model_to_brand: HashMap<String, usize>,
    brand_addrs: HashMap<String, BTreeSet<EcuAddr>>,
}

impl FingerprintDatabase {
    /// Build the database and its indices.
    ///
    /// Fails if a brand is declared twice or a model appears under two
    /// brands.
    pub fn new(brands: Vec<Brand>) -> DatabaseResult<Self> {
        let mut model_to_brand: HashMap<String, usize> = HashMap::new();
        let mut brand_addrs = HashMap::new();

        for (idx, brand) in brands.iter().enumerate() {
            if brand_addrs.contains_key(&brand.name) {
                return Err(DatabaseError::DuplicateBrand(brand.name.clone()));
            }

            for model in brand.models.keys() {
                if let Some(&other) = model_to_brand.get(model) {
                    return Err(DatabaseError::DuplicateModel {
                        model: model.clone(),
                        first: brands[other].name.clone(),
                        second: brand.name.clone(),
                    });
                }
                model_to_brand.insert(model.clone(), idx);
            }

            brand_addrs.insert(brand.name.clone(), brand.addrs());
            debug!(
                brand = %brand.name,
                models = brand.models.len(),
                requests = brand.config.requests.len(),
                "Registered brand"
            );
        }

        Ok(Self {
            brands,
            model_to_brand,
            brand_addrs,
        })
    }

    /// Build from parsed catalogs, in the given order
    pub fn from_catalogs(catalogs: Vec<BrandCatalog>) -> DatabaseResult<Self> {
        let brands = catalogs
            .into_iter()
            .map(BrandCatalog::into_brand)
            .collect::<DatabaseResult<Vec<_>>>()?;
        let db = Self::new(brands)?;
        info!(
            brands = db.brands.len(),
            models = db.model_to_brand.len(),
            "Fingerprint database loaded"
        );
        Ok(db)
    }

    /// The catalogs compiled into this crate
    pub fn builtin() -> DatabaseResult<Self> {
        Self::from_catalogs(catalog::builtin_catalogs()?)
    }

    /// Load every `.yaml`/`.yml` catalog in a directory, sorted by file name
    pub fn load_dir(dir: impl AsRef<Path>) -> DatabaseResult<Self> {
        Self::from_catalogs(catalog::load_dir(dir.as_ref())?)
    }

    pub fn brands(&self) -> &[Brand] {
        &self.brands
    }

    pub fn brand(&self, name: &str) -> Option<&Brand> {
        self.brands.iter().find(|b| b.name == name)
    }

    /// Brand owning `model`
    pub fn model_brand(&self, model: &str) -> Option<&Brand> {
        self.model_to_brand.get(model).map(|&idx| &self.brands[idx])
    }

    pub fn model(&self, model: &str) -> Option<&ModelFingerprint> {
        self.model_brand(model).and_then(|b| b.models.get(model))
    }

    /// Every (brand, model, fingerprint), brands in registration order
    pub fn models(&self) -> impl Iterator<Item = (&Brand, &str, &ModelFingerprint)> + '_ {
        self.brands.iter().flat_map(|brand| {
            brand
                .models
                .iter()
                .map(move |(model, fw)| (brand, model.as_str(), fw))
        })
    }

    /// Known (address, sub-address) pairs for a brand, extra ECUs included
    pub fn brand_addrs(&self, brand: &str) -> Option<&BTreeSet<EcuAddr>> {
        self.brand_addrs.get(brand)
    }

    /// Every configured request in priority order: brand order, then the
    /// brand's own request order
    pub fn requests(&self) -> impl Iterator<Item = (&Brand, &QueryRequest)> + '_ {
        self.brands
            .iter()
            .flat_map(|brand| brand.config.requests.iter().map(move |r| (brand, r)))
    }
}
