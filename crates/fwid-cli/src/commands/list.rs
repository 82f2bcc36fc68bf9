//! Brands and models commands - inspect the fingerprint database

use std::collections::BTreeSet;

use anyhow::Result;
use fwid_core::FingerprintDatabase;

use crate::output::{BrandRow, ModelRow, OutputContext};

/// List brands with their query configuration
pub fn brands(db: &FingerprintDatabase, ctx: &OutputContext) -> Result<()> {
    let rows: Vec<BrandRow> = db
        .brands()
        .iter()
        .map(|b| {
            let buses: BTreeSet<u8> = b.config.requests.iter().map(|r| r.bus).collect();
            BrandRow {
                brand: b.name.clone(),
                models: b.models.len(),
                requests: b.config.requests.len(),
                buses: buses
                    .iter()
                    .map(u8::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
                extra_ecus: b.config.extra_ecus.len(),
            }
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}

/// List models, optionally for one brand
pub fn models(db: &FingerprintDatabase, brand: Option<&str>, ctx: &OutputContext) -> Result<()> {
    if let Some(brand) = brand {
        if db.brand(brand).is_none() {
            anyhow::bail!("Unknown brand: {}", brand);
        }
    }

    let rows: Vec<ModelRow> = db
        .models()
        .filter(|(b, _, _)| brand.map_or(true, |name| b.name == name))
        .map(|(b, model, fingerprint)| ModelRow {
            model: model.to_string(),
            brand: b.name.clone(),
            ecus: fingerprint
                .keys()
                .map(|k| k.ecu.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            versions: fingerprint.values().map(|v| v.len()).sum(),
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}
