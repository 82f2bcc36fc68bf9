//! Scan command - query every known ECU and match the responses

use std::time::Instant;

use anyhow::{Context, Result};
use fwid_query::{QueryScheduler, ScanTargets};

use crate::output::{OutputContext, ScanReport};

/// Run a full scan, optionally restricted to one brand and optionally
/// sweeping the common diagnostic address ranges too
pub async fn scan(
    scheduler: &QueryScheduler,
    brand: Option<&str>,
    all_addresses: bool,
    ctx: &OutputContext,
) -> Result<()> {
    if let Some(brand) = brand {
        if scheduler.database().brand(brand).is_none() {
            anyhow::bail!("Unknown brand: {}", brand);
        }
    }

    let started = Instant::now();
    let pb = ctx.spinner("Querying ECUs...")?;
    let extra = all_addresses.then(ScanTargets::exploratory);
    let records = scheduler
        .get_fw_versions(brand, extra)
        .await
        .context("Firmware scan failed")?;
    pb.finish_and_clear();

    let result = scheduler.matcher().match_records(&records, true, true, true);
    ctx.print_report(&ScanReport::new(&records, &result, started.elapsed()));
    Ok(())
}
