//! Identify command - probe, rank brands, scan in order

use std::time::Instant;

use anyhow::{Context, Result};
use fwid_query::QueryScheduler;

use crate::output::{OutputContext, ScanReport};

/// Identify the vehicle, querying the most likely brands first
pub async fn identify(scheduler: &QueryScheduler, ctx: &OutputContext) -> Result<()> {
    let started = Instant::now();
    let pb = ctx.spinner("Probing for present ECUs...")?;
    let identification = scheduler
        .identify()
        .await
        .context("Identification failed")?;
    pb.finish_and_clear();

    ctx.info(&format!(
        "{} ECUs responded to the presence probe",
        identification.present.len()
    ));

    let report = ScanReport::new(
        &identification.records,
        &identification.result,
        started.elapsed(),
    )
    .with_ranking(identification.ranking.ranked());
    ctx.print_report(&report);
    Ok(())
}
