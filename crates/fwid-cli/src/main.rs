//! fwid - Vehicle firmware fingerprinting CLI
//!
//! Queries ECU firmware versions and matches them against the fingerprint
//! database to identify the vehicle model.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fwid_core::FingerprintDatabase;
use fwid_query::{
    FileParamStore, MemoryParamStore, ParamStore, QueryScheduler, SimulatedBus,
    OBD_MULTIPLEXING_CHANGED, OBD_MULTIPLEXING_ENABLED,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{ArgOverrides, Config, MergedConfig};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "fwid")]
#[command(author, version, about = "Vehicle firmware fingerprinting")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FWID_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of brand catalogs (built-in catalogs when omitted)
    #[arg(long, env = "FWID_CATALOG_DIR")]
    catalog: Option<PathBuf>,

    /// Simulate a vehicle of this model
    #[arg(long, env = "FWID_SIMULATE", value_name = "MODEL")]
    simulate: Option<String>,

    /// Parameter directory shared with the gateway daemon
    #[arg(long, env = "FWID_PARAMS_DIR")]
    params_dir: Option<PathBuf>,

    /// Number of attached bus adapters
    #[arg(long)]
    num_adapters: Option<u8>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Trace every query on the bus
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query every known ECU and match the responses
    Scan {
        /// Only use this brand's requests and ECUs
        #[arg(long)]
        brand: Option<String>,

        /// Also sweep the common diagnostic address ranges
        #[arg(long)]
        all: bool,
    },

    /// Probe present ECUs, then query brands from most to least likely
    Identify,

    /// List brands in the fingerprint database
    Brands,

    /// List models in the fingerprint database
    Models {
        /// Only list this brand's models
        #[arg(long)]
        brand: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose || cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(ArgOverrides {
        catalog_dir: cli.catalog.clone(),
        params_dir: cli.params_dir.clone(),
        num_adapters: cli.num_adapters,
        debug: cli.debug,
        no_color: cli.no_color,
    });

    let ctx = OutputContext::new(cli.output, merged.no_color, cli.quiet);

    let db = Arc::new(load_database(&merged)?);

    let result = match &cli.command {
        Commands::Brands => commands::brands(&db, &ctx),

        Commands::Models { brand } => commands::models(&db, brand.as_deref(), &ctx),

        Commands::Scan { brand, all } => {
            let scheduler = create_scheduler(db, cli.simulate.as_deref(), &merged)?;
            commands::scan(&scheduler, brand.as_deref(), *all, &ctx).await
        }

        Commands::Identify => {
            let scheduler = create_scheduler(db, cli.simulate.as_deref(), &merged)?;
            commands::identify(&scheduler, &ctx).await
        }
    };

    if let Err(e) = &result {
        ctx.error(&format!("Error: {:#}", e));
    }
    result
}

/// Load the catalogs from the configured directory, or the built-in set
fn load_database(config: &MergedConfig) -> Result<FingerprintDatabase> {
    match &config.catalog_dir {
        Some(dir) => FingerprintDatabase::load_dir(dir)
            .with_context(|| format!("Failed to load catalogs from {}", dir.display())),
        None => FingerprintDatabase::builtin().context("Failed to load built-in catalogs"),
    }
}

/// Wire a scheduler to the simulated vehicle and the parameter store
fn create_scheduler(
    db: Arc<FingerprintDatabase>,
    simulate: Option<&str>,
    config: &MergedConfig,
) -> Result<QueryScheduler> {
    let model = simulate.context("No vehicle bus available; pass --simulate <MODEL>")?;
    let bus = Arc::new(
        SimulatedBus::from_model(&db, model)
            .with_context(|| format!("Unknown model: {}", model))?,
    );

    // Without a shared parameter directory nothing else applies the
    // multiplexing mode, so the in-memory store acknowledges it itself
    let params: Arc<dyn ParamStore> = match &config.params_dir {
        Some(dir) => Arc::new(FileParamStore::new(dir)),
        None => Arc::new(MemoryParamStore::with_acknowledger(
            OBD_MULTIPLEXING_ENABLED,
            OBD_MULTIPLEXING_CHANGED,
        )),
    };

    Ok(QueryScheduler::new(
        db,
        bus.clone(),
        bus,
        params,
        config.scan.clone(),
    ))
}
