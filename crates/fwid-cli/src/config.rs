//! Configuration file handling for fwid

use anyhow::{Context, Result};
use fwid_query::ScanConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Directory of brand catalogs, built-in catalogs when unset
    pub catalog_dir: Option<PathBuf>,
    /// Parameter directory shared with the gateway daemon
    pub params_dir: Option<PathBuf>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Scan tuning
    #[serde(default)]
    pub scan: ScanConfig,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("fwid");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(self, args: ArgOverrides) -> MergedConfig {
        let mut scan = self.scan;
        if let Some(num_adapters) = args.num_adapters {
            scan.num_adapters = num_adapters;
        }
        scan.debug |= args.debug;

        MergedConfig {
            catalog_dir: args.catalog_dir.or(self.catalog_dir),
            params_dir: args.params_dir.or(self.params_dir),
            no_color: args.no_color || self.no_color.unwrap_or(false),
            scan,
        }
    }
}

/// Values given on the command line, each overriding the config file
#[derive(Debug, Clone, Default)]
pub struct ArgOverrides {
    pub catalog_dir: Option<PathBuf>,
    pub params_dir: Option<PathBuf>,
    pub num_adapters: Option<u8>,
    pub debug: bool,
    pub no_color: bool,
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub catalog_dir: Option<PathBuf>,
    pub params_dir: Option<PathBuf>,
    pub no_color: bool,
    pub scan: ScanConfig,
}
