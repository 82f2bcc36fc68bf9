//! Output formatting for fwid (table, json)

use std::time::Duration;

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use fwid_core::{BrandMatch, FirmwareRecord, MatchResult};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print an info message (unless in quiet mode or emitting JSON)
    pub fn info(&self, msg: &str) {
        if !self.quiet && self.format == OutputFormat::Table {
            println!("{}", msg);
        }
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Spinner shown while the bus is busy; hidden for JSON or quiet output
    pub fn spinner(&self, msg: &str) -> Result<ProgressBar> {
        if self.quiet || self.format == OutputFormat::Json {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Ok(pb)
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => print_json(&data),
        }
    }

    /// Print a scan report: records, then candidates and timing
    pub fn print_report(&self, report: &ScanReport) {
        match self.format {
            OutputFormat::Table => {
                if !report.brands.is_empty() {
                    println!("{}", Table::new(&report.brands));
                }
                if report.records.is_empty() {
                    println!("{}", "No firmware responses".yellow());
                } else {
                    println!("{}", Table::new(&report.records));
                }

                let verdict = match (report.candidates.len(), report.exact) {
                    (0, _) => "no match".red(),
                    (1, true) => "exact match".green(),
                    (1, false) => "fuzzy match".yellow(),
                    _ => "ambiguous".yellow(),
                };
                println!("{}: {}", "Result".bold(), verdict);
                let candidates = if report.candidates.is_empty() {
                    "-".to_string()
                } else {
                    report.candidates.join(", ")
                };
                println!("{}: {}", "Candidates".bold(), candidates);
                println!("{}: {} ms", "Elapsed".bold(), report.elapsed_ms);
            }
            OutputFormat::Json => print_json(report),
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Firmware bytes as text, escaping anything that is not printable ASCII
fn firmware_text(fw: &[u8]) -> String {
    fw.escape_ascii().to_string()
}

fn hex_addr(addr: u32) -> String {
    format!("0x{:X}", addr)
}

fn optional<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Firmware record display
#[derive(Debug, Tabled, Serialize)]
pub struct RecordRow {
    #[tabled(rename = "Brand")]
    pub brand: String,
    #[tabled(rename = "Bus")]
    pub bus: u8,
    #[tabled(rename = "ECU")]
    pub ecu: String,
    #[tabled(rename = "Address")]
    pub address: String,
    #[tabled(rename = "Sub")]
    pub sub_address: String,
    #[tabled(rename = "Firmware")]
    pub firmware: String,
    #[tabled(rename = "Raw")]
    pub raw: String,
    #[tabled(rename = "Logging")]
    pub logging: bool,
}

impl From<&FirmwareRecord> for RecordRow {
    fn from(record: &FirmwareRecord) -> Self {
        Self {
            brand: record.brand.clone(),
            bus: record.bus,
            ecu: record.ecu.to_string(),
            address: hex_addr(record.address),
            sub_address: optional(record.sub_address.map(|s| format!("0x{:X}", s))),
            firmware: firmware_text(&record.fw_version),
            raw: hex::encode(&record.fw_version),
            logging: record.logging,
        }
    }
}

/// Brand ranking display for identify
#[derive(Debug, Tabled, Serialize)]
pub struct RankRow {
    #[tabled(rename = "Brand")]
    pub brand: String,
    #[tabled(rename = "Matched ECUs")]
    pub matched: usize,
    #[tabled(rename = "Addresses")]
    pub addresses: String,
}

impl From<&BrandMatch> for RankRow {
    fn from(m: &BrandMatch) -> Self {
        let addresses: Vec<String> = m
            .matched
            .iter()
            .map(|(addr, sub)| match sub {
                Some(sub) => format!("{}/0x{:X}", hex_addr(*addr), sub),
                None => hex_addr(*addr),
            })
            .collect();
        Self {
            brand: m.brand.clone(),
            matched: m.count(),
            addresses: addresses.join(" "),
        }
    }
}

/// Brand display for brands command
#[derive(Debug, Tabled, Serialize)]
pub struct BrandRow {
    #[tabled(rename = "Brand")]
    pub brand: String,
    #[tabled(rename = "Models")]
    pub models: usize,
    #[tabled(rename = "Requests")]
    pub requests: usize,
    #[tabled(rename = "Buses")]
    pub buses: String,
    #[tabled(rename = "Extra ECUs")]
    pub extra_ecus: usize,
}

/// Model display for models command
#[derive(Debug, Tabled, Serialize)]
pub struct ModelRow {
    #[tabled(rename = "Model")]
    pub model: String,
    #[tabled(rename = "Brand")]
    pub brand: String,
    #[tabled(rename = "ECUs")]
    pub ecus: String,
    #[tabled(rename = "Versions")]
    pub versions: usize,
}

/// Outcome of a scan or identification
#[derive(Debug, Serialize)]
pub struct ScanReport {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub brands: Vec<RankRow>,
    pub records: Vec<RecordRow>,
    pub exact: bool,
    pub candidates: Vec<String>,
    pub elapsed_ms: u128,
}

impl ScanReport {
    pub fn new(records: &[FirmwareRecord], result: &MatchResult, elapsed: Duration) -> Self {
        Self {
            brands: Vec::new(),
            records: records.iter().map(RecordRow::from).collect(),
            exact: result.exact,
            candidates: result.candidates.iter().cloned().collect(),
            elapsed_ms: elapsed.as_millis(),
        }
    }

    pub fn with_ranking<'a>(mut self, ranking: impl IntoIterator<Item = &'a BrandMatch>) -> Self {
        self.brands = ranking.into_iter().map(RankRow::from).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fwid_core::EcuType;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_row_formatting() {
        let record = FirmwareRecord {
            ecu: EcuType::FwdRadar,
            address: 0x750,
            sub_address: Some(0xF),
            brand: "toyota".to_string(),
            bus: 0,
            request: vec![],
            response_address: Some(0x758),
            fw_version: Bytes::from_static(b"\x018821F3301200\x00\x00"),
            logging: false,
            obd_multiplexing: false,
        };

        let row = RecordRow::from(&record);
        assert_eq!(row.ecu, "fwdRadar");
        assert_eq!(row.address, "0x750");
        assert_eq!(row.sub_address, "0xF");
        assert_eq!(row.firmware, "\\x018821F3301200\\x00\\x00");
        assert_eq!(row.raw, "013838323146333330313230300000");
    }
}
