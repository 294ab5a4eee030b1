use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::DEFAULT_DATE_COLUMN;
use crate::symbols::DEFAULT_FILE_SUFFIX;
use crate::target::TargetSpec;
use crate::window::FeatureSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one `{symbol}{file_suffix}` CSV per symbol.
    pub data_dir: PathBuf,
    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,
    /// Symbols to prepare. Empty selects every symbol found in `data_dir`.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Inclusive start of the business-day calendar.
    pub start_date: NaiveDate,
    /// Inclusive end of the business-day calendar.
    pub end_date: NaiveDate,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default)]
    pub features: Vec<FeatureSpec>,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
    /// 0: ratio only, 1: plus forward aggregate, 2: plus next-day value.
    #[serde(default)]
    pub target_verbosity: u8,
    pub output_dir: PathBuf,
    #[serde(default = "default_workers")]
    pub n_workers: usize,
    /// Symbols whose coverage ratio falls below this are still written, but
    /// flagged with a warning.
    #[serde(default)]
    pub min_coverage: Option<f64>,
    /// Align and report coverage without writing any prepared CSVs.
    #[serde(default)]
    pub dry_run: bool,
}

impl Config {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            file_suffix: default_file_suffix(),
            symbols: Vec::new(),
            start_date,
            end_date,
            date_column: default_date_column(),
            features: Vec::new(),
            targets: Vec::new(),
            target_verbosity: 0,
            output_dir: output_dir.into(),
            n_workers: default_workers(),
            min_coverage: None,
            dry_run: false,
        }
    }
}

fn default_file_suffix() -> String {
    DEFAULT_FILE_SUFFIX.to_string()
}

fn default_date_column() -> String {
    DEFAULT_DATE_COLUMN.to_string()
}

/// One worker per available core, falling back to a single worker.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
