use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use stockwin_rs::config::{Config, default_workers};
use stockwin_rs::symbols::DEFAULT_FILE_SUFFIX;
use stockwin_rs::{FeatureSpec, TargetSpec};

#[derive(Parser, Debug)]
#[command(
    name = "stockwin",
    about = "Calendar-aligned sliding-window features and forward targets for daily stock data"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Align, enrich and write one prepared CSV per symbol
    #[command(name = "prepare")]
    Prepare(PrepareArgs),
    /// List the symbols available in a data directory
    #[command(name = "symbols")]
    Symbols(SymbolsArgs),
}

#[derive(Parser, Debug)]
pub struct PrepareArgs {
    /// Directory holding one CSV per symbol
    #[arg(long = "data-dir", value_hint = clap::ValueHint::DirPath)]
    pub data_dir: PathBuf,

    /// File name suffix following the symbol
    #[arg(long = "suffix", default_value = DEFAULT_FILE_SUFFIX)]
    pub suffix: String,

    /// Symbol to prepare; repeat for several. Omit to prepare every symbol found
    #[arg(long = "symbol", value_name = "SYMBOL")]
    pub symbols: Vec<String>,

    /// Inclusive start of the business-day calendar (YYYY-MM-DD)
    #[arg(long = "start")]
    pub start: String,

    /// Inclusive end of the business-day calendar (YYYY-MM-DD)
    #[arg(long = "end")]
    pub end: String,

    /// Name of the date column in the input files
    #[arg(long = "date-col", default_value = "Date")]
    pub date_col: String,

    /// Trailing window feature as column:window:kind (max/min/mean/median)
    #[arg(long = "feature", value_name = "COL:W:KIND")]
    pub features: Vec<FeatureSpec>,

    /// Forward target as column:horizon:kind (max/min/mean)
    #[arg(long = "target", value_name = "COL:H:KIND")]
    pub targets: Vec<TargetSpec>,

    /// 0 keeps only ratios, 1 adds forward aggregates, 2 adds next-day values
    #[arg(
        long = "verbose-targets",
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(0..=2)
    )]
    pub verbose_targets: u8,

    /// Output directory for prepared CSVs, manifest and log
    #[arg(long = "output-dir", value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// Number of worker threads (omit to use all logical cores)
    #[arg(long = "workers", alias = "n-jobs")]
    pub workers: Option<usize>,

    /// Warn about symbols whose coverage ratio falls below this value
    #[arg(long = "min-coverage")]
    pub min_coverage: Option<f64>,

    /// Align and report coverage without writing any files
    #[arg(long = "dry-run", default_value_t = false)]
    pub dry_run: bool,

    /// Disable the file log in the output directory
    #[arg(long = "no-file-log", default_value_t = false)]
    pub no_file_log: bool,
}

#[derive(Parser, Debug)]
pub struct SymbolsArgs {
    /// Directory holding one CSV per symbol
    #[arg(long = "data-dir", value_hint = clap::ValueHint::DirPath)]
    pub data_dir: PathBuf,

    /// File name suffix following the symbol
    #[arg(long = "suffix", default_value = DEFAULT_FILE_SUFFIX)]
    pub suffix: String,
}

impl Cli {
    pub fn parse() -> Self {
        <Cli as Parser>::parse()
    }
}

impl PrepareArgs {
    pub fn into_config(self) -> Result<Config> {
        let start_date = parse_date(&self.start)?;
        let end_date = parse_date(&self.end)?;
        if let Some(min_coverage) = self.min_coverage {
            ensure!(
                min_coverage.is_finite() && min_coverage >= 0.0,
                "--min-coverage must be a non-negative number, got {min_coverage}"
            );
        }

        let mut config = Config::new(self.data_dir, start_date, end_date, self.output_dir);
        config.file_suffix = self.suffix;
        config.symbols = self.symbols;
        config.date_column = self.date_col;
        config.features = self.features;
        config.targets = self.targets;
        config.target_verbosity = self.verbose_targets;
        config.n_workers = normalize_workers(self.workers);
        config.min_coverage = self.min_coverage;
        config.dry_run = self.dry_run;
        Ok(config)
    }
}

fn normalize_workers(value: Option<usize>) -> usize {
    value.map(|n| n.max(1)).unwrap_or_else(default_workers)
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date format for {raw}. Expected YYYY-MM-DD"))
}
