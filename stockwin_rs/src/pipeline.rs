use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::calendar::CalendarAligner;
use crate::config::Config;
use crate::data::AlignedSeries;
use crate::reader::{DataReader, SkippedSymbol, worker_pool};
use crate::target::PriceMovementTarget;
use crate::window::SlidingWindowFeatures;

pub const MANIFEST_FILE: &str = "stockwin_manifest.json";
const PREPARED_SUFFIX: &str = "_prepared.csv";

#[derive(Debug, Clone, Serialize)]
pub struct PreparedSymbol {
    pub symbol: String,
    pub rows: usize,
    pub columns: usize,
    pub coverage_ratio: f64,
    /// File name inside the output directory; `None` on dry runs.
    pub output: Option<String>,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PrepareSummary {
    pub prepared: Vec<PreparedSymbol>,
    pub skipped: Vec<SkippedSymbol>,
    pub manifest_path: Option<PathBuf>,
}

#[derive(Serialize)]
struct Manifest<'a> {
    version: &'static str,
    config: &'a Config,
    prepared: &'a [PreparedSymbol],
    skipped: &'a [SkippedSymbol],
}

pub fn prepared_file_name(symbol: &str) -> String {
    format!("{symbol}{PREPARED_SUFFIX}")
}

/// Apply every configured feature and then every configured target to one
/// aligned series. Both builders start from the aligned frame, so targets
/// never see feature columns and vice versa; the target columns are then
/// attached to the feature frame, overwriting any column of the same name.
pub fn enrich(aligned: &AlignedSeries, config: &Config) -> Result<DataFrame> {
    let mut features = SlidingWindowFeatures::from_aligned(aligned);
    for spec in &config.features {
        features
            .add_spec(spec)
            .with_context(|| format!("Failed to add feature {spec}"))?;
    }

    let mut targets = PriceMovementTarget::from_aligned(aligned, config.target_verbosity);
    for spec in &config.targets {
        targets
            .add_spec(spec)
            .with_context(|| format!("Failed to add target {spec}"))?;
    }

    // Labels are copied by name: a label may have replaced a source column
    // of the same name in place.
    let mut combined = features.build();
    let labels = targets.build();
    for spec in &config.targets {
        for name in spec.output_columns(config.target_verbosity) {
            let series = labels
                .column(&name)
                .with_context(|| format!("Target column {name} was not produced"))?;
            combined
                .with_column(series.clone())
                .with_context(|| format!("Failed to attach target column {name}"))?;
        }
    }
    Ok(combined)
}

/// Resolve, align, enrich and persist every configured symbol.
///
/// Each symbol is processed independently on the worker pool; a symbol that
/// has no file, fails to load, or rejects a feature/target spec is logged
/// and listed in `skipped` without affecting the others.
pub fn prepare_dataset(config: &Config) -> Result<PrepareSummary> {
    let started = Instant::now();
    if !config.dry_run {
        fs::create_dir_all(&config.output_dir)
            .with_context(|| format!("Unable to create {}", config.output_dir.display()))?;
    }

    let aligner = CalendarAligner::new(config.start_date, config.end_date)?
        .with_date_column(config.date_column.as_str());
    let reader =
        DataReader::new(&config.data_dir, &config.file_suffix, &config.symbols, aligner)?
            .with_workers(config.n_workers);
    let batch = reader.process()?;

    let pool = worker_pool(config.n_workers)?;
    let results: Vec<(String, Result<PreparedSymbol>)> = pool.install(|| {
        batch
            .aligned
            .par_iter()
            .map(|(symbol, aligned)| (symbol.clone(), prepare_symbol(symbol, aligned, config)))
            .collect()
    });

    let mut summary = PrepareSummary {
        skipped: batch.skipped,
        ..PrepareSummary::default()
    };
    for (symbol, result) in results {
        match result {
            Ok(prepared) => summary.prepared.push(prepared),
            Err(err) => {
                warn!(symbol = %symbol, error = %format!("{err:#}"), "Skipping symbol");
                summary
                    .skipped
                    .push(SkippedSymbol::new(symbol, format!("{err:#}")));
            }
        }
    }

    if !config.dry_run {
        let manifest_path = config.output_dir.join(MANIFEST_FILE);
        write_manifest(&manifest_path, config, &summary)?;
        summary.manifest_path = Some(manifest_path);
    }

    info!(
        prepared = summary.prepared.len(),
        skipped = summary.skipped.len(),
        dry_run = config.dry_run,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Dataset preparation finished"
    );
    Ok(summary)
}

fn prepare_symbol(
    symbol: &str,
    aligned: &AlignedSeries,
    config: &Config,
) -> Result<PreparedSymbol> {
    let coverage_ratio = aligned.coverage_ratio();
    if let Some(min_coverage) = config.min_coverage {
        if coverage_ratio < min_coverage {
            warn!(
                symbol,
                coverage = coverage_ratio,
                min_coverage,
                "Coverage below requested minimum"
            );
        }
    }

    let mut frame = enrich(aligned, config)?;
    let mut prepared = PreparedSymbol {
        symbol: symbol.to_string(),
        rows: frame.height(),
        columns: frame.width(),
        coverage_ratio,
        output: None,
        sha256: None,
    };

    if !config.dry_run {
        let file_name = prepared_file_name(symbol);
        let path = config.output_dir.join(&file_name);
        let digest = write_csv_hashed(&mut frame, &path)?;
        info!(
            symbol,
            rows = prepared.rows,
            coverage = coverage_ratio,
            path = %path.display(),
            "Prepared dataset written"
        );
        prepared.output = Some(file_name);
        prepared.sha256 = Some(digest);
    } else {
        info!(
            symbol,
            rows = prepared.rows,
            coverage = coverage_ratio,
            "Prepared dataset (dry run)"
        );
    }
    Ok(prepared)
}

/// Persist `frame` as CSV and return the SHA-256 of the bytes written.
pub fn write_csv_hashed(frame: &mut DataFrame, path: &Path) -> Result<String> {
    let file =
        File::create(path).with_context(|| format!("Unable to create {}", path.display()))?;
    let mut writer = HashingWriter::new(BufWriter::new(file));
    CsvWriter::new(&mut writer)
        .include_header(true)
        .finish(frame)
        .with_context(|| format!("Failed to persist {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(writer.finalize_hex())
}

fn write_manifest(path: &Path, config: &Config, summary: &PrepareSummary) -> Result<()> {
    let manifest = Manifest {
        version: env!("CARGO_PKG_VERSION"),
        config,
        prepared: &summary.prepared,
        skipped: &summary.skipped,
    };
    let file =
        File::create(path).with_context(|| format!("Unable to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &manifest)
        .with_context(|| format!("Failed to write manifest {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Unable to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to hash {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
