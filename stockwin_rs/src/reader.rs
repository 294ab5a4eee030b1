use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{info, warn};

use crate::calendar::CalendarAligner;
use crate::data::{AlignedSeries, load_rows};
use crate::symbols::{SymbolPaths, resolve_symbols};

/// A symbol left out of a batch, with the reason it was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
}

impl SkippedSymbol {
    pub fn new(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchAlignment {
    pub aligned: BTreeMap<String, AlignedSeries>,
    pub skipped: Vec<SkippedSymbol>,
}

pub(crate) fn worker_pool(n_workers: usize) -> Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(n_workers.max(1))
        .build()
        .context("Failed to build worker pool")
}

/// Loads and aligns every resolved symbol of a data directory.
#[derive(Debug, Clone)]
pub struct DataReader {
    aligner: CalendarAligner,
    paths: BTreeMap<String, PathBuf>,
    missing: Vec<String>,
    n_workers: usize,
}

impl DataReader {
    pub fn new(
        data_dir: &Path,
        file_suffix: &str,
        symbols: &[String],
        aligner: CalendarAligner,
    ) -> Result<Self> {
        let SymbolPaths { paths, missing } = resolve_symbols(data_dir, file_suffix, symbols)?;
        Ok(Self::from_paths(paths, missing, aligner))
    }

    pub fn from_paths(
        paths: BTreeMap<String, PathBuf>,
        missing: Vec<String>,
        aligner: CalendarAligner,
    ) -> Self {
        Self {
            aligner,
            paths,
            missing,
            n_workers: 1,
        }
    }

    pub fn with_workers(mut self, n_workers: usize) -> Self {
        self.n_workers = n_workers.max(1);
        self
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    pub fn process_one(&self, path: &Path) -> Result<AlignedSeries> {
        let raw = load_rows(path)?;
        self.aligner
            .align(&raw)
            .with_context(|| format!("Failed to align {}", path.display()))
    }

    /// Align every symbol on the worker pool. A symbol that fails to load
    /// or align is logged and reported in `skipped`; the rest of the batch
    /// is unaffected.
    pub fn process(&self) -> Result<BatchAlignment> {
        let started = Instant::now();
        let pool = worker_pool(self.n_workers)?;

        let results: Vec<(String, Result<AlignedSeries>)> = pool.install(|| {
            self.paths
                .par_iter()
                .map(|(symbol, path)| (symbol.clone(), self.process_one(path)))
                .collect()
        });

        let mut batch = BatchAlignment {
            aligned: BTreeMap::new(),
            skipped: self
                .missing
                .iter()
                .map(|symbol| SkippedSymbol::new(symbol.as_str(), "no data file"))
                .collect(),
        };
        for (symbol, result) in results {
            match result {
                Ok(aligned) => {
                    batch.aligned.insert(symbol, aligned);
                }
                Err(err) => {
                    warn!(symbol = %symbol, error = %format!("{err:#}"), "Skipping symbol");
                    batch.skipped.push(SkippedSymbol::new(symbol, format!("{err:#}")));
                }
            }
        }

        info!(
            aligned = batch.aligned.len(),
            skipped = batch.skipped.len(),
            business_days = self.aligner.business_days().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Calendar alignment finished"
        );
        Ok(batch)
    }
}
