use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

pub const DEFAULT_FILE_SUFFIX: &str = ".us.txt";

/// Symbol identifiers (file name minus `suffix`) of the regular files in
/// `dir`, sorted.
pub fn list_symbols(dir: &Path, suffix: &str) -> Result<Vec<String>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Unable to list {}", dir.display()))?;

    let mut symbols = BTreeSet::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Unable to read entry in {}", dir.display()))?;
        if !entry.file_type().map(|kind| kind.is_file()).unwrap_or(false) {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if let Some(symbol) = name.strip_suffix(suffix) {
            if !symbol.is_empty() {
                symbols.insert(symbol.to_string());
            }
        }
    }
    Ok(symbols.into_iter().collect())
}

#[derive(Debug, Clone, Default)]
pub struct SymbolPaths {
    pub paths: BTreeMap<String, PathBuf>,
    pub missing: Vec<String>,
}

/// Map requested symbols to `{dir}/{symbol}{suffix}`. An empty request
/// selects every symbol in `dir`. Symbols without a backing file are
/// reported in `missing` and logged; they never fail the call.
pub fn resolve_symbols(dir: &Path, suffix: &str, requested: &[String]) -> Result<SymbolPaths> {
    let available = list_symbols(dir, suffix)?;
    let mut resolved = SymbolPaths::default();

    if requested.is_empty() {
        for symbol in available {
            let path = dir.join(format!("{symbol}{suffix}"));
            resolved.paths.insert(symbol, path);
        }
        return Ok(resolved);
    }

    let available: BTreeSet<String> = available.into_iter().collect();
    for symbol in requested {
        if available.contains(symbol) {
            let path = dir.join(format!("{symbol}{suffix}"));
            resolved.paths.insert(symbol.clone(), path);
        } else {
            warn!(symbol = %symbol, dir = %dir.display(), "No data for symbol");
            resolved.missing.push(symbol.clone());
        }
    }
    Ok(resolved)
}
