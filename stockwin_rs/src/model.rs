use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::{float_values, replace_float_column};

pub const DEFAULT_PREDICTION_COLUMN: &str = "predict";

/// Capabilities every predictor trained on prepared feature/target tables
/// exposes. Implementations own their parameters; tables are borrowed.
pub trait Model {
    type Params;

    fn build(&mut self, params: Self::Params) -> Result<&mut Self>;

    fn train(&mut self, train: &DataFrame, valid: Option<&DataFrame>) -> Result<&mut Self>;

    fn evaluate(&self, valid: &DataFrame) -> Result<BTreeMap<String, f64>>;

    /// Returns a copy of `test` with the predictions in `output_col`.
    fn predict(&self, test: &DataFrame, output_col: &str) -> Result<DataFrame>;

    fn save(&self, path: &Path) -> Result<PathBuf>;

    fn load(&mut self, path: &Path) -> Result<&mut Self>;
}

const TRAIN_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LinearParams {
    pub k: f64,
    pub b: f64,
}

/// Single-feature linear model `label = k * feature + b`.
#[derive(Debug, Clone)]
pub struct LinearModel {
    feature: String,
    label: String,
    params: LinearParams,
}

impl Default for LinearModel {
    fn default() -> Self {
        Self::new("x", "y")
    }
}

impl LinearModel {
    pub fn new(feature: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            label: label.into(),
            params: LinearParams::default(),
        }
    }

    pub fn params(&self) -> LinearParams {
        self.params
    }

    fn predict_values(&self, frame: &DataFrame) -> Result<Vec<Option<f64>>> {
        let LinearParams { k, b } = self.params;
        Ok(float_values(frame, &self.feature)?
            .into_iter()
            .map(|x| x.map(|x| k * x + b))
            .collect())
    }

    fn paired_rows(&self, frame: &DataFrame) -> Result<Vec<(f64, f64)>> {
        let xs = float_values(frame, &self.feature)?;
        let ys = float_values(frame, &self.label)?;
        Ok(xs
            .into_iter()
            .zip(ys)
            .filter_map(|(x, y)| Some((x?, y?)))
            .collect())
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

impl Model for LinearModel {
    type Params = LinearParams;

    fn build(&mut self, params: LinearParams) -> Result<&mut Self> {
        self.params = params;
        Ok(self)
    }

    fn train(&mut self, train: &DataFrame, _valid: Option<&DataFrame>) -> Result<&mut Self> {
        let rows = self.paired_rows(train)?;
        let no_rows = || {
            anyhow!(
                "No rows with both '{}' and '{}' to train on",
                self.feature,
                self.label
            )
        };
        let mean_xy = mean(rows.iter().map(|(x, y)| x * y)).ok_or_else(no_rows)?;
        let mean_xx =
            mean(rows.iter().map(|(x, _)| x * x + TRAIN_EPSILON)).ok_or_else(no_rows)?;
        let mean_x = mean(rows.iter().map(|(x, _)| *x)).ok_or_else(no_rows)?;
        let mean_y = mean(rows.iter().map(|(_, y)| *y)).ok_or_else(no_rows)?;

        let k = mean_xy / mean_xx;
        self.params = LinearParams {
            k,
            b: mean_y - k * mean_x,
        };
        Ok(self)
    }

    fn evaluate(&self, valid: &DataFrame) -> Result<BTreeMap<String, f64>> {
        let LinearParams { k, b } = self.params;
        let rows = self.paired_rows(valid)?;
        let mse = mean(rows.iter().map(|(x, y)| {
            let err = k * x + b - y;
            err * err
        }))
        .unwrap_or(f64::NAN);
        Ok(BTreeMap::from([("mse".to_string(), mse)]))
    }

    fn predict(&self, test: &DataFrame, output_col: &str) -> Result<DataFrame> {
        let predictions = self.predict_values(test)?;
        let mut out = test.clone();
        replace_float_column(&mut out, output_col, predictions)?;
        Ok(out)
    }

    fn save(&self, path: &Path) -> Result<PathBuf> {
        let file = File::create(path)
            .with_context(|| format!("Unable to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.params)
            .with_context(|| format!("Failed to write model to {}", path.display()))?;
        Ok(path.to_path_buf())
    }

    fn load(&mut self, path: &Path) -> Result<&mut Self> {
        let file =
            File::open(path).with_context(|| format!("Unable to open {}", path.display()))?;
        self.params = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse model from {}", path.display()))?;
        Ok(self)
    }
}
