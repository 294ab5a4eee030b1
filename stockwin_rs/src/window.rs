use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::AggregationKind;
use crate::data::{AlignedSeries, float_values, replace_float_column, require_column};
use crate::error::ValidationError;

/// One trailing-window feature: `column` aggregated over the last
/// `window_size` rows (current row included).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub column: String,
    pub window_size: usize,
    pub kind: AggregationKind,
}

impl FeatureSpec {
    pub fn new(column: impl Into<String>, window_size: usize, kind: AggregationKind) -> Self {
        Self {
            column: column.into(),
            window_size,
            kind,
        }
    }

    pub fn name(&self) -> String {
        feature_name(&self.column, self.window_size, self.kind)
    }
}

impl fmt::Display for FeatureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.column, self.window_size, self.kind)
    }
}

impl FromStr for FeatureSpec {
    type Err = ValidationError;

    /// Parses `column:window:kind`, e.g. `Open:5:max`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (column, window_size, kind) = split_spec(raw, "feature")?;
        if window_size == 0 {
            return Err(ValidationError::ZeroLength {
                what: "window_size",
            });
        }
        Ok(Self::new(column, window_size, kind.parse()?))
    }
}

/// Split `column:length:kind` from the right so column names may contain
/// colons.
pub(crate) fn split_spec<'a>(
    raw: &'a str,
    what: &'static str,
) -> Result<(&'a str, usize, &'a str), ValidationError> {
    let malformed = || ValidationError::MalformedSpec {
        what,
        raw: raw.to_string(),
    };
    let mut parts = raw.rsplitn(3, ':');
    let kind = parts.next().ok_or_else(malformed)?;
    let length = parts.next().ok_or_else(malformed)?;
    let column = parts.next().ok_or_else(malformed)?;
    if column.is_empty() {
        return Err(malformed());
    }
    let length = length.trim().parse::<usize>().map_err(|_| malformed())?;
    Ok((column, length, kind))
}

pub fn feature_name(column: &str, window_size: usize, kind: AggregationKind) -> String {
    format!("{column}_{window_size}d_{kind}")
}

/// Trailing aggregate over rows `[max(0, i - window + 1), i]`. Nulls inside
/// a window are skipped; a window with no observations yields `None`.
pub fn rolling_aggregate(
    values: &[Option<f64>],
    window: usize,
    kind: AggregationKind,
) -> Vec<Option<f64>> {
    let mut scratch = Vec::with_capacity(window.min(values.len()));
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            scratch.clear();
            scratch.extend(values[start..=i].iter().flatten().copied());
            kind.apply(&scratch)
        })
        .collect()
}

/// Accumulates trailing-window feature columns on a private copy of a
/// table.
///
/// ```ignore
/// let mut features = SlidingWindowFeatures::from_aligned(&aligned);
/// features
///     .add_feature("Open", 5, AggregationKind::Mean)?
///     .add_feature("Close", 20, AggregationKind::Max)?;
/// let frame = features.build();
/// ```
#[derive(Debug, Clone)]
pub struct SlidingWindowFeatures {
    frame: DataFrame,
}

impl SlidingWindowFeatures {
    pub fn new(frame: &DataFrame) -> Self {
        Self {
            frame: frame.clone(),
        }
    }

    pub fn from_aligned(aligned: &AlignedSeries) -> Self {
        Self::new(aligned.frame())
    }

    /// Append `{column}_{window_size}d_{kind}`, overwriting an existing
    /// column of that name. Validation happens before anything is written,
    /// so a rejected call leaves earlier features intact.
    pub fn add_feature(
        &mut self,
        column: &str,
        window_size: usize,
        kind: AggregationKind,
    ) -> Result<&mut Self> {
        require_column(&self.frame, column)?;
        if window_size == 0 {
            return Err(ValidationError::ZeroLength {
                what: "window_size",
            }
            .into());
        }

        let values = float_values(&self.frame, column)?;
        let aggregated = rolling_aggregate(&values, window_size, kind);
        let name = feature_name(column, window_size, kind);
        debug!(feature = %name, rows = aggregated.len(), "Adding sliding window feature");
        replace_float_column(&mut self.frame, &name, aggregated)?;
        Ok(self)
    }

    pub fn add_spec(&mut self, spec: &FeatureSpec) -> Result<&mut Self> {
        self.add_feature(&spec.column, spec.window_size, spec.kind)
    }

    pub fn data(&self) -> &DataFrame {
        &self.frame
    }

    pub fn build(self) -> DataFrame {
        self.frame
    }
}
