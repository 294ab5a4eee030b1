use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const ALL_KINDS: &str = "max, min, mean, median";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    Max,
    Min,
    Mean,
    Median,
}

impl AggregationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationKind::Max => "max",
            AggregationKind::Min => "min",
            AggregationKind::Mean => "mean",
            AggregationKind::Median => "median",
        }
    }

    /// Aggregate a non-empty slice of finite values. Returns `None` for an
    /// empty slice so callers can map "no observations" straight to null.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let out = match self {
            AggregationKind::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AggregationKind::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            AggregationKind::Mean => values.iter().sum::<f64>() / values.len() as f64,
            AggregationKind::Median => median(values),
        };
        Some(out)
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationKind {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "max" => Ok(AggregationKind::Max),
            "min" => Ok(AggregationKind::Min),
            "mean" => Ok(AggregationKind::Mean),
            "median" => Ok(AggregationKind::Median),
            other => Err(ValidationError::UnsupportedAggregation {
                kind: other.to_string(),
                allowed: ALL_KINDS,
            }),
        }
    }
}
