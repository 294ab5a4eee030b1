//! Forward-looking price movement labels.
//!
//! Two label families are covered by the same machinery:
//!   1. the overall trend over the next few days (multi-day average), and
//!   2. whether a limit order placed at tomorrow's price would be filled
//!      within the horizon (future high / low).
//!
//! Every label is expressed relative to the *next* day's value, and its
//! aggregation window starts strictly after the current row, so the row a
//! prediction is made from never leaks into its own label.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::AggregationKind;
use crate::data::{AlignedSeries, float_values, replace_float_column, require_column};
use crate::error::ValidationError;
use crate::window::split_spec;

/// Added to the next-day denominator so a zero price never divides by zero.
pub const RATIO_EPSILON: f64 = 1e-10;

const TARGET_KINDS: &str = "mean, max, min";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub column: String,
    pub horizon: usize,
    pub kind: AggregationKind,
}

impl TargetSpec {
    pub fn new(column: impl Into<String>, horizon: usize, kind: AggregationKind) -> Self {
        Self {
            column: column.into(),
            horizon,
            kind,
        }
    }

    pub fn ratio_name(&self) -> String {
        ratio_name(&self.column, self.horizon, self.kind)
    }

    /// Names of the columns this target writes at `verbosity`, in the order
    /// they are added.
    pub fn output_columns(&self, verbosity: u8) -> Vec<String> {
        let mut names = vec![self.ratio_name()];
        if verbosity >= 1 {
            names.push(future_aggregate_name(&self.column, self.horizon, self.kind));
        }
        if verbosity >= 2 {
            names.push(next_day_name(&self.column));
        }
        names
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.column, self.horizon, self.kind)
    }
}

impl FromStr for TargetSpec {
    type Err = ValidationError;

    /// Parses `column:horizon:kind`, e.g. `High:3:max`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (column, horizon, kind) = split_spec(raw, "target")?;
        if horizon == 0 {
            return Err(ValidationError::ZeroLength { what: "horizon" });
        }
        let kind = ensure_target_kind(kind.parse()?)?;
        Ok(Self::new(column, horizon, kind))
    }
}

fn ensure_target_kind(kind: AggregationKind) -> Result<AggregationKind, ValidationError> {
    match kind {
        AggregationKind::Mean | AggregationKind::Max | AggregationKind::Min => Ok(kind),
        other => Err(ValidationError::UnsupportedAggregation {
            kind: other.to_string(),
            allowed: TARGET_KINDS,
        }),
    }
}

pub fn ratio_name(column: &str, horizon: usize, kind: AggregationKind) -> String {
    format!("future_{horizon}day_{kind}_{column}_ratio")
}

pub fn future_aggregate_name(column: &str, horizon: usize, kind: AggregationKind) -> String {
    format!("future_{horizon}day_{kind}_{column}")
}

pub fn next_day_name(column: &str) -> String {
    format!("next_day_{column}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovementColumns {
    pub next_day: Vec<Option<f64>>,
    pub future_aggregate: Vec<Option<f64>>,
    pub ratio: Vec<Option<f64>>,
}

/// Compute next-day values, the forward aggregate over rows
/// `[i + 1, i + horizon]` and their ratio.
///
/// The forward aggregate needs all `horizon` observations: rows within
/// `horizon` of the end, or whose window contains a null, get `None`.
pub fn price_movement(
    values: &[Option<f64>],
    horizon: usize,
    kind: AggregationKind,
) -> MovementColumns {
    let len = values.len();
    let next_day: Vec<Option<f64>> = (0..len)
        .map(|i| values.get(i + 1).copied().flatten())
        .collect();

    let mut window = Vec::with_capacity(horizon.min(len));
    let future_aggregate: Vec<Option<f64>> = (0..len)
        .map(|i| {
            let Some(end) = i.checked_add(horizon).filter(|end| *end < len) else {
                return None;
            };
            window.clear();
            for value in &values[i + 1..=end] {
                window.push((*value)?);
            }
            kind.apply(&window)
        })
        .collect();

    let ratio = future_aggregate
        .iter()
        .zip(next_day.iter())
        .map(|(future, next)| match (future, next) {
            (Some(future), Some(next)) => Some(future / (next + RATIO_EPSILON)),
            _ => None,
        })
        .collect();

    MovementColumns {
        next_day,
        future_aggregate,
        ratio,
    }
}

/// Attaches forward movement labels to a private copy of a table.
/// `verbosity` decides which intermediates are kept next to the ratio:
/// 0 keeps only the ratio, 1 adds the forward aggregate, 2 adds the
/// next-day value as well.
#[derive(Debug, Clone)]
pub struct PriceMovementTarget {
    frame: DataFrame,
    verbosity: u8,
}

impl PriceMovementTarget {
    pub fn new(frame: &DataFrame, verbosity: u8) -> Self {
        Self {
            frame: frame.clone(),
            verbosity,
        }
    }

    pub fn from_aligned(aligned: &AlignedSeries, verbosity: u8) -> Self {
        Self::new(aligned.frame(), verbosity)
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    pub fn compute_movement(
        &mut self,
        column: &str,
        horizon: usize,
        kind: AggregationKind,
        verbosity: u8,
    ) -> Result<&mut Self> {
        require_column(&self.frame, column)?;
        if horizon == 0 {
            return Err(ValidationError::ZeroLength { what: "horizon" }.into());
        }
        let kind = ensure_target_kind(kind)?;

        let values = float_values(&self.frame, column)?;
        let movement = price_movement(&values, horizon, kind);

        let name = ratio_name(column, horizon, kind);
        debug!(label = %name, verbosity, "Adding forward movement target");
        replace_float_column(&mut self.frame, &name, movement.ratio)?;
        if verbosity >= 1 {
            let name = future_aggregate_name(column, horizon, kind);
            replace_float_column(&mut self.frame, &name, movement.future_aggregate)?;
        }
        if verbosity >= 2 {
            replace_float_column(&mut self.frame, &next_day_name(column), movement.next_day)?;
        }
        Ok(self)
    }

    pub fn add_spec(&mut self, spec: &TargetSpec) -> Result<&mut Self> {
        let verbosity = self.verbosity;
        self.compute_movement(&spec.column, spec.horizon, spec.kind, verbosity)
    }

    pub fn add_future_high_point(&mut self, column: &str, horizon: usize) -> Result<&mut Self> {
        let verbosity = self.verbosity;
        self.compute_movement(column, horizon, AggregationKind::Max, verbosity)
    }

    pub fn add_future_low_point(&mut self, column: &str, horizon: usize) -> Result<&mut Self> {
        let verbosity = self.verbosity;
        self.compute_movement(column, horizon, AggregationKind::Min, verbosity)
    }

    pub fn add_future_avg_point(&mut self, column: &str, horizon: usize) -> Result<&mut Self> {
        let verbosity = self.verbosity;
        self.compute_movement(column, horizon, AggregationKind::Mean, verbosity)
    }

    pub fn data(&self) -> &DataFrame {
        &self.frame
    }

    pub fn build(self) -> DataFrame {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn forward_window_excludes_current_row() {
        let values = some(&[100.0, 1.0, 2.0, 3.0]);
        let movement = price_movement(&values, 2, AggregationKind::Max);
        // Row 0 must not see its own 100.0.
        assert_eq!(movement.future_aggregate, vec![Some(2.0), Some(3.0), None, None]);
        assert_eq!(movement.next_day, vec![Some(1.0), Some(2.0), Some(3.0), None]);
    }

    #[test]
    fn null_inside_forward_window_voids_the_label() {
        let values = vec![Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)];
        let movement = price_movement(&values, 2, AggregationKind::Mean);
        assert_eq!(movement.future_aggregate, vec![None, None, Some(4.5), None, None]);
        assert_eq!(movement.ratio[0], None);
        assert_eq!(movement.ratio[1], None);
    }

    #[test]
    fn horizon_longer_than_series_yields_only_nulls() {
        let values = some(&[1.0, 2.0, 3.0]);
        let movement = price_movement(&values, 5, AggregationKind::Min);
        assert!(movement.future_aggregate.iter().all(Option::is_none));
        assert!(movement.ratio.iter().all(Option::is_none));
    }

    #[test]
    fn oversized_horizon_yields_nulls_without_allocating() {
        let values = some(&[1.0, 2.0, 3.0]);
        let movement = price_movement(&values, usize::MAX, AggregationKind::Max);
        assert_eq!(movement.future_aggregate, vec![None, None, None]);
        assert_eq!(movement.ratio, vec![None, None, None]);
        assert_eq!(movement.next_day, vec![Some(2.0), Some(3.0), None]);

        let movement = price_movement(&values, 1 << 40, AggregationKind::Mean);
        assert!(movement.future_aggregate.iter().all(Option::is_none));

        let spec: TargetSpec = format!("High:{}:max", usize::MAX).parse().unwrap();
        assert_eq!(spec.horizon, usize::MAX);
    }

    #[test]
    fn output_columns_follow_verbosity() {
        let spec = TargetSpec::new("High", 3, AggregationKind::Max);
        assert_eq!(spec.output_columns(0), vec!["future_3day_max_High_ratio"]);
        assert_eq!(
            spec.output_columns(2),
            vec![
                "future_3day_max_High_ratio",
                "future_3day_max_High",
                "next_day_High"
            ]
        );
    }

    #[test]
    fn target_spec_rejects_median() {
        assert!(matches!(
            "Close:3:median".parse::<TargetSpec>(),
            Err(ValidationError::UnsupportedAggregation { .. })
        ));
        let spec: TargetSpec = "Low:3:min".parse().unwrap();
        assert_eq!(spec.ratio_name(), "future_3day_min_Low_ratio");
    }
}
