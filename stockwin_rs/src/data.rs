use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::ValidationError;

pub const DEFAULT_DATE_COLUMN: &str = "Date";

/// Read a per-symbol CSV in source order. Dates are kept as text here; the
/// calendar aligner is responsible for interpreting them.
pub fn load_rows(path: &Path) -> Result<DataFrame> {
    let lazy = LazyCsvReader::new(path)
        .has_header(true)
        .with_ignore_errors(true)
        .finish()
        .with_context(|| format!("Failed to initialize CSV reader for {}", path.display()))?;

    lazy.collect()
        .with_context(|| format!("Failed to collect rows from {}", path.display()))
}

/// A table reindexed onto the business-day calendar of `[start_date,
/// end_date]`. The frame is shared behind an `Arc`; builders clone it before
/// adding columns so the aligned data itself is never mutated.
#[derive(Debug, Clone)]
pub struct AlignedSeries {
    frame: Arc<DataFrame>,
    date_column: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    coverage_ratio: f64,
}

impl AlignedSeries {
    pub(crate) fn new(
        frame: DataFrame,
        date_column: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        coverage_ratio: f64,
    ) -> Self {
        Self {
            frame: Arc::new(frame),
            date_column: date_column.into(),
            start_date,
            end_date,
            coverage_ratio,
        }
    }

    pub fn frame(&self) -> &DataFrame {
        self.frame.as_ref()
    }

    pub fn date_column(&self) -> &str {
        &self.date_column
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Source rows inside the range divided by business days in the range.
    /// Duplicate or weekend-dated source rows are counted, so this can
    /// exceed 1.0.
    pub fn coverage_ratio(&self) -> f64 {
        self.coverage_ratio
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }
}

pub(crate) fn require_column<'a>(frame: &'a DataFrame, name: &str) -> Result<&'a Series> {
    frame
        .column(name)
        .map_err(|_| ValidationError::MissingColumn(name.to_string()).into())
}

/// Values of `name` coerced to `f64`. Nulls, NaNs and unparseable text all
/// come back as `None`.
pub(crate) fn float_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = require_column(frame, name)?;
    float_values_of(series)
}

pub(crate) fn float_values_of(series: &Series) -> Result<Vec<Option<f64>>> {
    let name = series.name();
    let cast = series
        .cast(&DataType::Float64)
        .with_context(|| format!("Column {name} cannot be coerced to float"))?;
    Ok(cast
        .f64()
        .with_context(|| format!("Column {name} must be float"))?
        .into_iter()
        .map(|value| value.filter(|v| !v.is_nan()))
        .collect())
}

pub(crate) fn string_values_of(series: &Series) -> Result<Vec<Option<String>>> {
    let name = series.name();
    let cast = series
        .cast(&DataType::String)
        .with_context(|| format!("Column {name} cannot be rendered as text"))?;
    Ok(cast
        .str()
        .with_context(|| format!("Column {name} must be text"))?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Insert `values` under `name`, replacing an existing column of the same
/// name in place.
pub(crate) fn replace_float_column(
    frame: &mut DataFrame,
    name: &str,
    values: Vec<Option<f64>>,
) -> Result<()> {
    let series = Series::new(name, values);
    frame
        .with_column(series)
        .with_context(|| format!("Failed to update column {name}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_rows_keeps_source_order_and_text_dates() -> Result<()> {
        let temp_dir = tempdir()?;
        let csv_path = temp_dir.path().join("abc.us.txt");
        std::fs::write(
            &csv_path,
            "Date,Open,Close\n2017-11-08,3,3.5\n2017-11-06,1,1.5\n2017-11-07,2,2.5\n",
        )?;

        let frame = load_rows(&csv_path)?;
        assert_eq!(frame.height(), 3);
        let dates = string_values_of(frame.column("Date")?)?;
        assert_eq!(dates[0].as_deref(), Some("2017-11-08"));
        assert_eq!(dates[1].as_deref(), Some("2017-11-06"));
        Ok(())
    }

    #[test]
    fn float_values_coerce_integers_and_drop_nan() -> Result<()> {
        let frame = df!(
            "ints" => &[1i64, 2, 3],
            "floats" => &[1.5, f64::NAN, 2.5]
        )?;
        assert_eq!(
            float_values(&frame, "ints")?,
            vec![Some(1.0), Some(2.0), Some(3.0)]
        );
        assert_eq!(
            float_values(&frame, "floats")?,
            vec![Some(1.5), None, Some(2.5)]
        );
        Ok(())
    }

    #[test]
    fn missing_column_is_a_validation_error() -> Result<()> {
        let frame = df!("a" => &[1.0])?;
        let err = float_values(&frame, "b").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::MissingColumn("b".to_string()))
        );
        Ok(())
    }
}
