use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use polars::prelude::*;
use tracing::{debug, warn};

use crate::data::{
    AlignedSeries, DEFAULT_DATE_COLUMN, float_values_of, require_column, string_values_of,
};
use crate::error::ValidationError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Monday through Friday between `start` and `end`, both inclusive. No
/// holiday calendar is applied.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// Parse the calendar date at the front of a cell. Accepts plain
/// `YYYY-MM-DD` as well as values carrying a time suffix
/// (`2017-11-06 00:00:00`, `2017-11-06T00:00:00Z`).
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10)?;
    NaiveDate::parse_from_str(head, DATE_FORMAT).ok()
}

pub fn format_calendar_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Replace each `None` with the nearest preceding `Some`. Leading `None`s
/// stay as they are.
pub fn forward_fill<T: Clone>(values: &mut [Option<T>]) {
    let mut last: Option<T> = None;
    for slot in values.iter_mut() {
        match slot {
            Some(value) => last = Some(value.clone()),
            None => {
                if let Some(prev) = &last {
                    *slot = Some(prev.clone());
                }
            }
        }
    }
}

/// Reindexes raw per-symbol rows onto the business-day calendar of a fixed
/// date range. One aligner is shared by every symbol of a batch.
#[derive(Debug, Clone)]
pub struct CalendarAligner {
    date_column: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    calendar: Vec<NaiveDate>,
}

impl CalendarAligner {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self> {
        if start_date > end_date {
            return Err(ValidationError::InvertedRange {
                start: start_date,
                end: end_date,
            }
            .into());
        }
        Ok(Self {
            date_column: DEFAULT_DATE_COLUMN.to_string(),
            start_date,
            end_date,
            calendar: business_days(start_date, end_date),
        })
    }

    pub fn with_date_column(mut self, name: impl Into<String>) -> Self {
        self.date_column = name.into();
        self
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

    pub fn business_days(&self) -> &[NaiveDate] {
        &self.calendar
    }

    /// Filter `raw` to the requested range, left-join it onto the business
    /// days, and forward-fill every non-date column.
    ///
    /// Raw rows may arrive in any order. When a date occurs more than once
    /// the last occurrence wins the join, but every in-range row (including
    /// duplicates and weekend-dated rows) counts towards the coverage ratio.
    pub fn align(&self, raw: &DataFrame) -> Result<AlignedSeries> {
        let date_series = require_column(raw, &self.date_column)?;
        let raw_dates = string_values_of(date_series)?;

        let mut source_rows = 0usize;
        let mut unparsed = 0usize;
        let mut row_by_date: HashMap<NaiveDate, usize> = HashMap::new();
        for (row, cell) in raw_dates.iter().enumerate() {
            let Some(date) = cell.as_deref().and_then(parse_calendar_date) else {
                unparsed += 1;
                continue;
            };
            if date < self.start_date || date > self.end_date {
                continue;
            }
            source_rows += 1;
            row_by_date.insert(date, row);
        }
        if unparsed > 0 {
            warn!(
                column = %self.date_column,
                rows = unparsed,
                "Dropping rows whose date could not be parsed as YYYY-MM-DD"
            );
        }

        let joined: Vec<Option<usize>> = self
            .calendar
            .iter()
            .map(|day| row_by_date.get(day).copied())
            .collect();

        let calendar_dates: Vec<String> = self
            .calendar
            .iter()
            .map(|day| format_calendar_date(*day))
            .collect();
        let mut columns = vec![Series::new(self.date_column.as_str(), calendar_dates)];

        for series in raw.get_columns() {
            if series.name() == self.date_column {
                continue;
            }
            let aligned = if series.dtype().is_numeric() {
                let values = float_values_of(series)?;
                let mut gathered: Vec<Option<f64>> = joined
                    .iter()
                    .map(|row| row.and_then(|idx| values[idx]))
                    .collect();
                forward_fill(&mut gathered);
                Series::new(series.name(), gathered)
            } else {
                let values = string_values_of(series)?;
                let mut gathered: Vec<Option<String>> = joined
                    .iter()
                    .map(|row| row.and_then(|idx| values[idx].clone()))
                    .collect();
                forward_fill(&mut gathered);
                Series::new(series.name(), gathered)
            };
            debug!(column = aligned.name(), dtype = ?aligned.dtype(), "Aligned column");
            columns.push(aligned);
        }

        let frame = DataFrame::new(columns)
            .with_context(|| "Failed to assemble business-day aligned frame")?;

        let coverage_ratio = if self.calendar.is_empty() {
            0.0
        } else {
            source_rows as f64 / self.calendar.len() as f64
        };

        Ok(AlignedSeries::new(
            frame,
            self.date_column.clone(),
            self.start_date,
            self.end_date,
            coverage_ratio,
        ))
    }
}
