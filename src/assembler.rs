use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use polars::prelude::*;

use crate::error::BandcastResult;

/// One assembled output row: a timestamp, the realized target if known,
/// and named prediction values (main and band columns per model family, or
/// per forecast column for the sequence path). Immutable once inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub timestamp: NaiveDateTime,
    pub actual: Option<f64>,
    pub values: Vec<(String, f64)>,
}

impl PredictionRecord {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            actual: None,
            values: Vec::new(),
        }
    }

    pub fn with_actual(mut self, actual: Option<f64>) -> Self {
        self.actual = actual;
        self
    }

    pub fn with_value(mut self, column: impl Into<String>, value: f64) -> Self {
        self.values.push((column.into(), value));
        self
    }
}

/// Merges prediction records into one record set keyed by timestamp.
///
/// Duplicate timestamps resolve by last-write-wins: the later-inserted
/// record replaces the earlier one wholesale. There is no deduplication by
/// value, only by key.
#[derive(Debug, Clone)]
pub struct PredictionAssembler {
    date_column: String,
    include_actual: bool,
    columns: Vec<String>,
    records: BTreeMap<NaiveDateTime, PredictionRecord>,
}

impl PredictionAssembler {
    pub fn new(date_column: impl Into<String>) -> Self {
        Self {
            date_column: date_column.into(),
            include_actual: false,
            columns: Vec::new(),
            records: BTreeMap::new(),
        }
    }

    /// Adds an `Actual` column to the output frame.
    pub fn with_actuals(mut self) -> Self {
        self.include_actual = true;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn insert(&mut self, record: PredictionRecord) {
        for (name, _) in &record.values {
            if !self.columns.contains(name) {
                self.columns.push(name.clone());
            }
        }
        self.records.insert(record.timestamp, record);
    }

    pub fn record(&self, timestamp: &NaiveDateTime) -> Option<&PredictionRecord> {
        self.records.get(timestamp)
    }

    /// Builds the output frame: the timestamp column, `Actual` when
    /// enabled, then one column per distinct value name in first-seen
    /// order. Rows are sorted by timestamp; values a record never supplied
    /// come out as nulls.
    pub fn finish(self) -> BandcastResult<DataFrame> {
        let timestamps: Vec<i64> = self
            .records
            .keys()
            .map(|d| d.and_utc().timestamp_millis())
            .collect();

        let mut out: Vec<Column> = Vec::with_capacity(self.columns.len() + 2);
        out.push(
            Column::new(self.date_column.as_str().into(), timestamps)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        );

        if self.include_actual {
            let actuals: Vec<Option<f64>> = self.records.values().map(|r| r.actual).collect();
            out.push(Column::new("Actual".into(), actuals));
        }

        for name in &self.columns {
            let values: Vec<Option<f64>> = self
                .records
                .values()
                .map(|r| {
                    r.values
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| *v)
                })
                .collect();
            out.push(Column::new(name.as_str().into(), values));
        }

        Ok(DataFrame::new(out)?)
    }
}

/// Inner-joins a prediction table with its source table on the timestamp
/// column, yielding the evaluation view (predicted next to realized).
/// Timestamps present in only one side are dropped.
pub fn join_with_actuals(
    predictions: &DataFrame,
    actuals: &DataFrame,
    on: &str,
) -> BandcastResult<DataFrame> {
    let joined = actuals
        .clone()
        .lazy()
        .join(
            predictions.clone().lazy(),
            [col(on)],
            [col(on)],
            JoinArgs::new(JoinType::Inner),
        )
        .collect()?;
    Ok(joined)
}
