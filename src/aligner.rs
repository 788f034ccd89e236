use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use ndarray::{Array2, Axis};
use polars::prelude::*;

use crate::{
    error::{AlignmentError, BandcastResult},
    scaler::StandardScaler,
};

/// Mutually aligned output of the aligner: row `i` of `features`, entry
/// `i` of `target` (when present), and entry `i` of `dates` all describe
/// the same observation.
#[derive(Debug, Clone)]
pub struct AlignedBatch {
    pub features: Array2<f64>,
    pub feature_names: Vec<String>,
    /// Actual target values; entries may be absent (future rows have no
    /// realized target yet). `None` when the table carries no target
    /// column at all.
    pub target: Option<Vec<Option<f64>>>,
    pub dates: Vec<NaiveDateTime>,
}

impl AlignedBatch {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Keeps only the rows at `indices`, in the given order, across all
    /// three aligned collections.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
            target: self
                .target
                .as_ref()
                .map(|t| indices.iter().map(|&i| t[i]).collect()),
            dates: indices.iter().map(|&i| self.dates[i]).collect(),
        }
    }
}

/// Cleans and synchronizes the feature matrix, target vector, and date
/// vector of one table.
#[derive(Debug, Clone)]
pub struct DataAligner {
    date_column: String,
    target_column: String,
}

impl DataAligner {
    pub fn new(date_column: impl Into<String>, target_column: impl Into<String>) -> Self {
        Self {
            date_column: date_column.into(),
            target_column: target_column.into(),
        }
    }

    pub fn date_column(&self) -> &str {
        &self.date_column
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    /// Standardizes every feature column (fit on this batch), then removes
    /// rows with non-finite features or unparseable dates from features,
    /// target, and dates in lockstep, preserving relative order.
    ///
    /// An absent target value does not drop its row; it surfaces as `None`
    /// in the aligned target so future rows stay scoreable.
    pub fn align(&self, df: &DataFrame) -> BandcastResult<AlignedBatch> {
        let dates = self.parse_date_column(df)?;

        let feature_names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .filter(|n| *n != self.date_column && *n != self.target_column)
            .collect();

        let raw = numeric_matrix(df, &feature_names)?;
        let features = StandardScaler::fit_transform(&raw);

        let target: Option<Vec<Option<f64>>> = if df.column(&self.target_column).is_ok() {
            Some(numeric_column(df, &self.target_column)?)
        } else {
            None
        };

        let keep: Vec<usize> = (0..df.height())
            .filter(|&i| dates[i].is_some() && features.row(i).iter().all(|v| v.is_finite()))
            .collect();

        Ok(AlignedBatch {
            features: features.select(Axis(0), &keep),
            feature_names,
            target: target.map(|t| keep.iter().map(|&i| t[i]).collect()),
            dates: keep.iter().filter_map(|&i| dates[i]).collect(),
        })
    }

    /// Extracts the given raw columns plus parsed dates for the sequence
    /// path: rows with non-finite values or bad dates are dropped, the
    /// survivors sorted by date, and duplicate timestamps reduced to their
    /// first occurrence. No standardization; the recurrent family applies
    /// its own persisted scaler.
    pub fn extract_ordered(
        &self,
        df: &DataFrame,
        columns: &[String],
    ) -> BandcastResult<(Array2<f64>, Vec<NaiveDateTime>)> {
        let dates = self.parse_date_column(df)?;
        for name in columns {
            if df.column(name).is_err() {
                return Err(AlignmentError::MissingColumn(name.clone()).into());
            }
        }
        let raw = numeric_matrix(df, columns)?;

        let mut keep: Vec<usize> = (0..df.height())
            .filter(|&i| dates[i].is_some() && raw.row(i).iter().all(|v| v.is_finite()))
            .collect();
        keep.sort_by_key(|&i| dates[i]);
        keep.dedup_by_key(|i| dates[*i]);

        let matrix = raw.select(Axis(0), &keep);
        let ordered_dates = keep.iter().filter_map(|&i| dates[i]).collect();
        Ok((matrix, ordered_dates))
    }

    fn parse_date_column(&self, df: &DataFrame) -> BandcastResult<Vec<Option<NaiveDateTime>>> {
        let col = df
            .column(&self.date_column)
            .map_err(|_| AlignmentError::MissingColumn(self.date_column.clone()))?;
        parse_dates(col)
    }
}

fn parse_dates(col: &Column) -> BandcastResult<Vec<Option<NaiveDateTime>>> {
    let series = col.as_materialized_series();
    match series.dtype() {
        DataType::String => Ok(series
            .str()?
            .into_iter()
            .map(|o| o.and_then(parse_datetime_str))
            .collect()),
        _ => {
            let cast = series.cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
            Ok(cast
                .datetime()?
                .physical()
                .into_iter()
                .map(|o| {
                    o.and_then(|ms| DateTime::from_timestamp_millis(ms).map(|d| d.naive_utc()))
                })
                .collect())
        }
    }
}

fn parse_datetime_str(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn numeric_column(df: &DataFrame, name: &str) -> BandcastResult<Vec<Option<f64>>> {
    let series = df
        .column(name)
        .map_err(|_| AlignmentError::MissingColumn(name.to_string()))?
        .as_materialized_series();
    let cast = series
        .cast(&DataType::Float64)
        .map_err(|e| AlignmentError::NonNumericColumn {
            column: name.to_string(),
            msg: e.to_string(),
        })?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|o| o.filter(|v| v.is_finite()))
        .collect())
}

fn numeric_matrix(df: &DataFrame, columns: &[String]) -> BandcastResult<Array2<f64>> {
    let mut by_column: Vec<Vec<f64>> = Vec::with_capacity(columns.len());
    for name in columns {
        let series = df
            .column(name)
            .map_err(|_| AlignmentError::MissingColumn(name.clone()))?
            .as_materialized_series();
        let cast = series
            .cast(&DataType::Float64)
            .map_err(|e| AlignmentError::NonNumericColumn {
                column: name.clone(),
                msg: e.to_string(),
            })?;
        by_column.push(
            cast.f64()?
                .into_iter()
                .map(|o| o.unwrap_or(f64::NAN))
                .collect(),
        );
    }

    Ok(Array2::from_shape_fn((df.height(), columns.len()), |(i, j)| {
        by_column[j][i]
    }))
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Timelike;

    fn sample_df() -> DataFrame {
        df!(
            "Date" => &["2024-03-04 09:15:00", "2024-03-04 09:20:00", "2024-03-04 09:25:00", "2024-03-04 09:30:00"],
            "Close" => &[Some(100.0), Some(f64::NAN), Some(102.0), Some(104.0)],
            "Volume" => &[Some(10.0), Some(20.0), Some(30.0), Some(40.0)],
            "target_n7d" => &[Some(1.0), Some(2.0), None, Some(4.0)],
        )
        .unwrap()
    }

    fn aligner() -> DataAligner {
        DataAligner::new("Date", "target_n7d")
    }

    #[test]
    fn aligned_outputs_have_equal_length_and_keep_order() {
        let batch = aligner().align(&sample_df()).unwrap();

        // Row 1 has a NaN feature and is dropped everywhere.
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.features.nrows(), 3);
        assert_eq!(batch.target.as_ref().unwrap().len(), 3);

        let minutes: Vec<u32> = batch.dates.iter().map(|d| d.time().minute()).collect();
        assert_eq!(minutes, vec![15, 25, 30]);

        // Missing target survives the mask as None.
        assert_eq!(batch.target.as_ref().unwrap()[1], None);
    }

    #[test]
    fn features_are_standardized_on_the_batch() {
        let batch = aligner().align(&sample_df()).unwrap();
        for col in batch.features.axis_iter(Axis(1)) {
            let mean: f64 = col.iter().sum::<f64>() / col.len() as f64;
            assert!(mean.abs() < 1e-9);
        }
    }

    #[test]
    fn missing_date_column_is_an_alignment_error() {
        let df = df!("Close" => &[1.0]).unwrap();
        let err = aligner().align(&df).unwrap_err();
        assert!(matches!(
            err,
            crate::error::BandcastError::Alignment(AlignmentError::MissingColumn(_))
        ));
    }

    #[test]
    fn all_rows_masked_yields_empty_batch() {
        let df = df!(
            "Date" => &["2024-03-04 09:15:00"],
            "Close" => &[f64::NAN],
        )
        .unwrap();
        let batch = aligner().align(&df).unwrap();
        assert!(batch.is_empty());
        assert!(batch.target.is_none());
    }

    #[test]
    fn extract_ordered_sorts_and_dedupes_by_timestamp() {
        let df = df!(
            "Date" => &[
                "2024-03-04 09:25:00",
                "2024-03-04 09:15:00",
                "2024-03-04 09:15:00",
                "2024-03-04 09:20:00",
            ],
            "Close" => &[3.0, 1.0, 9.0, 2.0],
        )
        .unwrap();
        let (matrix, dates) = aligner()
            .extract_ordered(&df, &["Close".to_string()])
            .unwrap();

        let minutes: Vec<u32> = dates.iter().map(|d| d.time().minute()).collect();
        assert_eq!(minutes, vec![15, 20, 25]);
        // First occurrence wins on duplicate timestamps.
        assert_eq!(matrix.column(0).to_vec(), vec![1.0, 2.0, 3.0]);
    }
}
