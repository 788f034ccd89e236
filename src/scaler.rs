use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{BandcastResult, DataError};

// ================================================================================================
// Standard Scaler
// ================================================================================================

/// Zero-mean, unit-variance scaler fitted on the batch being scored.
///
/// Non-finite entries are ignored during the fit so that a handful of bad
/// rows cannot poison a whole column; the finite-value mask applied by the
/// aligner removes those rows afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let n_cols = x.ncols();
        let mut mean = Array1::zeros(n_cols);
        let mut scale = Array1::ones(n_cols);

        for (j, col) in x.axis_iter(Axis(1)).enumerate() {
            let finite: Vec<f64> = col.iter().copied().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                continue;
            }
            let n = finite.len() as f64;
            let m = finite.iter().sum::<f64>() / n;
            let var = finite.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            mean[j] = m;
            // Zero-variance columns pass through unscaled.
            if var > 0.0 {
                scale[j] = var.sqrt();
            }
        }

        Self { mean, scale }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            row -= &self.mean;
            row /= &self.scale;
        }
        out
    }

    pub fn fit_transform(x: &Array2<f64>) -> Array2<f64> {
        Self::fit(x).transform(x)
    }
}

// ================================================================================================
// Min-Max Scaler
// ================================================================================================

/// Per-column min-max scaler serialized alongside the recurrent model
/// artifact. Loaded read-only at prediction time: `transform` maps raw
/// inputs into the model's training range, `inverse_transform` maps the
/// forecast back to price/volume units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    data_min: Array1<f64>,
    data_max: Array1<f64>,
}

impl MinMaxScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let n_cols = x.ncols();
        let mut data_min = Array1::from_elem(n_cols, f64::INFINITY);
        let mut data_max = Array1::from_elem(n_cols, f64::NEG_INFINITY);

        for (j, col) in x.axis_iter(Axis(1)).enumerate() {
            for v in col.iter().copied().filter(|v| v.is_finite()) {
                data_min[j] = data_min[j].min(v);
                data_max[j] = data_max[j].max(v);
            }
        }

        Self { data_min, data_max }
    }

    pub fn n_columns(&self) -> usize {
        self.data_min.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> BandcastResult<Array2<f64>> {
        self.check_width(x.ncols())?;
        let mut out = x.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            for j in 0..row.len() {
                let range = self.data_max[j] - self.data_min[j];
                row[j] = if range > 0.0 {
                    (row[j] - self.data_min[j]) / range
                } else {
                    0.0
                };
            }
        }
        Ok(out)
    }

    pub fn inverse_transform(&self, x: &Array2<f64>) -> BandcastResult<Array2<f64>> {
        self.check_width(x.ncols())?;
        let mut out = x.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            for j in 0..row.len() {
                let range = self.data_max[j] - self.data_min[j];
                row[j] = row[j] * range.max(0.0) + self.data_min[j];
            }
        }
        Ok(out)
    }

    fn check_width(&self, ncols: usize) -> BandcastResult<()> {
        if ncols != self.n_columns() {
            return Err(DataError::DimensionMismatch(format!(
                "scaler fitted on {} columns, input has {ncols}",
                self.n_columns()
            ))
            .into());
        }
        Ok(())
    }
}
