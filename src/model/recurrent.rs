use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{BandcastResult, DataError};

/// Fitted recurrent forecaster: a single tanh recurrence over the input
/// window followed by a dense head that emits all future steps at once.
///
/// Training happens elsewhere; this type only carries the fitted weights
/// and the native inference path. There is no per-unit prediction
/// distribution, so uncertainty banding does not apply to this family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentSequence {
    /// hidden x inputs
    w_input: Array2<f64>,
    /// hidden x hidden
    w_hidden: Array2<f64>,
    b_hidden: Array1<f64>,
    /// (n_future * n_outputs) x hidden
    w_output: Array2<f64>,
    b_output: Array1<f64>,
    n_future: usize,
    n_outputs: usize,
}

impl RecurrentSequence {
    pub fn new(
        w_input: Array2<f64>,
        w_hidden: Array2<f64>,
        b_hidden: Array1<f64>,
        w_output: Array2<f64>,
        b_output: Array1<f64>,
        n_future: usize,
        n_outputs: usize,
    ) -> BandcastResult<Self> {
        let hidden = w_input.nrows();
        if w_hidden.nrows() != hidden || w_hidden.ncols() != hidden || b_hidden.len() != hidden {
            return Err(DataError::DimensionMismatch(
                "recurrent weights disagree on hidden size".to_string(),
            )
            .into());
        }
        if w_output.ncols() != hidden
            || w_output.nrows() != n_future * n_outputs
            || b_output.len() != n_future * n_outputs
        {
            return Err(DataError::DimensionMismatch(
                "output head does not match n_future * n_outputs".to_string(),
            )
            .into());
        }
        Ok(Self {
            w_input,
            w_hidden,
            b_hidden,
            w_output,
            b_output,
            n_future,
            n_outputs,
        })
    }

    pub fn n_inputs(&self) -> usize {
        self.w_input.ncols()
    }

    pub fn n_future(&self) -> usize {
        self.n_future
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    /// One multi-step point forecast for a single window of shape
    /// `n_steps x n_inputs`. Returns `n_future x n_outputs`, in the scaled
    /// space the model was trained in.
    pub fn forecast(&self, window: &Array2<f64>) -> BandcastResult<Array2<f64>> {
        if window.ncols() != self.n_inputs() {
            return Err(DataError::DimensionMismatch(format!(
                "window has {} columns, model expects {}",
                window.ncols(),
                self.n_inputs()
            ))
            .into());
        }

        let mut h = Array1::zeros(self.w_hidden.nrows());
        for x_t in window.axis_iter(Axis(0)) {
            let pre = self.w_input.dot(&x_t) + self.w_hidden.dot(&h) + &self.b_hidden;
            h = pre.mapv(f64::tanh);
        }

        let flat = self.w_output.dot(&h) + &self.b_output;
        let out = Array2::from_shape_vec((self.n_future, self.n_outputs), flat.to_vec()).map_err(
            |e| DataError::DimensionMismatch(format!("failed to reshape forecast head: {e}")),
        )?;
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    fn identity_model() -> RecurrentSequence {
        // One input, one hidden unit, zero recurrence: h = tanh(x_last).
        // Head emits 2 future steps of 1 output each: [h, 2h].
        RecurrentSequence::new(
            array![[1.0]],
            array![[0.0]],
            array![0.0],
            array![[1.0], [2.0]],
            array![0.0, 0.0],
            2,
            1,
        )
        .unwrap()
    }

    #[test]
    fn forecast_shape_and_values() {
        let model = identity_model();
        let window = array![[0.0], [0.5]];
        let out = model.forecast(&window).unwrap();
        assert_eq!(out.dim(), (2, 1));

        let h = 0.5_f64.tanh();
        assert!((out[(0, 0)] - h).abs() < 1e-12);
        assert!((out[(1, 0)] - 2.0 * h).abs() < 1e-12);
    }

    #[test]
    fn forecast_rejects_wrong_window_width() {
        let model = identity_model();
        let window = array![[0.0, 1.0]];
        assert!(model.forecast(&window).is_err());
    }

    #[test]
    fn new_rejects_inconsistent_head() {
        let err = RecurrentSequence::new(
            array![[1.0]],
            array![[0.0]],
            array![0.0],
            array![[1.0]],
            array![0.0],
            2,
            1,
        );
        assert!(err.is_err());
    }
}
