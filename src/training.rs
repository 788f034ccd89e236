use ndarray::{Array2, Axis};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{
    error::{AlignmentError, BandcastResult},
    model::{Model, ModelFamily},
};

/// Owns the randomness of a training run. Every shuffle draws from this
/// explicitly threaded generator; nothing touches a process-global RNG, so
/// the same seed always reproduces the same split.
#[derive(Debug)]
pub struct TrainContext {
    rng: StdRng,
}

impl TrainContext {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

/// Row-aligned split of a feature matrix and target vector.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub y_train: Vec<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Vec<f64>,
}

/// Shuffles rows with the context's generator, then carves off the last
/// `test_fraction` of the shuffled order as the test set. Feature and
/// target rows stay paired throughout.
pub fn train_test_split(
    ctx: &mut TrainContext,
    x: &Array2<f64>,
    y: &[f64],
    test_fraction: f64,
) -> BandcastResult<TrainTestSplit> {
    if x.nrows() != y.len() {
        return Err(AlignmentError::LengthMismatch {
            left: "features".to_string(),
            left_len: x.nrows(),
            right: "target".to_string(),
            right_len: y.len(),
        }
        .into());
    }

    let n = x.nrows();
    let n_test = ((n as f64) * test_fraction.clamp(0.0, 1.0)).round() as usize;

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(ctx.rng());
    let (train_idx, test_idx) = indices.split_at(n - n_test);

    Ok(TrainTestSplit {
        x_train: x.select(Axis(0), train_idx),
        y_train: train_idx.iter().map(|&i| y[i]).collect(),
        x_test: x.select(Axis(0), test_idx),
        y_test: test_idx.iter().map(|&i| y[i]).collect(),
    })
}

/// Fitting seam for one model family. The engine itself only loads and
/// scores persisted artifacts; implementations of this trait live with the
/// training tooling that produces them.
pub trait ModelTrainer {
    fn family(&self) -> ModelFamily;

    fn fit(&self, ctx: &mut TrainContext, x: &Array2<f64>, y: &[f64]) -> BandcastResult<Model>;
}
