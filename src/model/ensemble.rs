use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::tree::DecisionTree;

// ================================================================================================
// Bagged ensemble
// ================================================================================================

/// Independently trained trees voting on the same input. Each tree is a
/// full model of the target, so its raw output is directly comparable to
/// its siblings'.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaggedTrees {
    trees: Vec<DecisionTree>,
}

impl BaggedTrees {
    pub fn new(trees: Vec<DecisionTree>) -> Self {
        Self { trees }
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Native prediction path: mean vote across all trees.
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let n = self.trees.len().max(1) as f64;
        let mut sum = Array1::zeros(x.nrows());
        for tree in &self.trees {
            sum += &tree.predict(x);
        }
        sum / n
    }
}

// ================================================================================================
// Staged boosting ensemble
// ================================================================================================

/// Sequentially trained stages, each fitted on the residual error of the
/// stages before it. A single stage predicts a residual correction, not the
/// target itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditiveStaged {
    base: f64,
    learning_rate: f64,
    stages: Vec<DecisionTree>,
}

impl AdditiveStaged {
    pub fn new(base: f64, learning_rate: f64, stages: Vec<DecisionTree>) -> Self {
        Self {
            base,
            learning_rate,
            stages,
        }
    }

    pub fn stages(&self) -> &[DecisionTree] {
        &self.stages
    }

    /// Native prediction path: base value plus the shrunken sum of every
    /// stage's residual correction.
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut out = Array1::from_elem(x.nrows(), self.base);
        for stage in &self.stages {
            out += &(stage.predict(x) * self.learning_rate);
        }
        out
    }

    /// Raw per-stage outputs, one row per stage. These are residual
    /// predictions on different scales and are **not** comparable across
    /// stages; the banding layer uses them as distribution samples anyway
    /// to reproduce the established heuristic.
    pub fn stage_outputs(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.stages.len(), x.nrows()));
        for (i, stage) in self.stages.iter().enumerate() {
            out.row_mut(i).assign(&stage.predict(x));
        }
        out
    }
}

// ================================================================================================
// Contribution-decomposed boosting ensemble
// ================================================================================================

/// Boosted ensemble whose score decomposes additively per tree: the sum of
/// all per-tree contributions plus the bias term equals the final
/// prediction exactly. Shrinkage is folded into the stored leaf values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditiveContribution {
    bias: f64,
    trees: Vec<DecisionTree>,
}

impl AdditiveContribution {
    pub fn new(bias: f64, trees: Vec<DecisionTree>) -> Self {
        Self { bias, trees }
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Native prediction path: bias plus the sum of every tree's
    /// contribution.
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut out = Array1::from_elem(x.nrows(), self.bias);
        for tree in &self.trees {
            out += &tree.predict(x);
        }
        out
    }

    /// Marginal contribution of each tree, one row per tree in training
    /// order. Summing over rows and adding `bias()` reproduces `predict`.
    pub fn contribution_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.trees.len(), x.nrows()));
        for (i, tree) in self.trees.iter().enumerate() {
            out.row_mut(i).assign(&tree.predict(x));
        }
        out
    }

    /// Running cumulative sum of contributions across trees, discarding the
    /// bias term: row `u` holds the partial prediction after the first
    /// `u + 1` trees. The final row converges on `predict` minus the bias.
    pub fn cumulative_contributions(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = self.contribution_matrix(x);
        for u in 1..out.nrows() {
            let prev = out.row(u - 1).to_owned();
            let mut row = out.row_mut(u);
            row += &prev;
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    #[test]
    fn bagged_mean_vote() {
        let model = BaggedTrees::new(vec![
            DecisionTree::leaf(1.0),
            DecisionTree::leaf(2.0),
            DecisionTree::leaf(6.0),
        ]);
        let preds = model.predict(&array![[0.0]]);
        assert!((preds[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn staged_prediction_applies_base_and_shrinkage() {
        let model = AdditiveStaged::new(
            10.0,
            0.1,
            vec![DecisionTree::leaf(2.0), DecisionTree::leaf(4.0)],
        );
        let preds = model.predict(&array![[0.0]]);
        assert!((preds[0] - 10.6).abs() < 1e-12);

        // Raw stage outputs are unshrunken residual predictions.
        let outputs = model.stage_outputs(&array![[0.0]]);
        assert_eq!(outputs, array![[2.0], [4.0]]);
    }

    #[test]
    fn contributions_sum_to_native_prediction() {
        let model = AdditiveContribution::new(
            0.5,
            vec![
                DecisionTree::stump(0, 0.0, -1.0, 1.0),
                DecisionTree::leaf(0.25),
                DecisionTree::leaf(0.125),
            ],
        );
        let x = array![[1.0], [-1.0]];

        let native = model.predict(&x);
        let contribs = model.contribution_matrix(&x);
        for s in 0..x.nrows() {
            let total: f64 = contribs.column(s).sum() + model.bias();
            assert!((total - native[s]).abs() < 1e-12);
        }
    }

    #[test]
    fn cumulative_contributions_converge_without_bias() {
        let model = AdditiveContribution::new(
            0.0,
            vec![
                DecisionTree::leaf(1.0),
                DecisionTree::leaf(2.0),
                DecisionTree::leaf(3.0),
            ],
        );
        let x = array![[0.0]];
        let cumulative = model.cumulative_contributions(&x);
        assert_eq!(cumulative, array![[1.0], [3.0], [6.0]]);

        let native = model.predict(&x);
        let last = cumulative[(2, 0)];
        assert!((last - native[0]).abs() / native[0].abs() < 1e-4);
    }
}
