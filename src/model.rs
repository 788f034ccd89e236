pub mod ensemble;
pub mod recurrent;
pub mod tree;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{BandcastResult, DataError};

pub use ensemble::{AdditiveContribution, AdditiveStaged, BaggedTrees};
pub use recurrent::RecurrentSequence;
pub use tree::{DecisionTree, Node};

/// The closed set of model families the engine dispatches over. The string
/// form is used in artifact file names and output column suffixes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ModelFamily {
    BaggedTrees,
    StagedBoosting,
    BoostedContribution,
    RecurrentSequence,
}

impl ModelFamily {
    /// The families that yield a per-unit prediction distribution and thus
    /// percentile bands.
    pub fn banded() -> [ModelFamily; 3] {
        [
            Self::BaggedTrees,
            Self::StagedBoosting,
            Self::BoostedContribution,
        ]
    }
}

/// Point predictions plus the raw per-unit distribution they came from.
/// `distribution` is oriented units x samples; the meaning of a "unit"
/// depends on the family that produced it.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub main: Vec<f64>,
    pub distribution: Array2<f64>,
}

/// A fitted model artifact. Tagged variant per family; sub-estimators are
/// read-only after load and exist solely so the distribution can be
/// extracted next to the native prediction path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Model {
    Bagged(BaggedTrees),
    Staged(AdditiveStaged),
    Contribution(AdditiveContribution),
    Recurrent(RecurrentSequence),
}

impl Model {
    pub fn family(&self) -> ModelFamily {
        match self {
            Self::Bagged(_) => ModelFamily::BaggedTrees,
            Self::Staged(_) => ModelFamily::StagedBoosting,
            Self::Contribution(_) => ModelFamily::BoostedContribution,
            Self::Recurrent(_) => ModelFamily::RecurrentSequence,
        }
    }

    /// Point predictions plus the per-unit distribution, per family:
    ///
    /// * `Bagged` — one unit per tree; each row is that tree's independent
    ///   vote on every sample.
    /// * `Staged` — one unit per boosting stage; each row is the stage's
    ///   raw residual prediction. Stages are not comparable in isolation;
    ///   treating them as distribution samples is an established
    ///   approximation, reproduced here deliberately.
    /// * `Contribution` — one unit per tree; row `u` is the cumulative sum
    ///   of per-tree contributions through tree `u`, bias discarded. The
    ///   final row converges on the native prediction.
    ///
    /// The main prediction always comes from the family's native inference
    /// path, independent of the distribution extraction.
    ///
    /// `Recurrent` has no per-unit distribution and is served by
    /// [`Model::forecast_window`] instead.
    pub fn predict_with_distribution(&self, x: &Array2<f64>) -> BandcastResult<Prediction> {
        match self {
            Self::Bagged(m) => {
                let mut distribution = Array2::zeros((m.trees().len(), x.nrows()));
                for (u, tree) in m.trees().iter().enumerate() {
                    distribution.row_mut(u).assign(&tree.predict(x));
                }
                Ok(Prediction {
                    main: m.predict(x).to_vec(),
                    distribution,
                })
            }
            Self::Staged(m) => Ok(Prediction {
                main: m.predict(x).to_vec(),
                distribution: m.stage_outputs(x),
            }),
            Self::Contribution(m) => Ok(Prediction {
                main: m.predict(x).to_vec(),
                distribution: m.cumulative_contributions(x),
            }),
            Self::Recurrent(_) => Err(DataError::UnsupportedFamily {
                family: self.family(),
                op: "per-unit distribution extraction".to_string(),
            }
            .into()),
        }
    }

    /// Multi-step forecast for one sequence window. Only the recurrent
    /// family supports this entry point.
    pub fn forecast_window(&self, window: &Array2<f64>) -> BandcastResult<Array2<f64>> {
        match self {
            Self::Recurrent(m) => m.forecast(window),
            _ => Err(DataError::UnsupportedFamily {
                family: self.family(),
                op: "sequence forecasting".to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    #[test]
    fn family_string_form_is_stable() {
        assert_eq!(ModelFamily::BaggedTrees.to_string(), "bagged_trees");
        assert_eq!(ModelFamily::StagedBoosting.to_string(), "staged_boosting");
        assert_eq!(
            ModelFamily::BoostedContribution.to_string(),
            "boosted_contribution"
        );
        assert_eq!(
            ModelFamily::RecurrentSequence.to_string(),
            "recurrent_sequence"
        );
    }

    #[test]
    fn bagged_distribution_holds_independent_votes() {
        let model = Model::Bagged(BaggedTrees::new(vec![
            DecisionTree::leaf(1.0),
            DecisionTree::leaf(2.0),
            DecisionTree::leaf(3.0),
            DecisionTree::leaf(4.0),
        ]));
        let pred = model.predict_with_distribution(&array![[0.0]]).unwrap();

        assert_eq!(pred.distribution, array![[1.0], [2.0], [3.0], [4.0]]);
        // Main path is the ensemble mean, untouched by the distribution.
        assert!((pred.main[0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn staged_main_uses_full_ensemble_not_distribution_sum() {
        let model = Model::Staged(AdditiveStaged::new(
            5.0,
            0.5,
            vec![DecisionTree::leaf(1.0), DecisionTree::leaf(3.0)],
        ));
        let pred = model.predict_with_distribution(&array![[0.0]]).unwrap();

        assert!((pred.main[0] - 7.0).abs() < 1e-12);
        let dist_sum: f64 = pred.distribution.column(0).sum();
        assert!((dist_sum - 4.0).abs() < 1e-12);
        assert!((pred.main[0] - dist_sum).abs() > 1.0);
    }

    #[test]
    fn contribution_distribution_converges_on_main() {
        let model = Model::Contribution(AdditiveContribution::new(
            0.0,
            vec![
                DecisionTree::stump(0, 0.0, -2.0, 2.0),
                DecisionTree::leaf(0.5),
            ],
        ));
        let x = array![[1.0], [-1.0]];
        let pred = model.predict_with_distribution(&x).unwrap();

        for s in 0..x.nrows() {
            let last = pred.distribution[(pred.distribution.nrows() - 1, s)];
            let rel = (last - pred.main[s]).abs() / pred.main[s].abs().max(1.0);
            assert!(rel < 1e-4);
        }
    }

    #[test]
    fn recurrent_has_no_distribution() {
        let model = Model::Recurrent(
            RecurrentSequence::new(
                array![[1.0]],
                array![[0.0]],
                array![0.0],
                array![[1.0]],
                array![0.0],
                1,
                1,
            )
            .unwrap(),
        );
        assert!(model.predict_with_distribution(&array![[0.0]]).is_err());
    }
}
