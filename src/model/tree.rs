use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// One node of a flat regression tree. Children are indices into the
/// owning tree's node array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree stored as a flat array of nodes with the root
/// at index 0. Immutable after load; the engine only traverses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// A single-leaf tree that predicts a constant. Handy as the smallest
    /// valid fitted estimator.
    pub fn leaf(value: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    /// A depth-one stump: `row[feature] <= threshold` goes left.
    pub fn stump(feature: usize, threshold: f64, left_value: f64, right_value: f64) -> Self {
        Self {
            nodes: vec![
                Node::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                },
                Node::Leaf { value: left_value },
                Node::Leaf { value: right_value },
            ],
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.axis_iter(Axis(0))
            .map(|row| self.predict_row(row))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    #[test]
    fn stump_splits_on_threshold() {
        let tree = DecisionTree::stump(0, 1.5, -1.0, 1.0);
        let x = array![[1.0, 9.0], [1.5, 9.0], [2.0, 9.0]];
        let preds = tree.predict(&x);
        assert_eq!(preds, array![-1.0, -1.0, 1.0]);
    }

    #[test]
    fn leaf_is_constant() {
        let tree = DecisionTree::leaf(3.25);
        let x = array![[0.0], [100.0]];
        assert_eq!(tree.predict(&x), array![3.25, 3.25]);
    }

    #[test]
    fn deeper_tree_routes_through_children() {
        // feature 0 <= 0.0 -> leaf(0.0); else feature 1 <= 5.0 -> 1.0 else 2.0
        let tree = DecisionTree::from_nodes(vec![
            Node::Split {
                feature: 0,
                threshold: 0.0,
                left: 1,
                right: 2,
            },
            Node::Leaf { value: 0.0 },
            Node::Split {
                feature: 1,
                threshold: 5.0,
                left: 3,
                right: 4,
            },
            Node::Leaf { value: 1.0 },
            Node::Leaf { value: 2.0 },
        ]);
        let x = array![[-1.0, 0.0], [1.0, 4.0], [1.0, 6.0]];
        assert_eq!(tree.predict(&x), array![0.0, 1.0, 2.0]);
    }
}
