//! Isolation forest density scorer.
//!
//! An ensemble of random recursive partitions. Points that are isolated
//! after few splits sit in sparse regions and are anomalous.
//!
//! Sign convention: `score_samples` returns the negated anomaly score,
//! so LOWER means MORE anomalous. `decision_function` subtracts the
//! contamination cut, making suspects exactly the negative values.

use crate::{rng::LabRng, stats};

const EULER_GAMMA: f64 = 0.577_215_664_9;

#[derive(Debug, Clone)]
pub enum IsolationTree {
    Internal {
        feature: usize,
        threshold: f64,
        /// values < threshold
        left: Box<IsolationTree>,
        /// values >= threshold
        right: Box<IsolationTree>,
    },
    External {
        size: usize,
    },
}

impl IsolationTree {
    pub fn build(
        x: &[Vec<f64>],
        indices: &[usize],
        height: usize,
        max_height: usize,
        rng: &mut LabRng,
    ) -> Self {
        let n_samples = indices.len();
        if height >= max_height || n_samples <= 1 {
            return IsolationTree::External { size: n_samples };
        }

        // Only features that still vary inside this node can split it.
        let n_features = x[indices[0]].len();
        let varying: Vec<(usize, f64, f64)> = (0..n_features)
            .filter_map(|feature| {
                let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(x[i][feature]), hi.max(x[i][feature]))
                });
                ((hi - lo).abs() >= 1e-10).then_some((feature, lo, hi))
            })
            .collect();
        if varying.is_empty() {
            return IsolationTree::External { size: n_samples };
        }
        let (feature, min_val, max_val) = varying[rng.below(varying.len())];

        let threshold = rng.uniform(min_val, max_val);
        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[i][feature] < threshold);

        if left_indices.is_empty() || right_indices.is_empty() {
            return IsolationTree::External { size: n_samples };
        }

        let left = Box::new(Self::build(x, &left_indices, height + 1, max_height, rng));
        let right = Box::new(Self::build(x, &right_indices, height + 1, max_height, rng));
        IsolationTree::Internal {
            feature,
            threshold,
            left,
            right,
        }
    }

    pub fn path_length(&self, sample: &[f64], current_height: usize) -> f64 {
        match self {
            IsolationTree::External { size } => current_height as f64 + average_path_length(*size),
            IsolationTree::Internal {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] < *threshold {
                    left.path_length(sample, current_height + 1)
                } else {
                    right.path_length(sample, current_height + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over n points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n_f = n as f64;
            2.0 * ((n_f - 1.0).ln() + EULER_GAMMA) - 2.0 * (n_f - 1.0) / n_f
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    contamination: f64,
    trees: Vec<IsolationTree>,
    samples_per_tree: usize,
    offset: f64,
}

impl IsolationForest {
    pub fn new(n_estimators: usize, max_samples: usize, contamination: f64) -> Self {
        Self {
            n_estimators: n_estimators.max(1),
            max_samples: max_samples.max(1),
            contamination: contamination.clamp(0.0, 0.5),
            trees: Vec::new(),
            samples_per_tree: 0,
            offset: 0.0,
        }
    }

    /// Build the ensemble and place the contamination cut.
    /// Each tree sees a subsample drawn without replacement.
    pub fn fit(&mut self, x: &[Vec<f64>], rng: &mut LabRng) {
        let n_samples = x.len();
        if n_samples == 0 {
            return;
        }
        let samples_per_tree = self.max_samples.min(n_samples);
        let max_height = (samples_per_tree as f64).log2().ceil() as usize;

        let mut pool: Vec<usize> = (0..n_samples).collect();
        self.trees = (0..self.n_estimators)
            .map(|_| {
                // Partial Fisher-Yates: the first `samples_per_tree` slots.
                for i in 0..samples_per_tree {
                    let j = i + rng.below(n_samples - i);
                    pool.swap(i, j);
                }
                IsolationTree::build(x, &pool[..samples_per_tree], 0, max_height, rng)
            })
            .collect();
        self.samples_per_tree = samples_per_tree;

        let scores = self.score_samples(x);
        self.offset = stats::quantile(&scores, self.contamination);
        log::debug!(
            "isolation forest: {} trees over {samples_per_tree} samples, cut at {:.4}",
            self.trees.len(),
            self.offset
        );
    }

    /// Negated anomaly score in [-1, 0). Lower is more anomalous.
    pub fn score_samples(&self, x: &[Vec<f64>]) -> Vec<f64> {
        if self.trees.is_empty() {
            return vec![0.0; x.len()];
        }
        let c_n = match average_path_length(self.samples_per_tree) {
            c if c > 0.0 => c,
            _ => 1.0,
        };
        x.iter()
            .map(|sample| {
                let avg_path = self
                    .trees
                    .iter()
                    .map(|tree| tree.path_length(sample, 0))
                    .sum::<f64>()
                    / self.trees.len() as f64;
                -(2.0_f64.powf(-avg_path / c_n))
            })
            .collect()
    }

    /// `score_samples - offset`. Negative ⇒ suspect.
    pub fn decision_function(&self, x: &[Vec<f64>]) -> Vec<f64> {
        self.score_samples(x).into_iter().map(|s| s - self.offset).collect()
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RngBank, StreamSlot};

    fn cluster_with_outliers() -> Vec<Vec<f64>> {
        let mut x: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![(i % 10) as f64 * 0.1, ((i % 10) + 1) as f64 * 0.1])
            .collect();
        x.push(vec![100.0, 100.0]);
        x.push(vec![-50.0, -50.0]);
        x
    }

    #[test]
    fn outliers_score_lower() {
        let x = cluster_with_outliers();
        let mut rng = RngBank::new(42).for_stream(StreamSlot::Forest);
        let mut forest = IsolationForest::new(100, 256, 0.05);
        forest.fit(&x, &mut rng);

        let scores = forest.score_samples(&x);
        assert!(scores[50] < scores[0], "Far point should be more anomalous");
        assert!(scores[51] < scores[0], "Far point should be more anomalous");

        let decision = forest.decision_function(&x);
        assert!(decision[50] < 0.0 && decision[51] < 0.0);
    }

    #[test]
    fn contamination_bounds_the_suspect_share() {
        let x = cluster_with_outliers();
        let mut rng = RngBank::new(9).for_stream(StreamSlot::Forest);
        let mut forest = IsolationForest::new(50, 256, 0.2);
        forest.fit(&x, &mut rng);
        let suspects = forest.decision_function(&x).iter().filter(|d| **d < 0.0).count();
        assert!(suspects <= (0.2 * x.len() as f64).ceil() as usize);
    }

    #[test]
    fn identical_points_do_not_panic() {
        let x = vec![vec![1.0, 1.0]; 8];
        let mut rng = RngBank::new(1).for_stream(StreamSlot::Forest);
        let mut forest = IsolationForest::new(10, 256, 0.1);
        forest.fit(&x, &mut rng);
        let scores = forest.score_samples(&x);
        assert!(scores.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn constant_feature_never_ends_a_split() {
        // Column 0 is constant everywhere; every tree must still split on column 1.
        let x: Vec<Vec<f64>> = (0..32).map(|i| vec![0.0, i as f64]).collect();
        let indices: Vec<usize> = (0..x.len()).collect();
        let mut rng = RngBank::new(5).for_stream(StreamSlot::Forest);
        for _ in 0..50 {
            match IsolationTree::build(&x, &indices, 0, 5, &mut rng) {
                IsolationTree::Internal { feature, .. } => assert_eq!(feature, 1),
                IsolationTree::External { size } => panic!("Root became a leaf of {size}"),
            }
        }
    }

    #[test]
    fn path_length_constants() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }
}
