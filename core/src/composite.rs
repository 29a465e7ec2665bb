//! Composite risk scorer.
//!
//! Three signals, each normalised to [0, 1], blended with fixed weights:
//!   flag    = flag_count / max(flag_count)
//!   density = 1 - (score - min) / (max - min)     (lower score = more anomalous)
//!   cluster = anomaly rate of the entity's cluster (label-aware)
//!           | 1 - cluster_size / population       (label-free)
//!
//! The label-aware cluster term is computed from hidden ground truth.
//! That makes the default composite a partly supervised ranking; it is
//! an explanatory signal, not a detector. Use ClusterSignal::LabelFree
//! for a ranking that never sees labels.

use crate::config::{ClusterSignal, CompositeWeights};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalScores {
    pub flag: f64,
    pub density: f64,
    pub cluster: f64,
    pub composite: f64,
}

pub struct CompositeScorer {
    weights: CompositeWeights,
    cluster_signal: ClusterSignal,
}

impl CompositeScorer {
    pub fn new(weights: CompositeWeights, cluster_signal: ClusterSignal) -> Self {
        Self {
            weights,
            cluster_signal,
        }
    }

    /// Inputs are aligned per entity. `labels` is only read in
    /// label-aware mode.
    pub fn score(
        &self,
        flag_counts: &[usize],
        density_scores: &[f64],
        clusters: &[usize],
        labels: &[bool],
    ) -> Vec<SignalScores> {
        let flag = normalize_flags(flag_counts);
        let density = normalize_density(density_scores);
        let cluster = match self.cluster_signal {
            ClusterSignal::LabelAware => {
                let rates = cluster_anomaly_rates(clusters, labels);
                clusters.iter().map(|c| rates[c]).collect()
            }
            ClusterSignal::LabelFree => cluster_rarity(clusters),
        };

        flag.into_iter()
            .zip(density)
            .zip(cluster)
            .map(|((f, d), c)| {
                let composite = self.weights.flag * f + self.weights.density * d + self.weights.cluster * c;
                SignalScores {
                    flag: f,
                    density: d,
                    cluster: c,
                    // Weights sum to 1 within tolerance; keep float drift out.
                    composite: composite.clamp(0.0, 1.0),
                }
            })
            .collect()
    }
}

/// 0.0 for everyone when nobody has a flag.
pub fn normalize_flags(flag_counts: &[usize]) -> Vec<f64> {
    let max = flag_counts.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return vec![0.0; flag_counts.len()];
    }
    flag_counts.iter().map(|c| *c as f64 / max as f64).collect()
}

/// Min-max, inverted. 0.0 for everyone when the scores have no spread.
pub fn normalize_density(scores: &[f64]) -> Vec<f64> {
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !(range > 0.0) {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| 1.0 - (s - min) / range).collect()
}

/// Fraction of labelled-anomalous members per cluster.
pub fn cluster_anomaly_rates(clusters: &[usize], labels: &[bool]) -> BTreeMap<usize, f64> {
    let mut tally: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
    for (c, is_anomalous) in clusters.iter().zip(labels) {
        let entry = tally.entry(*c).or_default();
        entry.0 += usize::from(*is_anomalous);
        entry.1 += 1;
    }
    tally
        .into_iter()
        .map(|(c, (hits, size))| (c, hits as f64 / size as f64))
        .collect()
}

pub fn cluster_rarity(clusters: &[usize]) -> Vec<f64> {
    let n = clusters.len() as f64;
    let mut sizes: BTreeMap<usize, usize> = BTreeMap::new();
    for c in clusters {
        *sizes.entry(*c).or_default() += 1;
    }
    clusters.iter().map(|c| 1.0 - sizes[c] as f64 / n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flags_anywhere_normalises_to_zero() {
        assert_eq!(normalize_flags(&[0, 0, 0]), vec![0.0, 0.0, 0.0]);
        assert_eq!(normalize_flags(&[0, 2, 4]), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn flat_density_normalises_to_zero() {
        assert_eq!(normalize_density(&[-0.4, -0.4]), vec![0.0, 0.0]);
        let d = normalize_density(&[-0.6, -0.5, -0.4]);
        assert!((d[0] - 1.0).abs() < 1e-12 && d[2].abs() < 1e-12);
    }

    #[test]
    fn cluster_rates_use_labels() {
        let rates = cluster_anomaly_rates(&[0, 0, 1, 1, 1, 1], &[true, false, false, false, false, true]);
        assert_eq!(rates[&0], 0.5);
        assert_eq!(rates[&1], 0.25);
    }

    #[test]
    fn label_free_mode_ignores_labels() {
        let scorer = CompositeScorer::new(CompositeWeights::default(), ClusterSignal::LabelFree);
        let clusters = [0, 0, 0, 1];
        let a = scorer.score(&[0, 1, 2, 3], &[-0.4, -0.5, -0.45, -0.7], &clusters, &[false; 4]);
        let b = scorer.score(&[0, 1, 2, 3], &[-0.4, -0.5, -0.45, -0.7], &clusters, &[true; 4]);
        assert_eq!(a, b);
        assert_eq!(a[3].cluster, 0.75);
    }

    #[test]
    fn composite_stays_in_unit_interval() {
        let scorer = CompositeScorer::new(CompositeWeights::default(), ClusterSignal::LabelAware);
        let scores = scorer.score(&[6, 6], &[-0.9, -0.9], &[0, 0], &[true, true]);
        for s in scores {
            assert!((0.0..=1.0).contains(&s.composite), "composite {}", s.composite);
        }
    }
}
