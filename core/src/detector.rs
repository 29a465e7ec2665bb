//! Detection pipeline: features → {flagger, forest, clusters} → composite.
//!
//! The three detectors consume the same feature table independently;
//! each fits its own scaler. Output rows are ranked by composite score,
//! highest first, ties broken by entity id.

use crate::{
    composite::{cluster_anomaly_rates, CompositeScorer},
    config::DetectionConfig,
    error::{LabError, LabResult},
    features::{feature_matrix, FeatureExtractor, FeatureKind, FeatureVector},
    flagger::{FeatureFence, OutlierFlagger},
    isolation::IsolationForest,
    kmeans::KMeans,
    rng::{RngBank, StreamSlot},
    scaler::StandardScaler,
    synth::Record,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of the final per-entity table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredEntity {
    #[serde(flatten)]
    pub features: FeatureVector,
    pub flagged_features: Vec<FeatureKind>,
    pub flag_count: usize,
    pub flag_suspect: bool,
    /// Isolation score; lower is more anomalous.
    pub density_score: f64,
    pub density_suspect: bool,
    pub cluster: usize,
    pub flag_signal: f64,
    pub density_signal: f64,
    pub cluster_signal: f64,
    pub composite: f64,
    pub rank: usize,
}

impl ScoredEntity {
    pub fn entity_id(&self) -> &str {
        &self.features.entity_id
    }

    pub fn is_anomalous(&self) -> bool {
        self.features.is_anomalous
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionReport {
    /// Ranked by composite, descending.
    pub rows: Vec<ScoredEntity>,
    pub fences: Vec<FeatureFence>,
    pub forest_offset: f64,
    pub kmeans_inertia: f64,
    /// Label-derived anomaly rate per cluster, for post-hoc explanation.
    pub cluster_rates: BTreeMap<usize, f64>,
}

impl DetectionReport {
    pub fn top(&self, k: usize) -> &[ScoredEntity] {
        &self.rows[..k.min(self.rows.len())]
    }

    pub fn get(&self, entity_id: &str) -> Option<&ScoredEntity> {
        self.rows.iter().find(|r| r.entity_id() == entity_id)
    }
}

pub struct Detector<'a> {
    config: &'a DetectionConfig,
    bank: RngBank,
}

impl<'a> Detector<'a> {
    pub fn new(config: &'a DetectionConfig, bank: RngBank) -> Self {
        Self { config, bank }
    }

    pub fn run(&self, records: &[Record]) -> LabResult<DetectionReport> {
        let rows = FeatureExtractor::new(self.config).extract(records)?;
        self.score(rows)
    }

    /// Score an already extracted feature table.
    pub fn score(&self, rows: Vec<FeatureVector>) -> LabResult<DetectionReport> {
        let cfg = self.config;
        if rows.is_empty() {
            return Err(LabError::EmptyPopulation);
        }
        if cfg.n_clusters == 0 {
            return Err(LabError::InvalidParameter {
                name: "detection.n_clusters",
                reason: "clustering needs at least one cluster".into(),
            });
        }
        if cfg.n_clusters > rows.len() {
            return Err(LabError::TooManyClusters {
                clusters: cfg.n_clusters,
                entities: rows.len(),
            });
        }

        // Univariate rule on raw feature values.
        let flag_result = OutlierFlagger::new(cfg.features.clone(), cfg.iqr_multiplier, cfg.suspect_flag_threshold)
            .flag(&rows);

        let matrix = feature_matrix(&rows, &cfg.features);

        // Density scorer, own scaler.
        let x_forest = StandardScaler::fit_transform(&matrix);
        let mut forest = IsolationForest::new(cfg.n_estimators, cfg.max_samples, cfg.contamination);
        forest.fit(&x_forest, &mut self.bank.for_stream(StreamSlot::Forest));
        let density_scores = forest.score_samples(&x_forest);
        let density_decision = forest.decision_function(&x_forest);

        // Clustering, own scaler.
        let x_cluster = StandardScaler::fit_transform(&matrix);
        let clustering = KMeans::new(cfg.n_clusters)
            .with_n_init(cfg.n_init)
            .with_max_iter(cfg.max_iter)
            .with_tol(cfg.tolerance)
            .fit(&x_cluster, &mut self.bank.for_stream(StreamSlot::Cluster));

        let labels: Vec<bool> = rows.iter().map(|r| r.is_anomalous).collect();
        let cluster_rates = cluster_anomaly_rates(&clustering.labels, &labels);
        let signals = CompositeScorer::new(cfg.weights, cfg.cluster_signal).score(
            &flag_result.flag_counts,
            &density_scores,
            &clustering.labels,
            &labels,
        );

        let mut scored: Vec<ScoredEntity> = rows
            .into_iter()
            .enumerate()
            .map(|(i, features)| ScoredEntity {
                features,
                flagged_features: flag_result.fences
                    .iter()
                    .zip(&flag_result.flags[i])
                    .filter(|(_, flagged)| **flagged)
                    .map(|(fence, _)| fence.kind)
                    .collect(),
                flag_count: flag_result.flag_counts[i],
                flag_suspect: flag_result.suspects[i],
                density_score: density_scores[i],
                density_suspect: density_decision[i] < 0.0,
                cluster: clustering.labels[i],
                flag_signal: signals[i].flag,
                density_signal: signals[i].density,
                cluster_signal: signals[i].cluster,
                composite: signals[i].composite,
                rank: 0,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.composite
                .total_cmp(&a.composite)
                .then_with(|| a.entity_id().cmp(b.entity_id()))
        });
        for (i, row) in scored.iter_mut().enumerate() {
            row.rank = i + 1;
        }

        log::info!(
            "Detection: {} flag suspects, {} density suspects, {} clusters (inertia {:.3})",
            scored.iter().filter(|r| r.flag_suspect).count(),
            scored.iter().filter(|r| r.density_suspect).count(),
            cfg.n_clusters,
            clustering.inertia
        );

        Ok(DetectionReport {
            rows: scored,
            fences: flag_result.fences,
            forest_offset: forest.offset(),
            kmeans_inertia: clustering.inertia,
            cluster_rates,
        })
    }
}
