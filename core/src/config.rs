use crate::{
    error::{LabError, LabResult},
    features::FeatureKind,
    types::AnomalyType,
};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Tolerance on the composite weight sum.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ── Population ─────────────────────────────────────────────────────

/// Baseline behaviour for one category (department).
///
/// Baseline draws are truncated to `[clip_min, clip_max]`. Anomaly
/// transforms may push values past that window but are clipped into
/// `[plausible_min, plausible_max]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryProfile {
    pub name: String,
    pub center: f64,
    pub spread: f64,
    pub clip_min: f64,
    pub clip_max: f64,
    pub plausible_min: f64,
    pub plausible_max: f64,
}

impl CategoryProfile {
    pub fn contains_baseline(&self, value: f64) -> bool {
        (self.clip_min..=self.clip_max).contains(&value)
    }

    pub fn contains_plausible(&self, value: f64) -> bool {
        (self.plausible_min..=self.plausible_max).contains(&value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HorizonConfig {
    pub year: i32,
    pub start_month: u32,
    pub months: u32,
    /// When set, replaces the monthly periods with one window of business days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_days: Option<BusinessDayWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessDayWindow {
    pub start: NaiveDate,
    pub days: usize,
}

// ── Anomaly patterns ───────────────────────────────────────────────

/// What burst padding does with the burst mask it draws.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BurstMode {
    /// Inflate the masked time steps.
    Inflate,
    /// Draw the mask and amounts, then leave the baseline untouched.
    Discard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternParams {
    /// Types assigned round-robin to the anomalous ordinals.
    #[serde(default = "default_anomaly_types")]
    pub types: Vec<AnomalyType>,
    pub padding_min: f64,
    pub padding_max: f64,
    pub inflation_weekday: Weekday,
    pub inflation_min: f64,
    pub inflation_max: f64,
    pub round_values: Vec<f64>,
    pub drift_per_period: f64,
    pub burst_probability: f64,
    pub burst_min: f64,
    pub burst_max: f64,
    pub burst_mode: BurstMode,
}

impl Default for PatternParams {
    fn default() -> Self {
        Self {
            types: default_anomaly_types(),
            padding_min: 1.0,
            padding_max: 2.0,
            inflation_weekday: Weekday::Fri,
            inflation_min: 2.0,
            inflation_max: 4.0,
            round_values: vec![8.0, 9.0, 10.0],
            drift_per_period: 0.5,
            burst_probability: 0.2,
            burst_min: 3.0,
            burst_max: 5.0,
            burst_mode: BurstMode::Inflate,
        }
    }
}

fn default_anomaly_types() -> Vec<AnomalyType> {
    AnomalyType::ALL.to_vec()
}

// ── Detection ──────────────────────────────────────────────────────

/// Source of the cluster term in the composite score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClusterSignal {
    /// Anomaly rate of the entity's cluster, computed from hidden labels.
    /// Not unsupervised: ground truth leaks into the ranking through this term.
    LabelAware,
    /// `1 - cluster_size / population`, no labels involved.
    LabelFree,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CompositeWeights {
    pub flag: f64,
    pub density: f64,
    pub cluster: f64,
}

impl CompositeWeights {
    /// Rescale arbitrary non-negative weights so they sum to 1.
    pub fn normalized(flag: f64, density: f64, cluster: f64) -> Self {
        let sum = flag + density + cluster;
        Self {
            flag: flag / sum,
            density: density / sum,
            cluster: cluster / sum,
        }
    }

    pub fn sum(&self) -> f64 {
        self.flag + self.density + self.cluster
    }
}

impl Default for CompositeWeights {
    /// The lab's 0.35 / 0.45 / 0.25 blend. Those add up to 1.05, so they
    /// are rescaled here to keep the composite inside [0, 1].
    fn default() -> Self {
        Self::normalized(0.35, 0.45, 0.25)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionConfig {
    pub features: Vec<FeatureKind>,
    pub ratio_weekday: Weekday,
    pub low_deviation_z: f64,
    pub iqr_multiplier: f64,
    pub suspect_flag_threshold: usize,
    pub contamination: f64,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub n_clusters: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub tolerance: f64,
    #[serde(default)]
    pub weights: CompositeWeights,
    pub cluster_signal: ClusterSignal,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            features: FeatureKind::DEFAULT_DETECTION.to_vec(),
            ratio_weekday: Weekday::Fri,
            low_deviation_z: 2.0,
            iqr_multiplier: 1.5,
            suspect_flag_threshold: 2,
            contamination: 0.2,
            n_estimators: 100,
            max_samples: 256,
            n_clusters: 4,
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
            weights: CompositeWeights::default(),
            cluster_signal: ClusterSignal::LabelAware,
        }
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabConfig {
    pub seed: u64,
    pub entity_count: usize,
    pub anomaly_fraction: f64,
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
    pub horizon: HorizonConfig,
    pub categories: Vec<CategoryProfile>,
    #[serde(default)]
    pub patterns: PatternParams,
    #[serde(default)]
    pub detection: DetectionConfig,
}

fn default_id_prefix() -> String {
    "EMP".into()
}

impl LabConfig {
    /// Load from a JSON file and validate.
    /// In tests, use LabConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LabConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// The reference timesheet population: 50 employees over the
    /// business days of January–June 2024, five departments.
    pub fn default_lab() -> Self {
        let dept = |name: &str, center: f64, spread: f64| CategoryProfile {
            name: name.into(),
            center,
            spread,
            clip_min: 4.0,
            clip_max: 12.0,
            plausible_min: 4.0,
            plausible_max: 16.0,
        };

        Self {
            seed: 42,
            entity_count: 50,
            anomaly_fraction: 0.2,
            id_prefix: default_id_prefix(),
            horizon: HorizonConfig {
                year: 2024,
                start_month: 1,
                months: 6,
                business_days: None,
            },
            categories: vec![
                dept("Engineering", 8.2, 0.8),
                dept("Sales", 7.8, 1.0),
                dept("Marketing", 7.5, 0.7),
                dept("Finance", 8.0, 0.6),
                dept("Operations", 8.5, 0.9),
            ],
            patterns: PatternParams::default(),
            detection: DetectionConfig::default(),
        }
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default_lab()
        }
    }

    pub fn category(&self, name: &str) -> LabResult<&CategoryProfile> {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| LabError::UnknownCategory {
                category: name.to_string(),
            })
    }

    /// Reject anything that would make generation or detection
    /// meaningless. Called before any random draw is made.
    pub fn validate(&self) -> LabResult<()> {
        if self.categories.is_empty() {
            return Err(LabError::EmptyCategories);
        }
        if self.entity_count == 0 {
            return Err(invalid("entity_count", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.anomaly_fraction) {
            return Err(invalid(
                "anomaly_fraction",
                format!("{} is outside [0, 1]", self.anomaly_fraction),
            ));
        }
        if self.horizon.months == 0 {
            return Err(invalid("horizon.months", "must be at least 1"));
        }
        if !(1..=12).contains(&self.horizon.start_month) {
            return Err(invalid(
                "horizon.start_month",
                format!("{} is not a month", self.horizon.start_month),
            ));
        }
        if self.horizon.business_days.as_ref().is_some_and(|w| w.days == 0) {
            return Err(invalid("horizon.business_days", "window needs at least one day"));
        }

        for cat in &self.categories {
            let ordered = cat.plausible_min <= cat.clip_min
                && cat.clip_min < cat.clip_max
                && cat.clip_max <= cat.plausible_max;
            if !ordered || !cat.center.is_finite() {
                return Err(invalid(
                    "categories",
                    format!("'{}' needs plausible_min <= clip_min < clip_max <= plausible_max", cat.name),
                ));
            }
            if !(cat.spread >= 0.0) {
                return Err(invalid(
                    "categories",
                    format!("'{}' has negative spread", cat.name),
                ));
            }
        }

        self.validate_patterns()?;
        self.validate_detection()
    }

    fn validate_patterns(&self) -> LabResult<()> {
        let p = &self.patterns;
        if p.types.is_empty() && self.anomaly_fraction > 0.0 {
            return Err(invalid("patterns.types", "must not be empty when anomaly_fraction > 0"));
        }
        let ranges = [
            ("patterns.padding", p.padding_min, p.padding_max),
            ("patterns.inflation", p.inflation_min, p.inflation_max),
            ("patterns.burst", p.burst_min, p.burst_max),
        ];
        for (name, lo, hi) in ranges {
            if lo > hi {
                return Err(invalid(name, format!("min {lo} exceeds max {hi}")));
            }
        }
        if p.round_values.is_empty() {
            return Err(invalid("patterns.round_values", "must not be empty"));
        }
        if !(0.0..=1.0).contains(&p.burst_probability) {
            return Err(invalid("patterns.burst_probability", "must be within [0, 1]"));
        }
        Ok(())
    }

    fn validate_detection(&self) -> LabResult<()> {
        let d = &self.detection;
        if d.features.is_empty() {
            return Err(invalid("detection.features", "must not be empty"));
        }
        if d.suspect_flag_threshold == 0 {
            return Err(invalid("detection.suspect_flag_threshold", "must be at least 1"));
        }
        if !(d.contamination > 0.0 && d.contamination <= 0.5) {
            return Err(invalid("detection.contamination", "must be within (0, 0.5]"));
        }
        if d.n_estimators == 0 || d.max_samples == 0 {
            return Err(invalid("detection.n_estimators", "forest needs trees and samples"));
        }
        if d.n_clusters == 0 || d.n_init == 0 || d.max_iter == 0 {
            return Err(invalid("detection.n_clusters", "clustering needs k, restarts and iterations"));
        }
        if d.n_clusters > self.entity_count {
            return Err(LabError::TooManyClusters {
                clusters: d.n_clusters,
                entities: self.entity_count,
            });
        }
        d.weights.validate()
    }
}

impl CompositeWeights {
    pub fn validate(&self) -> LabResult<()> {
        let parts = [self.flag, self.density, self.cluster];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid("detection.weights", "weights must be finite and non-negative"));
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(LabError::InvalidWeights { sum });
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> LabError {
    LabError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lab_is_valid() {
        LabConfig::default_lab().validate().unwrap();
    }

    #[test]
    fn default_weights_keep_the_reference_proportions() {
        let w = CompositeWeights::default();
        assert!((w.sum() - 1.0).abs() < 1e-12);
        assert!((w.density / w.flag - 0.45 / 0.35).abs() < 1e-12);
        assert!((w.cluster / w.flag - 0.25 / 0.35).abs() < 1e-12);
    }

    #[test]
    fn raw_reference_weights_are_rejected() {
        let mut config = LabConfig::default_lab();
        config.detection.weights = CompositeWeights {
            flag: 0.35,
            density: 0.45,
            cluster: 0.25,
        };
        match config.validate() {
            Err(LabError::InvalidWeights { sum }) => assert!((sum - 1.05).abs() < 1e-9),
            other => panic!("Expected InvalidWeights, got {other:?}"),
        }
    }

    #[test]
    fn cluster_count_above_population_is_rejected() {
        let mut config = LabConfig::default_lab();
        config.entity_count = 3;
        assert!(matches!(
            config.validate(),
            Err(LabError::TooManyClusters { clusters: 4, entities: 3 })
        ));
    }

    #[test]
    fn empty_category_table_is_rejected() {
        let mut config = LabConfig::default_lab();
        config.categories.clear();
        assert!(matches!(config.validate(), Err(LabError::EmptyCategories)));
    }

    #[test]
    fn empty_type_list_needs_zero_fraction() {
        let mut config = LabConfig::default_lab();
        config.patterns.types.clear();
        assert!(matches!(
            config.validate(),
            Err(LabError::InvalidParameter { name: "patterns.types", .. })
        ));
        config.anomaly_fraction = 0.0;
        config.validate().unwrap();
    }

    #[test]
    fn missing_type_list_defaults_to_all_types() {
        let json = r#"{ "padding_min": 1.0, "padding_max": 2.0, "inflation_weekday": "Fri",
            "inflation_min": 2.0, "inflation_max": 4.0, "round_values": [8.0],
            "drift_per_period": 0.5, "burst_probability": 0.2, "burst_min": 3.0,
            "burst_max": 5.0, "burst_mode": "inflate" }"#;
        let params: PatternParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.types, AnomalyType::ALL.to_vec());
    }

    #[test]
    fn zero_day_window_is_rejected() {
        let mut config = LabConfig::default_lab();
        config.horizon.business_days = Some(BusinessDayWindow {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            days: 0,
        });
        assert!(matches!(
            config.validate(),
            Err(LabError::InvalidParameter { name: "horizon.business_days", .. })
        ));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = LabConfig::default_lab();
        let json = serde_json::to_string(&config).unwrap();
        let back: LabConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
