//! Per-entity feature extraction.
//!
//! The record stream is grouped into an entity → records map, then each
//! group maps to exactly one FeatureVector. Nothing is shared between
//! groups. Hidden labels are copied onto the row for post-hoc scoring
//! only; no feature reads them.

use crate::{
    config::DetectionConfig,
    error::{LabError, LabResult},
    stats,
    synth::Record,
    types::{AnomalyType, EntityId, PeriodIndex},
};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Mean,
    StdDev,
    Max,
    Min,
    Total,
    WeekdayRatio,
    CoeffVariation,
    RoundPct,
    TrendSlope,
    LowDeviationPct,
    AvgZScore,
    DaysAboveZ2,
}

impl FeatureKind {
    /// Columns the three detectors consume unless configured otherwise.
    pub const DEFAULT_DETECTION: [FeatureKind; 6] = [
        FeatureKind::Mean,
        FeatureKind::WeekdayRatio,
        FeatureKind::CoeffVariation,
        FeatureKind::RoundPct,
        FeatureKind::TrendSlope,
        FeatureKind::LowDeviationPct,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mean            => "mean",
            Self::StdDev          => "std_dev",
            Self::Max             => "max",
            Self::Min             => "min",
            Self::Total           => "total",
            Self::WeekdayRatio    => "weekday_ratio",
            Self::CoeffVariation  => "coeff_variation",
            Self::RoundPct        => "round_pct",
            Self::TrendSlope      => "trend_slope",
            Self::LowDeviationPct => "low_deviation_pct",
            Self::AvgZScore       => "avg_z_score",
            Self::DaysAboveZ2     => "days_above_z2",
        }
    }
}

/// One row per entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub entity_id: EntityId,
    pub category: String,
    pub observations: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub max: f64,
    pub min: f64,
    pub total: f64,
    /// Mean on the focus weekday divided by mean on all other days.
    pub weekday_ratio: f64,
    pub coeff_variation: f64,
    /// Fraction of values with no fractional part.
    pub round_pct: f64,
    /// Slope of per-period means against period index.
    pub trend_slope: f64,
    /// Fraction of observations with |z| below the configured cut.
    pub low_deviation_pct: f64,
    pub avg_z_score: f64,
    pub days_above_z2: usize,
    pub is_anomalous: bool,
    pub anomaly_type: Option<AnomalyType>,
}

impl FeatureVector {
    pub fn get(&self, kind: FeatureKind) -> f64 {
        match kind {
            FeatureKind::Mean            => self.mean,
            FeatureKind::StdDev          => self.std_dev,
            FeatureKind::Max             => self.max,
            FeatureKind::Min             => self.min,
            FeatureKind::Total           => self.total,
            FeatureKind::WeekdayRatio    => self.weekday_ratio,
            FeatureKind::CoeffVariation  => self.coeff_variation,
            FeatureKind::RoundPct        => self.round_pct,
            FeatureKind::TrendSlope      => self.trend_slope,
            FeatureKind::LowDeviationPct => self.low_deviation_pct,
            FeatureKind::AvgZScore       => self.avg_z_score,
            FeatureKind::DaysAboveZ2     => self.days_above_z2 as f64,
        }
    }
}

/// Row-major matrix of the selected columns, one row per feature vector.
pub fn feature_matrix(rows: &[FeatureVector], kinds: &[FeatureKind]) -> Vec<Vec<f64>> {
    rows.iter()
        .map(|r| kinds.iter().map(|k| r.get(*k)).collect())
        .collect()
}

/// Per entity, per period aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodSummary {
    pub entity_id: EntityId,
    pub period_index: PeriodIndex,
    pub period_label: String,
    pub mean: f64,
    pub std_dev: f64,
    pub total: f64,
    pub days: usize,
}

/// Per-record context statistics, aligned with the input record slice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RecordStats {
    /// Against the entity's own mean and std; 0.0 when the entity has no spread.
    pub z_score: f64,
    /// Percentile rank of the value within its category.
    pub category_percentile: f64,
}

pub struct FeatureExtractor {
    ratio_weekday: Weekday,
    low_deviation_z: f64,
}

impl FeatureExtractor {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            ratio_weekday: config.ratio_weekday,
            low_deviation_z: config.low_deviation_z,
        }
    }

    /// Group the stream by entity and compute one row per entity,
    /// ordered by entity id.
    pub fn extract(&self, records: &[Record]) -> LabResult<Vec<FeatureVector>> {
        let groups = group_by_entity(records);
        if groups.is_empty() {
            return Err(LabError::EmptyPopulation);
        }
        let rows: Vec<FeatureVector> = groups
            .into_iter()
            .map(|(entity_id, group)| self.entity_row(entity_id, &group))
            .collect();
        log::info!("Extracted features for {} entities", rows.len());
        Ok(rows)
    }

    fn entity_row(&self, entity_id: EntityId, group: &[&Record]) -> FeatureVector {
        let values: Vec<f64> = group.iter().map(|r| r.value).collect();
        let mean = stats::mean(&values);
        let std_dev = stats::sample_std(&values);

        let (focus, rest): (Vec<f64>, Vec<f64>) = {
            let (f, r): (Vec<&&Record>, Vec<&&Record>) =
                group.iter().partition(|r| r.day_of_week == self.ratio_weekday);
            (f.iter().map(|r| r.value).collect(), r.iter().map(|r| r.value).collect())
        };
        let rest_mean = stats::mean(&rest);
        let weekday_ratio = if focus.is_empty() || rest.is_empty() || rest_mean == 0.0 {
            1.0
        } else {
            stats::mean(&focus) / rest_mean
        };

        let coeff_variation = if mean == 0.0 { 0.0 } else { std_dev / mean };

        let round_count = values.iter().filter(|v| v.fract() == 0.0).count();

        let mut per_period: BTreeMap<PeriodIndex, Vec<f64>> = BTreeMap::new();
        for r in group {
            per_period.entry(r.period_index).or_default().push(r.value);
        }
        let xs: Vec<f64> = per_period.keys().map(|k| *k as f64).collect();
        let ys: Vec<f64> = per_period.values().map(|v| stats::mean(v)).collect();
        let trend_slope = stats::linear_slope(&xs, &ys);

        let z: Vec<f64> = values.iter().map(|v| z_score(*v, mean, std_dev)).collect();
        let low_dev = z.iter().filter(|z| z.abs() < self.low_deviation_z).count();
        let days_above_z2 = z.iter().filter(|z| **z > 2.0).count();

        let n = values.len() as f64;
        let first = group[0];
        FeatureVector {
            entity_id,
            category: first.category.clone(),
            observations: values.len(),
            mean,
            std_dev,
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            total: values.iter().sum(),
            weekday_ratio,
            coeff_variation,
            round_pct: round_count as f64 / n,
            trend_slope,
            low_deviation_pct: low_dev as f64 / n,
            avg_z_score: stats::mean(&z),
            days_above_z2,
            is_anomalous: first.is_anomalous,
            anomaly_type: first.anomaly_type,
        }
    }
}

/// Entity id → that entity's records, in stream order.
pub fn group_by_entity(records: &[Record]) -> BTreeMap<EntityId, Vec<&Record>> {
    let mut groups: BTreeMap<EntityId, Vec<&Record>> = BTreeMap::new();
    for r in records {
        groups.entry(r.entity_id.clone()).or_default().push(r);
    }
    groups
}

pub fn period_summaries(records: &[Record]) -> Vec<PeriodSummary> {
    let mut groups: BTreeMap<(EntityId, PeriodIndex), Vec<&Record>> = BTreeMap::new();
    for r in records {
        groups.entry((r.entity_id.clone(), r.period_index)).or_default().push(r);
    }
    groups
        .into_iter()
        .map(|((entity_id, period_index), group)| {
            let values: Vec<f64> = group.iter().map(|r| r.value).collect();
            PeriodSummary {
                entity_id,
                period_index,
                period_label: group[0].period_label.clone(),
                mean: stats::mean(&values),
                std_dev: stats::sample_std(&values),
                total: values.iter().sum(),
                days: values.len(),
            }
        })
        .collect()
}

pub fn record_stats(records: &[Record]) -> Vec<RecordStats> {
    let entity_moments: BTreeMap<EntityId, (f64, f64)> = group_by_entity(records)
        .into_iter()
        .map(|(entity_id, group)| {
            let values: Vec<f64> = group.iter().map(|r| r.value).collect();
            (entity_id, (stats::mean(&values), stats::sample_std(&values)))
        })
        .collect();

    let mut by_category: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, r) in records.iter().enumerate() {
        by_category.entry(r.category.as_str()).or_default().push(i);
    }
    let mut percentile = vec![0.0; records.len()];
    for indices in by_category.values() {
        let values: Vec<f64> = indices.iter().map(|&i| records[i].value).collect();
        for (&i, rank) in indices.iter().zip(stats::percentile_ranks(&values)) {
            percentile[i] = rank;
        }
    }

    records
        .iter()
        .zip(percentile)
        .map(|(r, category_percentile)| {
            let (m, sd) = entity_moments[&r.entity_id];
            RecordStats {
                z_score: z_score(r.value, m, sd),
                category_percentile,
            }
        })
        .collect()
}

fn z_score(value: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev == 0.0 {
        0.0
    } else {
        (value - mean) / std_dev
    }
}
