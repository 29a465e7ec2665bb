//! Behaviour synthesizer.
//!
//! For every period and every entity: draw a truncated-normal baseline
//! from the entity's category profile, then, if the entity is anomalous,
//! transform the whole period vector at once. Several patterns depend on
//! the weekday or the period index, so the transform never works point
//! by point.
//!
//! Draw order: each (entity, period) pair owns two streams, one for the
//! baseline and one for the pattern, both derived from the entity's
//! ordinal. Output is identical no matter what order pairs are visited.

use crate::{
    calendar::{Horizon, Period},
    config::{BurstMode, CategoryProfile, LabConfig, PatternParams},
    error::LabResult,
    rng::{entity_period_unit, LabRng, RngBank, StreamSlot},
    roster::{Entity, Roster},
    types::{AnomalyType, EntityId, PeriodIndex},
};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// One observation of one entity on one business day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub entity_id: EntityId,
    pub period_index: PeriodIndex,
    pub period_label: String,
    pub date: NaiveDate,
    pub day_of_week: Weekday,
    pub category: String,
    pub value: f64,
    pub is_anomalous: bool,
    pub anomaly_type: Option<AnomalyType>,
}

/// Time context handed to an anomaly transform.
#[derive(Debug, Clone, Copy)]
pub struct PatternContext<'a> {
    pub days: &'a [NaiveDate],
    pub period_index: PeriodIndex,
    pub plausible_min: f64,
    pub plausible_max: f64,
}

/// Apply one anomaly pattern to a full period of baseline values.
///
/// Every branch ends by clipping into the plausible range.
pub fn apply_pattern(
    baseline: &[f64],
    ctx: &PatternContext<'_>,
    anomaly: AnomalyType,
    params: &PatternParams,
    rng: &mut LabRng,
) -> Vec<f64> {
    let modified: Vec<f64> = match anomaly {
        AnomalyType::ConstantPadding => baseline
            .iter()
            .map(|v| v + rng.uniform(params.padding_min, params.padding_max))
            .collect(),

        AnomalyType::DayInflation => baseline
            .iter()
            .zip(ctx.days)
            .map(|(v, day)| {
                if day.weekday() == params.inflation_weekday {
                    v + rng.uniform(params.inflation_min, params.inflation_max)
                } else {
                    *v
                }
            })
            .collect(),

        AnomalyType::RoundNumber => baseline
            .iter()
            .map(|_| *rng.choose(&params.round_values))
            .collect(),

        AnomalyType::GradualDrift => {
            let bump = params.drift_per_period * ctx.period_index as f64;
            baseline.iter().map(|v| v + bump).collect()
        }

        AnomalyType::BurstPadding => {
            // Mask and amounts are always drawn so both modes consume
            // the same number of draws.
            let mask: Vec<bool> = baseline
                .iter()
                .map(|_| rng.chance(params.burst_probability))
                .collect();
            let amounts: Vec<f64> = baseline
                .iter()
                .map(|_| rng.uniform(params.burst_min, params.burst_max))
                .collect();
            match params.burst_mode {
                BurstMode::Inflate => baseline
                    .iter()
                    .zip(mask.iter().zip(&amounts))
                    .map(|(v, (burst, amount))| if *burst { v + amount } else { *v })
                    .collect(),
                BurstMode::Discard => baseline.to_vec(),
            }
        }
    };

    modified
        .into_iter()
        .map(|v| v.clamp(ctx.plausible_min, ctx.plausible_max))
        .collect()
}

pub struct Synthesizer<'a> {
    config: &'a LabConfig,
    bank: RngBank,
}

impl<'a> Synthesizer<'a> {
    pub fn new(config: &'a LabConfig, bank: RngBank) -> Self {
        Self { config, bank }
    }

    /// Baseline draws for one entity over one period, rounded to cents.
    pub fn baseline(&self, entity: &Entity, profile: &CategoryProfile, period: &Period) -> Vec<f64> {
        let mut rng = self
            .bank
            .for_unit(StreamSlot::Baseline, entity_period_unit(entity.ordinal, period.index));
        period
            .days
            .iter()
            .map(|_| rng.truncated_normal(profile.center, profile.spread, profile.clip_min, profile.clip_max))
            .collect()
    }

    /// Final observed values for one entity over one period.
    pub fn entity_period(&self, entity: &Entity, period: &Period) -> LabResult<Vec<f64>> {
        let profile = self.config.category(&entity.category)?;
        let baseline = self.baseline(entity, profile, period);

        let (values, lo, hi) = match entity.anomaly_type {
            Some(anomaly) => {
                let mut rng = self
                    .bank
                    .for_unit(StreamSlot::Pattern, entity_period_unit(entity.ordinal, period.index));
                let ctx = PatternContext {
                    days: &period.days,
                    period_index: period.index,
                    plausible_min: profile.plausible_min,
                    plausible_max: profile.plausible_max,
                };
                let values = apply_pattern(&baseline, &ctx, anomaly, &self.config.patterns, &mut rng);
                (values, profile.plausible_min, profile.plausible_max)
            }
            None => (baseline, profile.clip_min, profile.clip_max),
        };

        Ok(values.into_iter().map(|v| round_cents(v).clamp(lo, hi)).collect())
    }

    /// The full record stream, period-major, roster order within a period.
    pub fn generate(&self, roster: &Roster, horizon: &Horizon) -> LabResult<Vec<Record>> {
        let mut records = Vec::with_capacity(roster.len() * horizon.len_days());

        for period in horizon.periods() {
            for entity in &roster.entities {
                let values = self.entity_period(entity, period)?;
                for (day, value) in period.days.iter().zip(values) {
                    records.push(Record {
                        entity_id: entity.entity_id.clone(),
                        period_index: period.index,
                        period_label: period.label.clone(),
                        date: *day,
                        day_of_week: day.weekday(),
                        category: entity.category.clone(),
                        value,
                        is_anomalous: entity.is_anomalous,
                        anomaly_type: entity.anomaly_type,
                    });
                }
            }
            log::debug!("period {} ({}) synthesized", period.index, period.label);
        }

        log::info!(
            "Synthesized {} records over {} periods",
            records.len(),
            horizon.periods().len()
        );
        Ok(records)
    }
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
