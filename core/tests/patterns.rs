//! Each planted pattern must leave the statistical fingerprint it is
//! designed to leave, and nothing may escape the plausible range.

use chrono::Weekday;
use fraudlab_core::{
    config::{BurstMode, LabConfig},
    engine::{Dataset, LabEngine},
    stats,
    synth::Record,
    types::AnomalyType,
};
use std::collections::BTreeMap;

fn dataset(seed: u64) -> (LabEngine, Dataset) {
    let engine = LabEngine::build_test(seed).unwrap();
    let data = engine.generate().unwrap();
    (engine, data)
}

fn by_entity(records: &[Record]) -> BTreeMap<&str, Vec<&Record>> {
    let mut map: BTreeMap<&str, Vec<&Record>> = BTreeMap::new();
    for r in records {
        map.entry(r.entity_id.as_str()).or_default().push(r);
    }
    map
}

fn monthly_slope(records: &[&Record]) -> f64 {
    let mut per_period: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
    for r in records {
        per_period.entry(r.period_index).or_default().push(r.value);
    }
    let xs: Vec<f64> = per_period.keys().map(|k| *k as f64).collect();
    let ys: Vec<f64> = per_period.values().map(|v| stats::mean(v)).collect();
    stats::linear_slope(&xs, &ys)
}

fn values(records: &[&Record]) -> Vec<f64> {
    records.iter().map(|r| r.value).collect()
}

#[test]
fn every_value_stays_inside_its_range() {
    let (engine, data) = dataset(42);
    for r in &data.records {
        let profile = engine.config.category(&r.category).unwrap();
        assert!(profile.contains_plausible(r.value),
            "{} on {} = {} escapes plausible range", r.entity_id, r.date, r.value);
        if !r.is_anomalous {
            assert!(profile.contains_baseline(r.value),
                "normal {} on {} = {} escapes clip range", r.entity_id, r.date, r.value);
        }
        assert_eq!((r.value * 100.0).round() / 100.0, r.value, "{} not rounded to cents", r.value);
    }
}

#[test]
fn constant_padding_lifts_the_whole_series() {
    let (engine, data) = dataset(42);
    for (id, recs) in by_entity(&data.records) {
        if recs[0].anomaly_type != Some(AnomalyType::ConstantPadding) {
            continue;
        }
        let profile = engine.config.category(&recs[0].category).unwrap();
        let shift = stats::mean(&values(&recs)) - profile.center;
        assert!(shift > 1.0, "{id}: padding shift only {shift:.3}");
    }
}

#[test]
fn day_inflation_concentrates_on_fridays() {
    let (_, data) = dataset(42);
    for (id, recs) in by_entity(&data.records) {
        let (fri, rest): (Vec<&Record>, Vec<&Record>) =
            recs.iter().partition(|r| r.day_of_week == Weekday::Fri);
        let gap = stats::mean(&values(&fri)) - stats::mean(&values(&rest));
        match recs[0].anomaly_type {
            Some(AnomalyType::DayInflation) => {
                assert!(gap >= 2.0, "{id}: Friday gap only {gap:.3}")
            }
            None => assert!(gap.abs() < 1.0, "{id}: normal entity has Friday gap {gap:.3}"),
            _ => {}
        }
    }
}

#[test]
fn round_number_entities_report_whole_hours_only() {
    let (engine, data) = dataset(42);
    let allowed = &engine.config.patterns.round_values;
    for (id, recs) in by_entity(&data.records) {
        if recs[0].anomaly_type != Some(AnomalyType::RoundNumber) {
            continue;
        }
        let v = values(&recs);
        assert!(v.iter().all(|x| allowed.contains(x)), "{id}: value outside {allowed:?}");
        let cv = stats::sample_std(&v) / stats::mean(&v);
        assert!(cv < 0.15, "{id}: coefficient of variation {cv:.3}");
    }
}

#[test]
fn gradual_drift_shows_a_positive_trend() {
    let (_, data) = dataset(42);
    for (id, recs) in by_entity(&data.records) {
        let slope = monthly_slope(&recs);
        match recs[0].anomaly_type {
            Some(AnomalyType::GradualDrift) => {
                assert!(slope > 0.3, "{id}: drift slope only {slope:.3}")
            }
            None => assert!(slope.abs() < 0.3, "{id}: normal entity trends at {slope:.3}"),
            _ => {}
        }
    }
}

#[test]
fn burst_padding_skews_right() {
    // Per entity skewness is noisy over ~130 days; pool a few seeds.
    let mut burst_skew = Vec::new();
    let mut normal_skew = Vec::new();
    for seed in [1, 2, 3, 4] {
        let (_, data) = dataset(seed);
        for (_, recs) in by_entity(&data.records) {
            let skew = stats::skewness(&values(&recs));
            match recs[0].anomaly_type {
                Some(AnomalyType::BurstPadding) => burst_skew.push(skew),
                None => normal_skew.push(skew),
                _ => {}
            }
        }
    }
    let burst = stats::mean(&burst_skew);
    let normal = stats::mean(&normal_skew);
    assert!(burst > 0.4, "Mean burst skewness {burst:.3}");
    assert!(burst > normal + 0.3, "Burst skew {burst:.3} vs normal {normal:.3}");
}

#[test]
fn discarded_bursts_leave_the_baseline_untouched() {
    let mut config = LabConfig::default_test(42);
    config.patterns.burst_mode = BurstMode::Discard;
    let engine = LabEngine::build(config).unwrap();
    let data = engine.generate().unwrap();
    let (_, inflated) = dataset(42);

    // Only burst entities may differ between the two modes.
    for (a, b) in data.records.iter().zip(&inflated.records) {
        assert_eq!(a.entity_id, b.entity_id);
        if a.anomaly_type != Some(AnomalyType::BurstPadding) {
            assert_eq!(a.value, b.value, "{} changed on {}", a.entity_id, a.date);
        } else {
            assert!(a.value <= b.value);
            let profile = engine.config.category(&a.category).unwrap();
            assert!(profile.contains_baseline(a.value));
        }
    }
}
