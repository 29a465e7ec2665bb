//! Ensemble detection: degenerate inputs, score ranges, recovery.

use fraudlab_core::{
    calendar::Horizon,
    config::{BusinessDayWindow, ClusterSignal, DetectionConfig, LabConfig},
    detector::Detector,
    engine::LabEngine,
    error::LabError,
    features::{FeatureExtractor, FeatureVector},
    rng::RngBank,
    types::AnomalyType,
    validation::validate,
};

fn flat_row(i: usize) -> FeatureVector {
    FeatureVector {
        entity_id: format!("EMP-{:03}", i + 1),
        category: "Finance".into(),
        observations: 20,
        mean: 8.0,
        std_dev: 0.5,
        max: 9.0,
        min: 7.0,
        total: 160.0,
        weekday_ratio: 1.0,
        coeff_variation: 0.0625,
        round_pct: 0.0,
        trend_slope: 0.0,
        low_deviation_pct: 0.95,
        avg_z_score: 0.0,
        days_above_z2: 0,
        is_anomalous: false,
        anomaly_type: None,
    }
}

#[test]
fn zero_spread_population_scores_without_failing() {
    let config = DetectionConfig::default();
    let rows: Vec<FeatureVector> = (0..10).map(flat_row).collect();
    let report = Detector::new(&config, RngBank::new(8)).score(rows).unwrap();

    assert_eq!(report.rows.len(), 10);
    for row in &report.rows {
        assert_eq!(row.flag_count, 0, "{} flagged on a flat population", row.entity_id());
        assert!(!row.density_suspect);
        assert_eq!(row.density_signal, 0.0);
        assert_eq!(row.composite, 0.0);
    }
    // All tied: ranking falls back to entity id.
    let ids: Vec<&str> = report.rows.iter().map(|r| r.entity_id()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
    assert_eq!(report.rows[0].rank, 1);
}

#[test]
fn single_period_window_has_zero_trend() {
    let engine = LabEngine::build_test(21).unwrap();
    let window = Horizon::business_days(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 20).unwrap();
    let data = engine.generate_over(window).unwrap();
    assert_eq!(data.records.len(), 50 * 20);

    let rows = FeatureExtractor::new(&engine.config.detection).extract(&data.records).unwrap();
    assert!(rows.iter().all(|r| r.trend_slope == 0.0));

    let report = engine.detect(&data.records).unwrap();
    assert_eq!(report.rows.len(), 50);
}

#[test]
fn zero_clusters_is_an_error_not_a_panic() {
    let config = DetectionConfig {
        n_clusters: 0,
        ..DetectionConfig::default()
    };
    let rows: Vec<FeatureVector> = (0..10).map(flat_row).collect();
    assert!(matches!(
        Detector::new(&config, RngBank::new(8)).score(rows),
        Err(LabError::InvalidParameter { name: "detection.n_clusters", .. })
    ));
}

#[test]
fn single_period_flags_beat_the_base_rate() {
    let _ = env_logger::builder().is_test(true).try_init();

    // 50 entities, 20% anomalous, one window of 20 business days.
    let (mut flagged, mut flagged_tp, mut base_rate) = (0, 0, 0.0);
    let seeds = [1u64, 2, 3, 4, 5, 6];
    for seed in seeds {
        let mut config = LabConfig::default_test(seed);
        config.horizon.business_days = Some(BusinessDayWindow {
            start: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            days: 20,
        });
        let engine = LabEngine::build(config).unwrap();
        let run = engine.run(format!("window-{seed}")).unwrap();
        assert_eq!(run.dataset.horizon.len_days(), 20);

        let summary = validate(&run.report, 10, &engine.config.patterns.types);
        flagged += summary.flags.flagged;
        flagged_tp += summary.flags.true_positives;
        base_rate += summary.flags.total_anomalous as f64 / summary.population as f64;
    }
    base_rate /= seeds.len() as f64;

    assert!(flagged > 0, "Flag rule never fired on the 20-day window");
    let precision = flagged_tp as f64 / flagged as f64;
    assert!(precision > base_rate,
        "Flag precision {precision:.2} ({flagged_tp}/{flagged}) no better than the {base_rate:.2} base rate");
}

#[test]
fn composite_is_bounded_and_ranked() {
    let engine = LabEngine::build_test(42).unwrap();
    let run = engine.run("bounded".into()).unwrap();
    let rows = &run.report.rows;

    for (i, row) in rows.iter().enumerate() {
        for (name, v) in [
            ("flag", row.flag_signal),
            ("density", row.density_signal),
            ("cluster", row.cluster_signal),
            ("composite", row.composite),
        ] {
            assert!((0.0..=1.0).contains(&v), "{}: {name} signal {v} outside [0, 1]", row.entity_id());
        }
        assert_eq!(row.rank, i + 1);
        assert_eq!(row.flag_count, row.flagged_features.len());
        assert_eq!(row.flag_suspect, row.flag_count >= 2);
        assert!(row.cluster < engine.config.detection.n_clusters);
    }
    for pair in rows.windows(2) {
        assert!(pair[0].composite >= pair[1].composite, "Ranking not descending");
    }
}

#[test]
fn density_cut_matches_contamination() {
    let run = LabEngine::build_test(42).unwrap().run("cut".into()).unwrap();
    let suspects = run.report.rows.iter().filter(|r| r.density_suspect).count();
    // Quantile cut at 0.2 of 50 scores: about 10 fall strictly below it.
    assert!((8..=11).contains(&suspects), "Density flagged {suspects} of 50");
}

#[test]
fn ensemble_beats_random_selection() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (mut flagged, mut flagged_tp) = (0, 0);
    let (mut top_tp, mut top_expected) = (0, 0.0);
    for seed in [11, 22, 33, 44, 55] {
        let run = LabEngine::build_test(seed).unwrap().run(format!("e2e-{seed}")).unwrap();
        let summary = validate(&run.report, 10, &AnomalyType::ALL);
        flagged += summary.flags.flagged;
        flagged_tp += summary.flags.true_positives;
        top_tp += summary.top_k.true_positives;
        top_expected += summary.top_k_random_expectation;
    }

    assert!(flagged > 0, "Flag rule never fired across five seeds");
    let precision = flagged_tp as f64 / flagged as f64;
    assert!(precision > 0.2, "Flag precision {precision:.2} no better than the 20% base rate");
    assert!(top_tp as f64 > top_expected,
        "Top-10 hits {top_tp} vs random expectation {top_expected:.1}");
}

#[test]
fn label_free_ranking_never_reads_labels() {
    let mut config = LabConfig::default_test(42);
    config.detection.cluster_signal = ClusterSignal::LabelFree;
    let engine = LabEngine::build(config).unwrap();
    let data = engine.generate().unwrap();

    let rows = FeatureExtractor::new(&engine.config.detection).extract(&data.records).unwrap();
    let mut blind = rows.clone();
    for r in &mut blind {
        r.is_anomalous = false;
        r.anomaly_type = None;
    }

    let detector = Detector::new(&engine.config.detection, engine.rng_bank);
    let with_labels = detector.score(rows).unwrap();
    let without = detector.score(blind).unwrap();
    for (a, b) in with_labels.rows.iter().zip(&without.rows) {
        assert_eq!(a.entity_id(), b.entity_id());
        assert_eq!(a.composite, b.composite);
    }
}

#[test]
fn label_aware_cluster_term_depends_on_ground_truth() {
    // The default composite is partly supervised: hiding the labels
    // changes the cluster term and therefore the composite.
    let engine = LabEngine::build_test(42).unwrap();
    let data = engine.generate().unwrap();
    let rows = FeatureExtractor::new(&engine.config.detection).extract(&data.records).unwrap();
    let mut blind = rows.clone();
    for r in &mut blind {
        r.is_anomalous = false;
    }

    let detector = Detector::new(&engine.config.detection, engine.rng_bank);
    let aware = detector.score(rows).unwrap();
    let hidden = detector.score(blind).unwrap();

    assert!(hidden.rows.iter().all(|r| r.cluster_signal == 0.0));
    assert!(aware.rows.iter().any(|r| r.cluster_signal > 0.0));
    assert_ne!(
        aware.rows.iter().map(|r| r.composite).sum::<f64>(),
        hidden.rows.iter().map(|r| r.composite).sum::<f64>()
    );
}

#[test]
fn recovery_is_reported_for_the_configured_types() {
    let types = vec![AnomalyType::ConstantPadding, AnomalyType::DayInflation, AnomalyType::GradualDrift];
    let mut config = LabConfig::default_test(42);
    config.patterns.types = types.clone();
    let engine = LabEngine::build(config).unwrap();
    let run = engine.run("subset".into()).unwrap();
    let summary = validate(&run.report, 10, &engine.config.patterns.types);

    let reported: Vec<AnomalyType> = summary.by_type.iter().map(|t| t.anomaly_type).collect();
    assert_eq!(reported, types);
    assert_eq!(summary.by_type.iter().map(|t| t.total).sum::<usize>(), 10);
}

#[test]
fn validation_counts_are_consistent() {
    let run = LabEngine::build_test(42).unwrap().run("validation".into()).unwrap();
    let summary = validate(&run.report, 10, &AnomalyType::ALL);

    assert_eq!(summary.population, 50);
    assert_eq!(summary.top_k.flagged, 10);
    assert!((summary.top_k_random_expectation - 2.0).abs() < 1e-12);
    for m in [&summary.flags, &summary.density, &summary.top_k] {
        assert_eq!(m.true_positives + m.false_positives, m.flagged, "{}", m.method);
        assert_eq!(m.total_anomalous, 10);
    }
    assert_eq!(summary.by_type.iter().map(|t| t.total).sum::<usize>(), 10);
    for t in &summary.by_type {
        assert!(t.caught_by_flags <= t.total && t.caught_by_density <= t.total);
        assert!(t.best_rank.is_some(), "{} has no ranked member", t.anomaly_type);
    }
}
