//! Sinks and the SQLite store.

use fraudlab_core::{
    engine::{LabEngine, LabRun},
    error::LabError,
    sink::{publish, publish_records, publish_scores, JsonRankingSink, MemorySink, RecordSink, ScoreSink},
    store::LabStore,
};

fn build_run(seed: u64) -> LabRun {
    LabEngine::build_test(seed)
        .unwrap()
        .run(format!("sink-test-{seed}"))
        .unwrap()
}

fn build_store(run: &LabRun, seed: u64) -> LabStore {
    let store = LabStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store.insert_run(&run.run_id, seed, "0.1.0-test", "{}").expect("insert run");
    store
}

#[test]
fn store_persists_records_and_ranking() {
    let run = build_run(42);
    let mut store = build_store(&run, 42);

    let failures = publish(&run, &mut [&mut store as &mut dyn RecordSink], &mut []);
    assert!(failures.is_empty(), "Unexpected sink failures: {failures:?}");
    let failures = publish(&run, &mut [], &mut [&mut store as &mut dyn ScoreSink]);
    assert!(failures.is_empty(), "Unexpected sink failures: {failures:?}");

    assert_eq!(store.count_records(&run.run_id).unwrap(), run.dataset.records.len());
    assert_eq!(store.run_seed(&run.run_id).unwrap(), 42);

    let top = store.top_ranked(&run.run_id, 5).unwrap();
    let expected: Vec<&str> = run.report.top(5).iter().map(|r| r.entity_id()).collect();
    let got: Vec<&str> = top.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(got, expected, "Stored ranking differs from the in-memory one");

    // Exactly the records the extractor counts as above z = 2.
    let expected_spikes: usize = run.report.rows.iter().map(|r| r.features.days_above_z2).sum();
    assert_eq!(store.count_spikes(&run.run_id, 2.0).unwrap(), expected_spikes);

    let first = &run.dataset.roster.entities[0];
    let mean = store.entity_mean(&run.run_id, &first.entity_id).unwrap();
    assert!(mean.is_some());
}

#[test]
fn records_for_an_unknown_run_are_rejected() {
    let run = build_run(3);
    let store = LabStore::in_memory().unwrap();
    store.migrate().unwrap();
    // Foreign key on run_id: no run row, no records.
    assert!(matches!(
        store.insert_records(&run.run_id, &run.dataset.records[..5]),
        Err(LabError::Database(_))
    ));
    assert_eq!(store.count_records(&run.run_id).unwrap(), 0);
}

#[test]
fn failing_sink_does_not_block_the_others() {
    let run = build_run(7);
    let before = run.report.clone();

    let mut broken = JsonRankingSink::new("/nonexistent-dir/for/sure/ranking.json");
    let mut memory = MemorySink::default();
    let mut failures = publish_records(&run, &mut [&mut memory as &mut dyn RecordSink]);
    failures.extend(publish_scores(&run, &mut [
        &mut broken as &mut dyn ScoreSink,
        &mut memory as &mut dyn ScoreSink,
    ]));

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].sink, "json");
    assert!(matches!(failures[0].error, LabError::Io(_)));
    assert_eq!(memory.records.len(), run.dataset.records.len());
    assert_eq!(memory.scores.len(), run.report.rows.len());
    assert_eq!(run.report, before, "In-memory results changed after a sink failure");
}

#[test]
fn json_ranking_round_trips_through_a_file() {
    let run = build_run(9);
    let path = std::env::temp_dir().join(format!("fraudlab-ranking-{}.json", std::process::id()));
    let mut sink = JsonRankingSink::new(&path);
    sink.write_scores(&run.run_id, &run.report.rows).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["run_id"], run.run_id.as_str());
    let rows = value["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 50);
    assert_eq!(rows[0]["rank"], 1);
    assert_eq!(rows[0]["entity_id"], run.report.rows[0].entity_id());
    let _ = std::fs::remove_file(&path);
}
