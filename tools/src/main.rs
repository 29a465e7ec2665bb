//! lab-runner: headless runner for the timesheet anomaly lab.
//!
//! Usage:
//!   lab-runner --seed 42 --entities 50 --months 6
//!   lab-runner --config data/lab_config.json --db lab.db --out ranking.json
//!   lab-runner --seed 7 --label-free --top 15
//!   lab-runner --days 20 --start 2024-01-01

use anyhow::Result;
use fraudlab_core::{
    config::{BusinessDayWindow, ClusterSignal, LabConfig},
    engine::{LabEngine, LabRun},
    features::period_summaries,
    sink::{publish_records, publish_scores, JsonRankingSink, RecordSink, ScoreSink},
    store::LabStore,
    validation::{validate, ValidationSummary},
};
use std::env;

#[derive(serde::Serialize)]
struct RunSummary<'a> {
    run_id: &'a str,
    seed: u64,
    finished_at: String,
    entities: usize,
    records: usize,
    validation: &'a ValidationSummary,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config_path = str_arg(&args, "--config");
    let db = str_arg(&args, "--db");
    let out = str_arg(&args, "--out");
    let top = parse_arg(&args, "--top", 10usize);
    let label_free = args.iter().any(|a| a == "--label-free");

    let mut config = match config_path {
        Some(path) => LabConfig::load(path)?,
        None => LabConfig::default_lab(),
    };
    config.seed = parse_arg(&args, "--seed", config.seed);
    config.entity_count = parse_arg(&args, "--entities", config.entity_count);
    config.horizon.months = parse_arg(&args, "--months", config.horizon.months);
    if let Some(days) = str_arg(&args, "--days") {
        let start = match str_arg(&args, "--start") {
            Some(date) => date.parse::<chrono::NaiveDate>()?,
            None => chrono::NaiveDate::from_ymd_opt(config.horizon.year, config.horizon.start_month, 1)
                .ok_or_else(|| anyhow::anyhow!("no first day for {}-{}", config.horizon.year, config.horizon.start_month))?,
        };
        config.horizon.business_days = Some(BusinessDayWindow {
            start,
            days: days.parse::<usize>()?,
        });
    }
    if label_free {
        config.detection.cluster_signal = ClusterSignal::LabelFree;
    }

    println!("Timesheet anomaly lab: lab-runner");
    println!("  seed:      {}", config.seed);
    println!("  entities:  {}", config.entity_count);
    match &config.horizon.business_days {
        Some(window) => println!("  window:    {} business days from {}", window.days, window.start),
        None => println!("  months:    {}", config.horizon.months),
    }
    println!("  cluster:   {:?}", config.detection.cluster_signal);
    println!();

    let seed = config.seed;
    let config_json = serde_json::to_string(&config)?;
    let engine = LabEngine::build(config)?;

    let run_id = format!("run-{seed}-{}", uuid::Uuid::new_v4().simple());
    let run = engine.run(run_id.clone())?;
    let summary = validate(&run.report, top, &engine.config.patterns.types);

    // Sinks run after the results are in memory; a failure is reported, not fatal.
    let mut store = match db {
        Some(path) => open_store(path, &run_id, seed, &config_json),
        None => None,
    };
    let mut json = out.map(JsonRankingSink::new);

    let mut failures = Vec::new();
    {
        let mut record_sinks: Vec<&mut dyn RecordSink> = Vec::new();
        if let Some(store) = store.as_mut() {
            record_sinks.push(store);
        }
        failures.extend(publish_records(&run, &mut record_sinks));
    }
    {
        let mut score_sinks: Vec<&mut dyn ScoreSink> = Vec::new();
        if let Some(store) = store.as_mut() {
            score_sinks.push(store);
        }
        if let Some(json) = json.as_mut() {
            score_sinks.push(json);
        }
        failures.extend(publish_scores(&run, &mut score_sinks));
    }

    print_summary(&run, &summary, top);
    print_leader_profile(&run);
    if !failures.is_empty() {
        println!();
        println!("  {} sink(s) failed; results above are complete.", failures.len());
    }

    let report = RunSummary {
        run_id: &run_id,
        seed,
        finished_at: chrono::Utc::now().to_rfc3339(),
        entities: run.dataset.roster.len(),
        records: run.dataset.records.len(),
        validation: &summary,
    };
    log::debug!("{}", serde_json::to_string(&report)?);

    Ok(())
}

fn open_store(path: &str, run_id: &str, seed: u64, config_json: &str) -> Option<LabStore> {
    let opened = LabStore::open(path).and_then(|store| {
        store.migrate()?;
        store.insert_run(run_id, seed, env!("CARGO_PKG_VERSION"), config_json)?;
        Ok(store)
    });
    match opened {
        Ok(store) => Some(store),
        Err(e) => {
            log::error!("cannot open store at {path}: {e}");
            None
        }
    }
}

fn print_summary(run: &LabRun, summary: &ValidationSummary, top: usize) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {}", run.run_id);
    println!("  entities:       {}", run.dataset.roster.len());
    println!("  anomalous:      {}", run.dataset.roster.anomalous_count());
    println!("  periods:        {}", run.dataset.horizon.periods().len());
    println!("  records:        {}", run.dataset.records.len());
    println!();

    for method in [&summary.flags, &summary.density] {
        println!(
            "  {:<18} flagged {:>3}  tp {:>3}  fp {:>3}  precision {:.2}  recall {:.2}",
            method.method,
            method.flagged,
            method.true_positives,
            method.false_positives,
            method.precision(),
            method.recall()
        );
    }
    println!(
        "  top {:<14} tp {:>3}  (random draw expects {:.1})",
        top, summary.top_k.true_positives, summary.top_k_random_expectation
    );
    println!();

    println!("  Recovery by pattern:");
    for t in &summary.by_type {
        let best = t.best_rank.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "    {:<18} {:>2} planted  flags {:>2}  density {:>2}  best rank {}",
            t.anomaly_type.name(),
            t.total,
            t.caught_by_flags,
            t.caught_by_density,
            best
        );
    }
    println!();

    println!("  Top {top} by composite risk:");
    for row in run.report.top(top) {
        let truth = match row.features.anomaly_type {
            Some(t) => t.name(),
            None => "normal",
        };
        println!(
            "    #{:<3} {:<10} {:<12} composite {:.3}  flags {}  density {:.3}  cluster {}  [{}]",
            row.rank,
            row.entity_id(),
            row.features.category,
            row.composite,
            row.flag_count,
            row.density_score,
            row.cluster,
            truth
        );
    }
}

/// Per-period profile of the highest-risk entity.
fn print_leader_profile(run: &LabRun) {
    let Some(leader) = run.report.rows.first() else {
        return;
    };
    let records: Vec<_> = run
        .dataset
        .records
        .iter()
        .filter(|r| r.entity_id == leader.entity_id())
        .cloned()
        .collect();
    println!();
    println!("  Period profile of {}:", leader.entity_id());
    for p in period_summaries(&records) {
        println!(
            "    {:<10} days {:>2}  mean {:>5.2}  sd {:>4.2}  total {:>6.1}",
            p.period_label, p.days, p.mean, p.std_dev, p.total
        );
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
