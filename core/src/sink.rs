//! Output sinks for the record stream and the scored table.
//!
//! RULE: a failing sink never touches the in-memory run. `publish`
//! reports every failure and carries on with the remaining sinks.

use crate::{
    detector::ScoredEntity,
    engine::LabRun,
    error::{LabError, LabResult},
    synth::Record,
};
use serde::Serialize;
use std::{fs::File, io::BufWriter, path::PathBuf};

pub trait RecordSink {
    fn name(&self) -> &'static str;
    fn write_records(&mut self, run_id: &str, records: &[Record]) -> LabResult<()>;
}

pub trait ScoreSink {
    fn name(&self) -> &'static str;
    fn write_scores(&mut self, run_id: &str, rows: &[ScoredEntity]) -> LabResult<()>;
}

#[derive(Debug)]
pub struct SinkFailure {
    pub sink: &'static str,
    pub error: LabError,
}

/// Hand a finished run to every sink. Returns the failures, if any.
pub fn publish(
    run: &LabRun,
    record_sinks: &mut [&mut dyn RecordSink],
    score_sinks: &mut [&mut dyn ScoreSink],
) -> Vec<SinkFailure> {
    let mut failures = publish_records(run, record_sinks);
    failures.extend(publish_scores(run, score_sinks));
    failures
}

pub fn publish_records(run: &LabRun, sinks: &mut [&mut dyn RecordSink]) -> Vec<SinkFailure> {
    let mut failures = Vec::new();
    for sink in sinks.iter_mut() {
        if let Err(error) = sink.write_records(&run.run_id, &run.dataset.records) {
            log::error!("record sink '{}' failed: {error}", sink.name());
            failures.push(SinkFailure { sink: sink.name(), error });
        }
    }
    failures
}

pub fn publish_scores(run: &LabRun, sinks: &mut [&mut dyn ScoreSink]) -> Vec<SinkFailure> {
    let mut failures = Vec::new();
    for sink in sinks.iter_mut() {
        if let Err(error) = sink.write_scores(&run.run_id, &run.report.rows) {
            log::error!("score sink '{}' failed: {error}", sink.name());
            failures.push(SinkFailure { sink: sink.name(), error });
        }
    }
    failures
}

/// Keeps everything it is given. Used by tests and by callers that want
/// the rows back after a run.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<Record>,
    pub scores: Vec<ScoredEntity>,
}

impl RecordSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write_records(&mut self, _run_id: &str, records: &[Record]) -> LabResult<()> {
        self.records.extend_from_slice(records);
        Ok(())
    }
}

impl ScoreSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write_scores(&mut self, _run_id: &str, rows: &[ScoredEntity]) -> LabResult<()> {
        self.scores.extend_from_slice(rows);
        Ok(())
    }
}

#[derive(Serialize)]
struct RankingFile<'a> {
    run_id: &'a str,
    rows: &'a [ScoredEntity],
}

/// Writes the ranked table as one pretty-printed JSON document.
pub struct JsonRankingSink {
    path: PathBuf,
}

impl JsonRankingSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScoreSink for JsonRankingSink {
    fn name(&self) -> &'static str {
        "json"
    }

    fn write_scores(&mut self, run_id: &str, rows: &[ScoredEntity]) -> LabResult<()> {
        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(writer, &RankingFile { run_id, rows })?;
        log::info!("wrote {} ranked rows to {}", rows.len(), self.path.display());
        Ok(())
    }
}
