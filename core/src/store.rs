//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! Sinks and the runner call store methods; they never execute SQL directly.

use rusqlite::{params, Connection};
use crate::{
    detector::ScoredEntity,
    error::LabResult,
    features::record_stats,
    sink::{RecordSink, ScoreSink},
    synth::Record,
};

pub struct LabStore {
    conn: Connection,
}

impl LabStore {
    /// Open (or create) the lab database at `path`.
    pub fn open(path: &str) -> LabResult<Self> {
        let conn = Connection::open(path)?;
        // WAL is ignored for :memory:, so don't fail on it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LabResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LabResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, version: &str, config_json: &str) -> LabResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version, config_json) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, seed as i64, version, config_json],
        )?;
        Ok(())
    }

    pub fn run_seed(&self, run_id: &str) -> LabResult<u64> {
        let seed: i64 = self.conn.query_row(
            "SELECT seed FROM run WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(seed as u64)
    }

    // ── Records ────────────────────────────────────────────────

    /// Records plus their per-entity z-score and within-category percentile.
    pub fn insert_records(&self, run_id: &str, records: &[Record]) -> LabResult<()> {
        let derived = record_stats(records);
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO record
                    (run_id, entity_id, period_index, period_label, work_date, weekday,
                     category, value, z_score, category_percentile, is_anomalous, anomaly_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for (r, d) in records.iter().zip(&derived) {
                stmt.execute(params![
                    run_id,
                    r.entity_id,
                    r.period_index as i64,
                    r.period_label,
                    r.date.to_string(),
                    r.day_of_week.to_string(),
                    r.category,
                    r.value,
                    d.z_score,
                    d.category_percentile,
                    r.is_anomalous as i32,
                    r.anomaly_type.map(|t| t.name()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn count_records(&self, run_id: &str) -> LabResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM record WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn entity_mean(&self, run_id: &str, entity_id: &str) -> LabResult<Option<f64>> {
        let mean = self.conn.query_row(
            "SELECT AVG(value) FROM record WHERE run_id = ?1 AND entity_id = ?2",
            params![run_id, entity_id],
            |row| row.get(0),
        )?;
        Ok(mean)
    }

    /// Entity-days more than `z` deviations above the entity's own mean.
    pub fn count_spikes(&self, run_id: &str, z: f64) -> LabResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM record WHERE run_id = ?1 AND z_score > ?2",
            params![run_id, z],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    // ── Scores ─────────────────────────────────────────────────

    pub fn insert_scores(&self, run_id: &str, rows: &[ScoredEntity]) -> LabResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO entity_score
                    (run_id, entity_id, category, rank, composite, flag_count, flag_suspect,
                     density_score, density_suspect, cluster, features_json,
                     is_anomalous, anomaly_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for row in rows {
                stmt.execute(params![
                    run_id,
                    row.features.entity_id,
                    row.features.category,
                    row.rank as i64,
                    row.composite,
                    row.flag_count as i64,
                    row.flag_suspect as i32,
                    row.density_score,
                    row.density_suspect as i32,
                    row.cluster as i64,
                    serde_json::to_string(&row.features)?,
                    row.features.is_anomalous as i32,
                    row.features.anomaly_type.map(|t| t.name()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Entity ids ordered by rank, best first.
    pub fn top_ranked(&self, run_id: &str, limit: usize) -> LabResult<Vec<(String, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, composite FROM entity_score
             WHERE run_id = ?1 ORDER BY rank ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![run_id, limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl RecordSink for LabStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write_records(&mut self, run_id: &str, records: &[Record]) -> LabResult<()> {
        self.insert_records(run_id, records)
    }
}

impl ScoreSink for LabStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn write_scores(&mut self, run_id: &str, rows: &[ScoredEntity]) -> LabResult<()> {
        self.insert_scores(run_id, rows)
    }
}
