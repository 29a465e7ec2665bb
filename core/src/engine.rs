//! The lab engine: generation and detection, wired end to end.
//!
//! EXECUTION ORDER (fixed, each stage fully consumes the previous one):
//!   1. Roster
//!   2. Behaviour synthesis      (record stream)
//!   3. Feature extraction
//!   4. Flagger / forest / clusters (independent, same feature table)
//!   5. Composite scoring and ranking
//!
//! RULES:
//!   - The config is validated before any random draw.
//!   - All randomness flows through the RngBank.
//!   - Detection never reads hidden labels, except the label-aware
//!     cluster term of the composite (see composite.rs).

use crate::{
    calendar::Horizon,
    config::LabConfig,
    detector::{DetectionReport, Detector},
    error::LabResult,
    rng::{RngBank, StreamSlot},
    roster::Roster,
    synth::{Record, Synthesizer},
    types::RunId,
};
use serde::{Deserialize, Serialize};

/// Everything the generator produces. Labels ride along on every record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub roster: Roster,
    pub horizon: Horizon,
    pub records: Vec<Record>,
}

#[derive(Debug, Clone)]
pub struct LabRun {
    pub run_id: RunId,
    pub dataset: Dataset,
    pub report: DetectionReport,
}

pub struct LabEngine {
    pub config: LabConfig,
    pub rng_bank: RngBank,
}

impl LabEngine {
    /// Validate the config and build an engine. Fails fast on any
    /// configuration error.
    pub fn build(config: LabConfig) -> LabResult<Self> {
        config.validate()?;
        let rng_bank = RngBank::new(config.seed);
        Ok(Self { config, rng_bank })
    }

    /// Engine over the test config with the given seed.
    pub fn build_test(seed: u64) -> LabResult<Self> {
        Self::build(LabConfig::default_test(seed))
    }

    pub fn roster(&self) -> Roster {
        let mut rng = self.rng_bank.for_stream(StreamSlot::Roster);
        Roster::generate(&self.config, &mut rng)
    }

    /// Roster and records over the configured horizon.
    pub fn generate(&self) -> LabResult<Dataset> {
        let horizon = Horizon::from_config(&self.config.horizon)?;
        self.generate_over(horizon)
    }

    /// Roster and records over a caller-supplied horizon.
    pub fn generate_over(&self, horizon: Horizon) -> LabResult<Dataset> {
        let roster = self.roster();
        let records = Synthesizer::new(&self.config, self.rng_bank).generate(&roster, &horizon)?;
        Ok(Dataset {
            roster,
            horizon,
            records,
        })
    }

    pub fn detect(&self, records: &[Record]) -> LabResult<DetectionReport> {
        Detector::new(&self.config.detection, self.rng_bank).run(records)
    }

    pub fn run(&self, run_id: RunId) -> LabResult<LabRun> {
        log::info!("run {run_id}: seed {}", self.config.seed);
        let dataset = self.generate()?;
        let report = self.detect(&dataset.records)?;
        Ok(LabRun {
            run_id,
            dataset,
            report,
        })
    }
}
