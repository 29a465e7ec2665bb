//! Shared primitive types used across the generator and the detector.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, unique identifier for an entity in the roster.
pub type EntityId = String;

/// Zero-based index of an observation period (one calendar month by default).
pub type PeriodIndex = usize;

/// The canonical run identifier.
pub type RunId = String;

/// Designed anomaly patterns layered on top of baseline behaviour.
///
/// Order is significant: the roster cycles through `AnomalyType::ALL`
/// round-robin, so reordering changes which entity gets which pattern.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    ConstantPadding,
    DayInflation,
    RoundNumber,
    GradualDrift,
    BurstPadding,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 5] = [
        AnomalyType::ConstantPadding,
        AnomalyType::DayInflation,
        AnomalyType::RoundNumber,
        AnomalyType::GradualDrift,
        AnomalyType::BurstPadding,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ConstantPadding => "constant_padding",
            Self::DayInflation    => "day_inflation",
            Self::RoundNumber     => "round_number",
            Self::GradualDrift    => "gradual_drift",
            Self::BurstPadding    => "burst_padding",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
