//! Post-hoc validation against hidden labels.
//!
//! Only runs after detection has finished; nothing here feeds back into
//! any detector.

use crate::{
    detector::{DetectionReport, ScoredEntity},
    types::AnomalyType,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodValidation {
    pub method: String,
    pub flagged: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub total_anomalous: usize,
}

impl MethodValidation {
    fn from_selection<'r>(method: &str, selected: impl Iterator<Item = &'r ScoredEntity>, total_anomalous: usize) -> Self {
        let (mut flagged, mut true_positives) = (0, 0);
        for row in selected {
            flagged += 1;
            true_positives += usize::from(row.is_anomalous());
        }
        Self {
            method: method.to_string(),
            flagged,
            true_positives,
            false_positives: flagged - true_positives,
            total_anomalous,
        }
    }

    /// Share of the flagged set that is truly anomalous. 0.0 when nothing was flagged.
    pub fn precision(&self) -> f64 {
        if self.flagged == 0 {
            0.0
        } else {
            self.true_positives as f64 / self.flagged as f64
        }
    }

    pub fn recall(&self) -> f64 {
        if self.total_anomalous == 0 {
            0.0
        } else {
            self.true_positives as f64 / self.total_anomalous as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeRecovery {
    pub anomaly_type: AnomalyType,
    pub total: usize,
    pub caught_by_flags: usize,
    pub caught_by_density: usize,
    /// Best (lowest) composite rank among entities of this type.
    pub best_rank: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationSummary {
    pub population: usize,
    pub flags: MethodValidation,
    pub density: MethodValidation,
    pub top_k: MethodValidation,
    /// Hits a uniformly random draw of the same size would expect.
    pub top_k_random_expectation: f64,
    pub by_type: Vec<TypeRecovery>,
}

/// Summarise the report against its hidden labels. Per-type recovery is
/// reported for each entry of `types`, normally the configured type list.
pub fn validate(report: &DetectionReport, top_k: usize, types: &[AnomalyType]) -> ValidationSummary {
    let rows = &report.rows;
    let population = rows.len();
    let total_anomalous = rows.iter().filter(|r| r.is_anomalous()).count();

    let flags = MethodValidation::from_selection("iqr_flags", rows.iter().filter(|r| r.flag_suspect), total_anomalous);
    let density = MethodValidation::from_selection("isolation_forest", rows.iter().filter(|r| r.density_suspect), total_anomalous);
    let top = report.top(top_k);
    let top_k = MethodValidation::from_selection("composite_top_k", top.iter(), total_anomalous);

    let base_rate = if population == 0 {
        0.0
    } else {
        total_anomalous as f64 / population as f64
    };

    let by_type = types
        .iter()
        .map(|t| {
            let members: Vec<&ScoredEntity> = rows
                .iter()
                .filter(|r| r.features.anomaly_type == Some(*t))
                .collect();
            TypeRecovery {
                anomaly_type: *t,
                total: members.len(),
                caught_by_flags: members.iter().filter(|r| r.flag_suspect).count(),
                caught_by_density: members.iter().filter(|r| r.density_suspect).count(),
                best_rank: members.iter().map(|r| r.rank).min(),
            }
        })
        .collect();

    ValidationSummary {
        population,
        top_k_random_expectation: base_rate * top.len() as f64,
        flags,
        density,
        top_k,
        by_type,
    }
}
