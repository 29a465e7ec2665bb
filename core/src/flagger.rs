//! Univariate robust-range (IQR) outlier flagger.
//!
//! Each detection feature is judged on its own. An entity's flag count
//! is the number of features on which it falls outside the fences; it is
//! a suspect once the count reaches the configured threshold.

use crate::{
    features::{FeatureKind, FeatureVector},
    stats,
};
use serde::{Deserialize, Serialize};

/// Fences computed for one feature over the population.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureFence {
    pub kind: FeatureKind,
    pub q1: f64,
    pub q3: f64,
    pub median: f64,
    pub lower: f64,
    pub upper: f64,
}

impl FeatureFence {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Zero width: anything off the median is an outlier.
    /// Otherwise strictly outside [lower, upper].
    pub fn is_outlier(&self, value: f64) -> bool {
        if self.iqr() == 0.0 {
            value != self.median
        } else {
            value < self.lower || value > self.upper
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlagResult {
    /// Per entity, per feature (same order as `fences`).
    pub flags: Vec<Vec<bool>>,
    pub flag_counts: Vec<usize>,
    pub suspects: Vec<bool>,
    pub fences: Vec<FeatureFence>,
}

pub struct OutlierFlagger {
    features: Vec<FeatureKind>,
    multiplier: f64,
    suspect_threshold: usize,
}

impl OutlierFlagger {
    pub fn new(features: Vec<FeatureKind>, multiplier: f64, suspect_threshold: usize) -> Self {
        Self {
            features,
            multiplier,
            suspect_threshold,
        }
    }

    pub fn fence(&self, kind: FeatureKind, values: &[f64]) -> FeatureFence {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let q1 = stats::quantile_sorted(&sorted, 0.25);
        let q3 = stats::quantile_sorted(&sorted, 0.75);
        let median = stats::quantile_sorted(&sorted, 0.5);
        let iqr = q3 - q1;
        FeatureFence {
            kind,
            q1,
            q3,
            median,
            lower: q1 - self.multiplier * iqr,
            upper: q3 + self.multiplier * iqr,
        }
    }

    pub fn flag(&self, rows: &[FeatureVector]) -> FlagResult {
        let fences: Vec<FeatureFence> = self
            .features
            .iter()
            .map(|kind| {
                let values: Vec<f64> = rows.iter().map(|r| r.get(*kind)).collect();
                let fence = self.fence(*kind, &values);
                if fence.iqr() == 0.0 {
                    log::warn!(
                        "feature {} has zero IQR; flagging values off the median {}",
                        kind.name(),
                        fence.median
                    );
                }
                fence
            })
            .collect();

        let flags: Vec<Vec<bool>> = rows
            .iter()
            .map(|r| fences.iter().map(|f| f.is_outlier(r.get(f.kind))).collect())
            .collect();
        let flag_counts: Vec<usize> = flags
            .iter()
            .map(|row| row.iter().filter(|f| **f).count())
            .collect();
        let suspects = flag_counts
            .iter()
            .map(|c| *c >= self.suspect_threshold)
            .collect();

        FlagResult {
            flags,
            flag_counts,
            suspects,
            fences,
        }
    }
}
