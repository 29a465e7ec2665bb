//! Column standardisation (zero mean, unit variance).
//!
//! Each detector fits its own scaler; fitted state is never shared.

use crate::stats;

#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit on a row-major matrix. A column with no spread gets scale 1.0,
    /// so it standardises to all zeros.
    pub fn fit(x: &[Vec<f64>]) -> Self {
        let n_features = x.first().map_or(0, |r| r.len());
        let mut means = Vec::with_capacity(n_features);
        let mut scales = Vec::with_capacity(n_features);
        for j in 0..n_features {
            let col: Vec<f64> = x.iter().map(|r| r[j]).collect();
            let sd = stats::population_std(&col);
            means.push(stats::mean(&col));
            scales.push(if sd == 0.0 { 1.0 } else { sd });
        }
        Self { means, scales }
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> Vec<Vec<f64>> {
        x.iter()
            .map(|row| {
                row.iter()
                    .zip(self.means.iter().zip(&self.scales))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect()
            })
            .collect()
    }

    pub fn fit_transform(x: &[Vec<f64>]) -> Vec<Vec<f64>> {
        Self::fit(x).transform(x)
    }
}
