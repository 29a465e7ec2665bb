//! Lloyd's K-means with k-means++ seeding and multiple restarts.
//!
//! Cluster ids are arbitrary. Two runs with different seeds may label
//! the same partition differently; only within-run comparisons hold.

use crate::rng::LabRng;

#[derive(Debug, Clone, PartialEq)]
pub struct KmeansResult {
    /// Cluster id per input row.
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Sum of squared distances from each point to its centroid.
    pub inertia: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone)]
pub struct KMeans {
    pub n_clusters: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub tol: f64,
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
        }
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Run `n_init` seeded restarts and keep the lowest inertia.
    /// Ties keep the earlier restart.
    ///
    /// Callers guarantee `1 <= n_clusters <= x.len()`.
    pub fn fit(&self, x: &[Vec<f64>], rng: &mut LabRng) -> KmeansResult {
        assert!(
            self.n_clusters >= 1 && self.n_clusters <= x.len(),
            "kmeans: need 1 <= k ({}) <= n ({})",
            self.n_clusters,
            x.len()
        );

        let mut best: Option<KmeansResult> = None;
        for restart in 0..self.n_init {
            let result = self.fit_once(x, rng);
            log::debug!("kmeans restart {restart}: inertia {:.4}", result.inertia);
            if best.as_ref().map_or(true, |b| result.inertia < b.inertia) {
                best = Some(result);
            }
        }
        // n_init >= 1, so at least one restart ran.
        best.unwrap_or_else(|| self.fit_once(x, rng))
    }

    fn fit_once(&self, x: &[Vec<f64>], rng: &mut LabRng) -> KmeansResult {
        let k = self.n_clusters;
        let dim = x[0].len();
        let mut centroids = kmeans_pp_init(x, k, rng);
        let mut labels = vec![usize::MAX; x.len()];
        let mut iterations = 0;

        for _ in 0..self.max_iter {
            iterations += 1;

            let mut changed = false;
            for (i, point) in x.iter().enumerate() {
                let nearest = nearest_centroid(point, &centroids);
                if labels[i] != nearest {
                    labels[i] = nearest;
                    changed = true;
                }
            }

            let mut sums = vec![vec![0.0; dim]; k];
            let mut counts = vec![0usize; k];
            for (point, &c) in x.iter().zip(&labels) {
                counts[c] += 1;
                for (s, v) in sums[c].iter_mut().zip(point) {
                    *s += v;
                }
            }
            let new_centroids: Vec<Vec<f64>> = sums
                .into_iter()
                .zip(&counts)
                .zip(&centroids)
                .map(|((sum, &count), old)| {
                    if count == 0 {
                        // Empty cluster keeps its previous centroid.
                        old.clone()
                    } else {
                        sum.into_iter().map(|s| s / count as f64).collect()
                    }
                })
                .collect();

            let shift: f64 = centroids
                .iter()
                .zip(&new_centroids)
                .map(|(a, b)| squared_euclidean(a, b))
                .sum();
            centroids = new_centroids;

            if !changed || shift < self.tol {
                break;
            }
        }

        // Final assignment against the settled centroids.
        for (i, point) in x.iter().enumerate() {
            labels[i] = nearest_centroid(point, &centroids);
        }
        let inertia = x
            .iter()
            .zip(&labels)
            .map(|(p, &c)| squared_euclidean(p, &centroids[c]))
            .sum();

        KmeansResult {
            labels,
            centroids,
            inertia,
            iterations,
        }
    }
}

/// K-means++: first centroid uniform, the rest proportional to D².
fn kmeans_pp_init(x: &[Vec<f64>], k: usize, rng: &mut LabRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(x[rng.below(x.len())].clone());

    while centroids.len() < k {
        let dists: Vec<f64> = x
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| squared_euclidean(p, c))
                    .fold(f64::MAX, f64::min)
            })
            .collect();
        let total: f64 = dists.iter().sum();

        let chosen = if total <= 0.0 {
            rng.below(x.len())
        } else {
            let r = rng.next_f64() * total;
            let mut cumulative = 0.0;
            let mut chosen = x.len() - 1;
            for (i, d) in dists.iter().enumerate() {
                cumulative += d;
                if cumulative > r {
                    chosen = i;
                    break;
                }
            }
            chosen
        };
        centroids.push(x[chosen].clone());
    }
    centroids
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::MAX;
    for (c, centroid) in centroids.iter().enumerate() {
        let d = squared_euclidean(point, centroid);
        if d < best_dist {
            best_dist = d;
            best = c;
        }
    }
    best
}

pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
