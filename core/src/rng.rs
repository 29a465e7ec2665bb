//! Deterministic random number generation.
//!
//! RULE: Nothing in the lab may call any platform RNG.
//! All randomness flows through LabRng instances derived
//! from the single master seed on the LabConfig.
//!
//! Each stream is seeded deterministically from
//! (master_seed, stream slot, unit index). This means:
//!   - Adding a new stream never changes existing streams.
//!   - Each entity's draws are reproducible in isolation, so generation
//!     can be split across threads without changing the output.

use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_pcg::Pcg64Mcg;

/// Attempts before truncated_normal gives up on rejection sampling.
const TRUNCATION_ATTEMPTS: usize = 1_000;

/// A named, deterministic RNG for a single stream.
pub struct LabRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl LabRng {
    /// Create an RNG from the master seed and a stable stream index.
    /// The index must never change once assigned.
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        use rand::RngCore;
        self.inner.next_u64()
    }

    /// Roll a usize in [0, n).
    pub fn below(&mut self, n: usize) -> usize {
        assert!(n > 0, "n must be > 0");
        self.inner.gen_range(0..n)
    }

    /// Uniform float in [lo, hi). Returns `lo` when the range is empty.
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        lo + self.next_f64() * (hi - lo)
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    pub fn standard_normal(&mut self) -> f64 {
        self.inner.sample(StandardNormal)
    }

    /// Normal(mean, std) restricted to [lo, hi].
    ///
    /// Rejection sampling against the untruncated normal. If the window
    /// sits far in a tail and every attempt misses, the draw falls back
    /// to a uniform value inside the window so the support holds.
    pub fn truncated_normal(&mut self, mean: f64, std: f64, lo: f64, hi: f64) -> f64 {
        if std <= 0.0 {
            return mean.clamp(lo, hi);
        }
        for _ in 0..TRUNCATION_ATTEMPTS {
            let x = mean + std * self.standard_normal();
            if (lo..=hi).contains(&x) {
                return x;
            }
        }
        self.uniform(lo, hi)
    }

    /// Pick one element uniformly.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.below(items.len())]
    }

    /// Fisher-Yates shuffle, consuming draws from this stream only.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i + 1);
            items.swap(i, j);
        }
    }
}

/// All RNG streams for a single run, indexed by stable slot.
#[derive(Debug, Clone, Copy)]
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn for_stream(&self, slot: StreamSlot) -> LabRng {
        LabRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }

    /// A stream for one logical unit (an entity, an entity-period pair,
    /// a restart) within a slot. The unit index is mixed through
    /// splitmix64 so neighbouring units get unrelated seeds.
    pub fn for_unit(&self, slot: StreamSlot, unit: u64) -> LabRng {
        let sub_seed = self.master_seed ^ splitmix64(unit.wrapping_add(1));
        LabRng::new(sub_seed, slot as u64).with_name(slot.name())
    }
}

/// Pack an entity ordinal and a period index into one unit index.
pub fn entity_period_unit(entity_ordinal: usize, period: usize) -> u64 {
    ((entity_ordinal as u64) << 20) | (period as u64 & 0xF_FFFF)
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries; only append.
/// Reordering changes every stream's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Roster = 0,
    Baseline = 1,
    Pattern = 2,
    Forest = 3,
    Cluster = 4,
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Roster => "roster",
            Self::Baseline => "baseline",
            Self::Pattern => "pattern",
            Self::Forest => "forest",
            Self::Cluster => "cluster",
        }
    }
}
