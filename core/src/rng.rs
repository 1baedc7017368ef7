//! Deterministic random number generation.
//!
//! RULE: Nothing in the simulation may call any platform RNG.
//! All randomness flows through StreamRng instances derived
//! from the run seed, which itself derives from (master seed, run index).
//!
//! Each concern gets its own persistent stream, seeded deterministically
//! from (run_seed XOR slot_index * golden-ratio). This means:
//!   - Adding a new stream never changes existing streams.
//!   - Arrival timing does not shift when treatment sampling changes.
//!   - The whole bank serializes into a snapshot, so a resumed engine
//!     continues every stream from its exact position.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// Derive the seed of one ensemble run from the master seed.
/// splitmix64 finalizer, so neighbouring indices give unrelated seeds.
pub fn derive_run_seed(master_seed: u64, run_index: u64) -> u64 {
    let mut z = master_seed ^ run_index.wrapping_add(1).wrapping_mul(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// A named, deterministic RNG stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamRng {
    pub name: String,
    inner: Pcg64Mcg,
}

impl StreamRng {
    /// Create a stream from a seed and a stable slot index.
    /// The index must never change once assigned.
    pub fn new(seed: u64, slot_index: u64) -> Self {
        let derived_seed = seed ^ (slot_index.wrapping_mul(GOLDEN_GAMMA));
        Self {
            name: "unnamed".into(),
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform float in [low, high).
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    /// Sample an exponential distribution with the given mean.
    /// Inverse transform on (0, 1]; returns exactly 0.0 only when the
    /// underlying uniform roll is 0.
    pub fn exponential(&mut self, mean: f64) -> f64 {
        let u = 1.0 - self.next_f64(); // (0, 1]
        -u.ln() * mean
    }

    /// Pick an index with probability proportional to `weights`.
    /// Callers guarantee a finite, positive total.
    pub fn weighted_index(&mut self, weights: &[f64], total: f64) -> usize {
        let roll = self.next_f64() * total;
        let mut cumulative = 0.0;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w;
            if roll < cumulative {
                return i;
            }
        }
        // Rounding can leave roll == total; fall back to the last positive weight.
        weights.iter().rposition(|w| *w > 0.0).unwrap_or(weights.len() - 1)
    }
}

/// All RNG streams for a single run, indexed by stable slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RngBank {
    seed:      u64,
    arrivals:  StreamRng,
    disease:   StreamRng,
    treatment: StreamRng,
    incidents: StreamRng,
    variation: StreamRng,
}

impl RngBank {
    pub fn new(seed: u64) -> Self {
        let stream = |slot: StreamSlot| StreamRng::new(seed, slot as u64).with_name(slot.name());
        Self {
            seed,
            arrivals:  stream(StreamSlot::Arrivals),
            disease:   stream(StreamSlot::Disease),
            treatment: stream(StreamSlot::Treatment),
            incidents: stream(StreamSlot::Incidents),
            variation: stream(StreamSlot::Variation),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn stream(&mut self, slot: StreamSlot) -> &mut StreamRng {
        match slot {
            StreamSlot::Arrivals  => &mut self.arrivals,
            StreamSlot::Disease   => &mut self.disease,
            StreamSlot::Treatment => &mut self.treatment,
            StreamSlot::Incidents => &mut self.incidents,
            StreamSlot::Variation => &mut self.variation,
        }
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries, only append.
/// Reordering changes every stream's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Arrivals  = 0,
    Disease   = 1,
    Treatment = 2,
    Incidents = 3,
    Variation = 4,
    // Add new streams here, append only.
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Arrivals  => "arrivals",
            Self::Disease   => "disease",
            Self::Treatment => "treatment",
            Self::Incidents => "incidents",
            Self::Variation => "variation",
        }
    }
}
