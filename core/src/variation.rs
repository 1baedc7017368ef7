//! Per-run parameter variation for ensembles.
//!
//! Each trajectory may perturb its own rates so the ensemble covers a
//! spread of plausible conditions, not only sampling noise. Drawn from the
//! run's Variation stream, so the ensemble stays reproducible.

use crate::{disease::DiseaseCatalog, rng::StreamRng, types::DiseaseId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunVariation {
    pub arrival_factor: f64,
    pub treatment_factor: f64,
    pub disease_factors: BTreeMap<DiseaseId, f64>,
}

impl Default for RunVariation {
    fn default() -> Self {
        Self {
            arrival_factor: 1.0,
            treatment_factor: 1.0,
            disease_factors: BTreeMap::new(),
        }
    }
}

impl RunVariation {
    pub fn sample(catalog: &DiseaseCatalog, rng: &mut StreamRng) -> Self {
        let mut v = Self {
            treatment_factor: rng.uniform(0.9, 1.2),
            ..Self::default()
        };

        // Outbreak of one disease.
        if rng.chance(0.3) {
            let d = pick(catalog, rng);
            let factor = rng.uniform(1.5, 3.0);
            *v.disease_factors.entry(d).or_insert(1.0) *= factor;
        }
        // One disease unusually rare.
        if rng.chance(0.2) {
            let d = pick(catalog, rng);
            let factor = rng.uniform(0.3, 0.7);
            *v.disease_factors.entry(d).or_insert(1.0) *= factor;
        }
        if rng.chance(0.4) {
            v.arrival_factor = rng.uniform(0.7, 1.4);
        }
        v
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }
}

fn pick(catalog: &DiseaseCatalog, rng: &mut StreamRng) -> DiseaseId {
    let i = rng.next_u64_below(catalog.len() as u64) as usize;
    catalog.by_index(i).id.clone()
}
