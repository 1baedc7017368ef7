//! Arrival process: patient generation and pathology sampling.
//!
//! Arrival instants are continuous: gaps are exponential with the
//! effective rate, and every instant falling in [tick, tick+1) becomes a
//! patient at `tick`. Nothing is ever dropped, so a coarse tick only
//! batches arrivals together.
//!
//! When the effective rate changes (calendar hour, incident), the pending
//! gap is redrawn from the start of the current tick. The exponential is
//! memoryless, so this is exact.
//!
//! Execution: step 3 of every tick.

use crate::{
    config::{GRANULARITY_WARN_ARRIVALS_PER_TICK, MAX_ARRIVALS_PER_TICK},
    disease::DiseaseCatalog,
    error::{SimError, SimResult},
    incident::Modifiers,
    rng::StreamRng,
    types::{DiseaseId, MonthIndex, PatientId, Tick},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArrivalProcess {
    /// Patients per tick before calendar and incident factors.
    base_rate: f64,
    /// Rate the pending instant was drawn with.
    drawn_rate: f64,
    /// Absolute continuous instant of the next arrival, if any.
    next_arrival: Option<f64>,
    next_patient_id: PatientId,
}

/// Outcome of one pathology draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiseaseDraw {
    pub index: usize,
    /// Every weight was zero and the draw fell back to uniform.
    pub fallback: bool,
}

impl ArrivalProcess {
    /// `rate_per_hour` is λ; `peak_factor` bounds the calendar and
    /// incident modulation and is only used for the granularity check.
    pub fn new(rate_per_hour: f64, peak_factor: f64) -> SimResult<Self> {
        if !(rate_per_hour.is_finite() && rate_per_hour > 0.0) {
            return Err(SimError::InvalidArrivalRate { rate: rate_per_hour });
        }
        let base_rate = rate_per_hour / 60.0;
        let peak = base_rate * peak_factor;
        if peak > GRANULARITY_WARN_ARRIVALS_PER_TICK {
            log::warn!(
                "arrival: peak rate {peak:.3} patients/tick exceeds {GRANULARITY_WARN_ARRIVALS_PER_TICK}; \
                 arrivals will be batched within ticks"
            );
        }
        Ok(Self {
            base_rate,
            drawn_rate: 0.0,
            next_arrival: None,
            next_patient_id: 0,
        })
    }

    pub fn base_rate(&self) -> f64 {
        self.base_rate
    }

    pub fn next_arrival(&self) -> Option<f64> {
        self.next_arrival
    }

    /// Hand out the next patient identifier.
    pub fn allocate_patient_id(&mut self) -> PatientId {
        let id = self.next_patient_id;
        self.next_patient_id += 1;
        id
    }

    /// Drop the pending instant so the next tick redraws it.
    /// Used after a reseed so the new stream decides the next gap.
    pub fn reset_pending(&mut self) {
        self.next_arrival = None;
        self.drawn_rate = 0.0;
    }

    /// Number of arrivals falling in [tick, tick+1) at `rate` patients/tick.
    /// A rate above `MAX_ARRIVALS_PER_TICK` fails the run.
    pub fn arrivals_in_tick(&mut self, tick: Tick, rate: f64, rng: &mut StreamRng) -> SimResult<u64> {
        if !(rate.is_finite() && rate <= MAX_ARRIVALS_PER_TICK) {
            return Err(SimError::ArrivalOverflow { tick, rate });
        }
        let start = tick as f64;
        if rate != self.drawn_rate || self.next_arrival.is_none() {
            self.drawn_rate = rate;
            self.next_arrival = (rate > 0.0).then(|| start + rng.exponential(1.0 / rate));
        }

        let end = start + 1.0;
        let mut count = 0;
        while let Some(at) = self.next_arrival {
            if at >= end {
                break;
            }
            count += 1;
            self.next_arrival = Some(at + rng.exponential(1.0 / rate));
        }
        Ok(count)
    }
}

/// Sampling weight of every disease this month:
/// prevalence × seasonality × incident surges × run-level factors.
pub fn disease_weights(
    catalog: &DiseaseCatalog,
    month: MonthIndex,
    modifiers: &Modifiers,
    run_factors: &BTreeMap<DiseaseId, f64>,
) -> Vec<f64> {
    catalog
        .month_weights(month)
        .into_iter()
        .zip(catalog.iter())
        .map(|(w, d)| {
            w * modifiers.disease_factor(&d.id) * run_factors.get(&d.id).copied().unwrap_or(1.0)
        })
        .collect()
}

/// Draw one pathology index from `weights`.
///
/// All-zero weights fall back to uniform; the caller annotates it.
/// A non-finite weight or total is unrecoverable for the run.
pub fn sample_disease(weights: &[f64], tick: Tick, rng: &mut StreamRng) -> SimResult<DiseaseDraw> {
    if weights.is_empty() {
        return Err(SimError::Sampling { tick, reason: "no diseases to sample".into() });
    }
    if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
        return Err(SimError::Sampling { tick, reason: format!("non-finite disease weight {w}") });
    }
    let total: f64 = weights.iter().sum();
    if !total.is_finite() {
        return Err(SimError::Sampling { tick, reason: format!("non-finite weight total {total}") });
    }
    if total <= 0.0 {
        let index = rng.next_u64_below(weights.len() as u64) as usize;
        return Ok(DiseaseDraw { index, fallback: true });
    }
    Ok(DiseaseDraw { index: rng.weighted_index(weights, total), fallback: false })
}
