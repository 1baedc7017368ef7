//! Per-run records: patients, run counters, and the per-tick HospitalState.

use crate::types::{DiseaseId, DoctorId, PatientId, Specialty, Tick};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: PatientId,
    pub disease: DiseaseId,
    pub specialty: Specialty,
    pub arrival_tick: Tick,
    pub enqueue_tick: Tick,
    pub treatment_start: Option<Tick>,
    pub treatment_end: Option<Tick>,
    pub doctor: Option<DoctorId>,
}

impl Patient {
    /// Arrival and enqueue happen in the same tick.
    pub fn arrive(id: PatientId, disease: DiseaseId, specialty: Specialty, tick: Tick) -> Self {
        Self {
            id,
            disease,
            specialty,
            arrival_tick: tick,
            enqueue_tick: tick,
            treatment_start: None,
            treatment_end: None,
            doctor: None,
        }
    }

    /// `start - arrival`, once treatment has started.
    pub fn wait_time(&self) -> Option<Tick> {
        self.treatment_start.map(|start| start - self.arrival_tick)
    }

    pub fn is_waiting(&self) -> bool {
        self.treatment_start.is_none()
    }
}

/// Cumulative counters carried across ticks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunCounters {
    pub patients_total: u64,
    pub patients_treated: u64,
    pub treatments_started: u64,
    pub total_wait: u64,
}

impl RunCounters {
    pub fn record_start(&mut self, wait: Tick) {
        self.treatments_started += 1;
        self.total_wait += wait;
    }

    /// Mean wait of every patient whose treatment has started; 0 before the first.
    pub fn avg_wait_time(&self) -> f64 {
        if self.treatments_started == 0 {
            0.0
        } else {
            self.total_wait as f64 / self.treatments_started as f64
        }
    }
}

/// Observable hospital state at the end of one tick.
///
/// Invariant: `patients_total == patients_treated + waiting + in_treatment`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HospitalState {
    pub tick: Tick,
    pub patients_total: u64,
    pub patients_treated: u64,
    pub waiting: u64,
    pub waiting_by_specialty: BTreeMap<Specialty, u64>,
    pub in_treatment: u64,
    pub busy_doctors: u32,
    pub avg_wait_time: f64,
    pub active_incidents: Vec<String>,
}

impl HospitalState {
    pub fn is_conserved(&self) -> bool {
        self.patients_total == self.patients_treated + self.waiting + self.in_treatment
    }

    /// Busy doctors over staffed doctors.
    pub fn occupancy(&self, total_doctors: u32) -> f64 {
        if total_doctors == 0 {
            0.0
        } else {
            self.busy_doctors as f64 / total_doctors as f64
        }
    }

    pub fn waiting_for(&self, specialty: &str) -> u64 {
        self.waiting_by_specialty.get(specialty).copied().unwrap_or(0)
    }
}
