//! Snapshot serialization: full engine state to/from JSON.
//!
//! The runner persists one every SNAPSHOT_INTERVAL ticks. A snapshot
//! holds everything needed to continue a run without replaying from
//! tick 0: doctors, queues, in-flight patients, counters, the pending
//! arrival instant, incident states, RNG stream positions and the clock.
//! Completed patients are not kept; they already live in the trajectory.

use crate::{
    arrival::ArrivalProcess,
    clock::SimClock,
    config::HospitalConfig,
    doctor::DoctorPool,
    error::{SimError, SimResult},
    incident::EventInjector,
    rng::RngBank,
    state::{Patient, RunCounters},
    types::{PatientId, RunId, Tick, TICKS_PER_DAY},
    variation::RunVariation,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SNAPSHOT_INTERVAL: Tick = TICKS_PER_DAY; // daily

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSnapshot {
    pub run_id: RunId,
    pub seed: u64,
    /// The next tick the restored engine will process.
    pub tick: Tick,
    pub clock: SimClock,
    pub config: HospitalConfig,
    pub rng: RngBank,
    pub arrivals: ArrivalProcess,
    pub pool: DoctorPool,
    pub patients: BTreeMap<PatientId, Patient>,
    pub counters: RunCounters,
    pub injector: EventInjector,
    pub variation: RunVariation,
}

impl EngineSnapshot {
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse and check that the snapshot belongs to `run_id`.
    pub fn from_json_for(run_id: &str, json: &str) -> SimResult<Self> {
        let snapshot = Self::from_json(json)?;
        if snapshot.run_id != run_id {
            return Err(SimError::SnapshotMismatch {
                expected: run_id.to_string(),
                found: snapshot.run_id,
            });
        }
        Ok(snapshot)
    }
}
