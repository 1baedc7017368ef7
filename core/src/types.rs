//! Shared primitive types used across the entire simulation.

/// A simulation tick. One tick = one simulated minute.
pub type Tick = u64;

/// Minutes in one simulated day.
pub const TICKS_PER_DAY: Tick = 24 * 60;

/// Monotonic patient identifier, unique within a run.
pub type PatientId = u64;

/// Doctor identifier, stable for the whole run.
pub type DoctorId = u32;

/// A doctor's area of practice, e.g. "cardiologist".
pub type Specialty = String;

/// Stable pathology identifier, e.g. "chest_pain".
pub type DiseaseId = String;

/// The canonical run identifier.
pub type RunId = String;

/// Identifier grouping a base run and its trajectories.
pub type SimulationId = String;

/// Fresh random simulation identifier. Not part of any seeded stream.
pub fn new_simulation_id() -> SimulationId {
    uuid::Uuid::new_v4().to_string()
}

/// Month index (0 = January) used for seasonality lookups.
pub type MonthIndex = usize;
