//! Treatment resolver: duration sampling, assignment and completion.
//!
//! Durations are exponential minutes rounded up to whole ticks. The
//! exponential's scale is chosen so the rounded duration keeps the
//! configured mean (× factor). A sample of exactly zero becomes one tick
//! and is annotated.

use crate::{
    event::SimEvent,
    rng::StreamRng,
    state::Patient,
    types::{DiseaseId, DoctorId, PatientId, Specialty, Tick},
};
use serde::{Deserialize, Serialize};

/// One completed visit, as emitted to the output stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreatmentRecord {
    pub patient_id: PatientId,
    pub disease: DiseaseId,
    pub specialty: Specialty,
    pub doctor_id: DoctorId,
    pub arrival_tick: Tick,
    pub start_tick: Tick,
    pub end_tick: Tick,
    pub wait_ticks: Tick,
    pub duration_ticks: Tick,
}

/// Result of `start_treatment`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub busy_until: Tick,
    pub wait: Tick,
    pub annotation: Option<SimEvent>,
}

/// Scale of the exponential whose ceiling has mean `mean`.
///
/// ceil(Exp(θ)) is geometric on 1, 2, ... with mean 1 / (1 - e^(-1/θ)),
/// so θ = -1 / ln(1 - 1/mean). None when `mean <= 1`: no visit is
/// shorter than one tick.
pub fn ceiling_scale(mean: f64) -> Option<f64> {
    (mean > 1.0).then(|| -1.0 / (-1.0 / mean).ln_1p())
}

/// Round a sampled duration up to whole ticks. The flag is set when a
/// zero sample was floored to one tick.
pub fn duration_from_minutes(minutes: f64) -> (Tick, bool) {
    if minutes <= 0.0 {
        (1, true)
    } else {
        (minutes.ceil() as Tick, false)
    }
}

/// Sample a duration in whole ticks with mean `mean`.
pub fn sample_duration(mean: f64, rng: &mut StreamRng) -> (Tick, bool) {
    match ceiling_scale(mean) {
        Some(scale) => duration_from_minutes(rng.exponential(scale)),
        None => (1, false),
    }
}

/// Start `patient` with `doctor` at `tick`. The caller commits the doctor.
pub fn start_treatment(
    tick: Tick,
    patient: &mut Patient,
    doctor: DoctorId,
    mean: f64,
    rng: &mut StreamRng,
) -> Assignment {
    begin_visit(tick, patient, doctor, sample_duration(mean, rng))
}

/// Start a visit with an already sampled `(duration, floored)` pair.
pub fn begin_visit(
    tick: Tick,
    patient: &mut Patient,
    doctor: DoctorId,
    (duration, floored): (Tick, bool),
) -> Assignment {
    patient.treatment_start = Some(tick);
    patient.doctor = Some(doctor);

    let annotation = floored.then(|| SimEvent::DurationFloored { tick, patient_id: patient.id });
    Assignment {
        busy_until: tick.saturating_add(duration),
        wait: tick - patient.arrival_tick,
        annotation,
    }
}

/// Close the visit at `tick` and build its record.
pub fn complete_treatment(tick: Tick, mut patient: Patient, doctor: DoctorId) -> TreatmentRecord {
    patient.treatment_end = Some(tick);
    let start = patient.treatment_start.unwrap_or(tick);
    TreatmentRecord {
        patient_id: patient.id,
        wait_ticks: start - patient.arrival_tick,
        duration_ticks: tick - start,
        disease: patient.disease,
        specialty: patient.specialty,
        doctor_id: doctor,
        arrival_tick: patient.arrival_tick,
        start_tick: start,
        end_tick: tick,
    }
}
