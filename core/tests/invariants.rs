//! Properties every run must hold, whatever the seed.
//!
//! Conservation, monotone counters, capacity, one patient per doctor,
//! FIFO per specialty.

use hospital_core::{
    config::HospitalConfig,
    disease::{Disease, DiseaseCatalog},
    engine::HospitalEngine,
    trajectory::Trajectory,
    types::DoctorId,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Two specialties, three pathologies, moderately loaded.
fn mixed_config() -> HospitalConfig {
    let mut config = HospitalConfig::default_test();
    config.diseases = DiseaseCatalog::new(vec![
        Disease::new("cardiac_event", 30.0, "cardiologist", 1.0),
        Disease::new("fracture", 45.0, "generalist", 2.0),
        Disease::new("flu", 15.0, "generalist", 3.0),
    ])
    .expect("catalog");
    config.arrival_rate_per_hour = 15.0;
    config.duration_ticks = 2_000;
    config
}

fn run(config: HospitalConfig, seed: u64) -> (Trajectory, BTreeMap<DoctorId, String>) {
    let mut engine =
        HospitalEngine::new(Arc::new(config), format!("inv-{seed}"), seed).expect("engine");
    engine.run_to_end().expect("run");
    let specialties = engine
        .pool()
        .doctors()
        .iter()
        .map(|d| (d.id, d.specialty.clone()))
        .collect();
    (engine.into_trajectory(), specialties)
}

#[test]
fn patients_are_conserved_every_tick() {
    for seed in [1, 2, 3] {
        let (trajectory, _) = run(mixed_config(), seed);
        assert_eq!(trajectory.states.len(), 2_000);
        for state in &trajectory.states {
            assert!(
                state.is_conserved(),
                "seed {seed} tick {}: total {} != treated {} + waiting {} + in treatment {}",
                state.tick, state.patients_total, state.patients_treated, state.waiting, state.in_treatment
            );
            let by_specialty: u64 = state.waiting_by_specialty.values().sum();
            assert_eq!(by_specialty, state.waiting, "tick {}: per-specialty waiting does not add up", state.tick);
            assert_eq!(state.in_treatment, state.busy_doctors as u64);
        }
    }
}

#[test]
fn cumulative_counters_never_decrease() {
    let (trajectory, _) = run(mixed_config(), 5);
    for pair in trajectory.states.windows(2) {
        assert_eq!(pair[1].tick, pair[0].tick + 1);
        assert!(pair[1].patients_total >= pair[0].patients_total);
        assert!(pair[1].patients_treated >= pair[0].patients_treated);
    }
}

#[test]
fn busy_doctors_never_exceed_staffing() {
    let config = mixed_config();
    let staffed = config.total_doctors();
    let (trajectory, _) = run(config, 9);
    assert!(trajectory.states.iter().all(|s| s.busy_doctors <= staffed));
}

#[test]
fn doctors_treat_one_patient_at_a_time_within_their_specialty() {
    let (trajectory, specialties) = run(mixed_config(), 13);
    assert!(!trajectory.treatments.is_empty());

    let mut by_doctor: BTreeMap<DoctorId, Vec<(u64, u64)>> = BTreeMap::new();
    for r in &trajectory.treatments {
        assert_eq!(
            specialties.get(&r.doctor_id),
            Some(&r.specialty),
            "patient {} treated by doctor {} of the wrong specialty",
            r.patient_id, r.doctor_id
        );
        assert!(r.duration_ticks >= 1, "patient {} had a zero-length treatment", r.patient_id);
        assert_eq!(r.end_tick - r.start_tick, r.duration_ticks);
        assert_eq!(r.start_tick - r.arrival_tick, r.wait_ticks);
        by_doctor.entry(r.doctor_id).or_default().push((r.start_tick, r.end_tick));
    }

    for (doctor, mut spans) in by_doctor {
        spans.sort();
        for pair in spans.windows(2) {
            assert!(
                pair[1].0 >= pair[0].1,
                "doctor {doctor} double booked: {:?} overlaps {:?}",
                pair[0], pair[1]
            );
        }
    }
}

#[test]
fn queues_are_first_come_first_served_per_specialty() {
    let (trajectory, _) = run(mixed_config(), 21);

    let mut by_specialty: BTreeMap<&str, Vec<(u64, u64)>> = BTreeMap::new();
    for r in &trajectory.treatments {
        by_specialty
            .entry(r.specialty.as_str())
            .or_default()
            .push((r.patient_id, r.start_tick));
    }

    for (specialty, mut started) in by_specialty {
        // Patient ids follow arrival order.
        started.sort();
        for pair in started.windows(2) {
            assert!(
                pair[1].1 >= pair[0].1,
                "{specialty}: patient {} started at {} before earlier patient {} at {}",
                pair[1].0, pair[1].1, pair[0].0, pair[0].1
            );
        }
    }
}

#[test]
fn average_wait_matches_started_treatments() {
    let config = mixed_config();
    let mut engine = HospitalEngine::new(Arc::new(config), "inv-avg".into(), 3).expect("engine");
    engine.run_to_end().expect("run");

    let in_progress: Vec<u64> = engine
        .patients_in_flight()
        .filter_map(|p| p.wait_time())
        .collect();
    let last = engine.last_state().cloned().expect("final state");
    let trajectory = engine.into_trajectory();

    let waits: Vec<u64> = trajectory
        .treatments
        .iter()
        .map(|r| r.wait_ticks)
        .chain(in_progress)
        .collect();
    let expected = waits.iter().sum::<u64>() as f64 / waits.len() as f64;
    assert!((last.avg_wait_time - expected).abs() < 1e-9);
}
