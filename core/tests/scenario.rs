//! End-to-end scenarios on small hospitals with known behaviour.

use hospital_core::{
    analysis::{detect_incident_periods, long_wait_treatments, AlertThresholds},
    config::HospitalConfig,
    engine::HospitalEngine,
    trajectory::Trajectory,
};
use std::sync::Arc;

fn run(config: HospitalConfig, run_id: &str) -> Trajectory {
    let seed = config.seed;
    let mut engine = HospitalEngine::new(Arc::new(config), run_id.into(), seed).expect("engine");
    engine.run_to_end().expect("run");
    engine.into_trajectory()
}

/// Only cardiology cases arrive: 12/h against two cardiologists with a
/// 30-minute mean is three times their capacity. The cardiology queue
/// builds while the generalists stay idle.
#[test]
fn cardiology_queue_builds_while_generalists_idle() {
    let _ = env_logger::builder().is_test(true).try_init();
    let trajectory = run(HospitalConfig::default_test(), "scenario-cardio");

    assert_eq!(trajectory.states.len(), 600);
    for state in &trajectory.states {
        assert_eq!(state.waiting_for("generalist"), 0, "tick {}: generalist queue", state.tick);
        assert!(state.busy_doctors <= 2, "tick {}: a generalist was assigned", state.tick);
    }
    assert!(trajectory.treatments.iter().all(|r| r.specialty == "cardiologist"));

    let last = trajectory.final_state().expect("final state");
    assert!(
        last.waiting_for("cardiologist") > 20,
        "expected a long cardiology queue, got {}",
        last.waiting_for("cardiologist")
    );
    assert_eq!(last.waiting, last.waiting_for("cardiologist"));
    assert!(last.avg_wait_time > 30.0, "avg wait {:.1}", last.avg_wait_time);

    // Generalists never treat anyone.
    for doctor in trajectory.doctors.iter().filter(|d| d.specialty == "generalist") {
        assert_eq!(doctor.patients_treated, 0);
    }
    let cardio_treated: u64 = trajectory
        .doctors
        .iter()
        .filter(|d| d.specialty == "cardiologist")
        .map(|d| d.patients_treated)
        .sum();
    assert_eq!(cardio_treated, last.patients_treated);
}

#[test]
fn ample_staffing_keeps_waits_near_zero() {
    let mut config = HospitalConfig::default_test();
    config.doctors.insert("cardiologist".into(), 20);
    let trajectory = run(config, "scenario-ample");

    let last = trajectory.final_state().expect("final state");
    assert!(last.avg_wait_time < 1.0, "avg wait {:.2} with 20 cardiologists", last.avg_wait_time);
    assert!(last.waiting <= 2);
}

#[test]
fn overload_is_detected_and_long_waits_listed() {
    let config = HospitalConfig::default_test();
    let total_doctors = config.total_doctors();
    let trajectory = run(config, "scenario-overload");

    let thresholds = AlertThresholds::default();
    let periods = detect_incident_periods(&trajectory.states, total_doctors, &thresholds);
    assert!(!periods.is_empty(), "a permanently overloaded service must raise an alert");
    let last = periods.last().expect("period");
    assert_eq!(last.end_tick, 599, "the overload lasts to the end of the run");
    assert!(last.peak_waiting > thresholds.high_wait_queue);

    let long = long_wait_treatments(&trajectory.treatments, thresholds.long_wait_ticks, 5);
    assert!(!long.is_empty());
    assert!(long.len() <= 5);
    assert!(long.windows(2).all(|w| w[0].wait_ticks >= w[1].wait_ticks));
    assert!(long.iter().all(|r| r.wait_ticks > thresholds.long_wait_ticks));
}

#[test]
fn a_single_tick_run_records_one_state() {
    let mut config = HospitalConfig::default_test();
    config.duration_ticks = 1;
    let trajectory = run(config, "scenario-one");

    assert_eq!(trajectory.states.len(), 1);
    let state = &trajectory.states[0];
    assert_eq!(state.tick, 0);
    assert!(state.is_conserved());
    assert_eq!(state.patients_treated, 0, "nothing can finish in the first minute");
}
