//! Ensemble generation: many seeded runs, aggregated.

use hospital_core::{
    config::HospitalConfig,
    engine::HospitalEngine,
    error::SimError,
    incident::{IncidentEffect, IncidentKind, IncidentTemplate},
    rng::derive_run_seed,
    stats::Metric,
    trajectory::{EnsembleConfig, TrajectoryGenerator},
    types::TICKS_PER_DAY,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The standard test hospital with enough cardiologists to be stable.
fn stable_config(days: u64) -> HospitalConfig {
    let mut config = HospitalConfig::default_test();
    config.doctors.insert("cardiologist".into(), 8);
    config.duration_ticks = days * TICKS_PER_DAY;
    config
}

#[test]
fn fifty_runs_over_thirty_days_aggregate() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut ensemble = EnsembleConfig::new("ens-50".into(), 50, 2025);
    ensemble.record_interval = 60;
    let generator =
        TrajectoryGenerator::new(Arc::new(stable_config(30)), ensemble).expect("generator");
    let report = generator.run().expect("ensemble");

    assert!(report.is_complete(), "failures: {:?}", report.failures);
    assert_eq!(report.cancelled, 0);
    let summary = report.summary.as_ref().expect("summary");
    assert_eq!(summary.runs, 50);

    let ids: BTreeSet<_> = report.runs.iter().map(|t| t.run_id.clone()).collect();
    let seeds: BTreeSet<_> = report.runs.iter().map(|t| t.seed).collect();
    assert_eq!(ids.len(), 50);
    assert_eq!(seeds.len(), 50, "every run has its own seed");
    for (i, run) in report.runs.iter().enumerate() {
        assert_eq!(run.run_index, Some(i));
        assert_eq!(run.seed, derive_run_seed(2025, i as u64));
        // 30 days at one state per hour, plus the final tick.
        assert_eq!(run.states.len(), 721);
        assert_eq!(run.final_state().map(|s| s.tick), Some(30 * TICKS_PER_DAY - 1));
    }

    let totals = summary.metric(Metric::PatientsTotal).expect("patients_total");
    let s = &totals.final_state;
    assert!(s.min < s.median && s.median < s.max, "{s:?}");
    assert!(s.min <= s.mean && s.mean <= s.max);
    assert!(s.std > 0.0);
    // 12/h over 30 days.
    assert!((s.mean - 8_640.0).abs() < 200.0, "mean total {}", s.mean);

    // Best avg_wait is the lowest final value, and the ranking names that run.
    let waits = summary.metric(Metric::AvgWaitTime).expect("avg_wait_time");
    assert_eq!(waits.ranking.best_value, waits.final_state.min);
    assert_eq!(waits.ranking.worst_value, waits.final_state.max);
    let best = report
        .runs
        .iter()
        .find(|t| t.run_id == waits.ranking.best_run)
        .expect("best run is in the report");
    assert_eq!(best.final_state().map(|s| s.avg_wait_time), Some(waits.final_state.min));

    // Throughput is ranked the other way round.
    let treated = summary.metric(Metric::PatientsTreated).expect("patients_treated");
    assert_eq!(treated.ranking.best_value, treated.final_state.max);

    assert_eq!(totals.percentiles.len(), 721);
    for band in &totals.percentiles {
        assert!(band.p25 <= band.p50 && band.p50 <= band.p75, "tick {}: {band:?}", band.tick);
    }
}

/// Two concurrent 1e200 surges overflow the disease weights to infinity,
/// which is unrecoverable for the run. The surge is sampled daily with
/// p = 0.5, so some runs see two overlapping surges and others do not.
#[test]
fn failed_runs_are_reported_and_excluded() {
    let mut config = stable_config(4);
    config.incident_templates.push(IncidentTemplate {
        kind: IncidentKind::Epidemic,
        mean_days_between: 1.0 / std::f64::consts::LN_2,
        duration_ticks: 10 * TICKS_PER_DAY,
        effects: vec![IncidentEffect::DiseaseSurge { disease: "cardiac_event".into(), factor: 1e200 }],
    });

    let mut ensemble = EnsembleConfig::new("ens-fail".into(), 40, 11);
    ensemble.record_interval = 60;
    let report = TrajectoryGenerator::new(Arc::new(config), ensemble)
        .expect("generator")
        .run()
        .expect("partial failure is not an ensemble error");

    assert!(!report.failures.is_empty(), "no run drew two surges");
    assert!(report.succeeded() > 0, "every run drew two surges");
    assert_eq!(report.succeeded() + report.failures.len(), 40);
    assert!(!report.is_complete());

    let summary = report.summary.as_ref().expect("summary over the survivors");
    assert_eq!(summary.runs, report.succeeded());

    let failed: BTreeSet<_> = report.failures.iter().map(|f| f.run_id.as_str()).collect();
    assert!(report.runs.iter().all(|t| !failed.contains(t.run_id.as_str())));
    for failure in &report.failures {
        assert_eq!(failure.seed, derive_run_seed(11, failure.run_index as u64));
        assert!(failure.error.contains("non-finite"), "{}", failure.error);
    }
}

#[test]
fn cancelling_before_start_skips_every_run() {
    let generator = TrajectoryGenerator::new(
        Arc::new(HospitalConfig::default_test()),
        EnsembleConfig::new("ens-cancel".into(), 8, 1),
    )
    .expect("generator");
    generator.cancel_token().cancel();
    let report = generator.run().expect("cancelled ensemble");

    assert_eq!(report.cancelled, 8);
    assert_eq!(report.succeeded(), 0);
    assert!(report.failures.is_empty());
    assert!(report.summary.is_none());
}

#[test]
fn cancelling_mid_ensemble_keeps_finished_runs() {
    let mut ensemble = EnsembleConfig::new("ens-cancel-mid".into(), 20, 3);
    ensemble.threads = Some(1);
    let generator =
        TrajectoryGenerator::new(Arc::new(HospitalConfig::default_test()), ensemble).expect("generator");
    let token = generator.cancel_token();

    let report = generator
        .run_with_progress(|_| token.cancel())
        .expect("cancelled ensemble");

    assert!(report.succeeded() >= 1);
    assert!(report.cancelled > 0);
    assert_eq!(report.succeeded() + report.cancelled, 20);
    assert_eq!(report.summary.as_ref().map(|s| s.runs), Some(report.succeeded()));
}

#[test]
fn zero_runs_is_a_configuration_error() {
    let result = TrajectoryGenerator::new(
        Arc::new(HospitalConfig::default_test()),
        EnsembleConfig::new("ens-empty".into(), 0, 1),
    );
    assert!(matches!(result, Err(SimError::InvalidConfig(_))));
}

#[test]
fn invalid_configuration_fails_before_any_run() {
    let mut config = HospitalConfig::default_test();
    config.arrival_rate_per_hour = -1.0;
    let result = TrajectoryGenerator::new(Arc::new(config), EnsembleConfig::new("ens-bad".into(), 5, 1));
    assert!(matches!(result, Err(SimError::InvalidArrivalRate { .. })));
}

#[test]
fn warm_start_runs_share_the_initial_state_and_then_diverge() {
    let config = stable_config(1);
    let mut warm = HospitalEngine::new(Arc::new(config.clone()), "warm".into(), 77).expect("engine");
    warm.run_ticks(300).expect("warm-up");
    let snapshot = warm.snapshot();
    let warm_total = snapshot.counters.patients_total;

    let mut ensemble = EnsembleConfig::new("ens-warm".into(), 4, 5);
    ensemble.warm_start = Some(snapshot);
    let report = TrajectoryGenerator::new(Arc::new(config), ensemble)
        .expect("generator")
        .run()
        .expect("ensemble");

    assert!(report.is_complete());
    for run in &report.runs {
        let first = &run.states[0];
        assert_eq!(first.tick, 300, "{} did not start from the warm state", run.run_id);
        assert!(first.patients_total >= warm_total);
        assert_eq!(run.final_state().map(|s| s.tick), Some(TICKS_PER_DAY - 1));
    }
    let finals: BTreeSet<u64> = report
        .runs
        .iter()
        .filter_map(|t| t.final_state().map(|s| s.patients_total))
        .collect();
    assert!(finals.len() > 1, "warm-started runs did not diverge");
}

#[test]
fn warm_start_under_another_configuration_is_rejected() {
    let mut warm = HospitalEngine::new(Arc::new(stable_config(1)), "warm".into(), 77).expect("engine");
    warm.run_ticks(60).expect("warm-up");

    let mut ensemble = EnsembleConfig::new("ens-warm-mismatch".into(), 2, 5);
    ensemble.warm_start = Some(warm.snapshot());
    let result = TrajectoryGenerator::new(Arc::new(stable_config(2)), ensemble);
    assert!(matches!(result, Err(SimError::InvalidConfig(_))));
}

#[test]
fn varied_runs_record_their_variation() {
    let mut ensemble = EnsembleConfig::new("ens-vary".into(), 5, 8);
    ensemble.vary_runs = true;
    ensemble.record_interval = 60;
    let report = TrajectoryGenerator::new(Arc::new(stable_config(1)), ensemble)
        .expect("generator")
        .run()
        .expect("ensemble");

    assert!(report.is_complete());
    assert!(report.runs.iter().all(|t| !t.variation.is_neutral()));
}
