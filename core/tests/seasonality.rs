//! Pathology mix and arrival volume follow the calendar.

use hospital_core::{
    config::{ArrivalProfile, HospitalConfig},
    disease::{Disease, DiseaseCatalog},
    engine::HospitalEngine,
    types::TICKS_PER_DAY,
};
use std::sync::Arc;

const JANUARY_END: u64 = 31 * TICKS_PER_DAY;
const FEBRUARY_END: u64 = 59 * TICKS_PER_DAY;

/// `flu` is three times as common as `sprain` in January and equally
/// common in February.
fn seasonal_config() -> HospitalConfig {
    let mut flu_season = [1.0; 12];
    flu_season[0] = 3.0;

    let mut config = HospitalConfig::default_test();
    config.diseases = DiseaseCatalog::new(vec![
        Disease::new("sprain", 5.0, "generalist", 1.0),
        Disease::new("flu", 5.0, "generalist", 1.0).with_seasonality(flu_season),
    ])
    .expect("catalog");
    config.doctors = [("generalist".to_string(), 40)].into();
    config.arrival_rate_per_hour = 30.0;
    config.duration_ticks = FEBRUARY_END;
    config
}

#[test]
fn disease_shares_converge_to_the_monthly_weights() {
    let config = seasonal_config();
    let mut engine = HospitalEngine::new(Arc::new(config), "season".into(), 2024)
        .expect("engine")
        .with_record_interval(60);
    engine.run_to_end().expect("run");

    let in_flight: Vec<(u64, String)> = engine
        .patients_in_flight()
        .map(|p| (p.arrival_tick, p.disease.clone()))
        .collect();
    let trajectory = engine.into_trajectory();
    let arrivals: Vec<(u64, String)> = trajectory
        .treatments
        .iter()
        .map(|r| (r.arrival_tick, r.disease.clone()))
        .chain(in_flight)
        .collect();

    let flu_share = |from: u64, to: u64| {
        let month: Vec<_> = arrivals.iter().filter(|(t, _)| (from..to).contains(t)).collect();
        let flu = month.iter().filter(|(_, d)| d == "flu").count();
        flu as f64 / month.len() as f64
    };

    let january = flu_share(0, JANUARY_END);
    let february = flu_share(JANUARY_END, FEBRUARY_END);
    assert!((january - 0.75).abs() < 0.02, "January flu share {january:.3}, expected 0.75");
    assert!((february - 0.50).abs() < 0.02, "February flu share {february:.3}, expected 0.50");
}

#[test]
fn arrival_profile_shapes_volume_by_hour() {
    let mut config = seasonal_config();
    config.diseases = DiseaseCatalog::new(vec![Disease::new("sprain", 5.0, "generalist", 1.0)])
        .expect("catalog");
    config.duration_ticks = 14 * TICKS_PER_DAY;
    let mut profile = ArrivalProfile::flat();
    // Nights are quiet, evenings busy.
    profile.hour_factors[0..6].fill(0.25);
    profile.hour_factors[18..22].fill(2.0);
    config.arrival_profile = profile;

    let mut engine = HospitalEngine::new(Arc::new(config), "profile".into(), 5)
        .expect("engine")
        .with_record_interval(60);
    engine.run_to_end().expect("run");
    let in_flight: Vec<u64> = engine.patients_in_flight().map(|p| p.arrival_tick).collect();
    let trajectory = engine.into_trajectory();

    let mut per_hour = [0u64; 24];
    for tick in trajectory.treatments.iter().map(|r| r.arrival_tick).chain(in_flight) {
        per_hour[((tick % TICKS_PER_DAY) / 60) as usize] += 1;
    }
    let night: u64 = per_hour[0..6].iter().sum();
    let evening: u64 = per_hour[18..22].iter().sum();

    // Expected: night 6 h × 0.25 × 30/h × 14 days = 630,
    // evening 4 h × 2 × 30/h × 14 days = 3360.
    assert!((500..760).contains(&night), "night arrivals {night}");
    assert!((3100..3620).contains(&evening), "evening arrivals {evening}");
}

#[test]
fn all_zero_month_falls_back_to_uniform_with_annotation() {
    let mut config = HospitalConfig::default_test();
    let mut dormant = [1.0; 12];
    dormant[0] = 0.0;
    config.diseases = DiseaseCatalog::new(vec![
        Disease::new("cardiac_event", 30.0, "cardiologist", 1.0).with_seasonality(dormant)
    ])
    .expect("catalog");
    config.doctors.insert("cardiologist".into(), 10);

    let mut engine = HospitalEngine::new(Arc::new(config), "fallback".into(), 3).expect("engine");
    engine.run_to_end().expect("a zero-weight month is not fatal");
    let trajectory = engine.into_trajectory();

    let last = trajectory.final_state().expect("final state");
    assert!(last.patients_total > 0);
    let fallbacks = trajectory
        .annotations()
        .filter(|e| e.type_name() == "sampling_fallback")
        .count() as u64;
    assert_eq!(fallbacks, last.patients_total, "every January arrival carries a sampling fallback");
    assert!(trajectory.treatments.iter().all(|r| r.disease == "cardiac_event"));
}
