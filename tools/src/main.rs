//! sim-runner: headless runner for the hospital emergency-service simulation.
//!
//! Usage:
//!   sim-runner run      --seed 42 --days 30 --db run.db [--config data/hospital_config.json]
//!   sim-runner resume   --run-id run-42-1700000000 --db run.db [--ticks 1440]
//!   sim-runner ensemble --runs 50 --days 30 --seed 7 --threads 8 --db ens.db [--vary]

use anyhow::{bail, Context, Result};
use hospital_core::{
    analysis::{detect_incident_periods, long_wait_treatments, AlertThresholds},
    config::HospitalConfig,
    engine::{verify_determinism, HospitalEngine},
    snapshot::{EngineSnapshot, SNAPSHOT_INTERVAL},
    stats::Metric,
    store::SimStore,
    trajectory::{EnsembleConfig, EnsembleReport, TrajectoryGenerator},
    types::{new_simulation_id, Tick, TICKS_PER_DAY},
};
use std::env;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("run");
    let db = str_arg(&args, "--db").unwrap_or(":memory:");

    println!("Hospital emergency service: sim-runner");
    println!("  command:   {command}");
    println!("  db:        {db}");
    println!();

    let mut store = SimStore::open(db)?;
    store.migrate()?;

    match command {
        "run" => cmd_run(&args, &mut store),
        "resume" => cmd_resume(&args, &mut store),
        "ensemble" => cmd_ensemble(&args, &mut store),
        other => bail!("unknown command '{other}' (expected run, resume or ensemble)"),
    }
}

/// Config from --config (default ./data/hospital_config.json), with
/// --seed, --ticks/--days and --doctors applied on top.
fn load_config(args: &[String]) -> Result<HospitalConfig> {
    let path = str_arg(args, "--config").unwrap_or("./data/hospital_config.json");
    let mut config = HospitalConfig::load(path)?;

    config.seed = parse_arg(args, "--seed", config.seed);
    if let Some(days) = opt_arg::<u64>(args, "--days") {
        config.duration_ticks = days * TICKS_PER_DAY;
    }
    config.duration_ticks = parse_arg(args, "--ticks", config.duration_ticks);
    if let Some(total) = opt_arg::<u32>(args, "--doctors") {
        config = config.with_total_doctors(total)?;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_run(args: &[String], store: &mut SimStore) -> Result<()> {
    let config = Arc::new(load_config(args)?);
    let seed = config.seed;
    let run_id = str_arg(args, "--run-id")
        .map(str::to_string)
        .unwrap_or_else(|| format!("run-{seed}-{}", unix_secs()));

    println!("  run_id:    {run_id}");
    println!("  seed:      {seed}");
    println!("  ticks:     {}", config.duration_ticks);
    println!("  doctors:   {}", config.total_doctors());
    println!();

    if args.iter().any(|a| a == "--verify") {
        let ticks = config.duration_ticks.min(TICKS_PER_DAY);
        verify_determinism(config.clone(), seed, ticks)?;
        println!("  determinism check passed over {ticks} ticks");
    }

    store.insert_run(&run_id, None, None, seed)?;
    let engine = HospitalEngine::new(config, run_id.clone(), seed)?;
    let total_doctors = drive(engine, store)?;
    print_summary(&run_id, total_doctors, store)
}

fn cmd_resume(args: &[String], store: &mut SimStore) -> Result<()> {
    let Some(run_id) = str_arg(args, "--run-id") else {
        bail!("resume needs --run-id");
    };
    let (tick, json) = store
        .latest_snapshot(run_id)?
        .with_context(|| format!("no snapshot stored for run {run_id}"))?;
    let mut snapshot = EngineSnapshot::from_json_for(run_id, &json)?;
    if let Some(extra) = opt_arg::<Tick>(args, "--ticks") {
        snapshot.config.duration_ticks = snapshot.tick + extra;
    }

    println!("  run_id:    {run_id}");
    println!("  from tick: {tick}");
    println!("  to tick:   {}", snapshot.config.duration_ticks);
    println!();

    store.truncate_run_from(run_id, tick)?;
    let engine = HospitalEngine::from_snapshot(snapshot)?;
    let total_doctors = drive(engine, store)?;
    print_summary(run_id, total_doctors, store)
}

/// Run to the end in SNAPSHOT_INTERVAL chunks, persisting each chunk with
/// its snapshot, then persist the rest and close the run.
/// Returns the number of doctors, for the summary.
fn drive(mut engine: HospitalEngine, store: &mut SimStore) -> Result<u32> {
    while !store.run_checkpointed_chunk(&mut engine, SNAPSHOT_INTERVAL)? {}
    let total_doctors = engine.pool().total_doctors();
    store.persist_trajectory(&engine.into_trajectory())?;
    Ok(total_doctors)
}

fn cmd_ensemble(args: &[String], store: &mut SimStore) -> Result<()> {
    let config = load_config(args)?;
    let runs = parse_arg(args, "--runs", 50usize);
    let simulation_id = str_arg(args, "--simulation-id")
        .map(str::to_string)
        .unwrap_or_else(new_simulation_id);

    let mut ensemble = EnsembleConfig::new(simulation_id.clone(), runs, config.seed);
    ensemble.threads = opt_arg(args, "--threads");
    ensemble.vary_runs = args.iter().any(|a| a == "--vary");
    ensemble.record_interval = parse_arg(args, "--record-interval", 60);

    if let Some(days) = opt_arg::<u64>(args, "--warm-start-days") {
        let mut warm = HospitalEngine::new(Arc::new(config.clone()), format!("{simulation_id}-warm"), config.seed)?;
        warm.run_ticks(days * TICKS_PER_DAY)?;
        ensemble.warm_start = Some(warm.snapshot());
    }

    println!("  simulation: {simulation_id}");
    println!("  runs:       {runs}");
    println!("  ticks:      {}", config.duration_ticks);
    println!("  vary runs:  {}", ensemble.vary_runs);
    println!();

    store.insert_simulation(
        &simulation_id,
        config.seed,
        runs,
        &serde_json::to_string(&config)?,
        env!("CARGO_PKG_VERSION"),
    )?;

    let generator = TrajectoryGenerator::new(Arc::new(config), ensemble)?;
    let report = generator.run_with_progress(|index| log::debug!("runner: run {index} done"))?;

    for trajectory in &report.runs {
        store.insert_run(&trajectory.run_id, Some(&simulation_id), trajectory.run_index, trajectory.seed)?;
        store.persist_trajectory(trajectory)?;
    }
    for failure in &report.failures {
        store.insert_run(&failure.run_id, Some(&simulation_id), Some(failure.run_index), failure.seed)?;
        store.mark_run_failed(&failure.run_id, &failure.error)?;
    }
    if let Some(summary) = &report.summary {
        store.persist_ensemble_summary(&simulation_id, summary)?;
    }

    print_ensemble_summary(&report);
    Ok(())
}

/// Summary of a run as persisted, so a resumed run reports its whole series.
fn print_summary(run_id: &str, total_doctors: u32, store: &SimStore) -> Result<()> {
    let states = store.states(run_id)?;
    let Some(last) = states.last() else {
        println!("  (no ticks simulated)");
        return Ok(());
    };
    let annotations = store.event_count(run_id, "sampling_fallback")?
        + store.event_count(run_id, "duration_floored")?;

    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {run_id}");
    println!("  final tick:     {}", last.tick);
    println!("  patients:       {}", last.patients_total);
    println!("  treated:        {}", last.patients_treated);
    println!("  waiting:        {}", last.waiting);
    println!("  in treatment:   {}", last.in_treatment);
    println!("  avg wait (min): {:.1}", last.avg_wait_time);
    println!("  annotations:    {annotations}");

    println!();
    println!("=== TREATED BY SPECIALTY ===");
    for (specialty, count) in store.treated_count_by_specialty(run_id)? {
        let waiting = last.waiting_for(&specialty);
        println!("  {specialty:<14} treated {count:>7}  waiting {waiting:>5}");
    }

    let thresholds = AlertThresholds::default();
    let periods = detect_incident_periods(&states, total_doctors, &thresholds);
    println!();
    println!("=== OVERLOAD PERIODS ({}) ===", periods.len());
    for p in periods.iter().take(10) {
        println!(
            "  ticks {:>7}..{:<7} peak waiting {:>4}  peak occupancy {:.0}%",
            p.start_tick, p.end_tick, p.peak_waiting, p.peak_occupancy * 100.0
        );
    }

    let treatments = store.treatments(run_id)?;
    let long = long_wait_treatments(&treatments, thresholds.long_wait_ticks, 5);
    println!();
    println!("=== LONGEST WAITS ===");
    if long.is_empty() {
        println!("  (none above {} minutes)", thresholds.long_wait_ticks);
    }
    for r in long {
        println!("  patient {:>7} {:<18} waited {:>5} min", r.patient_id, r.disease, r.wait_ticks);
    }
    Ok(())
}

fn print_ensemble_summary(report: &EnsembleReport) {
    println!("=== ENSEMBLE SUMMARY ===");
    println!("  succeeded:  {}/{}", report.succeeded(), report.requested);
    println!("  failed:     {}", report.failures.len());
    println!("  cancelled:  {}", report.cancelled);
    for failure in &report.failures {
        println!("    {} (seed {}): {}", failure.run_id, failure.seed, failure.error);
    }

    let Some(summary) = &report.summary else {
        return;
    };
    println!();
    println!("  {:<18} {:>10} {:>10} {:>10} {:>10} {:>10}  best run", "metric", "mean", "median", "std", "min", "max");
    for metric in Metric::ALL {
        if let Some(m) = summary.metric(metric) {
            let s = &m.final_state;
            println!(
                "  {:<18} {:>10.1} {:>10.1} {:>10.1} {:>10.1} {:>10.1}  {}",
                metric.name(), s.mean, s.median, s.std, s.min, s.max, m.ranking.best_run
            );
        }
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    opt_arg(args, flag).unwrap_or(default)
}

fn opt_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn unix_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
