//! Trajectories and the ensemble generator.
//!
//! A trajectory is the complete output of one run. The generator runs the
//! engine N times in parallel on a rayon pool, each run with its own seed
//! derived from (master seed, run index), and aggregates the survivors.
//!
//! RULES:
//!   - Runs share only the read-only configuration and warm-start snapshot.
//!   - A failed run is excluded and reported; it never aborts the ensemble.
//!   - Cancellation is checked before each run starts; in-flight runs finish.

use crate::{
    config::HospitalConfig,
    engine::HospitalEngine,
    error::{SimError, SimResult},
    event::SimEvent,
    rng::derive_run_seed,
    snapshot::EngineSnapshot,
    state::HospitalState,
    stats::EnsembleSummary,
    treatment::TreatmentRecord,
    types::{DoctorId, RunId, SimulationId, Specialty, Tick},
    variation::RunVariation,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorSummary {
    pub doctor_id: DoctorId,
    pub specialty: Specialty,
    pub patients_treated: u64,
}

/// Complete output of one run. Immutable once the run has finished.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trajectory {
    pub run_id: RunId,
    /// Position in the ensemble, for ensemble runs.
    pub run_index: Option<usize>,
    pub seed: u64,
    pub states: Vec<HospitalState>,
    pub treatments: Vec<TreatmentRecord>,
    pub events: Vec<SimEvent>,
    pub doctors: Vec<DoctorSummary>,
    pub variation: RunVariation,
}

impl Trajectory {
    pub fn new(run_id: RunId, seed: u64) -> Self {
        Self {
            run_id,
            run_index: None,
            seed,
            states: Vec::new(),
            treatments: Vec::new(),
            events: Vec::new(),
            doctors: Vec::new(),
            variation: RunVariation::default(),
        }
    }

    pub fn final_state(&self) -> Option<&HospitalState> {
        self.states.last()
    }

    pub fn annotations(&self) -> impl Iterator<Item = &SimEvent> {
        self.events.iter().filter(|e| e.is_annotation())
    }
}

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    pub simulation_id: SimulationId,
    pub runs: usize,
    pub master_seed: u64,
    /// None = rayon's default thread count.
    pub threads: Option<usize>,
    /// Sample a RunVariation per run.
    pub vary_runs: bool,
    /// HospitalState recording interval for every run.
    pub record_interval: Tick,
    /// Every run starts from this state, re-seeded.
    pub warm_start: Option<EngineSnapshot>,
}

impl EnsembleConfig {
    pub fn new(simulation_id: SimulationId, runs: usize, master_seed: u64) -> Self {
        Self {
            simulation_id,
            runs,
            master_seed,
            threads: None,
            vary_runs: false,
            record_interval: 1,
            warm_start: None,
        }
    }

    pub fn run_id(&self, index: usize) -> RunId {
        format!("{}-run{index:03}", self.simulation_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunFailure {
    pub run_index: usize,
    pub run_id: RunId,
    pub seed: u64,
    pub error: String,
}

#[derive(Debug)]
enum RunOutcome {
    Completed(Box<Trajectory>),
    Failed(RunFailure),
    Skipped,
}

#[derive(Debug)]
pub struct EnsembleReport {
    pub simulation_id: SimulationId,
    pub requested: usize,
    /// Successful runs, in run index order.
    pub runs: Vec<Trajectory>,
    pub failures: Vec<RunFailure>,
    /// Runs never started because the ensemble was cancelled.
    pub cancelled: usize,
    /// None when no run succeeded.
    pub summary: Option<EnsembleSummary>,
}

impl EnsembleReport {
    pub fn succeeded(&self) -> usize {
        self.runs.len()
    }

    pub fn is_complete(&self) -> bool {
        self.succeeded() == self.requested
    }
}

pub struct TrajectoryGenerator {
    config: Arc<HospitalConfig>,
    ensemble: EnsembleConfig,
    cancel: CancelToken,
}

impl TrajectoryGenerator {
    /// Configuration errors surface here, before any run starts.
    pub fn new(config: Arc<HospitalConfig>, ensemble: EnsembleConfig) -> SimResult<Self> {
        config.validate()?;
        if ensemble.runs == 0 {
            return Err(SimError::InvalidConfig("an ensemble needs at least one run".into()));
        }
        if let Some(snapshot) = &ensemble.warm_start {
            // Every run restores the snapshot's configuration.
            if snapshot.config != *config {
                return Err(SimError::InvalidConfig(format!(
                    "warm-start snapshot of run {} was taken under a different configuration",
                    snapshot.run_id
                )));
            }
        }
        Ok(Self { config, ensemble, cancel: CancelToken::default() })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn ensemble(&self) -> &EnsembleConfig {
        &self.ensemble
    }

    pub fn run(&self) -> SimResult<EnsembleReport> {
        self.run_with_progress(|_| {})
    }

    /// Run every trajectory; `on_run_done(index)` fires after each run
    /// that was started, whatever its outcome.
    pub fn run_with_progress<F>(&self, on_run_done: F) -> SimResult<EnsembleReport>
    where
        F: Fn(usize) + Sync + Send,
    {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = self.ensemble.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| SimError::Other(anyhow::anyhow!("cannot build thread pool: {e}")))?;

        log::info!(
            "ensemble: {} starting {} runs (master seed {}, {} threads)",
            self.ensemble.simulation_id,
            self.ensemble.runs,
            self.ensemble.master_seed,
            pool.current_num_threads(),
        );

        let outcomes: Vec<RunOutcome> = pool.install(|| {
            (0..self.ensemble.runs)
                .into_par_iter()
                .map(|index| {
                    if self.cancel.is_cancelled() {
                        return RunOutcome::Skipped;
                    }
                    let outcome = self.run_one(index);
                    on_run_done(index);
                    outcome
                })
                .collect()
        });

        let mut runs = Vec::new();
        let mut failures = Vec::new();
        let mut cancelled = 0;
        for outcome in outcomes {
            match outcome {
                RunOutcome::Completed(t) => runs.push(*t),
                RunOutcome::Failed(f) => failures.push(f),
                RunOutcome::Skipped => cancelled += 1,
            }
        }

        let summary = EnsembleSummary::from_trajectories(&runs);
        log::info!(
            "ensemble: {} finished, {}/{} runs succeeded, {} failed, {} cancelled",
            self.ensemble.simulation_id,
            runs.len(),
            self.ensemble.runs,
            failures.len(),
            cancelled,
        );

        Ok(EnsembleReport {
            simulation_id: self.ensemble.simulation_id.clone(),
            requested: self.ensemble.runs,
            runs,
            failures,
            cancelled,
            summary,
        })
    }

    fn run_one(&self, index: usize) -> RunOutcome {
        let seed = derive_run_seed(self.ensemble.master_seed, index as u64);
        let run_id = self.ensemble.run_id(index);
        match self.simulate(run_id.clone(), seed) {
            Ok(mut trajectory) => {
                trajectory.run_index = Some(index);
                log::debug!("ensemble: run {run_id} completed");
                RunOutcome::Completed(Box::new(trajectory))
            }
            Err(e) => {
                log::warn!("ensemble: run {run_id} (seed {seed}) failed: {e}");
                RunOutcome::Failed(RunFailure { run_index: index, run_id, seed, error: e.to_string() })
            }
        }
    }

    fn simulate(&self, run_id: RunId, seed: u64) -> SimResult<Trajectory> {
        let mut engine = match &self.ensemble.warm_start {
            Some(snapshot) => HospitalEngine::warm_start(snapshot.clone(), run_id, seed)?,
            None => HospitalEngine::new(self.config.clone(), run_id, seed)?,
        };
        if self.ensemble.vary_runs {
            engine = engine.with_sampled_variation();
        }
        engine = engine.with_record_interval(self.ensemble.record_interval);
        engine.run_to_end()?;
        Ok(engine.into_trajectory())
    }
}
