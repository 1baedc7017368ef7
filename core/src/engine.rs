//! The hospital engine: advances one emergency service minute by minute.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Incidents    sample new ones, activate and expire
//!   2. Release      free doctors whose busy_until has been reached
//!   3. Arrivals     generate patients and enqueue them
//!   4. Matching     assign queued patients until nothing more fits
//!   5. Record       append the tick's HospitalState to the trajectory
//!
//! RULES:
//!   - The engine owns all run state. No globals, no shared mutation.
//!   - All randomness flows through the engine's RngBank.
//!   - No I/O inside a tick. Persistence happens between chunks of ticks.
//!   - Same configuration + same seed = identical states, patients and events.

use crate::{
    arrival::{self, ArrivalProcess},
    clock::SimClock,
    config::HospitalConfig,
    doctor::DoctorPool,
    error::{SimError, SimResult},
    event::SimEvent,
    incident::{EventInjector, Incident},
    rng::{RngBank, StreamSlot},
    snapshot::EngineSnapshot,
    state::{HospitalState, Patient, RunCounters},
    trajectory::{DoctorSummary, Trajectory},
    treatment,
    types::{PatientId, RunId, Specialty, Tick, TICKS_PER_DAY},
    variation::RunVariation,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct HospitalEngine {
    pub run_id:      RunId,
    pub clock:       SimClock,
    seed:            u64,
    config:          Arc<HospitalConfig>,
    rng_bank:        RngBank,
    arrivals:        ArrivalProcess,
    pool:            DoctorPool,
    injector:        EventInjector,
    patients:        BTreeMap<PatientId, Patient>,
    counters:        RunCounters,
    variation:       RunVariation,
    specialties:     Vec<Specialty>,
    record_interval: Tick,
    last_state:      Option<HospitalState>,
    trajectory:      Trajectory,
}

impl HospitalEngine {
    /// Validate `config` and build a fresh engine at tick 0.
    pub fn new(config: Arc<HospitalConfig>, run_id: RunId, seed: u64) -> SimResult<Self> {
        config.validate()?;
        let arrivals = ArrivalProcess::new(
            config.arrival_rate_per_hour,
            config.peak_arrival_factor(),
        )?;
        let pool = DoctorPool::new(&config.doctors);
        let injector = EventInjector::new(config.incidents.clone(), config.incident_templates.clone());

        log::info!(
            "tick=0 engine: run {run_id} initialized (seed {seed}, {} doctors, {}/h, {} ticks)",
            pool.total_doctors(),
            config.arrival_rate_per_hour,
            config.duration_ticks,
        );

        let mut engine = Self::assemble(
            config,
            run_id,
            seed,
            RngBank::new(seed),
            arrivals,
            pool,
            injector,
        );
        engine.trajectory.events.push(SimEvent::RunInitialized {
            run_id: engine.run_id.clone(),
            seed,
        });
        Ok(engine)
    }

    /// Build from the configuration's own seed.
    pub fn from_config(config: HospitalConfig, run_id: RunId) -> SimResult<Self> {
        let seed = config.seed;
        Self::new(Arc::new(config), run_id, seed)
    }

    /// Continue a run exactly where the snapshot left it.
    pub fn from_snapshot(snapshot: EngineSnapshot) -> SimResult<Self> {
        let run_id = snapshot.run_id.clone();
        let seed = snapshot.seed;
        Self::restore(snapshot, run_id, seed, false)
    }

    /// Start a new run from a shared warm-start snapshot with its own
    /// identity and random streams.
    pub fn warm_start(snapshot: EngineSnapshot, run_id: RunId, seed: u64) -> SimResult<Self> {
        Self::restore(snapshot, run_id, seed, true)
    }

    fn restore(snapshot: EngineSnapshot, run_id: RunId, seed: u64, reseed: bool) -> SimResult<Self> {
        snapshot.config.validate()?;
        let tick = snapshot.tick;
        let mut arrivals = snapshot.arrivals;
        let rng_bank = if reseed {
            // The pending gap came from the old stream.
            arrivals.reset_pending();
            RngBank::new(seed)
        } else {
            snapshot.rng
        };

        let mut engine = Self::assemble(
            Arc::new(snapshot.config),
            run_id,
            seed,
            rng_bank,
            arrivals,
            snapshot.pool,
            snapshot.injector,
        );
        engine.clock = snapshot.clock;
        engine.clock.run_id = engine.run_id.clone();
        engine.clock.pause();
        engine.patients = snapshot.patients;
        engine.counters = snapshot.counters;
        engine.trajectory.variation = snapshot.variation.clone();
        engine.variation = snapshot.variation;

        log::info!("tick={tick} engine: run {} resumed (seed {seed})", engine.run_id);
        engine.trajectory.events.push(SimEvent::RunResumed {
            run_id: engine.run_id.clone(),
            tick,
            seed,
        });
        Ok(engine)
    }

    fn assemble(
        config: Arc<HospitalConfig>,
        run_id: RunId,
        seed: u64,
        rng_bank: RngBank,
        arrivals: ArrivalProcess,
        pool: DoctorPool,
        injector: EventInjector,
    ) -> Self {
        let specialties = pool.specialties().cloned().collect();
        Self {
            clock: SimClock::new(run_id.clone(), config.start_date),
            trajectory: Trajectory::new(run_id.clone(), seed),
            run_id,
            seed,
            config,
            rng_bank,
            arrivals,
            pool,
            injector,
            patients: BTreeMap::new(),
            counters: RunCounters::default(),
            variation: RunVariation::default(),
            specialties,
            record_interval: 1,
            last_state: None,
        }
    }

    /// Apply a per-run parameter variation.
    pub fn with_variation(mut self, variation: RunVariation) -> Self {
        self.trajectory.variation = variation.clone();
        self.variation = variation;
        self
    }

    /// Draw a variation from this run's Variation stream and apply it.
    pub fn with_sampled_variation(mut self) -> Self {
        let variation = RunVariation::sample(
            &self.config.diseases,
            self.rng_bank.stream(StreamSlot::Variation),
        );
        log::debug!("tick={} engine: run {} variation {variation:?}", self.clock.current_tick, self.run_id);
        self.with_variation(variation)
    }

    /// Record a HospitalState every `interval` ticks instead of every tick.
    /// The final tick is always recorded.
    pub fn with_record_interval(mut self, interval: Tick) -> Self {
        self.record_interval = interval.max(1);
        self
    }

    /// Add an incident mid-run. It is validated like a configured one.
    pub fn schedule_incident(&mut self, incident: Incident) -> SimResult<()> {
        incident.validate(&self.config.diseases, &self.config.doctors)?;
        self.injector.schedule(incident);
        Ok(())
    }

    /// Advance one tick. This is the core simulation step.
    /// Returns the events emitted during the tick.
    pub fn tick(&mut self) -> SimResult<Vec<SimEvent>> {
        assert!(!self.clock.paused, "tick() called on paused engine");
        let tick = self.clock.advance();

        // 1. Incidents.
        let mut events = self
            .injector
            .update(tick, self.rng_bank.stream(StreamSlot::Incidents));
        let modifiers = self.injector.modifiers();

        // 2. Release.
        for (doctor, patient_id) in self.pool.release_due(tick) {
            let patient = self.patients.remove(&patient_id).ok_or_else(|| {
                SimError::Other(anyhow::anyhow!("doctor {doctor} released unknown patient {patient_id}"))
            })?;
            let record = treatment::complete_treatment(tick, patient, doctor);
            self.counters.patients_treated += 1;
            self.trajectory.treatments.push(record);
        }

        // 3. Arrivals.
        let calendar = self.clock.calendar_at(tick);
        let rate = self.arrivals.base_rate()
            * self.config.arrival_profile.factor_at(&calendar)
            * modifiers.arrival_factor
            * self.variation.arrival_factor;
        let count = self
            .arrivals
            .arrivals_in_tick(tick, rate, self.rng_bank.stream(StreamSlot::Arrivals))?;
        if count > 0 {
            let catalog = &self.config.diseases;
            let weights = arrival::disease_weights(
                catalog,
                calendar.month,
                modifiers,
                &self.variation.disease_factors,
            );
            for _ in 0..count {
                let draw = arrival::sample_disease(&weights, tick, self.rng_bank.stream(StreamSlot::Disease))?;
                let id = self.arrivals.allocate_patient_id();
                if draw.fallback {
                    log::warn!(
                        "tick={tick} arrival: all disease weights zero in month {}, sampled uniformly",
                        calendar.month + 1
                    );
                    events.push(SimEvent::SamplingFallback { tick, month: calendar.month, patient_id: id });
                }
                let disease = catalog.by_index(draw.index);
                self.pool.enqueue(&disease.specialty, id)?;
                self.patients.insert(
                    id,
                    Patient::arrive(id, disease.id.clone(), disease.specialty.clone(), tick),
                );
                self.counters.patients_total += 1;
            }
        }

        // 4. Matching.
        let treatment_factor = modifiers.treatment_factor * self.variation.treatment_factor;
        for specialty in &self.specialties {
            let disabled = modifiers.disabled(specialty);
            while let Some((doctor, patient_id)) = self.pool.next_assignment(specialty, disabled) {
                let patient = self.patients.get_mut(&patient_id).ok_or_else(|| {
                    SimError::Other(anyhow::anyhow!("queued patient {patient_id} is not in flight"))
                })?;
                let mean = self.config.diseases.mean_duration(&patient.disease)? * treatment_factor;
                let assignment = treatment::start_treatment(
                    tick,
                    patient,
                    doctor,
                    mean,
                    self.rng_bank.stream(StreamSlot::Treatment),
                );
                self.pool.occupy(doctor, patient_id, assignment.busy_until)?;
                self.counters.record_start(assignment.wait);
                if let Some(annotation) = assignment.annotation {
                    log::debug!("tick={tick} treatment: zero duration for patient {patient_id} floored to 1");
                    events.push(annotation);
                }
            }
        }

        // 5. Record.
        let state = HospitalState {
            tick,
            patients_total: self.counters.patients_total,
            patients_treated: self.counters.patients_treated,
            waiting: self.pool.waiting_total(),
            waiting_by_specialty: self.pool.waiting_by_specialty(),
            in_treatment: self.pool.busy_count() as u64,
            busy_doctors: self.pool.busy_count(),
            avg_wait_time: self.counters.avg_wait_time(),
            active_incidents: self.injector.active_ids(),
        };
        let last_tick = tick + 1 >= self.config.duration_ticks;
        if tick % self.record_interval == 0 || last_tick {
            self.trajectory.states.push(state.clone());
        }
        if tick > 0 && tick % TICKS_PER_DAY == 0 {
            log::debug!(
                "tick={tick} engine: day {} total={} treated={} waiting={} busy={}",
                tick / TICKS_PER_DAY,
                state.patients_total,
                state.patients_treated,
                state.waiting,
                state.busy_doctors,
            );
        }
        self.last_state = Some(state);

        self.trajectory.events.extend(events.iter().cloned());
        Ok(events)
    }

    /// Run up to n ticks, stopping at the configured duration.
    pub fn run_ticks(&mut self, n: u64) -> SimResult<()> {
        self.clock.resume();
        for _ in 0..n {
            if self.is_finished() {
                break;
            }
            if let Err(e) = self.tick() {
                self.clock.pause();
                return Err(e);
            }
        }
        self.clock.pause();
        Ok(())
    }

    /// Run every remaining tick.
    pub fn run_to_end(&mut self) -> SimResult<()> {
        let remaining = self.remaining_ticks();
        self.run_ticks(remaining)?;
        if let Some(s) = &self.last_state {
            log::info!(
                "tick={} engine: run {} finished (total={} treated={} waiting={} avg_wait={:.1})",
                s.tick, self.run_id, s.patients_total, s.patients_treated, s.waiting, s.avg_wait_time
            );
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.clock.current_tick >= self.config.duration_ticks
    }

    pub fn remaining_ticks(&self) -> Tick {
        self.config.duration_ticks.saturating_sub(self.clock.current_tick)
    }

    /// Capture the full resumable state.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            run_id:    self.run_id.clone(),
            seed:      self.seed,
            tick:      self.clock.current_tick,
            clock:     self.clock.clone(),
            config:    (*self.config).clone(),
            rng:       self.rng_bank.clone(),
            arrivals:  self.arrivals.clone(),
            pool:      self.pool.clone(),
            patients:  self.patients.clone(),
            counters:  self.counters.clone(),
            injector:  self.injector.clone(),
            variation: self.variation.clone(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &HospitalConfig {
        &self.config
    }

    pub fn pool(&self) -> &DoctorPool {
        &self.pool
    }

    pub fn injector(&self) -> &EventInjector {
        &self.injector
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    pub fn variation(&self) -> &RunVariation {
        &self.variation
    }

    /// Patients currently waiting or in treatment, by id.
    pub fn patients_in_flight(&self) -> impl Iterator<Item = &Patient> {
        self.patients.values()
    }

    /// State at the end of the most recent tick.
    pub fn last_state(&self) -> Option<&HospitalState> {
        self.last_state.as_ref()
    }

    /// Output accumulated so far.
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Take the output recorded since the last drain, leaving the buffers
    /// empty. Per-doctor totals stay with `into_trajectory`.
    pub fn drain_output(&mut self) -> Trajectory {
        let mut chunk = Trajectory::new(self.run_id.clone(), self.seed);
        chunk.run_index = self.trajectory.run_index;
        chunk.variation = self.trajectory.variation.clone();
        chunk.states = std::mem::take(&mut self.trajectory.states);
        chunk.treatments = std::mem::take(&mut self.trajectory.treatments);
        chunk.events = std::mem::take(&mut self.trajectory.events);
        chunk
    }

    /// Finish the run's output, adding per-doctor totals.
    pub fn into_trajectory(mut self) -> Trajectory {
        self.trajectory.doctors = self
            .pool
            .doctors()
            .iter()
            .map(|d| DoctorSummary {
                doctor_id: d.id,
                specialty: d.specialty.clone(),
                patients_treated: d.patients_treated,
            })
            .collect();
        self.trajectory
    }
}

/// Run two engines from the same configuration and seed for `ticks`
/// ticks and fail on the first tick whose state differs.
pub fn verify_determinism(config: Arc<HospitalConfig>, seed: u64, ticks: Tick) -> SimResult<()> {
    let mut a = HospitalEngine::new(config.clone(), "determinism-a".into(), seed)?;
    let mut b = HospitalEngine::new(config, "determinism-b".into(), seed)?;
    a.clock.resume();
    b.clock.resume();
    for _ in 0..ticks {
        if a.is_finished() {
            break;
        }
        let events_a = a.tick()?;
        let events_b = b.tick()?;
        if a.last_state != b.last_state || events_a != events_b {
            let tick = a.clock.current_tick - 1;
            log::warn!("tick={tick} engine: determinism check diverged");
            return Err(SimError::DeterminismViolation { tick });
        }
    }
    Ok(())
}
