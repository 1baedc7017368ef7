//! Event injector: epidemics, disasters, weather, staff shortages.
//!
//! This component:
//!   1. Samples new incidents from templates once per simulated day
//!   2. Moves incidents through SCHEDULED → ACTIVE → EXPIRED
//!   3. Folds the active incidents into one set of rate/capacity modifiers
//!
//! Incidents are pure modifiers. They never touch Patient or Doctor
//! records; the arrival process, the doctor pool and the treatment
//! resolver read the folded modifiers instead.
//!
//! Execution: step 1 of every tick.

use crate::{
    config::MAX_ARRIVAL_SURGE,
    disease::DiseaseCatalog,
    error::{SimError, SimResult},
    event::SimEvent,
    rng::StreamRng,
    types::{DiseaseId, Specialty, Tick, TICKS_PER_DAY},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type tag of an incident.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Epidemic,
    Disaster,
    Weather,
    StaffShortage,
    Custom,
}

impl IncidentKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Epidemic      => "epidemic",
            Self::Disaster      => "disaster",
            Self::Weather       => "weather",
            Self::StaffShortage => "staff_shortage",
            Self::Custom        => "custom",
        }
    }
}

/// One parameter of an incident. Closed set: the engine handles every kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum IncidentEffect {
    /// Multiply the arrival rate.
    ArrivalSurge { factor: f64 },
    /// Take `count` doctors of `specialty` out of new assignments.
    CapacityReduction { specialty: Specialty, count: u32 },
    /// Multiply one disease's sampling weight.
    DiseaseSurge { disease: DiseaseId, factor: f64 },
    /// Multiply mean treatment durations.
    TreatmentSlowdown { factor: f64 },
}

impl IncidentEffect {
    fn validate(
        &self,
        incident: &str,
        catalog: &DiseaseCatalog,
        staffing: &BTreeMap<Specialty, u32>,
    ) -> SimResult<()> {
        let invalid = |reason: String| SimError::InvalidIncident {
            incident: incident.to_string(),
            reason,
        };
        match self {
            Self::ArrivalSurge { factor }
            | Self::TreatmentSlowdown { factor }
            | Self::DiseaseSurge { factor, .. }
                if !(factor.is_finite() && *factor >= 0.0) =>
            {
                Err(invalid(format!("factor {factor} must be finite and >= 0")))
            }
            Self::ArrivalSurge { factor } if *factor > MAX_ARRIVAL_SURGE => {
                Err(invalid(format!("arrival surge {factor} exceeds {MAX_ARRIVAL_SURGE}")))
            }
            Self::TreatmentSlowdown { factor } if *factor == 0.0 => {
                Err(invalid("treatment factor must be > 0".into()))
            }
            Self::DiseaseSurge { disease, .. } if catalog.index_of(disease).is_none() => {
                Err(invalid(format!("unknown disease '{disease}'")))
            }
            Self::CapacityReduction { specialty, .. } if !staffing.contains_key(specialty) => {
                Err(invalid(format!("no doctors configured for specialty '{specialty}'")))
            }
            Self::CapacityReduction { count: 0, .. } => {
                Err(invalid("capacity reduction count must be > 0".into()))
            }
            _ => Ok(()),
        }
    }
}

/// An injected incident, pre-planned in configuration or sampled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Incident {
    pub id: String,
    pub kind: IncidentKind,
    pub start_tick: Tick,
    /// Exclusive: the incident is active while start <= tick < end.
    pub end_tick: Tick,
    pub effects: Vec<IncidentEffect>,
}

impl Incident {
    pub fn new(id: &str, kind: IncidentKind, start_tick: Tick, duration: Tick) -> Self {
        Self {
            id: id.into(),
            kind,
            start_tick,
            end_tick: start_tick + duration,
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: IncidentEffect) -> Self {
        self.effects.push(effect);
        self
    }

    /// More arrivals, more of one disease, slightly longer treatments.
    pub fn epidemic(id: &str, disease: &str, start_tick: Tick, duration: Tick) -> Self {
        Self::new(id, IncidentKind::Epidemic, start_tick, duration)
            .with_effect(IncidentEffect::ArrivalSurge { factor: 1.5 })
            .with_effect(IncidentEffect::DiseaseSurge { disease: disease.into(), factor: 3.0 })
            .with_effect(IncidentEffect::TreatmentSlowdown { factor: 1.2 })
    }

    /// Mass-casualty event: arrivals double, trauma cases dominate.
    pub fn disaster(id: &str, trauma_disease: &str, start_tick: Tick, duration: Tick) -> Self {
        Self::new(id, IncidentKind::Disaster, start_tick, duration)
            .with_effect(IncidentEffect::ArrivalSurge { factor: 2.0 })
            .with_effect(IncidentEffect::DiseaseSurge { disease: trauma_disease.into(), factor: 4.0 })
    }

    /// Storms keep people at home.
    pub fn storm(id: &str, start_tick: Tick, duration: Tick) -> Self {
        Self::new(id, IncidentKind::Weather, start_tick, duration)
            .with_effect(IncidentEffect::ArrivalSurge { factor: 0.8 })
    }

    pub fn heat_wave(id: &str, start_tick: Tick, duration: Tick) -> Self {
        Self::new(id, IncidentKind::Weather, start_tick, duration)
            .with_effect(IncidentEffect::ArrivalSurge { factor: 1.2 })
    }

    pub fn cold_snap(id: &str, viral_disease: &str, start_tick: Tick, duration: Tick) -> Self {
        Self::new(id, IncidentKind::Weather, start_tick, duration)
            .with_effect(IncidentEffect::DiseaseSurge { disease: viral_disease.into(), factor: 2.0 })
    }

    pub fn staff_shortage(id: &str, specialty: &str, count: u32, start_tick: Tick, duration: Tick) -> Self {
        Self::new(id, IncidentKind::StaffShortage, start_tick, duration)
            .with_effect(IncidentEffect::CapacityReduction { specialty: specialty.into(), count })
    }

    pub fn is_active_at(&self, tick: Tick) -> bool {
        self.start_tick <= tick && tick < self.end_tick
    }

    pub fn validate(
        &self,
        catalog: &DiseaseCatalog,
        staffing: &BTreeMap<Specialty, u32>,
    ) -> SimResult<()> {
        if self.end_tick <= self.start_tick {
            return Err(SimError::InvalidIncident {
                incident: self.id.clone(),
                reason: format!("end tick {} must be after start tick {}", self.end_tick, self.start_tick),
            });
        }
        for effect in &self.effects {
            effect.validate(&self.id, catalog, staffing)?;
        }
        Ok(())
    }
}

/// A recurring incident shape the injector samples from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentTemplate {
    pub kind: IncidentKind,
    /// Mean days between occurrences.
    pub mean_days_between: f64,
    pub duration_ticks: Tick,
    pub effects: Vec<IncidentEffect>,
}

impl IncidentTemplate {
    pub fn validate(
        &self,
        catalog: &DiseaseCatalog,
        staffing: &BTreeMap<Specialty, u32>,
    ) -> SimResult<()> {
        let name = format!("{}-template", self.kind.name());
        if !(self.mean_days_between.is_finite() && self.mean_days_between > 0.0) {
            return Err(SimError::InvalidIncident {
                incident: name,
                reason: format!("mean days between {} must be finite and > 0", self.mean_days_between),
            });
        }
        if self.duration_ticks == 0 {
            return Err(SimError::InvalidIncident {
                incident: name,
                reason: "duration must be > 0".into(),
            });
        }
        for effect in &self.effects {
            effect.validate(&name, catalog, staffing)?;
        }
        Ok(())
    }

    /// Daily occurrence probability: 1 - exp(-1/mean_days).
    pub fn daily_probability(&self) -> f64 {
        1.0 - (-1.0 / self.mean_days_between).exp()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Scheduled,
    Active,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedIncident {
    pub incident: Incident,
    pub status: IncidentStatus,
}

/// The folded effect of every active incident.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Modifiers {
    pub arrival_factor: f64,
    pub treatment_factor: f64,
    pub disease_factors: BTreeMap<DiseaseId, f64>,
    pub disabled_doctors: BTreeMap<Specialty, u32>,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self {
            arrival_factor: 1.0,
            treatment_factor: 1.0,
            disease_factors: BTreeMap::new(),
            disabled_doctors: BTreeMap::new(),
        }
    }
}

impl Modifiers {
    pub fn disease_factor(&self, disease: &str) -> f64 {
        self.disease_factors.get(disease).copied().unwrap_or(1.0)
    }

    pub fn disabled(&self, specialty: &str) -> u32 {
        self.disabled_doctors.get(specialty).copied().unwrap_or(0)
    }

    /// Concurrent incidents compose multiplicatively; capacity
    /// reductions add up (the pool saturates them at its size).
    fn fold<'a>(incidents: impl Iterator<Item = &'a Incident>) -> Self {
        let mut m = Self::default();
        for incident in incidents {
            for effect in &incident.effects {
                match effect {
                    IncidentEffect::ArrivalSurge { factor } => m.arrival_factor *= factor,
                    IncidentEffect::TreatmentSlowdown { factor } => m.treatment_factor *= factor,
                    IncidentEffect::DiseaseSurge { disease, factor } => {
                        *m.disease_factors.entry(disease.clone()).or_insert(1.0) *= factor;
                    }
                    IncidentEffect::CapacityReduction { specialty, count } => {
                        *m.disabled_doctors.entry(specialty.clone()).or_insert(0) += count;
                    }
                }
            }
        }
        m
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventInjector {
    incidents: Vec<TrackedIncident>,
    templates: Vec<IncidentTemplate>,
    sampled_count: u64,
    modifiers: Modifiers,
}

impl EventInjector {
    pub fn new(scheduled: Vec<Incident>, templates: Vec<IncidentTemplate>) -> Self {
        let mut incidents: Vec<TrackedIncident> = scheduled
            .into_iter()
            .map(|incident| TrackedIncident { incident, status: IncidentStatus::Scheduled })
            .collect();
        incidents.sort_by_key(|t| t.incident.start_tick);
        Self {
            incidents,
            templates,
            sampled_count: 0,
            modifiers: Modifiers::default(),
        }
    }

    pub fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    pub fn incidents(&self) -> &[TrackedIncident] {
        &self.incidents
    }

    /// Identifiers of the currently active incidents, in schedule order.
    pub fn active_ids(&self) -> Vec<String> {
        self.incidents
            .iter()
            .filter(|t| t.status == IncidentStatus::Active)
            .map(|t| t.incident.id.clone())
            .collect()
    }

    /// Add an incident mid-run. It follows the same state machine.
    pub fn schedule(&mut self, incident: Incident) {
        self.incidents.push(TrackedIncident { incident, status: IncidentStatus::Scheduled });
    }

    /// Step 1 of the tick: sample, then activate and expire.
    pub fn update(&mut self, tick: Tick, rng: &mut StreamRng) -> Vec<SimEvent> {
        let mut events = Vec::new();

        if tick > 0 && tick % TICKS_PER_DAY == 0 {
            events.extend(self.sample_incidents(tick, rng));
        }

        let mut changed = false;
        for tracked in &mut self.incidents {
            let incident = &tracked.incident;
            match tracked.status {
                IncidentStatus::Scheduled if tick >= incident.end_tick => {
                    // Window already passed (e.g. resumed past it): never active.
                    tracked.status = IncidentStatus::Expired;
                }
                IncidentStatus::Scheduled if tick >= incident.start_tick => {
                    tracked.status = IncidentStatus::Active;
                    changed = true;
                    log::info!(
                        "tick={tick} incident: {} ({}) active until tick {}",
                        incident.id, incident.kind.name(), incident.end_tick
                    );
                    events.push(SimEvent::IncidentActivated {
                        tick,
                        incident_id: incident.id.clone(),
                        kind: incident.kind,
                    });
                }
                IncidentStatus::Active if tick >= incident.end_tick => {
                    tracked.status = IncidentStatus::Expired;
                    changed = true;
                    log::info!("tick={tick} incident: {} expired", incident.id);
                    events.push(SimEvent::IncidentExpired {
                        tick,
                        incident_id: incident.id.clone(),
                        kind: incident.kind,
                    });
                }
                _ => {}
            }
        }

        if changed {
            self.modifiers = Modifiers::fold(
                self.incidents
                    .iter()
                    .filter(|t| t.status == IncidentStatus::Active)
                    .map(|t| &t.incident),
            );
        }

        events
    }

    fn sample_incidents(&mut self, tick: Tick, rng: &mut StreamRng) -> Vec<SimEvent> {
        let mut events = Vec::new();
        let mut fresh = Vec::new();

        for template in &self.templates {
            if !rng.chance(template.daily_probability()) {
                continue;
            }
            self.sampled_count += 1;
            let incident = Incident {
                id: format!("{}-s{}", template.kind.name(), self.sampled_count),
                kind: template.kind,
                start_tick: tick,
                end_tick: tick + template.duration_ticks,
                effects: template.effects.clone(),
            };
            log::debug!("tick={tick} incident: sampled {}", incident.id);
            events.push(SimEvent::IncidentSampled {
                tick,
                incident_id: incident.id.clone(),
                kind: incident.kind,
                end_tick: incident.end_tick,
            });
            fresh.push(incident);
        }

        for incident in fresh {
            self.schedule(incident);
        }
        events
    }
}
