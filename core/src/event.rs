//! The output event stream: everything a run reports besides the
//! per-tick HospitalState series and the treatment records.
//!
//! RULE: Mid-run anomalies are annotated here, never thrown.
//! A long simulation must not be lost to one tick's numerical edge case.

use crate::{
    incident::IncidentKind,
    types::{MonthIndex, PatientId, RunId, Tick},
};
use serde::{Deserialize, Serialize};

/// Every event emitted during simulation.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Engine events ──────────────────────────────
    RunInitialized {
        run_id: RunId,
        seed: u64,
    },
    RunResumed {
        run_id: RunId,
        tick: Tick,
        seed: u64,
    },

    // ── Incident lifecycle ─────────────────────────
    IncidentSampled {
        tick: Tick,
        incident_id: String,
        kind: IncidentKind,
        end_tick: Tick,
    },
    IncidentActivated {
        tick: Tick,
        incident_id: String,
        kind: IncidentKind,
    },
    IncidentExpired {
        tick: Tick,
        incident_id: String,
        kind: IncidentKind,
    },

    // ── Annotations ────────────────────────────────
    /// Every disease weight was zero; the draw used uniform weights.
    SamplingFallback {
        tick: Tick,
        month: MonthIndex,
        patient_id: PatientId,
    },
    /// A treatment duration sampled as exactly zero was raised to one tick.
    DurationFloored {
        tick: Tick,
        patient_id: PatientId,
    },
}

impl SimEvent {
    /// Stable string name of the variant.
    /// Used for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. }    => "run_initialized",
            Self::RunResumed { .. }        => "run_resumed",
            Self::IncidentSampled { .. }   => "incident_sampled",
            Self::IncidentActivated { .. } => "incident_activated",
            Self::IncidentExpired { .. }   => "incident_expired",
            Self::SamplingFallback { .. }  => "sampling_fallback",
            Self::DurationFloored { .. }   => "duration_floored",
        }
    }

    /// Component that emitted the event.
    pub fn source(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. } | Self::RunResumed { .. } => "engine",
            Self::IncidentSampled { .. }
            | Self::IncidentActivated { .. }
            | Self::IncidentExpired { .. } => "incident",
            Self::SamplingFallback { .. } => "arrival",
            Self::DurationFloored { .. } => "treatment",
        }
    }

    pub fn tick(&self) -> Tick {
        match self {
            Self::RunInitialized { .. } => 0,
            Self::RunResumed { tick, .. }
            | Self::IncidentSampled { tick, .. }
            | Self::IncidentActivated { tick, .. }
            | Self::IncidentExpired { tick, .. }
            | Self::SamplingFallback { tick, .. }
            | Self::DurationFloored { tick, .. } => *tick,
        }
    }

    pub fn is_annotation(&self) -> bool {
        matches!(self, Self::SamplingFallback { .. } | Self::DurationFloored { .. })
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub tick: Tick,
    pub source: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized SimEvent
}

impl EventLogEntry {
    pub fn from_event(run_id: &str, event: &SimEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id:         None,
            run_id:     run_id.to_string(),
            tick:       event.tick(),
            source:     event.source().to_string(),
            event_type: event.type_name().to_string(),
            payload:    serde_json::to_string(event)?,
        })
    }
}
