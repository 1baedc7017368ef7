use crate::types::{DiseaseId, Specialty, Tick};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Configuration errors (raised before any tick runs) ─────

    #[error("Invalid arrival rate {rate}: must be a finite value > 0 patients/hour")]
    InvalidArrivalRate { rate: f64 },

    #[error("Specialty '{specialty}' is required by disease '{disease}' but has no doctors")]
    MissingSpecialty { specialty: Specialty, disease: DiseaseId },

    #[error("Invalid disease '{disease}': {reason}")]
    InvalidDisease { disease: DiseaseId, reason: String },

    #[error("Invalid seasonality for disease '{disease}': {reason}")]
    InvalidSeasonality { disease: DiseaseId, reason: String },

    #[error("Invalid incident '{incident}': {reason}")]
    InvalidIncident { incident: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Runtime faults ─────────────────────────────────────────

    #[error("Unknown disease '{0}'")]
    UnknownDisease(DiseaseId),

    #[error("Sampling failed at tick {tick}: {reason}")]
    Sampling { tick: Tick, reason: String },

    #[error("Arrival rate {rate} patients/tick at tick {tick} exceeds the supported ceiling")]
    ArrivalOverflow { tick: Tick, rate: f64 },

    #[error("Determinism violation: state diverged at tick {tick}")]
    DeterminismViolation { tick: Tick },

    #[error("Snapshot is for run '{found}', expected '{expected}'")]
    SnapshotMismatch { expected: String, found: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    /// True for errors that are raised by configuration validation.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArrivalRate { .. }
                | Self::MissingSpecialty { .. }
                | Self::InvalidDisease { .. }
                | Self::InvalidSeasonality { .. }
                | Self::InvalidIncident { .. }
                | Self::InvalidConfig(_)
        )
    }
}

pub type SimResult<T> = Result<T, SimError>;
