//! Disease catalog: the static registry of pathologies.
//!
//! Loaded once, validated once, then shared read-only by every
//! component and every trajectory of an ensemble.

use crate::{
    error::{SimError, SimResult},
    types::{DiseaseId, MonthIndex, Specialty},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const MONTHS: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Disease {
    pub id: DiseaseId,
    /// Mean treatment duration in minutes.
    pub mean_duration: f64,
    pub specialty: Specialty,
    /// Relative frequency before seasonality.
    pub prevalence: f64,
    /// Multiplier per month, index 0 = January.
    #[serde(default = "flat_seasonality")]
    pub seasonality: [f64; MONTHS],
}

fn flat_seasonality() -> [f64; MONTHS] {
    [1.0; MONTHS]
}

impl Disease {
    pub fn new(id: &str, mean_duration: f64, specialty: &str, prevalence: f64) -> Self {
        Self {
            id: id.into(),
            mean_duration,
            specialty: specialty.into(),
            prevalence,
            seasonality: flat_seasonality(),
        }
    }

    pub fn with_seasonality(mut self, seasonality: [f64; MONTHS]) -> Self {
        self.seasonality = seasonality;
        self
    }

    fn validate(&self) -> SimResult<()> {
        if !(self.mean_duration.is_finite() && self.mean_duration > 0.0) {
            return Err(SimError::InvalidDisease {
                disease: self.id.clone(),
                reason: format!("mean duration {} must be finite and > 0", self.mean_duration),
            });
        }
        if !(self.prevalence.is_finite() && self.prevalence >= 0.0) {
            return Err(SimError::InvalidDisease {
                disease: self.id.clone(),
                reason: format!("prevalence {} must be finite and >= 0", self.prevalence),
            });
        }
        if self.specialty.is_empty() {
            return Err(SimError::InvalidDisease {
                disease: self.id.clone(),
                reason: "specialty must not be empty".into(),
            });
        }
        if let Some((month, w)) = self
            .seasonality
            .iter()
            .enumerate()
            .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
        {
            return Err(SimError::InvalidSeasonality {
                disease: self.id.clone(),
                reason: format!("weight {w} for month {} must be finite and >= 0", month + 1),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DiseaseCatalog {
    diseases: Vec<Disease>,
}

impl DiseaseCatalog {
    /// Build and validate a catalog. Order is preserved and defines the
    /// sampling order, so it is part of the determinism contract.
    pub fn new(diseases: Vec<Disease>) -> SimResult<Self> {
        let catalog = Self { diseases };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.diseases.is_empty() {
            return Err(SimError::InvalidConfig("disease catalog is empty".into()));
        }
        let mut seen = BTreeSet::new();
        for disease in &self.diseases {
            if !seen.insert(disease.id.as_str()) {
                return Err(SimError::InvalidDisease {
                    disease: disease.id.clone(),
                    reason: "duplicate identifier".into(),
                });
            }
            disease.validate()?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.diseases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diseases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Disease> {
        self.diseases.iter()
    }

    pub fn by_index(&self, index: usize) -> &Disease {
        &self.diseases[index]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.diseases.iter().position(|d| d.id == id)
    }

    pub fn get(&self, id: &str) -> SimResult<&Disease> {
        self.diseases
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| SimError::UnknownDisease(id.to_string()))
    }

    pub fn seasonal_weight(&self, id: &str, month: MonthIndex) -> SimResult<f64> {
        Ok(self.get(id)?.seasonality[month % MONTHS])
    }

    pub fn mean_duration(&self, id: &str) -> SimResult<f64> {
        Ok(self.get(id)?.mean_duration)
    }

    pub fn prevalence(&self, id: &str) -> SimResult<f64> {
        Ok(self.get(id)?.prevalence)
    }

    pub fn specialty_of(&self, id: &str) -> SimResult<&Specialty> {
        Ok(&self.get(id)?.specialty)
    }

    /// Every specialty some disease requires, in sorted order.
    pub fn required_specialties(&self) -> BTreeSet<&str> {
        self.diseases.iter().map(|d| d.specialty.as_str()).collect()
    }

    /// Un-normalized sampling weights for `month`: prevalence × seasonality.
    pub fn month_weights(&self, month: MonthIndex) -> Vec<f64> {
        self.diseases
            .iter()
            .map(|d| d.prevalence * d.seasonality[month % MONTHS])
            .collect()
    }

    /// Normalized probability of each disease in `month`.
    /// Falls back to uniform when every weight is zero.
    pub fn month_distribution(&self, month: MonthIndex) -> Vec<f64> {
        let weights = self.month_weights(month);
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            weights.iter().map(|w| w / total).collect()
        } else {
            vec![1.0 / weights.len() as f64; weights.len()]
        }
    }
}
