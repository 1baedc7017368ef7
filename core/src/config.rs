use crate::{
    clock::CalendarPoint,
    disease::{Disease, DiseaseCatalog, MONTHS},
    error::{SimError, SimResult},
    incident::{Incident, IncidentEffect, IncidentTemplate},
    types::{Specialty, Tick},
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Above this many expected arrivals per tick the one-minute tick is too
/// coarse for `dt << 1/λ`; arrivals still batch correctly but we warn.
pub const GRANULARITY_WARN_ARRIVALS_PER_TICK: f64 = 0.25;

/// Hard ceiling on the effective arrival rate. Configurations whose
/// calendar peak exceeds it are rejected; a tick that reaches it through
/// stacked incidents fails the run.
pub const MAX_ARRIVALS_PER_TICK: f64 = 1_000.0;

/// Largest ArrivalSurge factor a single incident may carry.
pub const MAX_ARRIVAL_SURGE: f64 = 20.0;

/// Calendar modulation of the arrival rate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArrivalProfile {
    /// Index 0 = 00:00–00:59.
    pub hour_factors: [f64; 24],
    /// Index 0 = Monday.
    pub day_factors: [f64; 7],
    /// Index 0 = January.
    pub month_factors: [f64; MONTHS],
    #[serde(default)]
    pub special_dates: Vec<SpecialDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecialDate {
    pub name: String,
    /// 1 = January.
    pub month: u32,
    pub day: u32,
    pub factor: f64,
}

impl Default for ArrivalProfile {
    fn default() -> Self {
        Self::flat()
    }
}

impl ArrivalProfile {
    /// No calendar modulation: the arrival rate is exactly λ.
    pub fn flat() -> Self {
        Self {
            hour_factors: [1.0; 24],
            day_factors: [1.0; 7],
            month_factors: [1.0; MONTHS],
            special_dates: Vec::new(),
        }
    }

    pub fn factor_at(&self, at: &CalendarPoint) -> f64 {
        let special = self
            .special_dates
            .iter()
            .find(|s| s.month == at.month as u32 + 1 && s.day == at.day)
            .map(|s| s.factor)
            .unwrap_or(1.0);
        self.hour_factors[at.hour]
            * self.day_factors[at.weekday]
            * self.month_factors[at.month]
            * special
    }

    /// Upper bound of `factor_at` over the whole calendar.
    pub fn peak_factor(&self) -> f64 {
        let max = |xs: &[f64]| xs.iter().copied().fold(0.0_f64, f64::max);
        let special = self.special_dates.iter().map(|s| s.factor).fold(1.0_f64, f64::max);
        max(&self.hour_factors) * max(&self.day_factors) * max(&self.month_factors) * special
    }

    pub fn is_flat(&self) -> bool {
        *self == Self::flat()
    }

    fn validate(&self) -> SimResult<()> {
        let all = self
            .hour_factors
            .iter()
            .chain(self.day_factors.iter())
            .chain(self.month_factors.iter())
            .chain(self.special_dates.iter().map(|s| &s.factor));
        for f in all {
            if !(f.is_finite() && *f >= 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "arrival profile factor {f} must be finite and >= 0"
                )));
            }
        }
        for s in &self.special_dates {
            if !(1..=12).contains(&s.month) || !(1..=31).contains(&s.day) {
                return Err(SimError::InvalidConfig(format!(
                    "special date '{}' has invalid month/day {}/{}",
                    s.name, s.month, s.day
                )));
            }
        }
        Ok(())
    }
}

/// Everything one engine run needs. Read-only once the engine is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HospitalConfig {
    /// Doctors per specialty. Fixed for the run.
    pub doctors: BTreeMap<Specialty, u32>,
    /// Base arrival rate λ in patients per hour.
    pub arrival_rate_per_hour: f64,
    /// Number of ticks (minutes) to simulate.
    pub duration_ticks: Tick,
    pub seed: u64,
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDateTime,
    pub diseases: DiseaseCatalog,
    #[serde(default)]
    pub arrival_profile: ArrivalProfile,
    /// Pre-planned incidents.
    #[serde(default)]
    pub incidents: Vec<Incident>,
    /// Recurring incidents sampled once per simulated day.
    #[serde(default)]
    pub incident_templates: Vec<IncidentTemplate>,
    /// Shares used by `with_total_doctors`.
    #[serde(default)]
    pub specialty_proportions: BTreeMap<Specialty, f64>,
}

pub fn default_start_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

impl HospitalConfig {
    /// Load from a JSON file and validate.
    /// In tests, use HospitalConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: HospitalConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Five doctors (3 generalists, 2 cardiologists), 12 arrivals/hour,
    /// one cardiology pathology with a 30-minute mean, 600 ticks, seed 42.
    pub fn default_test() -> Self {
        let catalog = DiseaseCatalog::new(vec![Disease::new("cardiac_event", 30.0, "cardiologist", 1.0)])
            .unwrap_or_else(|e| unreachable!("built-in test catalog is valid: {e}"));
        Self {
            doctors: [("generalist".into(), 3), ("cardiologist".into(), 2)].into(),
            arrival_rate_per_hour: 12.0,
            duration_ticks: 600,
            seed: 42,
            start_date: default_start_date(),
            diseases: catalog,
            arrival_profile: ArrivalProfile::flat(),
            incidents: Vec::new(),
            incident_templates: Vec::new(),
            specialty_proportions: BTreeMap::new(),
        }
    }

    /// Fail fast on anything that would make the run meaningless.
    /// Nothing is clamped to a default.
    pub fn validate(&self) -> SimResult<()> {
        if !(self.arrival_rate_per_hour.is_finite() && self.arrival_rate_per_hour > 0.0) {
            return Err(SimError::InvalidArrivalRate { rate: self.arrival_rate_per_hour });
        }
        if self.duration_ticks == 0 {
            return Err(SimError::InvalidConfig("duration must be at least one tick".into()));
        }

        self.diseases.validate()?;
        for disease in self.diseases.iter() {
            if self.doctors.get(&disease.specialty).copied().unwrap_or(0) == 0 {
                return Err(SimError::MissingSpecialty {
                    specialty: disease.specialty.clone(),
                    disease: disease.id.clone(),
                });
            }
        }

        self.arrival_profile.validate()?;
        let calendar_peak = self.arrivals_per_tick() * self.arrival_profile.peak_factor();
        if calendar_peak > MAX_ARRIVALS_PER_TICK {
            return Err(SimError::InvalidConfig(format!(
                "peak arrival rate {calendar_peak:.1}/tick exceeds {MAX_ARRIVALS_PER_TICK}"
            )));
        }

        let mut ids = BTreeSet::new();
        for incident in &self.incidents {
            if !ids.insert(incident.id.as_str()) {
                return Err(SimError::InvalidIncident {
                    incident: incident.id.clone(),
                    reason: "duplicate identifier".into(),
                });
            }
            incident.validate(&self.diseases, &self.doctors)?;
        }
        for template in &self.incident_templates {
            template.validate(&self.diseases, &self.doctors)?;
        }
        Ok(())
    }

    pub fn total_doctors(&self) -> u32 {
        self.doctors.values().sum()
    }

    /// λ converted to patients per tick.
    pub fn arrivals_per_tick(&self) -> f64 {
        self.arrival_rate_per_hour / 60.0
    }

    /// Calendar peak times every configured arrival surge above 1, as if
    /// they all overlapped. Only feeds the granularity warning.
    pub fn peak_arrival_factor(&self) -> f64 {
        let surges: f64 = self
            .incidents
            .iter()
            .flat_map(|i| &i.effects)
            .chain(self.incident_templates.iter().flat_map(|t| &t.effects))
            .filter_map(|e| match e {
                IncidentEffect::ArrivalSurge { factor } => Some(factor.max(1.0)),
                _ => None,
            })
            .product();
        self.arrival_profile.peak_factor() * surges
    }

    /// Replace the staffing with `total` doctors split by `specialty_proportions`.
    pub fn with_total_doctors(mut self, total: u32) -> SimResult<Self> {
        if self.specialty_proportions.is_empty() {
            return Err(SimError::InvalidConfig(
                "specialty_proportions is required to split a doctor total".into(),
            ));
        }
        self.doctors = staffing_from_total(total, &self.specialty_proportions);
        Ok(self)
    }
}

/// Distribute `total` doctors across specialties by share.
/// Every specialty gets at least one doctor; the remainder goes to the
/// largest shares first (ties by name).
pub fn staffing_from_total(total: u32, proportions: &BTreeMap<Specialty, f64>) -> BTreeMap<Specialty, u32> {
    let share_sum: f64 = proportions.values().sum();
    let mut counts: BTreeMap<Specialty, u32> = proportions
        .iter()
        .map(|(s, p)| {
            let share = if share_sum > 0.0 { p / share_sum } else { 0.0 };
            (s.clone(), ((total as f64 * share).floor() as u32).max(1))
        })
        .collect();

    let mut by_share: Vec<(&Specialty, f64)> = proportions.iter().map(|(s, p)| (s, *p)).collect();
    by_share.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut assigned: u32 = counts.values().sum();
    'fill: while assigned < total && !by_share.is_empty() {
        for (specialty, _) in &by_share {
            if assigned >= total {
                break 'fill;
            }
            if let Some(c) = counts.get_mut(*specialty) {
                *c += 1;
                assigned += 1;
            }
        }
    }
    counts
}
