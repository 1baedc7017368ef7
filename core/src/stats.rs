//! Ensemble aggregation: per-tick percentile bands, final-state summary
//! statistics, and best/worst run per metric.
//!
//! Percentiles use linear interpolation between closest ranks.
//! Standard deviation is the population form (divide by n).

use crate::{
    state::HospitalState,
    trajectory::Trajectory,
    types::{RunId, Tick},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

/// Aggregated HospitalState fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PatientsTotal,
    PatientsTreated,
    Waiting,
    InTreatment,
    BusyDoctors,
    AvgWaitTime,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::PatientsTotal,
        Metric::PatientsTreated,
        Metric::Waiting,
        Metric::InTreatment,
        Metric::BusyDoctors,
        Metric::AvgWaitTime,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PatientsTotal   => "patients_total",
            Self::PatientsTreated => "patients_treated",
            Self::Waiting         => "waiting",
            Self::InTreatment     => "in_treatment",
            Self::BusyDoctors     => "busy_doctors",
            Self::AvgWaitTime     => "avg_wait_time",
        }
    }

    /// Which end of the range is the better run.
    /// Load metrics count as lower-is-better; only throughput is higher-is-better.
    pub fn direction(&self) -> Direction {
        match self {
            Self::PatientsTreated => Direction::HigherIsBetter,
            Self::PatientsTotal
            | Self::Waiting
            | Self::InTreatment
            | Self::BusyDoctors
            | Self::AvgWaitTime => Direction::LowerIsBetter,
        }
    }

    pub fn value(&self, state: &HospitalState) -> f64 {
        match self {
            Self::PatientsTotal   => state.patients_total as f64,
            Self::PatientsTreated => state.patients_treated as f64,
            Self::Waiting         => state.waiting as f64,
            Self::InTreatment     => state.in_treatment as f64,
            Self::BusyDoctors     => state.busy_doctors as f64,
            Self::AvgWaitTime     => state.avg_wait_time,
        }
    }
}

/// Linear-interpolation percentile of sorted data, `q` in [0, 1].
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TickPercentiles {
    pub tick: Tick,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SummaryStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl SummaryStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            median: percentile(&sorted, 0.5)?,
            std: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRanking {
    pub best_run: RunId,
    pub best_value: f64,
    pub worst_run: RunId,
    pub worst_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSummary {
    pub metric: Metric,
    pub final_state: SummaryStats,
    pub ranking: RunRanking,
    pub percentiles: Vec<TickPercentiles>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnsembleSummary {
    pub runs: usize,
    pub metrics: Vec<MetricSummary>,
}

impl EnsembleSummary {
    /// None when there is no run with at least one recorded state.
    pub fn from_trajectories(runs: &[Trajectory]) -> Option<Self> {
        let runs: Vec<&Trajectory> = runs.iter().filter(|t| !t.states.is_empty()).collect();
        if runs.is_empty() {
            return None;
        }
        let metrics = Metric::ALL
            .iter()
            .filter_map(|m| summarize_metric(&runs, *m))
            .collect();
        Some(Self { runs: runs.len(), metrics })
    }

    pub fn metric(&self, metric: Metric) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.metric == metric)
    }
}

fn summarize_metric(runs: &[&Trajectory], metric: Metric) -> Option<MetricSummary> {
    let finals: Vec<(&RunId, f64)> = runs
        .iter()
        .filter_map(|t| t.final_state().map(|s| (&t.run_id, metric.value(s))))
        .collect();
    let values: Vec<f64> = finals.iter().map(|(_, v)| *v).collect();

    Some(MetricSummary {
        metric,
        final_state: SummaryStats::from_values(&values)?,
        ranking: rank_runs(&finals, metric.direction())?,
        percentiles: tick_percentiles(runs, metric),
    })
}

/// Best and worst run by final value. Ties go to the earlier run.
pub fn rank_runs(finals: &[(&RunId, f64)], direction: Direction) -> Option<RunRanking> {
    let (first_id, first_value) = finals.first()?;
    let mut best = (*first_id, *first_value);
    let mut worst = best;
    for (id, value) in &finals[1..] {
        let (better, poorer) = match direction {
            Direction::HigherIsBetter => (*value > best.1, *value < worst.1),
            Direction::LowerIsBetter  => (*value < best.1, *value > worst.1),
        };
        if better {
            best = (*id, *value);
        }
        if poorer {
            worst = (*id, *value);
        }
    }
    Some(RunRanking {
        best_run: best.0.clone(),
        best_value: best.1,
        worst_run: worst.0.clone(),
        worst_value: worst.1,
    })
}

/// p25/p50/p75 per recorded tick, over the common prefix of the runs'
/// state series. Runs recorded on a different tick grid stop the band.
pub fn tick_percentiles(runs: &[&Trajectory], metric: Metric) -> Vec<TickPercentiles> {
    let len = runs.iter().map(|t| t.states.len()).min().unwrap_or(0);
    let mut bands = Vec::with_capacity(len);
    for i in 0..len {
        let tick = runs[0].states[i].tick;
        if runs.iter().any(|t| t.states[i].tick != tick) {
            break;
        }
        let mut column: Vec<f64> = runs.iter().map(|t| metric.value(&t.states[i])).collect();
        column.sort_by(f64::total_cmp);
        if let (Some(p25), Some(p50), Some(p75)) = (
            percentile(&column, 0.25),
            percentile(&column, 0.50),
            percentile(&column, 0.75),
        ) {
            bands.push(TickPercentiles { tick, p25, p50, p75 });
        }
    }
    bands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_interpolate_linearly() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&data, 0.0), Some(1.0));
        assert_eq!(percentile(&data, 1.0), Some(4.0));
        assert_eq!(percentile(&data, 0.5), Some(2.5));
        assert_eq!(percentile(&data, 0.25), Some(1.75));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn summary_stats_use_population_std() {
        let s = SummaryStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(s.mean, 5.0);
        assert_eq!(s.std, 2.0);
        assert_eq!(s.median, 4.5);
        assert_eq!((s.min, s.max), (2.0, 9.0));
    }

    #[test]
    fn ranking_follows_metric_direction() {
        let a = "a".to_string();
        let b = "b".to_string();
        let c = "c".to_string();
        let finals = [(&a, 3.0), (&b, 1.0), (&c, 5.0)];

        let lower = rank_runs(&finals, Metric::AvgWaitTime.direction()).unwrap();
        assert_eq!((lower.best_run.as_str(), lower.worst_run.as_str()), ("b", "c"));

        let higher = rank_runs(&finals, Metric::PatientsTreated.direction()).unwrap();
        assert_eq!((higher.best_run.as_str(), higher.worst_run.as_str()), ("c", "b"));
    }
}
