//! Post-run analysis of a finished trajectory: overload periods and the
//! longest waits. Read-only over the run output.

use crate::{state::HospitalState, treatment::TreatmentRecord, types::Tick};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertThresholds {
    /// A tick is flagged when more patients than this are waiting.
    pub high_wait_queue: u64,
    /// ...or when busy / total doctors exceeds this.
    pub high_occupancy: f64,
    /// Flagged ticks at most this far apart belong to the same period.
    pub merge_gap_ticks: Tick,
    pub long_wait_ticks: Tick,
    pub long_wait_limit: usize,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            high_wait_queue: 10,
            high_occupancy: 0.9,
            merge_gap_ticks: 60,
            long_wait_ticks: 60,
            long_wait_limit: 50,
        }
    }
}

/// A contiguous stretch of overload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverloadPeriod {
    pub start_tick: Tick,
    /// Last flagged tick, inclusive.
    pub end_tick: Tick,
    pub peak_waiting: u64,
    pub peak_occupancy: f64,
    /// Number of flagged states in the period.
    pub samples: usize,
}

pub fn detect_incident_periods(
    states: &[HospitalState],
    total_doctors: u32,
    thresholds: &AlertThresholds,
) -> Vec<OverloadPeriod> {
    let mut periods: Vec<OverloadPeriod> = Vec::new();
    for state in states {
        let occupancy = state.occupancy(total_doctors);
        if state.waiting <= thresholds.high_wait_queue && occupancy <= thresholds.high_occupancy {
            continue;
        }
        match periods.last_mut() {
            Some(p) if state.tick - p.end_tick <= thresholds.merge_gap_ticks => {
                p.end_tick = state.tick;
                p.peak_waiting = p.peak_waiting.max(state.waiting);
                p.peak_occupancy = p.peak_occupancy.max(occupancy);
                p.samples += 1;
            }
            _ => periods.push(OverloadPeriod {
                start_tick: state.tick,
                end_tick: state.tick,
                peak_waiting: state.waiting,
                peak_occupancy: occupancy,
                samples: 1,
            }),
        }
    }
    periods
}

/// Treatments that waited longer than `threshold`, longest first
/// (ties by patient id), at most `limit` of them.
pub fn long_wait_treatments(
    records: &[TreatmentRecord],
    threshold: Tick,
    limit: usize,
) -> Vec<&TreatmentRecord> {
    let mut long: Vec<&TreatmentRecord> = records.iter().filter(|r| r.wait_ticks > threshold).collect();
    long.sort_by(|a, b| b.wait_ticks.cmp(&a.wait_ticks).then(a.patient_id.cmp(&b.patient_id)));
    long.truncate(limit);
    long
}
