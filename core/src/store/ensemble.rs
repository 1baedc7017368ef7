//! Ensemble aggregates: percentile bands and final-state summaries.

use super::SimStore;
use crate::{
    error::SimResult,
    stats::{EnsembleSummary, SummaryStats},
};
use rusqlite::{params, OptionalExtension};

impl SimStore {
    pub fn persist_ensemble_summary(
        &mut self,
        simulation_id: &str,
        summary: &EnsembleSummary,
    ) -> SimResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut insert_band = tx.prepare(
                "INSERT OR REPLACE INTO ensemble_percentile (simulation_id, metric, tick, p25, p50, p75)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut insert_summary = tx.prepare(
                "INSERT OR REPLACE INTO ensemble_summary
                    (simulation_id, metric, mean, median, std, min, max,
                     best_run, best_value, worst_run, worst_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for m in &summary.metrics {
                let name = m.metric.name();
                for band in &m.percentiles {
                    insert_band.execute(params![
                        simulation_id, name, band.tick as i64, band.p25, band.p50, band.p75
                    ])?;
                }
                let s = &m.final_state;
                insert_summary.execute(params![
                    simulation_id,
                    name,
                    s.mean,
                    s.median,
                    s.std,
                    s.min,
                    s.max,
                    m.ranking.best_run,
                    m.ranking.best_value,
                    m.ranking.worst_run,
                    m.ranking.worst_value,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Final-state summary of one metric, by metric name.
    pub fn ensemble_metric_summary(
        &self,
        simulation_id: &str,
        metric: &str,
    ) -> SimResult<Option<SummaryStats>> {
        Ok(self
            .conn
            .query_row(
                "SELECT mean, median, std, min, max FROM ensemble_summary
                 WHERE simulation_id = ?1 AND metric = ?2",
                params![simulation_id, metric],
                |r| {
                    Ok(SummaryStats {
                        mean: r.get(0)?,
                        median: r.get(1)?,
                        std: r.get(2)?,
                        min: r.get(3)?,
                        max: r.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn percentile_count(&self, simulation_id: &str, metric: &str) -> SimResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM ensemble_percentile WHERE simulation_id = ?1 AND metric = ?2",
            params![simulation_id, metric],
            |r| r.get(0),
        )?)
    }
}
