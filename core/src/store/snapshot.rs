//! Engine snapshots, stored as JSON, and checkpointed runs.

use super::SimStore;
use crate::{engine::HospitalEngine, error::SimResult, types::Tick};
use rusqlite::{params, OptionalExtension};

impl SimStore {
    /// Run `engine` for one chunk of up to `interval` ticks. Unless that
    /// finished the run, the chunk's output is appended and a snapshot is
    /// saved at the next tick, so a resume from the latest snapshot loses
    /// no rows. Returns true once the run is finished; the caller then
    /// persists the remainder with `persist_trajectory`.
    pub fn run_checkpointed_chunk(&mut self, engine: &mut HospitalEngine, interval: Tick) -> SimResult<bool> {
        engine.run_ticks(interval)?;
        if engine.is_finished() {
            return Ok(true);
        }
        let chunk = engine.drain_output();
        self.append_output(&chunk)?;
        let snapshot = engine.snapshot();
        self.save_snapshot(&engine.run_id, snapshot.tick, &snapshot.to_json()?)?;
        log::debug!("tick={} store: checkpoint saved for run {}", snapshot.tick, engine.run_id);
        Ok(false)
    }

    pub fn save_snapshot(&self, run_id: &str, tick: Tick, state_json: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO snapshot (run_id, tick, state_json) VALUES (?1, ?2, ?3)",
            params![run_id, tick as i64, state_json],
        )?;
        Ok(())
    }

    pub fn latest_snapshot(&self, run_id: &str) -> SimResult<Option<(Tick, String)>> {
        self.latest_snapshot_before(run_id, i64::MAX as Tick)
    }

    pub fn latest_snapshot_before(
        &self, run_id: &str, tick: Tick
    ) -> SimResult<Option<(Tick, String)>> {
        Ok(self
            .conn
            .query_row(
                "SELECT tick, state_json FROM snapshot
                 WHERE run_id = ?1 AND tick <= ?2
                 ORDER BY tick DESC LIMIT 1",
                params![run_id, tick.min(i64::MAX as Tick) as i64],
                |row| Ok((row.get::<_, i64>(0)? as Tick, row.get::<_, String>(1)?)),
            )
            .optional()?)
    }

    pub fn snapshot_count(&self, run_id: &str) -> SimResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM snapshot WHERE run_id = ?1",
            params![run_id],
            |r| r.get(0),
        )?)
    }
}
