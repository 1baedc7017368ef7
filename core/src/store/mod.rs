//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine never touches it. Output is handed over between chunks of
//! ticks (checkpointed runs) or after the runs complete (ensembles).

use crate::{error::SimResult, types::Tick};
mod ensemble;
mod snapshot;
mod trajectory;
use rusqlite::{params, Connection, OptionalExtension};

pub struct SimStore {
    conn: Connection,
}

/// A `run` row.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub run_id: String,
    pub simulation_id: Option<String>,
    pub run_index: Option<usize>,
    pub seed: u64,
    pub status: String,
    pub error: Option<String>,
    pub final_tick: Option<Tick>,
}

impl SimStore {
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only for real files; :memory: ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Simulation ─────────────────────────────────────────────

    pub fn insert_simulation(
        &self,
        simulation_id: &str,
        master_seed: u64,
        runs: usize,
        config_json: &str,
        version: &str,
    ) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO simulation (simulation_id, master_seed, runs, config_json, version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                simulation_id,
                master_seed as i64,
                runs as i64,
                config_json,
                version,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn simulation_exists(&self, simulation_id: &str) -> SimResult<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM simulation WHERE simulation_id = ?1",
            params![simulation_id],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(
        &self,
        run_id: &str,
        simulation_id: Option<&str>,
        run_index: Option<usize>,
        seed: u64,
    ) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, simulation_id, run_index, seed, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                simulation_id,
                run_index.map(|i| i as i64),
                seed as i64,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn mark_run_failed(&self, run_id: &str, error: &str) -> SimResult<()> {
        self.conn.execute(
            "UPDATE run SET status = 'failed', error = ?2 WHERE run_id = ?1",
            params![run_id, error],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> SimResult<Option<RunRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT run_id, simulation_id, run_index, seed, status, error, final_tick
                 FROM run WHERE run_id = ?1",
                params![run_id],
                |r| {
                    Ok(RunRow {
                        run_id: r.get(0)?,
                        simulation_id: r.get(1)?,
                        run_index: r.get::<_, Option<i64>>(2)?.map(|i| i as usize),
                        seed: r.get::<_, i64>(3)? as u64,
                        status: r.get(4)?,
                        error: r.get(5)?,
                        final_tick: r.get::<_, Option<i64>>(6)?.map(|t| t as Tick),
                    })
                },
            )
            .optional()?)
    }

    /// Runs of a simulation in run index order.
    pub fn runs_for_simulation(&self, simulation_id: &str) -> SimResult<Vec<RunRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, simulation_id, run_index, seed, status, error, final_tick
             FROM run WHERE simulation_id = ?1 ORDER BY run_index ASC",
        )?;
        let rows = stmt
            .query_map(params![simulation_id], |r| {
                Ok(RunRow {
                    run_id: r.get(0)?,
                    simulation_id: r.get(1)?,
                    run_index: r.get::<_, Option<i64>>(2)?.map(|i| i as usize),
                    seed: r.get::<_, i64>(3)? as u64,
                    status: r.get(4)?,
                    error: r.get(5)?,
                    final_tick: r.get::<_, Option<i64>>(6)?.map(|t| t as Tick),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
