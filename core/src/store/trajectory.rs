//! Run output: hospital states, treated patients, doctor totals, event log.

use super::SimStore;
use crate::{
    error::SimResult,
    event::EventLogEntry,
    state::HospitalState,
    trajectory::Trajectory,
    treatment::TreatmentRecord,
    types::Tick,
};
use rusqlite::{params, OptionalExtension, Row, Transaction};

impl SimStore {
    /// Append a chunk of run output in one transaction. The run stays open.
    pub fn append_output(&mut self, chunk: &Trajectory) -> SimResult<()> {
        let tx = self.conn.transaction()?;
        insert_output(&tx, chunk)?;
        tx.commit()?;
        log::debug!(
            "store: appended {} states, {} treatments, {} events to run {}",
            chunk.states.len(),
            chunk.treatments.len(),
            chunk.events.len(),
            chunk.run_id,
        );
        Ok(())
    }

    /// Write the last output of a run together with its per-doctor totals,
    /// in one transaction, and mark the run complete.
    pub fn persist_trajectory(&mut self, trajectory: &Trajectory) -> SimResult<()> {
        let run_id = trajectory.run_id.as_str();
        let tx = self.conn.transaction()?;
        insert_output(&tx, trajectory)?;
        {
            let mut insert_doctor = tx.prepare(
                "INSERT OR REPLACE INTO doctor_summary (run_id, doctor_id, specialty, patients_treated)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for d in &trajectory.doctors {
                insert_doctor.execute(params![run_id, d.doctor_id, d.specialty, d.patients_treated as i64])?;
            }

            tx.execute(
                "UPDATE run SET status = 'completed', final_tick = ?2, variation = ?3 WHERE run_id = ?1",
                params![
                    run_id,
                    trajectory.final_state().map(|s| s.tick as i64),
                    serde_json::to_string(&trajectory.variation)?,
                ],
            )?;
        }
        tx.commit()?;
        log::debug!(
            "store: persisted run {run_id} ({} states, {} treatments, {} events)",
            trajectory.states.len(),
            trajectory.treatments.len(),
            trajectory.events.len(),
        );
        Ok(())
    }

    /// Drop every output row of `run_id` at or after `tick`, so a run
    /// resumed from a snapshot can be persisted again without overlap.
    pub fn truncate_run_from(&mut self, run_id: &str, tick: Tick) -> SimResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM hospital_state WHERE run_id = ?1 AND tick >= ?2",
            params![run_id, tick as i64],
        )?;
        tx.execute(
            "DELETE FROM patient_treated WHERE run_id = ?1 AND end_tick >= ?2",
            params![run_id, tick as i64],
        )?;
        tx.execute(
            "DELETE FROM event_log WHERE run_id = ?1 AND tick >= ?2",
            params![run_id, tick as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn state_count(&self, run_id: &str) -> SimResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM hospital_state WHERE run_id = ?1",
            params![run_id],
            |r| r.get(0),
        )?)
    }

    pub fn treated_count(&self, run_id: &str) -> SimResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM patient_treated WHERE run_id = ?1",
            params![run_id],
            |r| r.get(0),
        )?)
    }

    pub fn treated_count_by_specialty(&self, run_id: &str) -> SimResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT specialty, COUNT(*) FROM patient_treated
             WHERE run_id = ?1 GROUP BY specialty ORDER BY specialty",
        )?;
        let rows = stmt
            .query_map(params![run_id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Most recent recorded state of a run.
    pub fn final_state(&self, run_id: &str) -> SimResult<Option<HospitalState>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {STATE_COLUMNS} FROM hospital_state WHERE run_id = ?1
                     ORDER BY tick DESC LIMIT 1"
                ),
                params![run_id],
                state_row,
            )
            .optional()?
            .map(StateRow::into_state)
            .transpose()
    }

    /// Every recorded state of a run, in tick order.
    pub fn states(&self, run_id: &str) -> SimResult<Vec<HospitalState>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STATE_COLUMNS} FROM hospital_state WHERE run_id = ?1 ORDER BY tick"
        ))?;
        let rows = stmt
            .query_map(params![run_id], state_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(StateRow::into_state).collect()
    }

    pub fn treatments(&self, run_id: &str) -> SimResult<Vec<TreatmentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT patient_id, disease, specialty, doctor_id, arrival_tick,
                    start_tick, end_tick, wait_ticks, duration_ticks
             FROM patient_treated WHERE run_id = ?1 ORDER BY end_tick, patient_id",
        )?;
        let rows = stmt
            .query_map(params![run_id], |r| {
                Ok(TreatmentRecord {
                    patient_id: r.get::<_, i64>(0)? as u64,
                    disease: r.get(1)?,
                    specialty: r.get(2)?,
                    doctor_id: r.get(3)?,
                    arrival_tick: r.get::<_, i64>(4)? as Tick,
                    start_tick: r.get::<_, i64>(5)? as Tick,
                    end_tick: r.get::<_, i64>(6)? as Tick,
                    wait_ticks: r.get::<_, i64>(7)? as Tick,
                    duration_ticks: r.get::<_, i64>(8)? as Tick,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn events_for_tick(&self, run_id: &str, tick: Tick) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, tick, source, event_type, payload
             FROM event_log WHERE run_id = ?1 AND tick = ?2
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id, tick as i64], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    run_id:     row.get(1)?,
                    tick:       row.get::<_, i64>(2)? as u64,
                    source:     row.get(3)?,
                    event_type: row.get(4)?,
                    payload:    row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, run_id: &str, event_type: &str) -> SimResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE run_id = ?1 AND event_type = ?2",
            params![run_id, event_type],
            |r| r.get(0),
        )?)
    }
}

const STATE_COLUMNS: &str = "tick, patients_total, patients_treated, waiting, in_treatment, \
     busy_doctors, avg_wait_time, waiting_by_specialty, active_incidents";

/// Raw `hospital_state` columns; the JSON columns are decoded afterwards.
struct StateRow {
    tick: i64,
    patients_total: i64,
    patients_treated: i64,
    waiting: i64,
    in_treatment: i64,
    busy_doctors: u32,
    avg_wait_time: f64,
    waiting_by_specialty: String,
    active_incidents: String,
}

impl StateRow {
    fn into_state(self) -> SimResult<HospitalState> {
        Ok(HospitalState {
            tick: self.tick as Tick,
            patients_total: self.patients_total as u64,
            patients_treated: self.patients_treated as u64,
            waiting: self.waiting as u64,
            waiting_by_specialty: serde_json::from_str(&self.waiting_by_specialty)?,
            in_treatment: self.in_treatment as u64,
            busy_doctors: self.busy_doctors,
            avg_wait_time: self.avg_wait_time,
            active_incidents: serde_json::from_str(&self.active_incidents)?,
        })
    }
}

fn state_row(r: &Row<'_>) -> rusqlite::Result<StateRow> {
    Ok(StateRow {
        tick: r.get(0)?,
        patients_total: r.get(1)?,
        patients_treated: r.get(2)?,
        waiting: r.get(3)?,
        in_treatment: r.get(4)?,
        busy_doctors: r.get(5)?,
        avg_wait_time: r.get(6)?,
        waiting_by_specialty: r.get(7)?,
        active_incidents: r.get(8)?,
    })
}

/// States, treatments and events of `trajectory`, inside the caller's transaction.
fn insert_output(tx: &Transaction<'_>, trajectory: &Trajectory) -> SimResult<()> {
    let run_id = trajectory.run_id.as_str();

    let mut insert_state = tx.prepare(
        "INSERT INTO hospital_state
            (run_id, tick, patients_total, patients_treated, waiting, in_treatment,
             busy_doctors, avg_wait_time, waiting_by_specialty, active_incidents)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for s in &trajectory.states {
        insert_state.execute(params![
            run_id,
            s.tick as i64,
            s.patients_total as i64,
            s.patients_treated as i64,
            s.waiting as i64,
            s.in_treatment as i64,
            s.busy_doctors,
            s.avg_wait_time,
            serde_json::to_string(&s.waiting_by_specialty)?,
            serde_json::to_string(&s.active_incidents)?,
        ])?;
    }

    let mut insert_treated = tx.prepare(
        "INSERT INTO patient_treated
            (run_id, patient_id, disease, specialty, doctor_id, arrival_tick,
             start_tick, end_tick, wait_ticks, duration_ticks)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for r in &trajectory.treatments {
        insert_treated.execute(params![
            run_id,
            r.patient_id as i64,
            r.disease,
            r.specialty,
            r.doctor_id,
            r.arrival_tick as i64,
            r.start_tick as i64,
            r.end_tick as i64,
            r.wait_ticks as i64,
            r.duration_ticks as i64,
        ])?;
    }

    let mut insert_event = tx.prepare(
        "INSERT INTO event_log (run_id, tick, source, event_type, payload)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for event in &trajectory.events {
        let entry = EventLogEntry::from_event(run_id, event)?;
        insert_event.execute(params![
            entry.run_id,
            entry.tick as i64,
            entry.source,
            entry.event_type,
            entry.payload,
        ])?;
    }
    Ok(())
}
