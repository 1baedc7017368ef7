//! Doctor pool: finite capacity per specialty plus the FIFO waiting queues.
//!
//! RULES:
//!   - A doctor holds at most one patient; a patient is held by at most one doctor.
//!   - A patient sits in exactly one queue until dequeued, and never re-enters.
//!   - Specialties are visited in sorted order; within a specialty the
//!     lowest free doctor id is assigned first.

use crate::{
    error::{SimError, SimResult},
    types::{DoctorId, PatientId, Specialty, Tick},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: DoctorId,
    pub specialty: Specialty,
    pub patient: Option<PatientId>,
    pub busy_until: Option<Tick>,
    pub patients_treated: u64,
}

impl Doctor {
    pub fn is_busy(&self) -> bool {
        self.patient.is_some()
    }
}

/// FIFO of waiting patients for one specialty.
/// Insertion order is arrival order; within a tick, patient id order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SpecialtyQueue {
    waiting: VecDeque<PatientId>,
}

impl SpecialtyQueue {
    pub fn push(&mut self, patient: PatientId) {
        self.waiting.push_back(patient);
    }

    pub fn pop(&mut self) -> Option<PatientId> {
        self.waiting.pop_front()
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatientId> {
        self.waiting.iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorPool {
    /// Indexed by DoctorId.
    doctors: Vec<Doctor>,
    queues: BTreeMap<Specialty, SpecialtyQueue>,
}

impl DoctorPool {
    /// Doctor ids are assigned in specialty order, starting at 0.
    pub fn new(staffing: &BTreeMap<Specialty, u32>) -> Self {
        let mut doctors = Vec::new();
        let mut queues = BTreeMap::new();
        for (specialty, count) in staffing {
            for _ in 0..*count {
                doctors.push(Doctor {
                    id: doctors.len() as DoctorId,
                    specialty: specialty.clone(),
                    patient: None,
                    busy_until: None,
                    patients_treated: 0,
                });
            }
            queues.insert(specialty.clone(), SpecialtyQueue::default());
        }
        Self { doctors, queues }
    }

    pub fn doctors(&self) -> &[Doctor] {
        &self.doctors
    }

    pub fn doctor(&self, id: DoctorId) -> Option<&Doctor> {
        self.doctors.get(id as usize)
    }

    pub fn specialties(&self) -> impl Iterator<Item = &Specialty> {
        self.queues.keys()
    }

    pub fn queue(&self, specialty: &str) -> Option<&SpecialtyQueue> {
        self.queues.get(specialty)
    }

    pub fn enqueue(&mut self, specialty: &str, patient: PatientId) -> SimResult<()> {
        let queue = self.queues.get_mut(specialty).ok_or_else(|| {
            SimError::InvalidConfig(format!("no queue for specialty '{specialty}'"))
        })?;
        queue.push(patient);
        Ok(())
    }

    /// Step 2: free every doctor whose treatment ends at or before `tick`.
    /// Returns (doctor, patient) pairs in doctor id order.
    pub fn release_due(&mut self, tick: Tick) -> Vec<(DoctorId, PatientId)> {
        let mut released = Vec::new();
        for doctor in &mut self.doctors {
            if doctor.busy_until.is_some_and(|until| until <= tick) {
                if let Some(patient) = doctor.patient.take() {
                    doctor.busy_until = None;
                    doctor.patients_treated += 1;
                    released.push((doctor.id, patient));
                }
            }
        }
        released
    }

    /// Step 4: the next (doctor, patient) pairing for `specialty`, if any.
    /// The patient is removed from the queue; the caller must `occupy`.
    ///
    /// With `disabled` doctors out, the specialty accepts new patients
    /// only while its busy count is below `n - disabled`.
    pub fn next_assignment(&mut self, specialty: &str, disabled: u32) -> Option<(DoctorId, PatientId)> {
        let queue = self.queues.get_mut(specialty)?;
        if queue.is_empty() {
            return None;
        }

        let mut staffed = 0u32;
        let mut busy = 0u32;
        let mut free = None;
        for doctor in self.doctors.iter().filter(|d| d.specialty == specialty) {
            staffed += 1;
            if doctor.is_busy() {
                busy += 1;
            } else if free.is_none() {
                free = Some(doctor.id);
            }
        }
        if busy >= staffed.saturating_sub(disabled) {
            return None;
        }

        let doctor = free?;
        let patient = queue.pop()?;
        Some((doctor, patient))
    }

    pub fn occupy(&mut self, doctor: DoctorId, patient: PatientId, busy_until: Tick) -> SimResult<()> {
        let d = self
            .doctors
            .get_mut(doctor as usize)
            .ok_or_else(|| SimError::Other(anyhow::anyhow!("unknown doctor {doctor}")))?;
        if d.is_busy() {
            return Err(SimError::Other(anyhow::anyhow!(
                "doctor {doctor} already treating patient {:?}",
                d.patient
            )));
        }
        d.patient = Some(patient);
        d.busy_until = Some(busy_until);
        Ok(())
    }

    pub fn busy_count(&self) -> u32 {
        self.doctors.iter().filter(|d| d.is_busy()).count() as u32
    }

    pub fn waiting_total(&self) -> u64 {
        self.queues.values().map(|q| q.len() as u64).sum()
    }

    pub fn waiting_by_specialty(&self) -> BTreeMap<Specialty, u64> {
        self.queues
            .iter()
            .map(|(s, q)| (s.clone(), q.len() as u64))
            .collect()
    }

    pub fn total_doctors(&self) -> u32 {
        self.doctors.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> DoctorPool {
        DoctorPool::new(&[("cardiologist".to_string(), 2), ("generalist".to_string(), 1)].into())
    }

    #[test]
    fn ids_follow_specialty_order() {
        let pool = pool();
        let ids: Vec<_> = pool.doctors().iter().map(|d| (d.id, d.specialty.as_str())).collect();
        assert_eq!(ids, vec![(0, "cardiologist"), (1, "cardiologist"), (2, "generalist")]);
    }

    #[test]
    fn lowest_free_doctor_is_assigned_first() {
        let mut pool = pool();
        for p in 0..3 {
            pool.enqueue("cardiologist", p).unwrap();
        }
        let (d, p) = pool.next_assignment("cardiologist", 0).unwrap();
        assert_eq!((d, p), (0, 0));
        pool.occupy(d, p, 10).unwrap();

        let (d, p) = pool.next_assignment("cardiologist", 0).unwrap();
        assert_eq!((d, p), (1, 1));
        pool.occupy(d, p, 5).unwrap();

        assert!(pool.next_assignment("cardiologist", 0).is_none());
        assert_eq!(pool.waiting_total(), 1);

        assert_eq!(pool.release_due(5), vec![(1, 1)]);
        assert_eq!(pool.next_assignment("cardiologist", 0), Some((1, 2)));
    }

    #[test]
    fn capacity_reduction_blocks_new_assignments_only() {
        let mut pool = pool();
        pool.enqueue("cardiologist", 0).unwrap();
        pool.enqueue("cardiologist", 1).unwrap();
        let (d, p) = pool.next_assignment("cardiologist", 0).unwrap();
        pool.occupy(d, p, 100).unwrap();

        // One of two disabled: the busy doctor keeps its patient,
        // the free one takes nobody.
        assert!(pool.next_assignment("cardiologist", 1).is_none());
        assert_eq!(pool.busy_count(), 1);
        // Over-saturated reductions clamp at the pool size.
        assert!(pool.next_assignment("cardiologist", 99).is_none());
        assert!(pool.next_assignment("cardiologist", 0).is_some());
    }

    #[test]
    fn occupying_a_busy_doctor_is_an_error() {
        let mut pool = pool();
        pool.occupy(2, 0, 3).unwrap();
        assert!(pool.occupy(2, 1, 3).is_err());
    }
}
