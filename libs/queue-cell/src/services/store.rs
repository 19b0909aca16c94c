use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Appointment, PartitionKey, QueueDate, QueueError};

/// Persistence for appointments and their per-partition token sequences.
///
/// Every mutation after insert goes through [`AppointmentStore::compare_and_swap`],
/// so two writers holding the same version cannot both win.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Atomically increments and returns the partition's sequence. The first call yields 1.
    async fn next_token_number(&self, partition: &PartitionKey) -> Result<u32, QueueError>;

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, QueueError>;

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, QueueError>;

    /// Replaces the record if its stored version equals `expected_version`.
    /// The returned record carries the bumped version.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        appointment: Appointment,
    ) -> Result<Appointment, QueueError>;

    /// All of a doctor's appointments on `date`, across hospitals, in token order.
    async fn list_by_doctor(&self, doctor_id: Uuid, date: QueueDate) -> Result<Vec<Appointment>, QueueError>;

    async fn list_by_hospital(&self, hospital_id: Uuid, date: QueueDate) -> Result<Vec<Appointment>, QueueError>;

    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, QueueError>;
}

#[derive(Default)]
struct Records {
    appointments: HashMap<Uuid, Appointment>,
    sequences: HashMap<PartitionKey, u32>,
}

impl Records {
    fn collect<P>(&self, predicate: P) -> Vec<Appointment>
    where
        P: Fn(&Appointment) -> bool,
    {
        let mut found: Vec<Appointment> = self
            .appointments
            .values()
            .filter(|appointment| predicate(appointment))
            .cloned()
            .collect();
        found.sort_by(Appointment::queue_order);
        found
    }
}

/// Process-local store. Sequences and records share one lock.
#[derive(Clone, Default)]
pub struct InMemoryAppointmentStore {
    records: Arc<RwLock<Records>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn next_token_number(&self, partition: &PartitionKey) -> Result<u32, QueueError> {
        let mut records = self.records.write().await;
        let cell = records.sequences.entry(partition.clone()).or_insert(0);
        *cell = cell
            .checked_add(1)
            .ok_or_else(|| QueueError::Storage(format!("Token sequence exhausted for {}", partition)))?;
        Ok(*cell)
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, QueueError> {
        let mut records = self.records.write().await;
        if records.appointments.contains_key(&appointment.id) {
            return Err(QueueError::Storage(format!("Appointment {} already exists", appointment.id)));
        }
        records.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, QueueError> {
        Ok(self.records.read().await.appointments.get(&id).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        mut appointment: Appointment,
    ) -> Result<Appointment, QueueError> {
        let mut records = self.records.write().await;
        let stored = records
            .appointments
            .get_mut(&appointment.id)
            .ok_or_else(|| QueueError::NotFound(format!("Appointment {} not found", appointment.id)))?;

        if stored.version != expected_version {
            debug!(
                "CAS rejected for {}: expected v{}, found v{}",
                appointment.id, expected_version, stored.version
            );
            return Err(QueueError::ConcurrencyConflict(appointment.id.to_string()));
        }

        appointment.version = expected_version + 1;
        *stored = appointment.clone();
        Ok(appointment)
    }

    async fn list_by_doctor(&self, doctor_id: Uuid, date: QueueDate) -> Result<Vec<Appointment>, QueueError> {
        let records = self.records.read().await;
        Ok(records.collect(|a| a.doctor_id == doctor_id && a.queue_date == date))
    }

    async fn list_by_hospital(&self, hospital_id: Uuid, date: QueueDate) -> Result<Vec<Appointment>, QueueError> {
        let records = self.records.read().await;
        Ok(records.collect(|a| a.hospital_id == hospital_id && a.queue_date == date))
    }

    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, QueueError> {
        let records = self.records.read().await;
        Ok(records.collect(|a| a.patient_id == patient_id))
    }
}

/// Runs `op` again while it fails with a concurrency conflict, at most `max_retries` extra times.
/// `op` must re-read whatever state it decides on.
pub async fn retry_on_conflict<T, F, Fut>(max_retries: u32, mut op: F) -> Result<T, QueueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QueueError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if err.is_conflict() && attempt < max_retries => {
                attempt += 1;
                debug!("Retrying after conflict (attempt {}/{}): {}", attempt, max_retries, err);
                tokio::task::yield_now().await;
            }
            Err(err) if err.is_conflict() => {
                warn!("Giving up after {} conflicting attempts: {}", attempt + 1, err);
                return Err(err);
            }
            other => return other,
        }
    }
}
