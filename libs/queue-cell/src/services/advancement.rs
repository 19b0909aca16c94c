use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use directory_cell::DoctorProfile;

use crate::{
    retry_on_conflict, Appointment, AppointmentStore, PatientCalled, QueueDate, QueueError,
    QueueNotificationHub, ServingPolicy, StatusTarget,
};

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    Called {
        appointment: Appointment,
        event: PatientCalled,
    },
    /// Nothing was waiting; no record was touched.
    QueueEmpty,
}

type AdvanceLock = Arc<Mutex<()>>;

/// "Call next": promotes the lowest waiting token of a doctor's day to serving.
///
/// Calls for the same (doctor, day) run one at a time within a process; the
/// store's compare-and-swap still guards writes from other instances.
pub struct QueueAdvancementService {
    store: Arc<dyn AppointmentStore>,
    hub: QueueNotificationHub,
    policy: ServingPolicy,
    max_retries: u32,
    locks: Mutex<HashMap<(Uuid, QueueDate), AdvanceLock>>,
}

impl QueueAdvancementService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        hub: QueueNotificationHub,
        policy: ServingPolicy,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            hub,
            policy,
            max_retries,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn partition_lock(&self, doctor_id: Uuid, date: QueueDate) -> AdvanceLock {
        let mut locks = self.locks.lock().await;
        locks.entry((doctor_id, date)).or_default().clone()
    }

    // Drops the entry once no other call holds or waits on it.
    async fn release_lock(&self, doctor_id: Uuid, date: QueueDate, lock: AdvanceLock) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks.get(&(doctor_id, date)).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&(doctor_id, date));
            debug!("Released advance lock for doctor {} on {}", doctor_id, date);
        }
    }

    pub async fn call_next(
        &self,
        doctor: &DoctorProfile,
        date: QueueDate,
        now: DateTime<Utc>,
    ) -> Result<AdvanceOutcome, QueueError> {
        let lock = self.partition_lock(doctor.id, date).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.advance(doctor, date, now).await
        };
        self.release_lock(doctor.id, date, lock).await;
        outcome
    }

    async fn advance(
        &self,
        doctor: &DoctorProfile,
        date: QueueDate,
        now: DateTime<Utc>,
    ) -> Result<AdvanceOutcome, QueueError> {
        let promoted = retry_on_conflict(self.max_retries, || async {
            let queue = self.store.list_by_doctor(doctor.id, date).await?;
            let previous: Vec<Appointment> = queue.iter().filter(|a| a.is_serving()).cloned().collect();
            let Some(next) = queue.into_iter().find(Appointment::is_waiting) else {
                return Ok(None);
            };

            let mut serving = next.clone();
            serving.transition(StatusTarget::Serving, now)?;
            let committed = self.store.compare_and_swap(next.version, serving).await?;
            Ok(Some((committed, previous)))
        })
        .await?;

        let Some((appointment, previous)) = promoted else {
            info!("Queue empty for doctor {} on {}", doctor.id, date);
            return Ok(AdvanceOutcome::QueueEmpty);
        };

        if self.policy == ServingPolicy::Single {
            self.complete_previous(previous, now).await;
        }

        let event = PatientCalled::for_appointment(&appointment);
        self.hub.publish_patient_called(&event).await;

        info!(
            "Doctor {} called token {} for patient {}",
            doctor.id, appointment.token.display_token, appointment.patient_id
        );
        Ok(AdvanceOutcome::Called { appointment, event })
    }

    // Only tokens that were serving before this promotion are completed.
    // Failures here leave the old token serving; the new call already committed.
    async fn complete_previous(&self, serving: Vec<Appointment>, now: DateTime<Utc>) {
        for previous in serving {
            let result = retry_on_conflict(self.max_retries, || async {
                let current = self
                    .store
                    .get(previous.id)
                    .await?
                    .ok_or_else(|| QueueError::NotFound(previous.id.to_string()))?;
                if !current.is_serving() {
                    return Ok(current);
                }
                let mut completed = current.clone();
                completed.transition(StatusTarget::Completed, now)?;
                self.store.compare_and_swap(current.version, completed).await
            })
            .await;

            match result {
                Ok(done) => info!("Completed previous token {}", done.token.display_token),
                Err(e) => warn!("Could not complete previous token {}: {}", previous.token.display_token, e),
            }
        }
    }
}
