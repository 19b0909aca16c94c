use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    retry_on_conflict, Appointment, AppointmentStore, QueueDate, QueueError, StatusFilter, StatusTarget,
};

/// Who is asking for a status change. Each caller may only touch their own records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateScope {
    Doctor(Uuid),
    Hospital(Uuid),
}

impl UpdateScope {
    fn covers(&self, appointment: &Appointment) -> bool {
        match self {
            UpdateScope::Doctor(id) => appointment.doctor_id == *id,
            UpdateScope::Hospital(id) => appointment.hospital_id == *id,
        }
    }
}

/// Manual status updates plus the read-side projections of the queue.
pub struct QueueLifecycleService {
    store: Arc<dyn AppointmentStore>,
    max_retries: u32,
}

impl QueueLifecycleService {
    pub fn new(store: Arc<dyn AppointmentStore>, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    pub async fn get(&self, id: Uuid) -> Result<Appointment, QueueError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| QueueError::NotFound("Appointment not found".to_string()))
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        target: StatusTarget,
        scope: UpdateScope,
        now: DateTime<Utc>,
    ) -> Result<Appointment, QueueError> {
        let updated = retry_on_conflict(self.max_retries, || async {
            let current = self.get(id).await?;
            if !scope.covers(&current) {
                return Err(QueueError::Forbidden("Appointment belongs to another queue".to_string()));
            }

            let mut next = current.clone();
            if !next.transition(target, now)? {
                debug!("Status update on {} to {} is a no-op", id, target);
                return Ok(current);
            }

            self.store.compare_and_swap(current.version, next).await
        })
        .await?;

        info!(
            "Appointment {} ({}) now {}/{}",
            updated.id, updated.token.display_token, updated.status, updated.token.status
        );
        Ok(updated)
    }

    /// The doctor's working list for `date`: waiting, serving and skipped tokens.
    pub async fn active_queue(&self, doctor_id: Uuid, date: QueueDate) -> Result<Vec<Appointment>, QueueError> {
        let mut queue = self.store.list_by_doctor(doctor_id, date).await?;
        queue.retain(Appointment::is_active);
        Ok(queue)
    }

    /// Every appointment at the hospital for `date`, any status.
    pub async fn live_board(&self, hospital_id: Uuid, date: QueueDate) -> Result<Vec<Appointment>, QueueError> {
        self.store.list_by_hospital(hospital_id, date).await
    }

    pub async fn history(
        &self,
        doctor_id: Uuid,
        date: QueueDate,
        filter: StatusFilter,
    ) -> Result<Vec<Appointment>, QueueError> {
        let mut history = self.store.list_by_doctor(doctor_id, date).await?;
        history.retain(|a| filter.matches(a.token.status));
        Ok(history)
    }

    /// Newest queue day first, token order within a day.
    pub async fn patient_appointments(&self, patient_id: Uuid) -> Result<Vec<Appointment>, QueueError> {
        let mut appointments = self.store.list_by_patient(patient_id).await?;
        appointments.sort_by_key(|a| (Reverse(a.queue_date), a.token.number, a.created_at));
        Ok(appointments)
    }

    pub async fn now_serving(&self, doctor_id: Uuid, date: QueueDate) -> Result<Vec<Appointment>, QueueError> {
        let mut serving = self.store.list_by_doctor(doctor_id, date).await?;
        serving.retain(Appointment::is_serving);
        Ok(serving)
    }
}
