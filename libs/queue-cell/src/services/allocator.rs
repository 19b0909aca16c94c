use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use directory_cell::{PatientProfile, ProfileDirectory};

use crate::{
    Appointment, AppointmentStatus, AppointmentStore, BookAppointmentRequest, DailyPartitionPolicy,
    PartitionKey, QueueDate, QueueError, Token, TokenStatus,
};

/// Initial used in display codes: first letter of the doctor's last name.
pub fn doctor_initial(doctor_name: &str) -> String {
    let word = doctor_name
        .split_whitespace()
        .last()
        .unwrap_or(doctor_name);

    word.chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_default()
}

/// `DR{Initial}-{DD}-{NNN}`, e.g. `DRS-14-003`.
pub fn display_token(doctor_name: &str, queue_date: QueueDate, number: u32) -> String {
    format!(
        "DR{}-{:02}-{:03}",
        doctor_initial(doctor_name),
        queue_date.day_of_month(),
        number
    )
}

/// Issues tokens. Numbers come from the store's per-partition counter, never from a scan.
pub struct TokenAllocator {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn ProfileDirectory>,
    policy: DailyPartitionPolicy,
    allow_duplicates: bool,
}

impl TokenAllocator {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn ProfileDirectory>,
        policy: DailyPartitionPolicy,
        allow_duplicates: bool,
    ) -> Self {
        Self {
            store,
            directory,
            policy,
            allow_duplicates,
        }
    }

    pub async fn book(
        &self,
        patient: &PatientProfile,
        request: BookAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<Appointment, QueueError> {
        debug!("Booking request from patient {} for doctor {}", patient.id, request.doctor_id);

        let doctor = self
            .directory
            .doctor(request.doctor_id)
            .await?
            .ok_or_else(|| QueueError::NotFound("Doctor not found".to_string()))?;

        if !doctor.is_bookable() {
            warn!("Rejected booking for unapproved doctor {}", doctor.id);
            return Err(QueueError::ValidationError("Doctor is not accepting appointments".to_string()));
        }

        let hospital = self
            .directory
            .hospital(request.hospital_id)
            .await?
            .ok_or_else(|| QueueError::NotFound("Hospital not found".to_string()))?;

        if !hospital.accepts_bookings() {
            warn!("Rejected booking at unapproved hospital {}", hospital.id);
            return Err(QueueError::ValidationError("Hospital is not accepting appointments".to_string()));
        }

        if !doctor.practises_at(hospital.id) {
            warn!("Doctor {} does not practise at hospital {}", doctor.id, hospital.id);
            return Err(QueueError::ValidationError("Doctor does not practise at this hospital".to_string()));
        }

        let (appointment_date, queue_date) = self.policy.resolve(&request.appointment_date);
        let partition = PartitionKey {
            doctor_id: doctor.id,
            hospital_id: request.hospital_id,
            queue_date,
        };

        if !self.allow_duplicates {
            self.ensure_not_booked(patient.id, &partition).await?;
        }

        let number = self.store.next_token_number(&partition).await?;

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            doctor_id: doctor.id,
            hospital_id: request.hospital_id,
            patient_name: patient.name.clone(),
            doctor_name: doctor.name.clone(),
            appointment_date,
            queue_date,
            appointment_type: request.appointment_type,
            status: AppointmentStatus::Scheduled,
            token: Token {
                number,
                display_token: display_token(&doctor.name, queue_date, number),
                status: TokenStatus::Waiting,
            },
            notes: request.notes,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let appointment = self.store.insert(appointment).await?;

        info!(
            "Issued token {} ({}) to patient {} for {}",
            appointment.token.display_token, appointment.token.number, patient.id, partition
        );
        Ok(appointment)
    }

    async fn ensure_not_booked(&self, patient_id: Uuid, partition: &PartitionKey) -> Result<(), QueueError> {
        let existing = self
            .store
            .list_by_doctor(partition.doctor_id, partition.queue_date)
            .await?;

        let duplicate = existing.iter().find(|a| {
            a.patient_id == patient_id
                && a.hospital_id == partition.hospital_id
                && a.status != AppointmentStatus::Cancelled
        });

        match duplicate {
            Some(appointment) => Err(QueueError::DuplicateBooking(appointment.token.display_token.clone())),
            None => Ok(()),
        }
    }
}
