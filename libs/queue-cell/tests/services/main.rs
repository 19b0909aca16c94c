mod advancement_test;
mod notifications_test;

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use directory_cell::{ApprovalStatus, DoctorProfile, HospitalProfile, InMemoryDirectory, PatientProfile};
use queue_cell::*;
use shared_config::QueueSettings;
use shared_utils::test_utils::TestConfig;

pub fn day(d: u32) -> QueueDate {
    QueueDate::from_ymd(2026, 10, d).unwrap()
}

/// A queue wired to in-memory backends with one approved doctor at one hospital.
pub struct Fixture {
    pub config: TestConfig,
    pub state: Arc<QueueState>,
    pub directory: InMemoryDirectory,
    pub doctor: DoctorProfile,
    pub hospital: HospitalProfile,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_settings(QueueSettings::default()).await
    }

    pub async fn with_settings(settings: QueueSettings) -> Self {
        Self::with_store(settings, Arc::new(InMemoryAppointmentStore::new())).await
    }

    pub async fn with_store(settings: QueueSettings, store: Arc<dyn AppointmentStore>) -> Self {
        let config = TestConfig {
            queue: settings,
            ..TestConfig::default()
        };
        let directory = InMemoryDirectory::new();

        let hospital = HospitalProfile {
            id: Uuid::new_v4(),
            name: "City General".to_string(),
            admins: vec!["hospital-admin-user".to_string()],
            is_approved: true,
        };
        directory.insert_hospital(hospital.clone()).await;

        let state = QueueState::new(
            config.to_arc(),
            Arc::new(directory.clone()),
            store,
        )
        .unwrap();

        let doctor = doctor_profile("doctor-user", "Dr. Sam Stone", hospital.id, ApprovalStatus::Approved);
        directory.insert_doctor(doctor.clone()).await;

        Self {
            config,
            state: Arc::new(state),
            directory,
            doctor,
            hospital,
        }
    }

    pub async fn add_doctor(&self, user_id: &str, name: &str, status: ApprovalStatus) -> DoctorProfile {
        let doctor = doctor_profile(user_id, name, self.hospital.id, status);
        self.directory.insert_doctor(doctor.clone()).await;
        doctor
    }

    pub async fn patient(&self, name: &str) -> PatientProfile {
        let patient = PatientProfile {
            id: Uuid::new_v4(),
            user_id: format!("user-{}", Uuid::new_v4()),
            name: name.to_string(),
        };
        self.directory.insert_patient(patient.clone()).await;
        patient
    }

    pub fn request(&self, doctor: &DoctorProfile, date: QueueDate) -> BookAppointmentRequest {
        BookAppointmentRequest {
            doctor_id: doctor.id,
            hospital_id: self.hospital.id,
            appointment_date: RequestedDate::Day(date.date()),
            appointment_type: AppointmentType::Visit,
            notes: None,
        }
    }

    pub async fn book(&self, patient: &PatientProfile, date: QueueDate) -> Appointment {
        self.state
            .allocator
            .book(patient, self.request(&self.doctor, date), Utc::now())
            .await
            .unwrap()
    }

    /// Books `count` fresh patients with the default doctor on `date`.
    pub async fn book_many(&self, count: usize, date: QueueDate) -> Vec<Appointment> {
        let mut booked = Vec::with_capacity(count);
        for i in 0..count {
            let patient = self.patient(&format!("Patient {}", i + 1)).await;
            booked.push(self.book(&patient, date).await);
        }
        booked
    }

    pub async fn set_status(&self, appointment: &Appointment, target: StatusTarget) -> Appointment {
        self.state
            .lifecycle
            .update_status(appointment.id, target, UpdateScope::Doctor(self.doctor.id), Utc::now())
            .await
            .unwrap()
    }

    pub async fn call_next(&self, date: QueueDate) -> AdvanceOutcome {
        self.state
            .advancement
            .call_next(&self.doctor, date, Utc::now())
            .await
            .unwrap()
    }
}

fn doctor_profile(user_id: &str, name: &str, hospital_id: Uuid, status: ApprovalStatus) -> DoctorProfile {
    DoctorProfile {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        name: name.to_string(),
        specialization: Some("General Medicine".to_string()),
        timings: None,
        fees_per_consultation: None,
        hospital_id: Some(hospital_id),
        status,
    }
}

pub fn called(outcome: AdvanceOutcome) -> Appointment {
    match outcome {
        AdvanceOutcome::Called { appointment, .. } => appointment,
        AdvanceOutcome::QueueEmpty => panic!("expected a patient to be called"),
    }
}
