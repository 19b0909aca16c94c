use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{
    DirectoryError, DirectorySeed, DoctorProfile, HospitalProfile, PatientProfile, ProfileDirectory,
};

#[derive(Debug, Default)]
struct Profiles {
    doctors: HashMap<Uuid, DoctorProfile>,
    patients: HashMap<Uuid, PatientProfile>,
    hospitals: HashMap<Uuid, HospitalProfile>,
}

/// Directory held in process memory. Used by tests and single-node demos.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDirectory {
    profiles: Arc<RwLock<Profiles>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let profiles = Profiles {
            doctors: seed.doctors.into_iter().map(|d| (d.id, d)).collect(),
            patients: seed.patients.into_iter().map(|p| (p.id, p)).collect(),
            hospitals: seed.hospitals.into_iter().map(|h| (h.id, h)).collect(),
        };

        Self {
            profiles: Arc::new(RwLock::new(profiles)),
        }
    }

    pub async fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DirectoryError::Seed(format!("{}: {}", path.display(), e)))?;
        let seed: DirectorySeed = serde_json::from_str(&raw)?;

        debug!(
            "Loaded {} doctors, {} patients, {} hospitals from seed",
            seed.doctors.len(),
            seed.patients.len(),
            seed.hospitals.len()
        );
        Ok(Self::from_seed(seed))
    }

    pub async fn insert_doctor(&self, doctor: DoctorProfile) {
        self.profiles.write().await.doctors.insert(doctor.id, doctor);
    }

    pub async fn insert_patient(&self, patient: PatientProfile) {
        self.profiles.write().await.patients.insert(patient.id, patient);
    }

    pub async fn insert_hospital(&self, hospital: HospitalProfile) {
        self.profiles.write().await.hospitals.insert(hospital.id, hospital);
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryDirectory {
    async fn doctor(&self, id: Uuid) -> Result<Option<DoctorProfile>, DirectoryError> {
        Ok(self.profiles.read().await.doctors.get(&id).cloned())
    }

    async fn doctor_by_user(&self, user_id: &str) -> Result<Option<DoctorProfile>, DirectoryError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.doctors.values().find(|d| d.user_id == user_id).cloned())
    }

    async fn patient(&self, id: Uuid) -> Result<Option<PatientProfile>, DirectoryError> {
        Ok(self.profiles.read().await.patients.get(&id).cloned())
    }

    async fn patient_by_user(&self, user_id: &str) -> Result<Option<PatientProfile>, DirectoryError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.patients.values().find(|p| p.user_id == user_id).cloned())
    }

    async fn hospital(&self, id: Uuid) -> Result<Option<HospitalProfile>, DirectoryError> {
        Ok(self.profiles.read().await.hospitals.get(&id).cloned())
    }

    async fn hospital_for_admin(&self, user_id: &str) -> Result<Option<HospitalProfile>, DirectoryError> {
        let profiles = self.profiles.read().await;
        Ok(profiles
            .hospitals
            .values()
            .find(|h| h.is_administered_by(user_id))
            .cloned())
    }
}
