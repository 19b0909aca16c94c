use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::{DirectoryError, DoctorProfile, HospitalProfile, PatientProfile, ProfileDirectory};

const DOCTORS: &str = "doctors";
const PATIENTS: &str = "patients";
const HOSPITALS: &str = "hospitals";

/// Profiles read from the registration system's PostgREST tables.
pub struct SupabaseDirectory {
    supabase: SupabaseClient,
}

impl SupabaseDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn lookup<T>(&self, table: &str, column: &str, value: &str) -> Result<Option<T>, DirectoryError>
    where
        T: DeserializeOwned,
    {
        debug!("Directory lookup {}.{} = {}", table, column, value);
        self.supabase
            .select_one(table, column, value)
            .await
            .map_err(|e| {
                error!("Directory lookup on {} failed: {}", table, e);
                DirectoryError::Backend(e.to_string())
            })
    }
}

#[async_trait]
impl ProfileDirectory for SupabaseDirectory {
    async fn doctor(&self, id: Uuid) -> Result<Option<DoctorProfile>, DirectoryError> {
        self.lookup(DOCTORS, "id", &id.to_string()).await
    }

    async fn doctor_by_user(&self, user_id: &str) -> Result<Option<DoctorProfile>, DirectoryError> {
        self.lookup(DOCTORS, "user_id", user_id).await
    }

    async fn patient(&self, id: Uuid) -> Result<Option<PatientProfile>, DirectoryError> {
        self.lookup(PATIENTS, "id", &id.to_string()).await
    }

    async fn patient_by_user(&self, user_id: &str) -> Result<Option<PatientProfile>, DirectoryError> {
        self.lookup(PATIENTS, "user_id", user_id).await
    }

    async fn hospital(&self, id: Uuid) -> Result<Option<HospitalProfile>, DirectoryError> {
        self.lookup(HOSPITALS, "id", &id.to_string()).await
    }

    async fn hospital_for_admin(&self, user_id: &str) -> Result<Option<HospitalProfile>, DirectoryError> {
        self.supabase
            .select_one_containing(HOSPITALS, "admins", user_id)
            .await
            .map_err(|e| {
                error!("Hospital admin lookup failed: {}", e);
                DirectoryError::Backend(e.to_string())
            })
    }
}
