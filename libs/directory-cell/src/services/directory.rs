use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;

use crate::{
    DirectoryError, DoctorProfile, HospitalProfile, InMemoryDirectory, PatientProfile,
    SupabaseDirectory,
};

/// Read-only view of the profiles owned by the registration system.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn doctor(&self, id: Uuid) -> Result<Option<DoctorProfile>, DirectoryError>;

    async fn doctor_by_user(&self, user_id: &str) -> Result<Option<DoctorProfile>, DirectoryError>;

    async fn patient(&self, id: Uuid) -> Result<Option<PatientProfile>, DirectoryError>;

    async fn patient_by_user(&self, user_id: &str) -> Result<Option<PatientProfile>, DirectoryError>;

    async fn hospital(&self, id: Uuid) -> Result<Option<HospitalProfile>, DirectoryError>;

    async fn hospital_for_admin(&self, user_id: &str) -> Result<Option<HospitalProfile>, DirectoryError>;
}

/// Picks the Supabase directory when it is configured, otherwise an in-memory
/// one, optionally seeded from `DIRECTORY_SEED_FILE`.
pub async fn directory_from_config(config: &AppConfig) -> Result<Arc<dyn ProfileDirectory>, DirectoryError> {
    if config.is_directory_remote() {
        info!("Using Supabase profile directory at {}", config.supabase_url);
        return Ok(Arc::new(SupabaseDirectory::new(config)));
    }

    let directory = match &config.directory_seed_file {
        Some(path) => {
            info!("Seeding in-memory profile directory from {}", path);
            InMemoryDirectory::from_seed_file(path).await?
        }
        None => {
            info!("Using empty in-memory profile directory");
            InMemoryDirectory::new()
        }
    };

    Ok(Arc::new(directory))
}
