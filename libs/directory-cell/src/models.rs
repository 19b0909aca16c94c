use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub specialization: Option<String>,
    /// Free-form shift hours, e.g. "Mon-Fri: 09:00-17:00".
    #[serde(default)]
    pub timings: Option<String>,
    #[serde(default)]
    pub fees_per_consultation: Option<f64>,
    #[serde(default)]
    pub hospital_id: Option<Uuid>,
    #[serde(default)]
    pub status: ApprovalStatus,
}

impl DoctorProfile {
    pub fn is_bookable(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }

    /// A doctor without a hospital on file may be booked at any hospital.
    pub fn practises_at(&self, hospital_id: Uuid) -> bool {
        self.hospital_id.map_or(true, |own| own == hospital_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientProfile {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HospitalProfile {
    pub id: Uuid,
    pub name: String,
    /// User ids allowed to manage this hospital's live board.
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub is_approved: bool,
}

impl HospitalProfile {
    pub fn accepts_bookings(&self) -> bool {
        self.is_approved
    }

    pub fn is_administered_by(&self, user_id: &str) -> bool {
        self.admins.iter().any(|admin| admin == user_id)
    }
}

/// Shape of `DIRECTORY_SEED_FILE`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub doctors: Vec<DoctorProfile>,
    #[serde(default)]
    pub patients: Vec<PatientProfile>,
    #[serde(default)]
    pub hospitals: Vec<HospitalProfile>,
}
