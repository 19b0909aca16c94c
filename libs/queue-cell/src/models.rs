use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::QueueError;

// ==============================================================================
// QUEUE DAY
// ==============================================================================

/// Canonical day bucket for token sequencing. Compared by equality only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueDate(NaiveDate);

impl QueueDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn day_of_month(&self) -> u32 {
        self.0.day()
    }

    pub fn succ(&self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }
}

impl fmt::Display for QueueDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for QueueDate {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|_| QueueError::ValidationError(format!("Invalid date {:?}, expected YYYY-MM-DD", s)))
    }
}

/// The (doctor, hospital, day) triple that owns one token sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub doctor_id: Uuid,
    pub hospital_id: Uuid,
    pub queue_date: QueueDate,
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.doctor_id, self.hospital_id, self.queue_date)
    }
}

// ==============================================================================
// STATUSES
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    #[default]
    Waiting,
    Serving,
    Completed,
    Skipped,
}

impl TokenStatus {
    pub const ALL: [TokenStatus; 4] = [
        TokenStatus::Waiting,
        TokenStatus::Serving,
        TokenStatus::Completed,
        TokenStatus::Skipped,
    ];

    /// Statuses shown on a doctor's active queue.
    pub fn is_active(&self) -> bool {
        !matches!(self, TokenStatus::Completed)
    }

    pub fn can_transition_to(&self, target: &TokenStatus) -> bool {
        use TokenStatus::*;
        match (self, target) {
            (from, to) if from == to => true,
            (Completed, _) => false,
            (Waiting, _) => true,
            (Serving, _) => true,
            (Skipped, _) => true,
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStatus::Waiting => write!(f, "waiting"),
            TokenStatus::Serving => write!(f, "serving"),
            TokenStatus::Completed => write!(f, "completed"),
            TokenStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl FromStr for TokenStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        TokenStatus::ALL
            .into_iter()
            .find(|status| status.to_string() == wanted)
            .ok_or_else(|| QueueError::ValidationError(format!("Unknown token status: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
    #[serde(rename = "no-show", alias = "no_show")]
    NoShow,
}

impl AppointmentStatus {
    pub fn is_closed(&self) -> bool {
        !matches!(self, AppointmentStatus::Scheduled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no-show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentType {
    #[default]
    #[serde(alias = "in_person", alias = "in-person")]
    Visit,
    #[serde(alias = "remote", alias = "telehealth")]
    Video,
}

/// Requested outcome of a manual status update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusTarget {
    Waiting,
    Serving,
    Completed,
    Skipped,
    Cancelled,
    #[serde(rename = "no-show", alias = "no_show")]
    NoShow,
}

impl StatusTarget {
    fn token_status(&self) -> TokenStatus {
        match self {
            StatusTarget::Waiting => TokenStatus::Waiting,
            StatusTarget::Serving => TokenStatus::Serving,
            StatusTarget::Completed => TokenStatus::Completed,
            StatusTarget::Skipped | StatusTarget::Cancelled | StatusTarget::NoShow => TokenStatus::Skipped,
        }
    }

    fn appointment_status(&self) -> Option<AppointmentStatus> {
        match self {
            StatusTarget::Completed => Some(AppointmentStatus::Completed),
            StatusTarget::Cancelled => Some(AppointmentStatus::Cancelled),
            StatusTarget::NoShow => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }
}

impl fmt::Display for StatusTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusTarget::Waiting => write!(f, "waiting"),
            StatusTarget::Serving => write!(f, "serving"),
            StatusTarget::Completed => write!(f, "completed"),
            StatusTarget::Skipped => write!(f, "skipped"),
            StatusTarget::Cancelled => write!(f, "cancelled"),
            StatusTarget::NoShow => write!(f, "no-show"),
        }
    }
}

/// Token status filter for history lookups. Missing or "All" means no filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(TokenStatus),
}

impl StatusFilter {
    pub fn parse(raw: Option<&str>) -> Result<Self, QueueError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(StatusFilter::All),
            Some(value) if value.eq_ignore_ascii_case("all") => Ok(StatusFilter::All),
            Some(value) => value.parse().map(StatusFilter::Only),
        }
    }

    pub fn matches(&self, status: TokenStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

/// What happens to the doctor's current `serving` token when the next one is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServingPolicy {
    /// Earlier serving tokens are left untouched.
    #[default]
    Concurrent,
    /// Earlier serving tokens are completed once a new token is promoted.
    Single,
}

impl FromStr for ServingPolicy {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concurrent" => Ok(ServingPolicy::Concurrent),
            "single" => Ok(ServingPolicy::Single),
            other => Err(QueueError::ValidationError(format!("Unknown serving policy: {}", other))),
        }
    }
}

// ==============================================================================
// APPOINTMENT + TOKEN
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    pub number: u32,
    pub display_token: String,
    pub status: TokenStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub hospital_id: Uuid,
    pub patient_name: String,
    pub doctor_name: String,
    pub appointment_date: DateTime<Utc>,
    pub queue_date: QueueDate,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub token: Token,
    pub notes: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn partition(&self) -> PartitionKey {
        PartitionKey {
            doctor_id: self.doctor_id,
            hospital_id: self.hospital_id,
            queue_date: self.queue_date,
        }
    }

    /// Visible on the doctor's active queue.
    pub fn is_active(&self) -> bool {
        self.token.status.is_active()
            && !matches!(self.status, AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }

    pub fn is_waiting(&self) -> bool {
        self.status == AppointmentStatus::Scheduled && self.token.status == TokenStatus::Waiting
    }

    pub fn is_serving(&self) -> bool {
        self.status == AppointmentStatus::Scheduled && self.token.status == TokenStatus::Serving
    }

    /// Applies `target` in place. Returns `false` when nothing changed.
    pub fn transition(&mut self, target: StatusTarget, now: DateTime<Utc>) -> Result<bool, QueueError> {
        let next_token = target.token_status();
        let next_status = target.appointment_status();

        if self.status.is_closed() || !self.token.status.can_transition_to(&next_token) {
            if self.token.status == next_token && next_status.map_or(true, |s| s == self.status) {
                return Ok(false);
            }
            return Err(QueueError::InvalidStatusTransition {
                from: format!("{}/{}", self.status, self.token.status),
                to: target.to_string(),
            });
        }

        let changed = self.token.status != next_token || next_status.is_some_and(|s| s != self.status);
        self.token.status = next_token;
        if let Some(status) = next_status {
            self.status = status;
        }
        if changed {
            self.updated_at = now;
        }
        Ok(changed)
    }

    /// Ordering used by every queue projection.
    pub fn queue_order(a: &Appointment, b: &Appointment) -> std::cmp::Ordering {
        a.token
            .number
            .cmp(&b.token.number)
            .then_with(|| a.created_at.cmp(&b.created_at))
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Booking date as sent by clients: an RFC 3339 instant, a local date-time
/// without offset, or a bare calendar day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RequestedDate {
    Timestamp(DateTime<Utc>),
    Local(NaiveDateTime),
    Day(NaiveDate),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    #[serde(alias = "doctorId")]
    pub doctor_id: Uuid,
    #[serde(alias = "hospitalId")]
    pub hospital_id: Uuid,
    #[serde(alias = "appointmentDate")]
    pub appointment_date: RequestedDate,
    #[serde(rename = "type", default)]
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: StatusTarget,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub date: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallNextResponse {
    pub queue_empty: bool,
    pub appointment: Option<Appointment>,
}

// ==============================================================================
// REAL-TIME EVENTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientCalled {
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub hospital_id: Uuid,
    pub patient_id: Uuid,
    pub token_number: u32,
    pub display_token: String,
    pub patient_name: String,
    pub doctor_name: String,
    pub queue_date: QueueDate,
}

impl PatientCalled {
    pub fn for_appointment(appointment: &Appointment) -> Self {
        Self {
            appointment_id: appointment.id,
            doctor_id: appointment.doctor_id,
            hospital_id: appointment.hospital_id,
            patient_id: appointment.patient_id,
            token_number: appointment.token.number,
            display_token: appointment.token.display_token.clone(),
            patient_name: appointment.patient_name.clone(),
            doctor_name: appointment.doctor_name.clone(),
            queue_date: appointment.queue_date,
        }
    }
}

/// Messages a connected dashboard may send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Setup {
        #[serde(default)]
        hospital_id: Option<Uuid>,
    },
    CallPatient,
    Ping,
}

/// Messages pushed to connected dashboards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected { topics: Vec<String> },
    PatientCalled(PatientCalled),
    CallResult { appointment: Box<Appointment> },
    QueueEmpty { doctor_id: Uuid, queue_date: QueueDate },
    Error { message: String },
    Pong,
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string(self)?)
    }
}
