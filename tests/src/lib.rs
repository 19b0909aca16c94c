//! Boots the full API on an ephemeral port and talks to it over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::{Client, Response};
use serde_json::Value;
use tokio::net::TcpListener;
use uuid::Uuid;

use directory_cell::{ApprovalStatus, DirectorySeed, DoctorProfile, HospitalProfile, InMemoryDirectory, PatientProfile};
use outpatient_queue_api::create_router;
use queue_cell::{InMemoryAppointmentStore, QueueState};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

pub const DOCTOR_USER: &str = "doctor-user";
pub const PATIENT_USER: &str = "patient-user";
pub const ADMIN_USER: &str = "hospital-admin-user";

/// A running server plus the profiles it was seeded with.
pub struct TestServer {
    pub addr: SocketAddr,
    pub config: TestConfig,
    pub state: Arc<QueueState>,
    pub doctor: DoctorProfile,
    pub patient: PatientProfile,
    pub hospital: HospitalProfile,
}

impl TestServer {
    pub async fn start() -> Self {
        let hospital = HospitalProfile {
            id: Uuid::new_v4(),
            name: "City General".to_string(),
            admins: vec![ADMIN_USER.to_string()],
            is_approved: true,
        };
        let doctor = DoctorProfile {
            id: Uuid::new_v4(),
            user_id: DOCTOR_USER.to_string(),
            name: "Dr. Sam Stone".to_string(),
            specialization: Some("General Medicine".to_string()),
            timings: Some("Mon-Fri: 09:00-17:00".to_string()),
            fees_per_consultation: Some(500.0),
            hospital_id: Some(hospital.id),
            status: ApprovalStatus::Approved,
        };
        let patient = PatientProfile {
            id: Uuid::new_v4(),
            user_id: PATIENT_USER.to_string(),
            name: "Asha Rao".to_string(),
        };

        let directory = InMemoryDirectory::from_seed(DirectorySeed {
            doctors: vec![doctor.clone()],
            patients: vec![patient.clone()],
            hospitals: vec![hospital.clone()],
        });

        let config = TestConfig::default();
        let state = Arc::new(
            QueueState::new(
                config.to_arc(),
                Arc::new(directory),
                Arc::new(InMemoryAppointmentStore::new()),
            )
            .expect("queue state"),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let app = create_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server");
        });

        Self {
            addr,
            config,
            state,
            doctor,
            patient,
            hospital,
        }
    }

    pub fn client_as(&self, user_id: &str, role: &str) -> ApiTestClient {
        let user = TestUser::new(&format!("{}@example.com", user_id), role).with_id(user_id);
        let token = JwtTestUtils::create_test_token(&user, &self.config.jwt_secret, None);
        ApiTestClient::new(&format!("http://{}", self.addr), Some(token))
    }

    pub fn anonymous(&self) -> ApiTestClient {
        ApiTestClient::new(&format!("http://{}", self.addr), None)
    }
}

/// Test client with authentication capabilities
pub struct ApiTestClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ApiTestClient {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
            auth_token,
        }
    }

    pub async fn get(&self, path: &str) -> Result<Response, reqwest::Error> {
        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(ref token) = self.auth_token {
            request = request.bearer_auth(token);
        }
        request.send().await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Response, reqwest::Error> {
        let mut request = self.client.post(format!("{}{}", self.base_url, path)).json(&body);
        if let Some(ref token) = self.auth_token {
            request = request.bearer_auth(token);
        }
        request.send().await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Response, reqwest::Error> {
        let mut request = self.client.put(format!("{}{}", self.base_url, path)).json(&body);
        if let Some(ref token) = self.auth_token {
            request = request.bearer_auth(token);
        }
        request.send().await
    }
}
