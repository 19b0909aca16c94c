use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Extension, State},
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_models::auth::{Role, User};

use crate::{AdvanceOutcome, ClientEvent, QueueError, QueueState, ServerEvent, Topic};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Close the socket after this many unanswered pings.
const MAX_MISSED_PONGS: u32 = 3;

const OUTBOUND_BUFFER: usize = 64;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<QueueState>>,
    Extension(user): Extension<User>,
) -> impl IntoResponse {
    info!("WebSocket upgrade for user {}", user.id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

#[derive(Debug, PartialEq)]
pub(crate) enum HeartbeatAction {
    SendPing,
    TimedOut,
}

/// Counts pings that have not been answered since the last sign of life.
#[derive(Debug, Default)]
pub(crate) struct Heartbeat {
    missed: u32,
}

impl Heartbeat {
    pub(crate) fn on_pong(&mut self) {
        self.missed = 0;
    }

    pub(crate) fn on_tick(&mut self) -> HeartbeatAction {
        if self.missed >= MAX_MISSED_PONGS {
            return HeartbeatAction::TimedOut;
        }
        self.missed += 1;
        HeartbeatAction::SendPing
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<QueueState>, user: User) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut session = BridgeSession::new(state, user, tx.clone());
    let mut heartbeat = Heartbeat::default();
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        heartbeat.on_pong();
                        session.handle_text(text.as_str()).await;
                    }
                    Some(Ok(Message::Pong(_))) => heartbeat.on_pong(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("WebSocket read error for {}: {}", session.user.id, e);
                        break;
                    }
                    _ => {}
                }
            }
            _ = ticker.tick() => {
                match heartbeat.on_tick() {
                    HeartbeatAction::SendPing => {
                        if tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                    HeartbeatAction::TimedOut => {
                        info!("{} missed pongs from {}, disconnecting", MAX_MISSED_PONGS, session.user.id);
                        break;
                    }
                }
            }
        }
    }

    let user_id = session.user.id.clone();
    session.close().await;
    drop(tx);
    let _ = writer.await;

    info!("WebSocket disconnected for user {}", user_id);
}

/// One connected dashboard: its identity, the topics it joined and the
/// tasks forwarding those topics to the socket.
pub struct BridgeSession {
    state: Arc<QueueState>,
    user: User,
    outbound: mpsc::Sender<Message>,
    topics: Vec<Topic>,
    forwarders: Vec<JoinHandle<()>>,
}

impl BridgeSession {
    pub fn new(state: Arc<QueueState>, user: User, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            state,
            user,
            outbound,
            topics: Vec::new(),
            forwarders: Vec::new(),
        }
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub async fn handle_text(&mut self, text: &str) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                debug!("Unreadable client message from {}: {}", self.user.id, e);
                self.send(ServerEvent::Error {
                    message: "Unrecognised event".to_string(),
                })
                .await;
                return;
            }
        };

        let reply = match event {
            ClientEvent::Setup { hospital_id } => self.setup(hospital_id).await.map(|topics| ServerEvent::Connected {
                topics: topics.iter().map(Topic::to_string).collect(),
            }),
            ClientEvent::CallPatient => self.call_patient().await,
            ClientEvent::Ping => Ok(ServerEvent::Pong),
        };

        match reply {
            Ok(event) => self.send(event).await,
            Err(e) => {
                let message = client_message(&e);
                self.send(ServerEvent::Error { message }).await;
            }
        }
    }

    async fn resolve_topics(&self, hospital_id: Option<Uuid>) -> Result<Vec<Topic>, QueueError> {
        let directory = &self.state.directory;
        let role = self.user.role();

        if let Some(hospital_id) = hospital_id {
            let hospital = directory
                .hospital(hospital_id)
                .await?
                .ok_or_else(|| QueueError::NotFound("Hospital not found".to_string()))?;

            let allowed = match role {
                Some(Role::Admin) => true,
                Some(Role::HospitalAdmin) => hospital.is_administered_by(&self.user.id),
                _ => false,
            };
            if !allowed {
                return Err(QueueError::Forbidden("Not an administrator of this hospital".to_string()));
            }
            return Ok(vec![Topic::Hospital(hospital.id)]);
        }

        match role {
            Some(Role::Patient) => directory
                .patient_by_user(&self.user.id)
                .await?
                .map(|patient| vec![Topic::Patient(patient.id)])
                .ok_or_else(|| QueueError::ValidationError("Create patient profile first".to_string())),
            Some(Role::Doctor) => directory
                .doctor_by_user(&self.user.id)
                .await?
                .map(|doctor| vec![Topic::Doctor(doctor.id)])
                .ok_or_else(|| QueueError::NotFound("Doctor profile not found".to_string())),
            Some(Role::HospitalAdmin) => directory
                .hospital_for_admin(&self.user.id)
                .await?
                .map(|hospital| vec![Topic::Hospital(hospital.id)])
                .ok_or_else(|| QueueError::NotFound("No hospital is administered by this user".to_string())),
            _ => Err(QueueError::ValidationError("hospital_id is required for this role".to_string())),
        }
    }

    /// Joins the caller's topics, replacing any joined before.
    pub async fn setup(&mut self, hospital_id: Option<Uuid>) -> Result<Vec<Topic>, QueueError> {
        let topics = self.resolve_topics(hospital_id).await?;
        self.leave_topics().await;

        for topic in &topics {
            let mut receiver = self.state.hub.subscribe(*topic).await;
            let outbound = self.outbound.clone();
            let topic = *topic;

            self.forwarders.push(tokio::spawn(async move {
                loop {
                    match receiver.recv().await {
                        Ok(message) => {
                            if outbound.send(Message::Text(message.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Subscriber on {} lagged, {} events dropped", topic, skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }));
        }

        debug!("User {} joined {:?}", self.user.id, topics);
        self.topics = topics.clone();
        Ok(topics)
    }

    async fn call_patient(&self) -> Result<ServerEvent, QueueError> {
        if self.user.role() != Some(Role::Doctor) {
            return Err(QueueError::Forbidden("Only doctors can call patients".to_string()));
        }
        let doctor = self
            .state
            .directory
            .doctor_by_user(&self.user.id)
            .await?
            .ok_or_else(|| QueueError::NotFound("Doctor profile not found".to_string()))?;

        let queue_date = self.state.today();
        let outcome = self.state.advancement.call_next(&doctor, queue_date, Utc::now()).await?;

        Ok(match outcome {
            AdvanceOutcome::Called { appointment, .. } => ServerEvent::CallResult {
                appointment: Box::new(appointment),
            },
            AdvanceOutcome::QueueEmpty => ServerEvent::QueueEmpty {
                doctor_id: doctor.id,
                queue_date,
            },
        })
    }

    async fn send(&self, event: ServerEvent) {
        match event.to_json() {
            Ok(json) => {
                let _ = self.outbound.send(Message::Text(json.into())).await;
            }
            Err(e) => error!("Failed to serialize event: {}", e),
        }
    }

    async fn leave_topics(&mut self) {
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
            let _ = forwarder.await;
        }
        for topic in self.topics.drain(..) {
            self.state.hub.release(topic).await;
        }
    }

    pub async fn close(mut self) {
        self.leave_topics().await;
    }
}

fn client_message(err: &QueueError) -> String {
    match err {
        QueueError::Storage(_) | QueueError::Redis(_) | QueueError::Serialization(_) | QueueError::Directory(_) => {
            error!("WebSocket request failed: {}", err);
            "Operation failed".to_string()
        }
        other => other.to_string(),
    }
}
