use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{PatientCalled, ServerEvent};

const TOPIC_CAPACITY: usize = 64;

pub type TopicSender = broadcast::Sender<String>;
pub type TopicReceiver = broadcast::Receiver<String>;

/// Addressed channel a dashboard can join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Patient(Uuid),
    Hospital(Uuid),
    Doctor(Uuid),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Patient(id) => write!(f, "patient:{}", id),
            Topic::Hospital(id) => write!(f, "hospital:{}", id),
            Topic::Doctor(id) => write!(f, "doctor:{}", id),
        }
    }
}

/// In-process fan-out of queue events to connected sockets. Best effort:
/// nobody listening is fine, and lagging receivers drop messages.
#[derive(Clone, Default)]
pub struct QueueNotificationHub {
    channels: Arc<RwLock<HashMap<Topic, TopicSender>>>,
}

impl QueueNotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, topic: Topic) -> TopicReceiver {
        let mut channels = self.channels.write().await;
        channels
            .entry(topic)
            .or_insert_with(|| {
                debug!("Opened topic {}", topic);
                broadcast::channel(TOPIC_CAPACITY).0
            })
            .subscribe()
    }

    /// Drops the topic's sender once nobody listens to it.
    pub async fn release(&self, topic: Topic) {
        let mut channels = self.channels.write().await;
        if channels.get(&topic).is_some_and(|sender| sender.receiver_count() == 0) {
            channels.remove(&topic);
            debug!("Closed topic {}", topic);
        }
    }

    /// Sends to one topic. Returns how many receivers got the message.
    pub async fn publish(&self, topic: Topic, event: &ServerEvent) -> usize {
        let message = match event.to_json() {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping unserializable event for {}: {}", topic, e);
                return 0;
            }
        };

        let channels = self.channels.read().await;
        match channels.get(&topic) {
            Some(sender) => sender.send(message).unwrap_or(0),
            None => 0,
        }
    }

    /// Notifies the called patient, the hospital board and the doctor's other sessions.
    pub async fn publish_patient_called(&self, called: &PatientCalled) -> usize {
        let event = ServerEvent::PatientCalled(called.clone());
        let mut delivered = 0;
        for topic in [
            Topic::Patient(called.patient_id),
            Topic::Hospital(called.hospital_id),
            Topic::Doctor(called.doctor_id),
        ] {
            delivered += self.publish(topic, &event).await;
        }

        debug!(
            "Token {} called, delivered to {} receivers",
            called.display_token, delivered
        );
        delivered
    }

    pub async fn active_topics(&self) -> Vec<Topic> {
        self.channels.read().await.keys().copied().collect()
    }
}
