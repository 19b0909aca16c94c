use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use axum::extract::ws::Message;
use shared_utils::test_utils::TestUser;
use queue_cell::websocket::BridgeSession;

use super::*;

fn called_event(patient_id: Uuid, hospital_id: Uuid, doctor_id: Uuid) -> PatientCalled {
    PatientCalled {
        appointment_id: Uuid::new_v4(),
        doctor_id,
        hospital_id,
        patient_id,
        token_number: 1,
        display_token: "DRS-14-001".to_string(),
        patient_name: "Asha Rao".to_string(),
        doctor_name: "Dr. Sam Stone".to_string(),
        queue_date: day(14),
    }
}

async fn next_event(rx: &mut mpsc::Receiver<Message>) -> ServerEvent {
    let message = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed");
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("unexpected frame {:?}", other),
    }
}

#[tokio::test]
async fn test_event_reaches_only_addressed_patient() {
    let hub = QueueNotificationHub::new();
    let (called_patient, other_patient) = (Uuid::new_v4(), Uuid::new_v4());
    let mut called_rx = hub.subscribe(Topic::Patient(called_patient)).await;
    let mut other_rx = hub.subscribe(Topic::Patient(other_patient)).await;

    let delivered = hub
        .publish_patient_called(&called_event(called_patient, Uuid::new_v4(), Uuid::new_v4()))
        .await;

    assert_eq!(delivered, 1);
    assert!(called_rx.try_recv().is_ok());
    assert!(other_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_event_reaches_hospital_board() {
    let hub = QueueNotificationHub::new();
    let hospital = Uuid::new_v4();
    let mut board = hub.subscribe(Topic::Hospital(hospital)).await;
    let mut other_board = hub.subscribe(Topic::Hospital(Uuid::new_v4())).await;

    hub.publish_patient_called(&called_event(Uuid::new_v4(), hospital, Uuid::new_v4()))
        .await;

    let event: ServerEvent = serde_json::from_str(&board.recv().await.unwrap()).unwrap();
    assert!(matches!(event, ServerEvent::PatientCalled(_)));
    assert!(other_board.try_recv().is_err());
}

#[tokio::test]
async fn test_setup_joins_patient_topic_and_forwards_calls() {
    let fixture = Fixture::new().await;
    let patient = fixture.patient("Asha").await;
    fixture.book(&patient, day(14)).await;

    let user = TestUser::patient("asha@example.com").with_id(&patient.user_id).to_user();
    let (tx, mut rx) = mpsc::channel(16);
    let mut session = BridgeSession::new(fixture.state.clone(), user, tx);

    session.handle_text(r#"{"event":"setup","data":{}}"#).await;
    match next_event(&mut rx).await {
        ServerEvent::Connected { topics } => assert_eq!(topics, vec![format!("patient:{}", patient.id)]),
        other => panic!("unexpected {:?}", other),
    }

    called(fixture.call_next(day(14)).await);
    match next_event(&mut rx).await {
        ServerEvent::PatientCalled(event) => assert_eq!(event.patient_id, patient.id),
        other => panic!("unexpected {:?}", other),
    }

    session.close().await;
    assert!(fixture.state.hub.active_topics().await.is_empty());
}

#[tokio::test]
async fn test_patient_cannot_join_a_hospital_board() {
    let fixture = Fixture::new().await;
    let patient = fixture.patient("Asha").await;
    let user = TestUser::patient("asha@example.com").with_id(&patient.user_id).to_user();
    let (tx, mut rx) = mpsc::channel(16);
    let mut session = BridgeSession::new(fixture.state.clone(), user, tx);

    let setup = format!(r#"{{"event":"setup","data":{{"hospital_id":"{}"}}}}"#, fixture.hospital.id);
    session.handle_text(&setup).await;

    assert!(matches!(next_event(&mut rx).await, ServerEvent::Error { .. }));
    assert!(session.topics().is_empty());
}

#[tokio::test]
async fn test_hospital_admin_joins_own_board() {
    let fixture = Fixture::new().await;
    let user = TestUser::hospital_admin("admin@example.com")
        .with_id("hospital-admin-user")
        .to_user();
    let (tx, mut rx) = mpsc::channel(16);
    let mut session = BridgeSession::new(fixture.state.clone(), user, tx);

    let setup = format!(r#"{{"event":"setup","data":{{"hospital_id":"{}"}}}}"#, fixture.hospital.id);
    session.handle_text(&setup).await;

    assert!(matches!(next_event(&mut rx).await, ServerEvent::Connected { .. }));
    assert_eq!(session.topics(), &[Topic::Hospital(fixture.hospital.id)]);
    session.close().await;
}

#[tokio::test]
async fn test_doctor_calls_patient_over_socket() {
    let fixture = Fixture::new().await;
    let today = fixture.state.today();
    fixture.book_many(1, today).await;
    let user = TestUser::doctor("sam@example.com").with_id("doctor-user").to_user();
    let (tx, mut rx) = mpsc::channel(16);
    let mut session = BridgeSession::new(fixture.state.clone(), user, tx);

    session.handle_text(r#"{"event":"call_patient"}"#).await;
    match next_event(&mut rx).await {
        ServerEvent::CallResult { appointment } => assert_eq!(appointment.token.number, 1),
        other => panic!("unexpected {:?}", other),
    }

    session.handle_text(r#"{"event":"call_patient"}"#).await;
    match next_event(&mut rx).await {
        ServerEvent::QueueEmpty { doctor_id, queue_date } => {
            assert_eq!(doctor_id, fixture.doctor.id);
            assert_eq!(queue_date, today);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_patient_cannot_call_patients() {
    let fixture = Fixture::new().await;
    let patient = fixture.patient("Asha").await;
    let user = TestUser::patient("asha@example.com").with_id(&patient.user_id).to_user();
    let (tx, mut rx) = mpsc::channel(16);
    let mut session = BridgeSession::new(fixture.state.clone(), user, tx);

    session.handle_text(r#"{"event":"call_patient"}"#).await;

    match next_event(&mut rx).await {
        ServerEvent::Error { message } => assert!(message.contains("Only doctors")),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_ping_and_garbage() {
    let fixture = Fixture::new().await;
    let user = TestUser::default().to_user();
    let (tx, mut rx) = mpsc::channel(16);
    let mut session = BridgeSession::new(fixture.state.clone(), user, tx);

    session.handle_text(r#"{"event":"ping"}"#).await;
    assert_eq!(next_event(&mut rx).await, ServerEvent::Pong);

    session.handle_text("not json").await;
    assert!(matches!(next_event(&mut rx).await, ServerEvent::Error { .. }));
}
