use std::time::Duration;

use async_trait::async_trait;

use super::*;

/// Holds each write that promotes a token to serving open for a moment, so
/// overlapping calls interleave between reading the queue and committing.
#[derive(Default)]
struct SlowPromotionStore {
    inner: InMemoryAppointmentStore,
}

#[async_trait]
impl AppointmentStore for SlowPromotionStore {
    async fn next_token_number(&self, partition: &PartitionKey) -> Result<u32, QueueError> {
        self.inner.next_token_number(partition).await
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, QueueError> {
        self.inner.insert(appointment).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, QueueError> {
        self.inner.get(id).await
    }

    async fn compare_and_swap(&self, expected_version: u64, appointment: Appointment) -> Result<Appointment, QueueError> {
        if appointment.token.status == TokenStatus::Serving {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        self.inner.compare_and_swap(expected_version, appointment).await
    }

    async fn list_by_doctor(&self, doctor_id: Uuid, date: QueueDate) -> Result<Vec<Appointment>, QueueError> {
        self.inner.list_by_doctor(doctor_id, date).await
    }

    async fn list_by_hospital(&self, hospital_id: Uuid, date: QueueDate) -> Result<Vec<Appointment>, QueueError> {
        self.inner.list_by_hospital(hospital_id, date).await
    }

    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, QueueError> {
        self.inner.list_by_patient(patient_id).await
    }
}

#[tokio::test]
async fn test_empty_queue_reports_queue_empty_and_mutates_nothing() {
    let fixture = Fixture::new().await;
    let booked = fixture.book_many(2, day(14)).await;
    fixture.set_status(&booked[0], StatusTarget::Completed).await;
    fixture.set_status(&booked[1], StatusTarget::Skipped).await;

    let before = fixture.state.store.list_by_doctor(fixture.doctor.id, day(14)).await.unwrap();
    let outcome = fixture.call_next(day(14)).await;
    let after = fixture.state.store.list_by_doctor(fixture.doctor.id, day(14)).await.unwrap();

    assert_eq!(outcome, AdvanceOutcome::QueueEmpty);
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_call_next_promotes_lowest_waiting_token() {
    let fixture = Fixture::new().await;
    let booked = fixture.book_many(3, day(14)).await;

    let first = called(fixture.call_next(day(14)).await);
    assert_eq!(first.id, booked[0].id);
    assert_eq!(first.token.status, TokenStatus::Serving);

    // Token 1 stays serving; the next call moves on to token 2.
    let second = called(fixture.call_next(day(14)).await);
    assert_eq!(second.token.number, 2);

    let current = fixture.state.lifecycle.get(booked[0].id).await.unwrap();
    assert_eq!(current.token.status, TokenStatus::Serving);
}

#[tokio::test]
async fn test_call_next_skips_past_non_waiting_tokens() {
    let fixture = Fixture::new().await;
    let booked = fixture.book_many(4, day(14)).await;
    fixture.set_status(&booked[0], StatusTarget::Completed).await;
    fixture.set_status(&booked[1], StatusTarget::Skipped).await;
    fixture.set_status(&booked[2], StatusTarget::Serving).await;

    let next = called(fixture.call_next(day(14)).await);
    assert_eq!(next.token.number, 4);
}

#[tokio::test]
async fn test_requeued_token_is_called_by_number() {
    let fixture = Fixture::new().await;
    let booked = fixture.book_many(3, day(14)).await;
    fixture.set_status(&booked[0], StatusTarget::Skipped).await;
    fixture.set_status(&booked[0], StatusTarget::Waiting).await;

    let next = called(fixture.call_next(day(14)).await);
    assert_eq!(next.id, booked[0].id);
}

#[tokio::test]
async fn test_call_next_only_looks_at_the_given_day() {
    let fixture = Fixture::new().await;
    fixture.book_many(2, day(15)).await;

    assert_eq!(fixture.call_next(day(14)).await, AdvanceOutcome::QueueEmpty);
    assert_eq!(called(fixture.call_next(day(15)).await).token.number, 1);
}

#[tokio::test]
async fn test_called_event_describes_the_token() {
    let fixture = Fixture::new().await;
    let booked = fixture.book_many(1, day(14)).await;

    match fixture.call_next(day(14)).await {
        AdvanceOutcome::Called { appointment, event } => {
            assert_eq!(event.appointment_id, appointment.id);
            assert_eq!(event.patient_id, booked[0].patient_id);
            assert_eq!(event.display_token, "DRS-14-001");
            assert_eq!(event.queue_date, day(14));
        }
        AdvanceOutcome::QueueEmpty => panic!("expected a call"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_promote_distinct_tokens() {
    let fixture = Fixture::with_settings(QueueSettings {
        max_cas_retries: 50,
        ..QueueSettings::default()
    })
    .await;
    fixture.book_many(6, day(14)).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let state = fixture.state.clone();
        let doctor = fixture.doctor.clone();
        handles.push(tokio::spawn(async move {
            state.advancement.call_next(&doctor, day(14), Utc::now()).await
        }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(called(handle.await.unwrap().unwrap()).token.number);
    }
    numbers.sort_unstable();

    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_single_policy_completes_previous_serving_token() {
    let fixture = Fixture::with_settings(QueueSettings {
        serving_policy: "single".to_string(),
        ..QueueSettings::default()
    })
    .await;
    let booked = fixture.book_many(2, day(14)).await;

    called(fixture.call_next(day(14)).await);
    called(fixture.call_next(day(14)).await);

    let first = fixture.state.lifecycle.get(booked[0].id).await.unwrap();
    assert_eq!(first.token.status, TokenStatus::Completed);
    assert_eq!(first.status, AppointmentStatus::Completed);

    let serving = fixture.state.lifecycle.now_serving(fixture.doctor.id, day(14)).await.unwrap();
    assert_eq!(serving.len(), 1);
    assert_eq!(serving[0].id, booked[1].id);
}

#[tokio::test]
async fn test_single_policy_leaves_serving_token_when_queue_is_empty() {
    let fixture = Fixture::with_settings(QueueSettings {
        serving_policy: "single".to_string(),
        ..QueueSettings::default()
    })
    .await;
    let booked = fixture.book_many(1, day(14)).await;

    called(fixture.call_next(day(14)).await);
    assert_eq!(fixture.call_next(day(14)).await, AdvanceOutcome::QueueEmpty);

    let first = fixture.state.lifecycle.get(booked[0].id).await.unwrap();
    assert_eq!(first.token.status, TokenStatus::Serving);
}

#[tokio::test]
async fn test_call_publishes_to_patient_topic() {
    let fixture = Fixture::new().await;
    let booked = fixture.book_many(1, day(14)).await;
    let mut receiver = fixture.state.hub.subscribe(Topic::Patient(booked[0].patient_id)).await;

    called(fixture.call_next(day(14)).await);

    let message = receiver.recv().await.unwrap();
    let event: ServerEvent = serde_json::from_str(&message).unwrap();
    assert!(matches!(event, ServerEvent::PatientCalled(ref called) if called.appointment_id == booked[0].id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_policy_overlapping_calls_keep_one_serving() {
    let settings = QueueSettings {
        serving_policy: "single".to_string(),
        ..QueueSettings::default()
    };
    let fixture = Fixture::with_store(settings, Arc::new(SlowPromotionStore::default())).await;
    let booked = fixture.book_many(3, day(14)).await;

    let calls: Vec<_> = (0..2)
        .map(|_| {
            let state = fixture.state.clone();
            let doctor = fixture.doctor.clone();
            tokio::spawn(async move { state.advancement.call_next(&doctor, day(14), Utc::now()).await })
        })
        .collect();
    for call in calls {
        called(call.await.unwrap().unwrap());
    }

    let queue = fixture.state.store.list_by_doctor(fixture.doctor.id, day(14)).await.unwrap();
    let statuses: Vec<(u32, TokenStatus)> = queue.iter().map(|a| (a.token.number, a.token.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (1, TokenStatus::Completed),
            (2, TokenStatus::Serving),
            (3, TokenStatus::Waiting),
        ]
    );
    assert_eq!(fixture.state.lifecycle.get(booked[1].id).await.unwrap().status, AppointmentStatus::Scheduled);
}
