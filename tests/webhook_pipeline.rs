mod common;

use chrono::Utc;
use common::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn redelivery_is_acknowledged_without_second_dispatch() {
    let handler = RecordingHandler::new();
    let p = pipeline(handler.clone());
    let body = event_body("evt_1", "subscription.created", "u1");

    let first = p.service.ingest(&body, Some(&sign_now(&body))).await.unwrap();
    let second = p.service.ingest(&body, Some(&sign_now(&body))).await.unwrap();

    assert_eq!(first, IngestOutcome::Processed);
    assert_eq!(second, IngestOutcome::Duplicate);
    assert_eq!(handler.calls(), 1);

    let record = p.dedup.get(&EventId::from("evt_1")).await.unwrap().unwrap();
    assert_eq!(record.status, DedupStatus::Succeeded);
    assert_eq!(record.kind, EventKind::SubscriptionCreated);
}

#[tokio::test]
async fn tampered_body_is_rejected_and_leaves_no_record() {
    let handler = RecordingHandler::new();
    let p = pipeline(handler.clone());
    let body = event_body("evt_2", "payment.succeeded", "u1");
    let header = sign_now(&body);

    let mut tampered = body.clone();
    let last = tampered.len() - 2;
    tampered[last] = b'9';

    let err = p.service.ingest(&tampered, Some(&header)).await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Signature(SignatureError::Mismatch)
    ));
    assert!(p.dedup.is_empty());
    assert_eq!(handler.calls(), 0);

    // the genuine delivery of the same id still goes through
    let outcome = p.service.ingest(&body, Some(&header)).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Processed);
    assert_eq!(handler.calls_for("evt_2"), 1);
}

#[tokio::test]
async fn missing_and_stale_signatures_are_rejected() {
    let handler = RecordingHandler::new();
    let p = pipeline(handler.clone());
    let body = event_body("evt_3", "payment.failed", "u1");

    let err = p.service.ingest(&body, None).await.unwrap_err();
    assert!(matches!(err, IngestError::Signature(SignatureError::Missing)));

    let old = Utc::now().timestamp() - 301;
    let stale = HmacSignatureVerifier::sign(TEST_SECRET, old, &body).unwrap();
    let err = p.service.ingest(&body, Some(&stale)).await.unwrap_err();
    assert!(matches!(err, IngestError::Signature(SignatureError::Stale)));

    let wrong = HmacSignatureVerifier::sign("not-our-secret", Utc::now().timestamp(), &body).unwrap();
    let err = p.service.ingest(&body, Some(&wrong)).await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Signature(SignatureError::Mismatch)
    ));

    assert!(p.dedup.is_empty());
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn acknowledge_policy_answers_success_without_dispatch() {
    let handler = RecordingHandler::new();
    let p = pipeline_with(
        handler.clone(),
        SignatureFailurePolicy::Acknowledge,
        Duration::from_secs(5),
    );
    let body = event_body("evt_4", "subscription.renewed", "u1");

    let outcome = p.service.ingest(&body, Some("t=1,v1=deadbeef")).await.unwrap();
    assert_eq!(outcome, IngestOutcome::RejectedButAcknowledged);
    assert!(p.dedup.is_empty());
    assert_eq!(handler.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_of_one_event_dispatch_once() {
    let handler = RecordingHandler::new();
    handler.set_delay(Duration::from_millis(20));
    let p = Arc::new(pipeline(handler.clone()));
    let body = Arc::new(event_body("evt_race", "subscription.cancelled", "u1"));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let p = p.clone();
            let body = body.clone();
            tokio::spawn(async move {
                let header = sign_now(&body);
                p.service.ingest(&body, Some(&header)).await
            })
        })
        .collect();

    let outcomes: Vec<IngestOutcome> = futures_util::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let processed = outcomes
        .iter()
        .filter(|o| **o == IngestOutcome::Processed)
        .count();
    let duplicates = outcomes
        .iter()
        .filter(|o| **o == IngestOutcome::Duplicate)
        .count();
    assert_eq!(processed, 1);
    assert_eq!(duplicates, 15);
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn handler_failure_is_acknowledged_and_recorded() {
    let handler = RecordingHandler::new();
    handler.set("evt_fail", Behavior::Fail);
    let p = pipeline(handler.clone());

    let body = event_body("evt_fail", "payment.failed", "u1");
    let outcome = p.service.ingest(&body, Some(&sign_now(&body))).await.unwrap();
    match outcome {
        IngestOutcome::HandlerFailed { error } => assert!(error.contains("downstream rejected")),
        other => panic!("unexpected outcome {other:?}"),
    }

    let record = p.dedup.get(&EventId::from("evt_fail")).await.unwrap().unwrap();
    assert_eq!(record.status, DedupStatus::Failed);
    assert!(record.last_error.is_some());

    // redelivery is not a retry
    let again = p.service.ingest(&body, Some(&sign_now(&body))).await.unwrap();
    assert_eq!(again, IngestOutcome::Duplicate);
    assert_eq!(handler.calls_for("evt_fail"), 1);

    // the pipeline keeps serving later events
    let next = event_body("evt_next", "payment.succeeded", "u1");
    let outcome = p.service.ingest(&next, Some(&sign_now(&next))).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Processed);
}

#[tokio::test]
async fn handler_panic_is_contained() {
    let handler = RecordingHandler::new();
    handler.set("evt_panic", Behavior::Panic);
    let p = pipeline(handler.clone());

    let body = event_body("evt_panic", "subscription.created", "u1");
    let outcome = p.service.ingest(&body, Some(&sign_now(&body))).await.unwrap();
    match outcome {
        IngestOutcome::HandlerFailed { error } => assert!(error.contains("panicked")),
        other => panic!("unexpected outcome {other:?}"),
    }

    let next = event_body("evt_after_panic", "subscription.created", "u2");
    let outcome = p.service.ingest(&next, Some(&sign_now(&next))).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Processed);
}

#[tokio::test]
async fn slow_handler_times_out_and_is_marked_failed() {
    let handler = RecordingHandler::new();
    handler.set("evt_slow", Behavior::Sleep(Duration::from_secs(30)));
    let p = pipeline_with(
        handler.clone(),
        SignatureFailurePolicy::Reject,
        Duration::from_millis(50),
    );

    let body = event_body("evt_slow", "subscription.renewed", "u1");
    let outcome = p.service.ingest(&body, Some(&sign_now(&body))).await.unwrap();
    match outcome {
        IngestOutcome::HandlerFailed { error } => assert!(error.contains("timed out")),
        other => panic!("unexpected outcome {other:?}"),
    }
    let record = p.dedup.get(&EventId::from("evt_slow")).await.unwrap().unwrap();
    assert_eq!(record.status, DedupStatus::Failed);
}

#[tokio::test]
async fn unknown_event_type_is_recorded_and_ignored() {
    let handler = RecordingHandler::new();
    let p = pipeline(handler.clone());
    let body = event_body("evt_unknown", "customer.updated", "u1");

    let outcome = p.service.ingest(&body, Some(&sign_now(&body))).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Ignored);
    assert_eq!(handler.calls(), 0);

    let record = p
        .dedup
        .get(&EventId::from("evt_unknown"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DedupStatus::Succeeded);
    assert_eq!(record.kind, EventKind::Unknown("customer.updated".into()));

    let again = p.service.ingest(&body, Some(&sign_now(&body))).await.unwrap();
    assert_eq!(again, IngestOutcome::Duplicate);
}

#[tokio::test]
async fn verified_but_malformed_body_is_not_recorded() {
    let handler = RecordingHandler::new();
    let p = pipeline(handler.clone());

    for body in [
        b"not json at all".to_vec(),
        br#"{"type":"payment.succeeded"}"#.to_vec(),
        br#"{"id":"","type":"payment.succeeded"}"#.to_vec(),
    ] {
        let err = p.service.ingest(&body, Some(&sign_now(&body))).await.unwrap_err();
        assert!(matches!(err, IngestError::Malformed(_)), "{err:?}");
    }
    assert!(p.dedup.is_empty());
    assert_eq!(handler.calls(), 0);
}

#[tokio::test]
async fn rotated_secrets_take_effect_immediately() {
    let handler = RecordingHandler::new();
    let p = pipeline(handler.clone());
    let body = event_body("evt_rotate", "payment.succeeded", "u1");
    let header = sign_now(&body);

    p.verifier.rotate(vec!["whsec_next".to_string()]);
    let err = p.service.ingest(&body, Some(&header)).await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Signature(SignatureError::Mismatch)
    ));

    p.verifier
        .rotate(vec!["whsec_next".to_string(), TEST_SECRET.to_string()]);
    let outcome = p.service.ingest(&body, Some(&header)).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Processed);
}

#[tokio::test]
async fn replay_redispatches_failed_events_once_fixed() {
    let handler = RecordingHandler::new();
    handler.set("evt_replay", Behavior::Fail);
    let p = pipeline(handler.clone());

    let body = event_body("evt_replay", "subscription.cancelled", "u9");
    p.service.ingest(&body, Some(&sign_now(&body))).await.unwrap();

    let id = EventId::from("evt_replay");
    match p.service.replay(&id).await.unwrap() {
        ReplayOutcome::HandlerFailed { .. } => {}
        other => panic!("unexpected outcome {other:?}"),
    }

    handler.set("evt_replay", Behavior::Succeed);
    assert_eq!(p.service.replay(&id).await.unwrap(), ReplayOutcome::Processed);
    assert_eq!(
        p.service.replay(&id).await.unwrap(),
        ReplayOutcome::AlreadySucceeded
    );
    assert_eq!(handler.calls_for("evt_replay"), 3);

    let record = p.dedup.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, DedupStatus::Succeeded);
    assert_eq!(record.payload["user_id"], "u9");
}

#[tokio::test]
async fn replay_of_unknown_id_is_not_found() {
    let p = pipeline(RecordingHandler::new());
    let err = p
        .service
        .replay(&EventId::from("evt_missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::NotFound));
}

#[tokio::test]
async fn replay_leaves_fresh_pending_records_alone() {
    let handler = RecordingHandler::new();
    let p = pipeline_with(
        handler.clone(),
        SignatureFailurePolicy::Reject,
        Duration::from_secs(1),
    );

    let fresh = InboundEvent {
        event_id: EventId::from("evt_pending"),
        kind: EventKind::PaymentSucceeded,
        created: None,
        payload: serde_json::json!({"user_id": "u1"}),
        received_signature: String::new(),
    };
    p.dedup
        .claim(&DedupRecord::pending(&fresh, Utc::now()))
        .await
        .unwrap();
    assert_eq!(
        p.service.replay(&fresh.event_id).await.unwrap(),
        ReplayOutcome::InFlight
    );

    // a pending record past the handler deadline was abandoned by a crash
    let stale = InboundEvent {
        event_id: EventId::from("evt_abandoned"),
        ..fresh
    };
    p.dedup
        .claim(&DedupRecord::pending(
            &stale,
            Utc::now() - chrono::Duration::seconds(10),
        ))
        .await
        .unwrap();
    assert_eq!(
        p.service.replay(&stale.event_id).await.unwrap(),
        ReplayOutcome::Processed
    );
    assert_eq!(handler.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_replays_dispatch_once() {
    let handler = RecordingHandler::new();
    handler.set("evt_replay_race", Behavior::Fail);
    let p = Arc::new(pipeline(handler.clone()));

    let body = event_body("evt_replay_race", "payment.failed", "u1");
    p.service.ingest(&body, Some(&sign_now(&body))).await.unwrap();

    handler.set("evt_replay_race", Behavior::Succeed);
    handler.set_delay(Duration::from_millis(50));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let p = p.clone();
            tokio::spawn(async move {
                p.service
                    .replay(&EventId::from("evt_replay_race"))
                    .await
            })
        })
        .collect();

    let outcomes: Vec<ReplayOutcome> = futures_util::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let processed = outcomes
        .iter()
        .filter(|o| **o == ReplayOutcome::Processed)
        .count();
    assert_eq!(processed, 1, "{outcomes:?}");
    assert!(
        outcomes.iter().all(|o| matches!(
            o,
            ReplayOutcome::Processed | ReplayOutcome::InFlight | ReplayOutcome::AlreadySucceeded
        )),
        "{outcomes:?}"
    );
    // the failed first delivery plus exactly one replay
    assert_eq!(handler.calls_for("evt_replay_race"), 2);
}

#[tokio::test]
async fn out_of_range_signature_timestamp_is_rejected() {
    let handler = RecordingHandler::new();
    let p = pipeline(handler.clone());
    let body = event_body("evt_overflow", "payment.succeeded", "u1");

    let err = p
        .service
        .ingest(&body, Some("t=-9223372036854775808,v1=00"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Signature(SignatureError::Malformed)
    ));
    assert!(p.dedup.is_empty());
    assert_eq!(handler.calls(), 0);
}
