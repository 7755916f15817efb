//! Shared fixtures for the integration tests

#![allow(dead_code)]

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use gatehouse::application_impl::*;
pub use gatehouse::application_port::*;
pub use gatehouse::domain_model::*;
pub use gatehouse::domain_port::*;
pub use gatehouse::infra_memory::*;

pub const TEST_SECRET: &str = "whsec_test_current";
pub const OPERATOR_TOKEN: &str = "op-token-for-tests";

/// Settings for an in-memory server; `{policy}` is the signature failure policy.
pub fn settings_toml(policy: &str) -> String {
    format!(
        r#"
[http]
address = "127.0.0.1:0"

[log]
filter = "debug"

[storage]
backend = "memory"

[session]
refresh_ttl_secs = 2592000
access_ttl_secs = 900
jwt_issuer = "gatehouse.test"
jwt_audience = "tests"
jwt_signing_key = "integration-test-key"

[webhook]
secrets = ["{TEST_SECRET}", "whsec_test_previous"]
tolerance_secs = 300
signature_failure_policy = "{policy}"
dedup_horizon_secs = 259200
handler_timeout_secs = 5
operator_token = "{OPERATOR_TOKEN}"

[pruner]
interval_secs = 3600

[health]
environment = "test"
"#
    )
}

/// How the recording handler reacts to a given event id.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    Sleep(Duration),
}

/// Counts every dispatch and lets a test script failures per event id.
#[derive(Default)]
pub struct RecordingHandler {
    calls: AtomicUsize,
    seen: Mutex<Vec<(EventId, EventKind)>>,
    behaviors: Mutex<HashMap<String, Behavior>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, event_id: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id.as_str() == event_id)
            .count()
    }

    pub fn set(&self, event_id: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(event_id.to_string(), behavior);
    }

    /// Applied to every successful dispatch, widens race windows.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn handle(&self, event: &InboundEvent) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((event.event_id.clone(), event.kind.clone()));

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(event.event_id.as_str())
            .copied()
            .unwrap_or(Behavior::Succeed);
        let delay = *self.delay.lock().unwrap();

        match behavior {
            Behavior::Succeed => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(())
            }
            Behavior::Fail => Err(anyhow::anyhow!("downstream rejected {}", event.event_id)),
            Behavior::Panic => panic!("handler blew up on {}", event.event_id),
            Behavior::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl BillingHandler for RecordingHandler {
    async fn on_subscription_created(&self, event: &InboundEvent) -> anyhow::Result<()> {
        self.handle(event).await
    }
    async fn on_subscription_renewed(&self, event: &InboundEvent) -> anyhow::Result<()> {
        self.handle(event).await
    }
    async fn on_subscription_cancelled(&self, event: &InboundEvent) -> anyhow::Result<()> {
        self.handle(event).await
    }
    async fn on_payment_succeeded(&self, event: &InboundEvent) -> anyhow::Result<()> {
        self.handle(event).await
    }
    async fn on_payment_failed(&self, event: &InboundEvent) -> anyhow::Result<()> {
        self.handle(event).await
    }
}

pub fn event_body(id: &str, kind: &str, user_id: &str) -> Vec<u8> {
    serde_json::json!({
        "id": id,
        "type": kind,
        "created": Utc::now().timestamp(),
        "payload": { "user_id": user_id },
    })
    .to_string()
    .into_bytes()
}

pub fn sign_now(body: &[u8]) -> String {
    HmacSignatureVerifier::sign(TEST_SECRET, Utc::now().timestamp(), body).unwrap()
}

pub struct Pipeline {
    pub service: RealWebhookService,
    pub dedup: Arc<MemoryDedupRepo>,
    pub verifier: Arc<HmacSignatureVerifier>,
}

pub fn pipeline_with(
    handler: Arc<dyn BillingHandler>,
    policy: SignatureFailurePolicy,
    handler_timeout: Duration,
) -> Pipeline {
    let dedup = Arc::new(MemoryDedupRepo::new());
    let verifier = Arc::new(HmacSignatureVerifier::new(vec![TEST_SECRET.to_string()], 300));
    let service = RealWebhookService::new(
        verifier.clone(),
        dedup.clone(),
        handler,
        WebhookConfig {
            signature_failure_policy: policy,
            handler_timeout,
        },
    );
    Pipeline {
        service,
        dedup,
        verifier,
    }
}

pub fn pipeline(handler: Arc<dyn BillingHandler>) -> Pipeline {
    pipeline_with(handler, SignatureFailurePolicy::Reject, Duration::from_secs(5))
}

pub fn session_service(store: Arc<dyn SessionStore>) -> RealSessionService {
    let codec = Arc::new(JwtHs256Codec::new(JwtConfig {
        issuer: "gatehouse.test".into(),
        audience: "tests".into(),
        access_ttl: chrono::Duration::minutes(15),
        signing_key: b"integration-test-key".to_vec(),
    }));
    RealSessionService::new(store, codec, chrono::Duration::days(30))
}

pub fn stored_token(token: &str, user_id: &str, ttl: chrono::Duration) -> RefreshToken {
    let now = Utc::now();
    RefreshToken {
        token: TokenString::parse(token).unwrap(),
        user_id: UserId::from(user_id),
        issued_at: now,
        expires_at: now + ttl,
    }
}

/// Memory store that counts every call made to it.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemorySessionStore,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl SessionStore for CountingStore {
    async fn insert(&self, record: &RefreshToken) -> Result<(), StoreError> {
        self.count();
        self.inner.insert(record).await
    }
    async fn find_by_token(&self, token: &TokenString) -> Result<Option<RefreshToken>, StoreError> {
        self.count();
        self.inner.find_by_token(token).await
    }
    async fn delete_by_token(&self, token: &TokenString) -> Result<(), StoreError> {
        self.count();
        self.inner.delete_by_token(token).await
    }
    async fn take_by_token(&self, token: &TokenString) -> Result<Option<RefreshToken>, StoreError> {
        self.count();
        self.inner.take_by_token(token).await
    }
    async fn delete_by_user(&self, user_id: &UserId) -> Result<u64, StoreError> {
        self.count();
        self.inner.delete_by_user(user_id).await
    }
    async fn delete_expired(&self, now: chrono::DateTime<Utc>) -> Result<u64, StoreError> {
        self.count();
        self.inner.delete_expired(now).await
    }
    async fn ping(&self) -> Result<(), StoreError> {
        self.count();
        self.inner.ping().await
    }
}

/// Where `GatedStore` parks the first `take_by_token` call.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TakeGate {
    BeforeTake,
    AfterTake,
}

/// Memory store whose first `take_by_token` signals `reached` and then
/// waits for `release`, so a test can interleave other work at that point.
pub struct GatedStore {
    pub inner: MemorySessionStore,
    pub reached: tokio::sync::Notify,
    pub release: tokio::sync::Notify,
    gate: TakeGate,
    armed: std::sync::atomic::AtomicBool,
}

impl GatedStore {
    pub fn new(gate: TakeGate) -> Arc<Self> {
        Arc::new(GatedStore {
            inner: MemorySessionStore::new(),
            reached: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
            gate,
            armed: std::sync::atomic::AtomicBool::new(true),
        })
    }

    async fn park(&self) {
        self.reached.notify_one();
        self.release.notified().await;
    }
}

#[async_trait::async_trait]
impl SessionStore for GatedStore {
    async fn insert(&self, record: &RefreshToken) -> Result<(), StoreError> {
        self.inner.insert(record).await
    }
    async fn find_by_token(&self, token: &TokenString) -> Result<Option<RefreshToken>, StoreError> {
        self.inner.find_by_token(token).await
    }
    async fn delete_by_token(&self, token: &TokenString) -> Result<(), StoreError> {
        self.inner.delete_by_token(token).await
    }
    async fn take_by_token(&self, token: &TokenString) -> Result<Option<RefreshToken>, StoreError> {
        let gated = self.armed.swap(false, Ordering::SeqCst);
        if gated && self.gate == TakeGate::BeforeTake {
            self.park().await;
        }
        let taken = self.inner.take_by_token(token).await;
        if gated && self.gate == TakeGate::AfterTake {
            self.park().await;
        }
        taken
    }
    async fn delete_by_user(&self, user_id: &UserId) -> Result<u64, StoreError> {
        self.inner.delete_by_user(user_id).await
    }
    async fn delete_expired(&self, now: chrono::DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.delete_expired(now).await
    }
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}
