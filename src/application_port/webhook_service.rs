use crate::domain_model::*;
use crate::domain_port::StoreError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,
    #[error("signature header malformed")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Stale,
    #[error("signature mismatch")]
    Mismatch,
    #[error("no webhook secret configured")]
    NoSecret,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("signature rejected: {0}")]
    Signature(#[from] SignatureError),
    #[error("malformed event: {0}")]
    Malformed(String),
    #[error("store error: {0}")]
    Storage(String),
    #[error("event not found")]
    NotFound,
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        IngestError::Storage(err.to_string())
    }
}

/// Failure of a business handler. Recorded and logged, never turned into
/// a failed delivery.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),
    #[error("handler timed out after {0}s")]
    TimedOut(u64),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// What happened to a delivery that was acknowledged to the sender.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Processed,
    HandlerFailed { error: String },
    Duplicate,
    Ignored,
    RejectedButAcknowledged,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplayOutcome {
    Processed,
    HandlerFailed { error: String },
    AlreadySucceeded,
    /// The first dispatch is still inside its handler deadline.
    InFlight,
    Ignored,
}

/// Business rules for each billing event kind. The match in the pipeline
/// is exhaustive, so a new `EventKind` variant forces a new method here.
#[async_trait::async_trait]
pub trait BillingHandler: Send + Sync + 'static {
    async fn on_subscription_created(&self, event: &InboundEvent) -> anyhow::Result<()>;
    async fn on_subscription_renewed(&self, event: &InboundEvent) -> anyhow::Result<()>;
    async fn on_subscription_cancelled(&self, event: &InboundEvent) -> anyhow::Result<()>;
    async fn on_payment_succeeded(&self, event: &InboundEvent) -> anyhow::Result<()>;
    async fn on_payment_failed(&self, event: &InboundEvent) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait WebhookService: Send + Sync {
    /// `body` must be the exact bytes the sender signed.
    async fn ingest(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<IngestOutcome, IngestError>;

    async fn replay(&self, event_id: &EventId) -> Result<ReplayOutcome, IngestError>;
}
