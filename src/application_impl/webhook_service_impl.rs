use super::HmacSignatureVerifier;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// What to answer when a delivery fails signature verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureFailurePolicy {
    /// Fail the request so the forgery is visible to operators.
    Reject,
    /// Answer as if received, log it, dispatch nothing.
    Acknowledge,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub signature_failure_policy: SignatureFailurePolicy,
    pub handler_timeout: Duration,
}

/// Verify → dedup → dispatch → acknowledge.
///
/// Once the signature checks out the delivery is acknowledged no matter what
/// the handler does; handler faults are recorded on the dedup record and left
/// to operator replay.
pub struct RealWebhookService {
    verifier: Arc<HmacSignatureVerifier>,
    dedup_repo: Arc<dyn DedupRepo>,
    handler: Arc<dyn BillingHandler>,
    config: WebhookConfig,
}

impl RealWebhookService {
    pub fn new(
        verifier: Arc<HmacSignatureVerifier>,
        dedup_repo: Arc<dyn DedupRepo>,
        handler: Arc<dyn BillingHandler>,
        config: WebhookConfig,
    ) -> Self {
        Self {
            verifier,
            dedup_repo,
            handler,
            config,
        }
    }

    fn parse_event(body: &[u8], signature: &str) -> Result<InboundEvent, IngestError> {
        let envelope: EventEnvelope =
            serde_json::from_slice(body).map_err(|e| IngestError::Malformed(e.to_string()))?;
        if envelope.id.as_str().is_empty() || envelope.id.as_str().len() > MAX_EVENT_ID_LEN {
            return Err(IngestError::Malformed("event id length".into()));
        }
        Ok(InboundEvent::from_envelope(envelope, signature))
    }

    /// Run the handler on its own task so a panic or a hang cannot unwind
    /// past the acknowledgement.
    async fn run_handler(&self, event: &InboundEvent) -> Result<(), HandlerError> {
        let handler = self.handler.clone();
        let task_event = event.clone();
        let mut task =
            tokio::spawn(async move { dispatch(handler.as_ref(), &task_event).await });

        match tokio::time::timeout(self.config.handler_timeout, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(HandlerError::Failed(format!("{e:#}"))),
            Ok(Err(join_err)) if join_err.is_panic() => {
                let panic = join_err.into_panic();
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(HandlerError::Panicked(msg))
            }
            Ok(Err(join_err)) => Err(HandlerError::Failed(join_err.to_string())),
            Err(_) => {
                task.abort();
                Err(HandlerError::TimedOut(self.config.handler_timeout.as_secs()))
            }
        }
    }

    /// Dispatch and record the result on the dedup record. Store faults
    /// while recording are logged only: the event is already claimed.
    async fn dispatch_and_record(&self, event: &InboundEvent) -> Result<(), HandlerError> {
        let result = self.run_handler(event).await;
        let now = Utc::now();
        let recorded = match &result {
            Ok(()) => {
                info!(event_id = %event.event_id, event_type = %event.kind, "event processed");
                self.dedup_repo.mark_succeeded(&event.event_id, now).await
            }
            Err(e) => {
                error!(
                    event_id = %event.event_id,
                    event_type = %event.kind,
                    error = %e,
                    "event handler failed, delivery still acknowledged"
                );
                self.dedup_repo
                    .mark_failed(&event.event_id, &e.to_string(), now)
                    .await
            }
        };
        if let Err(e) = recorded {
            error!(event_id = %event.event_id, error = %e, "failed to record dispatch result");
        }
        result
    }

    async fn mark_ignored(&self, event: &InboundEvent) {
        info!(event_id = %event.event_id, event_type = %event.kind, "ignoring unknown event type");
        if let Err(e) = self
            .dedup_repo
            .mark_succeeded(&event.event_id, Utc::now())
            .await
        {
            error!(event_id = %event.event_id, error = %e, "failed to record dispatch result");
        }
    }
}

async fn dispatch(handler: &dyn BillingHandler, event: &InboundEvent) -> anyhow::Result<()> {
    match &event.kind {
        EventKind::SubscriptionCreated => handler.on_subscription_created(event).await,
        EventKind::SubscriptionRenewed => handler.on_subscription_renewed(event).await,
        EventKind::SubscriptionCancelled => handler.on_subscription_cancelled(event).await,
        EventKind::PaymentSucceeded => handler.on_payment_succeeded(event).await,
        EventKind::PaymentFailed => handler.on_payment_failed(event).await,
        EventKind::Unknown(_) => Ok(()),
    }
}

#[async_trait::async_trait]
impl WebhookService for RealWebhookService {
    async fn ingest(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<IngestOutcome, IngestError> {
        if let Err(e) = self.verifier.verify(body, signature_header) {
            warn!(error = %e, body_len = body.len(), "webhook signature verification failed");
            return match self.config.signature_failure_policy {
                SignatureFailurePolicy::Reject => Err(IngestError::Signature(e)),
                SignatureFailurePolicy::Acknowledge => Ok(IngestOutcome::RejectedButAcknowledged),
            };
        }

        let event = Self::parse_event(body, signature_header.unwrap_or_default())?;

        match self
            .dedup_repo
            .claim(&DedupRecord::pending(&event, Utc::now()))
            .await?
        {
            DedupClaim::Won => {}
            DedupClaim::Existing(record) => {
                info!(
                    event_id = %event.event_id,
                    event_type = %event.kind,
                    status = record.status.as_str(),
                    "duplicate delivery acknowledged"
                );
                return Ok(IngestOutcome::Duplicate);
            }
        }

        if !event.kind.is_known() {
            self.mark_ignored(&event).await;
            return Ok(IngestOutcome::Ignored);
        }

        match self.dispatch_and_record(&event).await {
            Ok(()) => Ok(IngestOutcome::Processed),
            Err(e) => Ok(IngestOutcome::HandlerFailed {
                error: e.to_string(),
            }),
        }
    }

    async fn replay(&self, event_id: &EventId) -> Result<ReplayOutcome, IngestError> {
        let record = self
            .dedup_repo
            .get(event_id)
            .await?
            .ok_or(IngestError::NotFound)?;

        match record.status {
            DedupStatus::Succeeded => return Ok(ReplayOutcome::AlreadySucceeded),
            DedupStatus::Pending => {
                let deadline = chrono::Duration::from_std(self.config.handler_timeout)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                if record.updated_at + deadline > Utc::now() {
                    return Ok(ReplayOutcome::InFlight);
                }
            }
            DedupStatus::Failed => {}
        }

        // only the replay that moves the record back to Pending dispatches
        if !self.dedup_repo.try_reclaim(&record, Utc::now()).await? {
            info!(event_id = %event_id, "replay already claimed by another caller");
            return Ok(ReplayOutcome::InFlight);
        }

        let event = record.to_event();
        if !event.kind.is_known() {
            self.mark_ignored(&event).await;
            return Ok(ReplayOutcome::Ignored);
        }

        info!(event_id = %event.event_id, event_type = %event.kind, "replaying event");
        match self.dispatch_and_record(&event).await {
            Ok(()) => Ok(ReplayOutcome::Processed),
            Err(e) => Ok(ReplayOutcome::HandlerFailed {
                error: e.to_string(),
            }),
        }
    }
}
