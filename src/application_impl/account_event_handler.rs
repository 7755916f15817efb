use crate::application_port::BillingHandler;
use crate::domain_model::*;
use crate::domain_port::SessionStore;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

/// Default business handler: cancellations revoke every session of the
/// account, everything else is logged for downstream systems.
pub struct AccountEventHandler {
    sessions: Arc<dyn SessionStore>,
}

impl AccountEventHandler {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }

    fn payload_user(event: &InboundEvent) -> anyhow::Result<UserId> {
        let raw = event
            .payload
            .get("user_id")
            .and_then(|v| v.as_str())
            .context("payload has no user_id")?;
        Ok(raw.parse::<UserId>()?)
    }

    fn log(event: &InboundEvent) {
        info!(
            event_id = %event.event_id,
            event_type = %event.kind,
            user_id = event.payload.get("user_id").and_then(|v| v.as_str()).unwrap_or("-"),
            "billing event received"
        );
    }
}

#[async_trait::async_trait]
impl BillingHandler for AccountEventHandler {
    async fn on_subscription_created(&self, event: &InboundEvent) -> anyhow::Result<()> {
        Self::log(event);
        Ok(())
    }

    async fn on_subscription_renewed(&self, event: &InboundEvent) -> anyhow::Result<()> {
        Self::log(event);
        Ok(())
    }

    async fn on_subscription_cancelled(&self, event: &InboundEvent) -> anyhow::Result<()> {
        let user_id = Self::payload_user(event)?;
        let revoked = self
            .sessions
            .delete_by_user(&user_id)
            .await
            .context("revoking sessions")?;
        info!(
            event_id = %event.event_id,
            user_id = %user_id,
            revoked,
            "subscription cancelled, sessions revoked"
        );
        Ok(())
    }

    async fn on_payment_succeeded(&self, event: &InboundEvent) -> anyhow::Result<()> {
        Self::log(event);
        Ok(())
    }

    async fn on_payment_failed(&self, event: &InboundEvent) -> anyhow::Result<()> {
        Self::log(event);
        Ok(())
    }
}
