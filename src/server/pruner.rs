use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Background housekeeping: drops dedup records past the sender's redelivery
/// horizon and refresh tokens past their expiry.
pub struct Pruner {
    session_store: Arc<dyn SessionStore>,
    dedup_repo: Arc<dyn DedupRepo>,
    horizon: chrono::Duration,
    interval: Duration,
    cancellation_token: CancellationToken,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub dedup_records: u64,
    pub refresh_tokens: u64,
}

impl Pruner {
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        dedup_repo: Arc<dyn DedupRepo>,
        horizon: chrono::Duration,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            session_store,
            dedup_repo,
            horizon,
            interval,
            cancellation_token,
        }
    }

    pub async fn tick_once(&self, now: DateTime<Utc>) -> anyhow::Result<PruneStats> {
        let dedup_records = self.dedup_repo.prune_older_than(now - self.horizon).await?;
        let refresh_tokens = self.session_store.delete_expired(now).await?;
        if dedup_records > 0 || refresh_tokens > 0 {
            tracing::info!(dedup_records, refresh_tokens, "pruned expired records");
        }
        Ok(PruneStats {
            dedup_records,
            refresh_tokens,
        })
    }

    pub async fn run(&self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("Pruner shutting down...");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.tick_once(Utc::now()).await {
                        tracing::error!("Pruner error: {:#}", e);
                    }
                }
            }
        }
    }
}
