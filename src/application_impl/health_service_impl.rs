use crate::application_port::*;
use crate::domain_port::SessionStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

pub struct RealHealthService {
    started: Instant,
    environment: String,
    storage: Option<Arc<dyn SessionStore>>,
}

impl RealHealthService {
    /// `storage` is pinged on every report when set; otherwise only process
    /// liveness is reported.
    pub fn new(environment: impl Into<String>, storage: Option<Arc<dyn SessionStore>>) -> Self {
        Self {
            started: Instant::now(),
            environment: environment.into(),
            storage,
        }
    }

    async fn check(&self) -> anyhow::Result<()> {
        if let Some(storage) = &self.storage {
            storage.ping().await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl HealthService for RealHealthService {
    async fn report(&self) -> HealthReport {
        let (status, error) = match self.check().await {
            Ok(()) => (HealthStatus::Healthy, None),
            Err(e) => {
                tracing::warn!(error = %e, "health check degraded");
                (HealthStatus::Degraded, Some(e.to_string()))
            }
        };

        HealthReport {
            status,
            timestamp: Utc::now(),
            uptime_secs: self.started.elapsed().as_secs(),
            environment: self.environment.clone(),
            error,
        }
    }
}
