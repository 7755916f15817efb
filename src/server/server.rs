use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::server::Pruner;
use crate::settings::{Settings, StorageBackend};
use anyhow::{Context, anyhow};
use sqlx::MySqlPool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Storage adapters selected by `storage.backend`.
pub struct Backends {
    pub session_store: Arc<dyn SessionStore>,
    pub dedup_repo: Arc<dyn DedupRepo>,
    pub pool: Option<MySqlPool>,
}

impl Backends {
    pub fn memory() -> Self {
        Self {
            session_store: Arc::new(MemorySessionStore::new()),
            dedup_repo: Arc::new(MemoryDedupRepo::new()),
            pool: None,
        }
    }

    pub async fn connect(settings: &Settings) -> anyhow::Result<Self> {
        let storage = &settings.storage;
        match storage.backend {
            StorageBackend::Memory => {
                warn!("memory storage backend: dedup state is not shared between instances");
                Ok(Self::memory())
            }
            StorageBackend::Mysql => {
                let dsn = storage
                    .mysql_dsn
                    .as_deref()
                    .context("storage.mysql_dsn is required for the mysql backend")?;
                let pool = MySqlPool::connect(dsn).await?;
                Ok(Self {
                    session_store: Arc::new(MySqlSessionStore::new(pool.clone())),
                    dedup_repo: Arc::new(MySqlDedupRepo::new(pool.clone())),
                    pool: Some(pool),
                })
            }
            StorageBackend::Redis => {
                let dsn = storage
                    .redis_dsn
                    .as_deref()
                    .context("storage.redis_dsn is required for the redis backend")?;
                let redis_client = redis::Client::open(dsn)?;
                let redis_manager = redis_client.get_connection_manager().await?;
                Ok(Self {
                    session_store: Arc::new(RedisSessionStore::new(
                        redis_manager.clone(),
                        storage.redis_prefix.clone(),
                    )),
                    dedup_repo: Arc::new(RedisDedupRepo::new(
                        redis_manager,
                        storage.redis_prefix.clone(),
                        Duration::from_secs(settings.webhook.dedup_horizon_secs),
                    )),
                    pool: None,
                })
            }
        }
    }
}

pub struct Server {
    pub session_service: Arc<dyn SessionService>,
    pub webhook_service: Arc<dyn WebhookService>,
    pub health_service: Arc<dyn HealthService>,
    pub signature_verifier: Arc<HmacSignatureVerifier>,
    pub operator_token: Option<String>,
    pruner_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<MySqlPool>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let backends = Backends::connect(settings).await?;
        let handler: Arc<dyn BillingHandler> =
            Arc::new(AccountEventHandler::new(backends.session_store.clone()));
        Self::from_parts(settings, backends, handler)
    }

    /// Assemble services over the given storage and business handler.
    /// Must be called inside a tokio runtime: the pruner is spawned here.
    pub fn from_parts(
        settings: &Settings,
        backends: Backends,
        handler: Arc<dyn BillingHandler>,
    ) -> anyhow::Result<Self> {
        if settings.webhook.secrets.iter().all(|s| s.is_empty()) {
            return Err(anyhow!("webhook.secrets must contain at least one secret"));
        }
        if settings.session.jwt_signing_key.is_empty() {
            return Err(anyhow!("session.jwt_signing_key must not be empty"));
        }

        let Backends {
            session_store,
            dedup_repo,
            pool,
        } = backends;

        let codec: Arc<dyn AccessTokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: settings.session.jwt_issuer.clone(),
            audience: settings.session.jwt_audience.clone(),
            access_ttl: chrono::Duration::seconds(settings.session.access_ttl_secs as i64),
            signing_key: settings.session.jwt_signing_key.clone().into_bytes(),
        }));
        let session_service: Arc<dyn SessionService> = Arc::new(RealSessionService::new(
            session_store.clone(),
            codec,
            chrono::Duration::seconds(settings.session.refresh_ttl_secs as i64),
        ));

        let signature_verifier = Arc::new(HmacSignatureVerifier::new(
            settings.webhook.secrets.clone(),
            settings.webhook.tolerance_secs,
        ));
        let webhook_service: Arc<dyn WebhookService> = Arc::new(RealWebhookService::new(
            signature_verifier.clone(),
            dedup_repo.clone(),
            handler,
            WebhookConfig {
                signature_failure_policy: settings.webhook.signature_failure_policy,
                handler_timeout: Duration::from_secs(settings.webhook.handler_timeout_secs),
            },
        ));

        let health_service: Arc<dyn HealthService> = Arc::new(RealHealthService::new(
            settings.health.environment.clone(),
            settings
                .health
                .check_storage
                .then(|| session_store.clone()),
        ));

        let cancel = CancellationToken::new();
        let pruner = Pruner::new(
            session_store,
            dedup_repo,
            chrono::Duration::seconds(settings.webhook.dedup_horizon_secs as i64),
            Duration::from_secs(settings.pruner.interval_secs.max(1)),
            cancel.clone(),
        );
        let pruner_handle = tokio::spawn(async move {
            pruner.run().await;
        });

        info!("server started");

        Ok(Self {
            session_service,
            webhook_service,
            health_service,
            signature_verifier,
            operator_token: settings
                .webhook
                .operator_token
                .clone()
                .filter(|t| !t.is_empty()),
            pruner_handle: Mutex::new(Some(pruner_handle)),
            cancel,
            pool,
        })
    }

    pub fn rotate_webhook_secrets(&self, secrets: Vec<String>) {
        self.signature_verifier.rotate(secrets);
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = match self.pruner_handle.lock() {
            Ok(mut lock) => lock.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let r = handle.await;
            info!("pruner handle dropped: {:?}", r);
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
