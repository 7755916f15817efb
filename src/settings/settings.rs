use crate::application_impl::SignatureFailurePolicy;
use anyhow::{Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub http: Http,
    pub log: Log,
    pub storage: Storage,
    pub session: Session,
    pub webhook: Webhook,
    pub pruner: Pruner,
    pub health: Health,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Http {
    pub address: String,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Mysql,
    Redis,
}

#[derive(Clone, Deserialize)]
pub struct Storage {
    pub backend: StorageBackend,
    pub mysql_dsn: Option<String>,
    pub redis_dsn: Option<String>,
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,
}

#[derive(Clone, Deserialize)]
pub struct Session {
    pub refresh_ttl_secs: u64,
    pub access_ttl_secs: u64,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_signing_key: String,
}

#[derive(Clone, Deserialize)]
pub struct Webhook {
    /// Current secret first, then previous ones still accepted.
    pub secrets: Vec<String>,
    pub tolerance_secs: u64,
    pub signature_failure_policy: SignatureFailurePolicy,
    pub dedup_horizon_secs: u64,
    pub handler_timeout_secs: u64,
    pub operator_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pruner {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub environment: String,
    #[serde(default)]
    pub check_storage: bool,
}

fn default_redis_prefix() -> String {
    "gatehouse".to_string()
}

// Settings get logged at startup; keep credentials out of the output.

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("backend", &self.backend)
            .field("mysql_dsn", &self.mysql_dsn.as_ref().map(|_| "***"))
            .field("redis_dsn", &self.redis_dsn.as_ref().map(|_| "***"))
            .field("redis_prefix", &self.redis_prefix)
            .finish()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Webhook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Webhook")
            .field("secrets", &self.secrets.len())
            .field("tolerance_secs", &self.tolerance_secs)
            .field("signature_failure_policy", &self.signature_failure_policy)
            .field("dedup_horizon_secs", &self.dedup_horizon_secs)
            .field("handler_timeout_secs", &self.handler_timeout_secs)
            .field("operator_token", &self.operator_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

const ENV_PREFIX: &str = "GATEHOUSE";

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("webhook.secrets")
        .try_parsing(true)
}

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(environment())
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

/// Parse settings from TOML text, without environment overrides.
pub fn parse_settings_str(toml: &str) -> Result<Settings> {
    let settings: Settings = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
