use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;
pub const MAX_BUFFERED_BYTES: usize = 1024 * 1024;
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Top-level config (`openmates.toml` + `OPENMATES_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenMatesConfig {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub keyvault: KeyVaultConfig,
    #[serde(default)]
    pub hotcache: HotCacheConfig,
    #[serde(default)]
    pub metadatastore: MetadataStoreConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Default for OpenMatesConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                port: DEFAULT_PORT,
                bind: DEFAULT_BIND.to_string(),
                auth: AuthConfig {
                    mode: AuthMode::Token,
                    token: Some("change-me".to_string()),
                },
            },
            keyvault: KeyVaultConfig::default(),
            hotcache: HotCacheConfig::default(),
            metadatastore: MetadataStoreConfig::default(),
            reminders: RemindersConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// Bearer token expected on the WebSocket handshake. `None` with
    /// `AuthMode::None` disables auth entirely (local dev only).
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    Token,
    None,
}

/// KeyVault connection settings. `master_key_path` points at the HSM-equivalent
/// KEK material; in single-node deployments this is a file on a sealed
/// volume, not a network service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyVaultConfig {
    #[serde(default = "default_master_key_path")]
    pub master_key_path: String,
    /// Identifier for the HMAC key used for deterministic email hashing,
    /// shared across all users at the KV layer.
    #[serde(default = "default_email_hmac_key_id")]
    pub email_hmac_key_id: String,
    /// Seconds a decrypted DEK may be reused before the KV is consulted
    /// again ("cache token validity for ≤30s").
    #[serde(default = "default_dek_cache_ttl_secs")]
    pub dek_cache_ttl_secs: u64,
}

impl Default for KeyVaultConfig {
    fn default() -> Self {
        Self {
            master_key_path: default_master_key_path(),
            email_hmac_key_id: default_email_hmac_key_id(),
            dek_cache_ttl_secs: default_dek_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotCacheConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_reminder_ttl_days")]
    pub reminder_ttl_days: i64,
    #[serde(default = "default_pending_delivery_ttl_days")]
    pub pending_delivery_ttl_days: i64,
    /// Directory the spill file is written to on graceful shutdown and read
    /// back from on startup.
    #[serde(default = "default_spill_dir")]
    pub spill_dir: String,
}

impl Default for HotCacheConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            reminder_ttl_days: default_reminder_ttl_days(),
            pending_delivery_ttl_days: default_pending_delivery_ttl_days(),
            spill_dir: default_spill_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataStoreConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for MetadataStoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    #[serde(default = "default_reminder_tick_ms")]
    pub tick_interval_ms: u64,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_reminder_tick_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_queue_high_water_mark")]
    pub queue_high_water_mark: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            queue_high_water_mark: default_queue_high_water_mark(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_master_key_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.openmates/master.key", home)
}
fn default_email_hmac_key_id() -> String {
    "email-hmac-key".to_string()
}
fn default_dek_cache_ttl_secs() -> u64 {
    30
}
fn default_top_n() -> usize {
    crate::limits::DEFAULT_TOP_N
}
fn default_reminder_ttl_days() -> i64 {
    7
}
fn default_pending_delivery_ttl_days() -> i64 {
    60
}
fn default_spill_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.openmates/spill", home)
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.openmates/openmates.db", home)
}
fn default_reminder_tick_ms() -> u64 {
    2_000
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_base_ms() -> u64 {
    200
}
fn default_queue_high_water_mark() -> usize {
    10_000
}

impl OpenMatesConfig {
    /// Load config from a TOML file with `OPENMATES_*` env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. `OPENMATES_CONFIG` env var
    ///   3. `./openmates.toml`
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("OPENMATES_CONFIG").ok())
            .unwrap_or_else(|| "./openmates.toml".to_string());

        let config: OpenMatesConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("OPENMATES_").split("_"))
            .extract()
            .map_err(|e| crate::error::OpenMatesError::Config(e.to_string()))?;

        Ok(config)
    }
}
