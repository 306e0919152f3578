//! Configuration for the access mirror.
//!
//! Sources, lowest precedence first: built-in defaults, an optional file (TOML, YAML or
//! JSON by extension), then `MEDLEDGER_*` environment variables with `__` between
//! sections, e.g. `MEDLEDGER_LEDGER__ENDPOINT`.

use crate::error::SettingsError;
use chrono::{FixedOffset, Offset, Utc};
use medledger_client::RpcClientConfig;
use medledger_codec::MissingBlockTime;
use medledger_identity::SecretSource;
use medledger_types::{Address, Commitment, MEMO_PROGRAM_ID};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest representable UTC offset, exclusive.
const MAX_OFFSET_MINUTES: i32 = 24 * 60;

/// Main mirror configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Mirror accesses to the ledger at all
    #[serde(default)]
    pub enabled: bool,

    /// Program whose instructions carry access records
    #[serde(default = "default_memo_program_id")]
    pub memo_program_id: String,

    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub identity: IdentitySettings,

    #[serde(default)]
    pub trail: TrailSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            memo_program_id: default_memo_program_id(),
            ledger: LedgerSettings::default(),
            identity: IdentitySettings::default(),
            trail: TrailSettings::default(),
            dispatch: DispatchSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Ledger node connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub commitment: Commitment,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub skip_preflight: bool,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            commitment: Commitment::Confirmed,
            request_timeout_secs: default_request_timeout(),
            confirm_timeout_secs: default_confirm_timeout(),
            poll_interval_ms: default_poll_interval(),
            skip_preflight: false,
        }
    }
}

/// Where the signing secret comes from. A file takes precedence over the variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySettings {
    #[serde(default = "default_secret_env")]
    pub secret_env: String,

    #[serde(default)]
    pub secret_file: Option<PathBuf>,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
            secret_file: None,
        }
    }
}

/// Audit trail reconstruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailSettings {
    /// Offset applied to trail timestamps, minutes east of UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,

    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default)]
    pub missing_block_time: MissingBlockTime,
}

impl Default for TrailSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fetch_timeout_secs: default_fetch_timeout(),
            missing_block_time: MissingBlockTime::Omit,
        }
    }
}

/// Request-path dispatch of access records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Upper bound on one submission, confirmation included
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,

    /// How long a request handler waits for a bounded record
    #[serde(default = "default_dispatch_timeout")]
    pub timeout_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            submit_timeout_secs: default_submit_timeout(),
            timeout_secs: default_dispatch_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_memo_program_id() -> String {
    MEMO_PROGRAM_ID.to_string()
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8899".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_confirm_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    500
}

fn default_secret_env() -> String {
    "MEDLEDGER_SIGNING_KEY".to_string()
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_submit_timeout() -> u64 {
    60
}

fn default_dispatch_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AuditConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&AuditConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MEDLEDGER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later, at the first access.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.memo_program()?;

        if self.enabled && self.ledger.endpoint.trim().is_empty() {
            return Err(SettingsError::Invalid("ledger.endpoint is empty".into()));
        }

        let durations = [
            ("ledger.request_timeout_secs", self.ledger.request_timeout_secs),
            ("ledger.confirm_timeout_secs", self.ledger.confirm_timeout_secs),
            ("ledger.poll_interval_ms", self.ledger.poll_interval_ms),
            ("trail.fetch_timeout_secs", self.trail.fetch_timeout_secs),
            ("dispatch.submit_timeout_secs", self.dispatch.submit_timeout_secs),
            ("dispatch.timeout_secs", self.dispatch.timeout_secs),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, value)| *value == 0) {
            return Err(SettingsError::Invalid(format!("{name} must be positive")));
        }

        // blockhash, send and the last status poll each get a full request timeout
        let submit_floor = self
            .ledger
            .confirm_timeout_secs
            .saturating_add(self.ledger.request_timeout_secs.saturating_mul(3));
        if self.dispatch.submit_timeout_secs < submit_floor {
            return Err(SettingsError::Invalid(format!(
                "dispatch.submit_timeout_secs {} is shorter than the ledger client's own limit of {submit_floor}s \
                 (confirm_timeout_secs + 3 * request_timeout_secs)",
                self.dispatch.submit_timeout_secs
            )));
        }

        if self.trail.max_concurrent_fetches == 0 {
            return Err(SettingsError::Invalid(
                "trail.max_concurrent_fetches must be positive".into(),
            ));
        }

        if self.trail.utc_offset_minutes.abs() >= MAX_OFFSET_MINUTES {
            return Err(SettingsError::Invalid(format!(
                "trail.utc_offset_minutes {} is out of range",
                self.trail.utc_offset_minutes
            )));
        }

        Ok(())
    }

    pub fn memo_program(&self) -> Result<Address, SettingsError> {
        self.memo_program_id.parse().map_err(|e| {
            SettingsError::Invalid(format!(
                "memo_program_id {:?}: {e}",
                self.memo_program_id
            ))
        })
    }

    pub fn secret_source(&self) -> SecretSource {
        match &self.identity.secret_file {
            Some(path) => SecretSource::File(path.clone()),
            None => SecretSource::Env(self.identity.secret_env.clone()),
        }
    }

    pub fn rpc_client_config(&self) -> RpcClientConfig {
        RpcClientConfig {
            endpoint: self.ledger.endpoint.clone(),
            commitment: self.ledger.commitment,
            request_timeout: Duration::from_secs(self.ledger.request_timeout_secs),
            confirm_timeout: Duration::from_secs(self.ledger.confirm_timeout_secs),
            poll_interval: Duration::from_millis(self.ledger.poll_interval_ms),
            skip_preflight: self.ledger.skip_preflight,
        }
    }

    /// Trail timestamp offset; out-of-range values fall back to UTC.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.trail.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.submit_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.trail.fetch_timeout_secs)
    }
}
