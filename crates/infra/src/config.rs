//! Layered configuration.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults;
//! 2. `config/default.toml` and `config/{environment}.toml` (both optional);
//! 3. environment variables `STOCKROOM_*`, nested keys split on `__`
//!    (e.g. `STOCKROOM_SERVER__PORT=9000`, `STOCKROOM_LEDGER__NEGATIVE_STOCK=allow`).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use stockroom_core::UserId;
use stockroom_ledger::NegativeStockPolicy;
use stockroom_observability::LogSettings;
use stockroom_purchasing::PricingPolicy;
use stockroom_reporting::DEFAULT_MAX_SERIES_DAYS;

use crate::retry::MAX_READ_RETRIES;

pub const CONFIG_DIR: &str = "config";
pub const ENV_PREFIX: &str = "STOCKROOM";
const DEFAULT_ENV: &str = "development";

/// Used when no secret is configured. Never acceptable outside development.
pub const DEV_JWT_SECRET: &str = "stockroom-development-secret-do-not-deploy";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: String,
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub store: StoreSettings,
    pub ledger: LedgerSettings,
    pub purchasing: PurchasingSettings,
    pub reporting: ReportingSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// HS256 secret for bearer tokens.
    pub jwt_secret: Option<String>,
    /// User seeded with the admin role at startup.
    pub bootstrap_admin: Option<Uuid>,
}

impl AuthSettings {
    pub fn secret(&self) -> String {
        match self.jwt_secret.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => {
                warn!("auth.jwt_secret is not set; falling back to the development secret");
                DEV_JWT_SECRET.to_string()
            }
        }
    }

    pub fn bootstrap_admin(&self) -> Option<UserId> {
        self.bootstrap_admin.map(UserId::from_uuid)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Extra attempts for reads failing with a transient store error.
    pub read_retries: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: 10,
            read_retries: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub negative_stock: NegativeStockPolicy,
    /// Products with movements this recent cannot be disabled.
    pub disable_guard_days: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            negative_stock: NegativeStockPolicy::Reject,
            disable_guard_days: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct PurchasingSettings {
    pub pricing: PricingPolicy,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ReportingSettings {
    pub max_series_days: u32,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            max_series_days: DEFAULT_MAX_SERIES_DAYS,
        }
    }
}

impl Settings {
    /// Load from `config/` and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var(format!("{ENV_PREFIX}_ENVIRONMENT")).unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let builder = Config::builder()
            .set_default("environment", environment.as_str())?
            .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
            .add_source(File::with_name(&format!("{CONFIG_DIR}/{environment}")).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()
    }

    fn validate(mut self) -> Result<Self, ConfigError> {
        if self.environment.is_empty() {
            self.environment = DEFAULT_ENV.to_string();
        }
        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            return Err(ConfigError::Message(
                "store.database_url is required for the postgres backend".to_string(),
            ));
        }
        if self.store.max_connections == 0 {
            return Err(ConfigError::Message("store.max_connections must be at least 1".to_string()));
        }
        if self.store.read_retries > MAX_READ_RETRIES {
            warn!(
                configured = self.store.read_retries,
                max = MAX_READ_RETRIES,
                "store.read_retries capped"
            );
            self.store.read_retries = MAX_READ_RETRIES;
        }
        if self.reporting.max_series_days == 0 {
            return Err(ConfigError::Message("reporting.max_series_days must be at least 1".to_string()));
        }
        Ok(self)
    }
}
