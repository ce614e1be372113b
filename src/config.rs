use ::config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::alerts::SmtpConfig;
use crate::fetcher::FetcherConfig;
use crate::models::ProductConfig;
use crate::monitor::MonitorConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub fetcher: FetcherConfig,
    pub monitor: MonitorConfig,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub console: ConsoleConfig,
    pub smtp: SmtpChannelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpChannelConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub smtp: SmtpConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, ignored by git
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("VIGIA").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Message("Database URL must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if self.database.retention_days == 0 {
            return Err(ConfigError::Message(
                "Database retention_days must be greater than 0".into(),
            ));
        }

        if self.fetcher.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Fetcher request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.monitor.max_concurrency == 0 {
            return Err(ConfigError::Message(
                "Monitor max_concurrency must be greater than 0".into(),
            ));
        }

        if self.monitor.degraded_threshold == 0 {
            return Err(ConfigError::Message(
                "Monitor degraded_threshold must be greater than 0".into(),
            ));
        }

        if self.notifications.smtp.enabled {
            let smtp = &self.notifications.smtp.smtp;
            if smtp.port == 0 {
                return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
            }
            if smtp.from_address.is_none() || smtp.to_address.is_none() {
                return Err(ConfigError::Message(
                    "SMTP notifications require from_address and to_address".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Product list, loaded from its own TOML file. Products are data that
/// changes between runs, not deployment configuration, so they live
/// outside the `config/` hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Products {
    #[serde(default)]
    pub products: Vec<ProductConfig>,
}

impl Products {
    pub fn from_path(path: &Path) -> Result<Vec<ProductConfig>, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Message(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Vec<ProductConfig>, ConfigError> {
        let parsed: Products = toml::from_str(raw)
            .map_err(|e| ConfigError::Message(format!("invalid product file: {e}")))?;

        for product in &parsed.products {
            product
                .validate()
                .map_err(|e| ConfigError::Message(format!("product {}: {e}", product.name)))?;
        }

        Ok(parsed.products)
    }
}
