use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub email: EmailConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Runs on the in-memory store when unset
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_shortlist_size")]
    pub shortlist_size: usize,
    #[serde(default = "default_shortlist_ttl_hours")]
    pub shortlist_ttl_hours: i64,
    /// Used when the settings store holds no delivery fee
    #[serde(default = "default_delivery_fee")]
    pub default_delivery_fee: i64,
}

fn default_shortlist_size() -> usize { 3 }
fn default_shortlist_ttl_hours() -> i64 { 24 }
fn default_delivery_fee() -> i64 { 5000 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            shortlist_size: default_shortlist_size(),
            shortlist_ttl_hours: default_shortlist_ttl_hours(),
            default_delivery_fee: default_delivery_fee(),
        }
    }
}

impl BusinessRules {
    /// Reject rules that would produce empty or already-expired shortlists
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.shortlist_size == 0 {
            return Err(config::ConfigError::Message("business_rules.shortlist_size must be at least 1".into()));
        }
        if self.shortlist_ttl_hours <= 0 {
            return Err(config::ConfigError::Message(format!(
                "business_rules.shortlist_ttl_hours must be positive, got {}",
                self.shortlist_ttl_hours
            )));
        }
        if self.default_delivery_fee < 0 {
            return Err(config::ConfigError::Message(format!(
                "business_rules.default_delivery_fee must not be negative, got {}",
                self.default_delivery_fee
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff")]
    pub base_backoff_seconds: i64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_seconds: i64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_max_attempts() -> u32 { 5 }
fn default_base_backoff() -> i64 { 30 }
fn default_max_backoff() -> i64 { 3600 }
fn default_poll_interval() -> u64 { 10 }
fn default_batch_size() -> usize { 20 }

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_seconds: default_base_backoff(),
            max_backoff_seconds: default_max_backoff(),
            poll_interval_seconds: default_poll_interval(),
            batch_size: default_batch_size(),
        }
    }
}

impl EmailConfig {
    pub fn retry_policy(&self) -> atelier_core::email::RetryPolicy {
        atelier_core::email::RetryPolicy {
            max_attempts: self.max_attempts,
            base_backoff: chrono::Duration::seconds(self.base_backoff_seconds),
            max_backoff: chrono::Duration::seconds(self.max_backoff_seconds),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `ATELIER__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("ATELIER").separator("__"))
            .build()?;

        let config: Config = s.try_deserialize()?;
        config.business_rules.validate()?;
        Ok(config)
    }
}
