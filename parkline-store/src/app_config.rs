use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    pub gateway: GatewayConfig,
    pub sensor: SensorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_payment_timeout")]
    pub payment_timeout_seconds: i64,
    #[serde(default = "default_reservation_window")]
    pub reservation_window_minutes: i64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_ban_threshold")]
    pub ban_failed_payments_threshold: i64,
    #[serde(default = "default_ban_hours")]
    pub ban_duration_hours: i64,
}

fn default_payment_timeout() -> i64 { 300 }
fn default_reservation_window() -> i64 { 15 }
fn default_poll_interval() -> u64 { 10 }
fn default_ban_threshold() -> i64 { 3 }
fn default_ban_hours() -> i64 { 24 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Rate limiting is off when unset or empty.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { url: None, rate_limit_per_minute: default_rate_limit() }
    }
}

impl RedisConfig {
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }
}

fn default_rate_limit() -> i64 { 100 }

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub secret_key: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Shared secret the gateway signs webhook bodies with.
    #[serde(default)]
    pub webhook_secret: String,
    /// Use the in-process mock gateway instead of calling out.
    #[serde(default)]
    pub mock: bool,
}

fn default_currency() -> String { "PHP".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    pub url: String,
    #[serde(default = "default_sensor_timeout")]
    pub timeout_seconds: u64,
}

fn default_sensor_timeout() -> u64 { 5 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `PARKLINE__DATABASE__URL=...` sets `database.url`
            .add_source(config::Environment::with_prefix("PARKLINE").separator("__"))
            .build()?;

        Self::from_settings(s)
    }

    fn from_settings(settings: config::Config) -> Result<Self, config::ConfigError> {
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        // tokio's interval panics on a zero period
        if self.business_rules.poll_interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "business_rules.poll_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.business_rules.payment_timeout_seconds <= 0 {
            return Err(config::ConfigError::Message(
                "business_rules.payment_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.gateway.webhook_secret.is_empty() && !self.gateway.mock {
            return Err(config::ConfigError::Message(
                "gateway.webhook_secret is required when the live gateway is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn settings(business_rules: &str) -> config::Config {
        let toml = format!(
            r#"
            [server]
            port = 8080
            [database]
            url = "postgres://localhost/parkline"
            [auth]
            jwt_secret = "s"
            jwt_expiration_seconds = 60
            [business_rules]
            {business_rules}
            [gateway]
            base_url = "https://gateway.example"
            secret_key = "sk"
            webhook_secret = "whsk"
            success_url = "http://localhost/ok"
            cancel_url = "http://localhost/cancel"
            [sensor]
            url = "http://localhost:5000/occupancy"
            "#
        );
        config::Config::builder()
            .add_source(File::from_str(&toml, FileFormat::Toml))
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_business_rules_and_redis() {
        let config = Config::from_settings(settings("")).unwrap();
        assert_eq!(config.business_rules.poll_interval_seconds, 10);
        assert_eq!(config.business_rules.payment_timeout_seconds, 300);
        assert!(config.redis.url().is_none());
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let err = Config::from_settings(settings("poll_interval_seconds = 0")).unwrap_err();
        assert!(err.to_string().contains("poll_interval_seconds"));
    }

    #[test]
    fn test_live_gateway_needs_webhook_secret() {
        let unsigned = config::Config::builder()
            .add_source(settings(""))
            .set_override("gateway.webhook_secret", "")
            .unwrap()
            .build()
            .unwrap();
        let err = Config::from_settings(unsigned).unwrap_err();
        assert!(err.to_string().contains("webhook_secret"));
    }
}
