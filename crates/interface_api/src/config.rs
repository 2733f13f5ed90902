//! API configuration

use core_kernel::Timezone;
use serde::Deserialize;

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: String,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_min_connections: u32,
    /// Log level
    pub log_level: String,
    /// Days between invoice date and due date
    pub invoice_due_days: i64,
    /// IANA zone that billing days are counted in
    pub billing_timezone: Timezone,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/care_billing".to_string(),
            database_max_connections: 10,
            database_min_connections: 2,
            log_level: "info".to_string(),
            invoice_due_days: domain_billing::DEFAULT_DUE_DAYS,
            billing_timezone: Timezone::default(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from `API_`-prefixed environment variables
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.invoice_due_days, 30);
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(config.billing_timezone, Timezone::default());
    }

    #[test]
    fn test_timezone_deserializes_from_name() {
        let config: ApiConfig =
            serde_json::from_str(r#"{"billing_timezone": "Europe/Amsterdam"}"#).unwrap();
        assert_eq!(config.billing_timezone, "Europe/Amsterdam".parse::<Timezone>().unwrap());
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let result = serde_json::from_str::<ApiConfig>(r#"{"billing_timezone": "Mars/Olympus"}"#);
        assert!(result.is_err());
    }
}
