//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub telephony: TelephonyConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Apply embedded migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_run_migrations() -> bool {
    true
}

/// Telephony provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelephonyConfig {
    /// Externally reachable base URL used to build answer/hangup webhooks
    pub public_base_url: String,

    /// WebSocket base URL the voice engine streams media on
    pub media_stream_base_url: String,

    /// Hard limit on a single call, in seconds
    #[serde(default = "default_call_time_limit")]
    pub call_time_limit_secs: u32,

    /// Outbound HTTP timeout for provider APIs
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub twilio: TwilioConfig,

    #[serde(default)]
    pub plivo: PlivoConfig,
}

fn default_call_time_limit() -> u32 {
    2700 // 45 minutes
}

fn default_request_timeout() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com/2010-04-01".to_string()
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            api_base: default_twilio_api_base(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlivoConfig {
    #[serde(default)]
    pub auth_id: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_plivo_api_base")]
    pub api_base: String,
}

fn default_plivo_api_base() -> String {
    "https://api.plivo.com/v1".to_string()
}

impl Default for PlivoConfig {
    fn default() -> Self {
        Self {
            auth_id: String::new(),
            auth_token: String::new(),
            api_base: default_plivo_api_base(),
        }
    }
}

/// Campaign scheduler configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Run the fleet poller in this process
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,

    /// Fleet poller interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Attempts made to find a free line before giving up
    #[serde(default = "default_line_poll_attempts")]
    pub line_poll_attempts: u32,

    /// Delay between line polling attempts in seconds
    #[serde(default = "default_line_poll_interval")]
    pub line_poll_interval_secs: u64,

    /// Hard deadline for one campaign loop in seconds
    #[serde(default = "default_loop_timeout")]
    pub loop_timeout_secs: u64,

    /// Longest wait for a provider to accept a campaign call, in seconds.
    /// A placement still pending then is treated as refused.
    #[serde(default = "default_placement_timeout")]
    pub placement_timeout_secs: u64,

    /// Maximum due scheduled calls placed per poll
    #[serde(default = "default_scheduled_batch_size")]
    pub scheduled_batch_size: i64,
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    30
}

fn default_line_poll_attempts() -> u32 {
    6
}

fn default_line_poll_interval() -> u64 {
    30
}

fn default_loop_timeout() -> u64 {
    14400 // 4 hours
}

fn default_placement_timeout() -> u64 {
    30
}

fn default_scheduled_batch_size() -> i64 {
    50
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn line_poll_interval(&self) -> Duration {
        Duration::from_secs(self.line_poll_interval_secs)
    }

    pub fn loop_timeout(&self) -> Duration {
        Duration::from_secs(self.loop_timeout_secs)
    }

    pub fn placement_timeout(&self) -> Duration {
        Duration::from_secs(self.placement_timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            poll_interval_secs: default_poll_interval(),
            line_poll_attempts: default_line_poll_attempts(),
            line_poll_interval_secs: default_line_poll_interval(),
            loop_timeout_secs: default_loop_timeout(),
            placement_timeout_secs: default_placement_timeout(),
            scheduled_batch_size: default_scheduled_batch_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of the human readable format
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 10)?
            .set_default("database.run_migrations", true)?
            .set_default("telephony.call_time_limit_secs", 2700)?
            .set_default("telephony.request_timeout_secs", 15)?
            .set_default("scheduler.enabled", true)?
            .set_default("scheduler.poll_interval_secs", 30)?
            .set_default("scheduler.line_poll_attempts", 6)?
            .set_default("scheduler.line_poll_interval_secs", 30)?
            .set_default("scheduler.loop_timeout_secs", 14400)?
            .set_default("scheduler.placement_timeout_secs", 30)?
            .set_default("scheduler.scheduled_batch_size", 50)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with CALLFLOW_ prefix
            .add_source(
                Environment::with_prefix("CALLFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("CALLFLOW").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scheduler_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.line_poll_attempts, 6);
        assert_eq!(config.line_poll_interval(), Duration::from_secs(30));
        assert_eq!(config.loop_timeout(), Duration::from_secs(4 * 60 * 60));
        assert_eq!(config.placement_timeout(), Duration::from_secs(30));
        assert!(config.enabled);
    }

    #[test]
    fn test_config_from_toml_uses_defaults() {
        let raw = r#"
            [server]
            port = 9000

            [database]
            url = "postgres://localhost/callflow"

            [telephony]
            public_base_url = "https://calls.example.com"
            media_stream_base_url = "wss://media.example.com"

            [scheduler]
            poll_interval_secs = 10
        "#;

        let config: AppConfig = Config::builder()
            .add_source(File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.telephony.call_time_limit_secs, 2700);
        assert_eq!(config.telephony.twilio.api_base, "https://api.twilio.com/2010-04-01");
        assert_eq!(config.scheduler.poll_interval_secs, 10);
        assert_eq!(config.scheduler.line_poll_attempts, 6);
        assert!(!config.logging.json);
        assert_eq!(config.server_addr(), "0.0.0.0:9000");
    }
}
