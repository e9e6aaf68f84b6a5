//! # Feature: Configuration System
//!
//! Bot configuration from a YAML file with environment variable
//! interpolation, or from plain environment variables.
//!
//! - **Version**: 3.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 3.0.0: Ticket desk settings (data path, conversation timeouts)
//! - 2.0.0: YAML configuration with `${VAR}` interpolation
//! - 1.0.0: Initial environment variable configuration

use anyhow::{Context, Result};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // ${VAR_NAME} or ${VAR_NAME:-default}
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("Invalid regex")
});

/// How long each conversation step waits for the admin, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Support role designation (setup aborts on timeout)
    pub role: u64,
    /// Default/custom choice per category (falls back to default)
    pub category_choice: u64,
    /// Custom welcome text (falls back to default)
    pub custom_text: u64,
    /// Log channel designation (setup aborts on timeout)
    pub log_channel: u64,
    /// Replace/cancel confirmation before re-running setup
    pub confirm: u64,
    /// Free-text prompts of the panel editor
    pub edit: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            role: 60,
            category_choice: 120,
            custom_text: 120,
            log_channel: 60,
            confirm: 60,
            edit: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn role(&self) -> Duration {
        Duration::from_secs(self.role)
    }

    pub fn category_choice(&self) -> Duration {
        Duration::from_secs(self.category_choice)
    }

    pub fn custom_text(&self) -> Duration {
        Duration::from_secs(self.custom_text)
    }

    pub fn log_channel(&self) -> Duration {
        Duration::from_secs(self.log_channel)
    }

    pub fn confirm(&self) -> Duration {
        Duration::from_secs(self.confirm)
    }

    pub fn edit(&self) -> Duration {
        Duration::from_secs(self.edit)
    }

    fn all(&self) -> [(&'static str, u64); 6] {
        [
            ("role", self.role),
            ("category_choice", self.category_choice),
            ("custom_text", self.custom_text),
            ("log_channel", self.log_channel),
            ("confirm", self.confirm),
            ("edit", self.edit),
        ]
    }
}

/// Bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Discord bot token (required)
    pub discord_token: String,

    /// Ticket document location
    #[serde(default = "default_data_path")]
    pub data_path: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Dev mode guild ID (for faster command registration)
    #[serde(default)]
    pub discord_guild_id: Option<String>,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// How often abandoned conversation waiters are swept
    #[serde(default = "default_sweep_interval")]
    pub waiter_sweep_interval_secs: u64,
}

// Default value functions for serde
fn default_data_path() -> String {
    "data/tickets.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sweep_interval() -> u64 {
    5
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN environment variable not set"))?,
            data_path: env::var("TICKETS_DATA_PATH").unwrap_or_else(|_| default_data_path()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
            discord_guild_id: env::var("DISCORD_GUILD_ID").ok(),
            timeouts: TimeoutConfig::default(),
            waiter_sweep_interval_secs: default_sweep_interval(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable interpolation
    ///
    /// Supports `${VAR_NAME}` syntax for environment variable substitution.
    /// Example: `discord_token: "${DISCORD_TOKEN}"`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        let interpolated = interpolate_env_vars(content)?;
        let config: Config = serde_yaml::from_str(&interpolated).context("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Auto-detect and load configuration
    ///
    /// Priority order:
    /// 1. If CONFIG_FILE env var is set, load from that file
    /// 2. If config.yaml exists in current directory, load from it
    /// 3. Fall back to environment variables
    pub fn auto_load() -> Result<Self> {
        if let Ok(config_path) = env::var("CONFIG_FILE") {
            info!("Loading config from CONFIG_FILE: {}", config_path);
            return Self::from_file(&config_path);
        }

        let default_config_path = "config.yaml";
        if Path::new(default_config_path).exists() {
            info!("Loading config from {}", default_config_path);
            return Self::from_file(default_config_path);
        }

        info!("No config file found, using environment variables");
        Self::from_env()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("discord_token is required");
        }

        if self.data_path.trim().is_empty() {
            anyhow::bail!("data_path must not be empty");
        }

        for (name, secs) in self.timeouts.all() {
            if secs == 0 {
                anyhow::bail!("timeouts.{} must be greater than zero", name);
            }
        }

        if self.waiter_sweep_interval_secs == 0 {
            anyhow::bail!("waiter_sweep_interval_secs must be greater than zero");
        }

        if let Some(ref guild_id) = self.discord_guild_id {
            if guild_id.parse::<u64>().is_err() {
                anyhow::bail!("Invalid discord_guild_id '{}': expected a numeric id", guild_id);
            }
        }

        Ok(())
    }

    pub fn guild_id(&self) -> Option<u64> {
        self.discord_guild_id.as_deref().and_then(|id| id.parse().ok())
    }

    pub fn waiter_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.waiter_sweep_interval_secs)
    }
}

// ============================================================================
// Environment Variable Interpolation
// ============================================================================

/// Interpolate environment variables in a string
///
/// Supports `${VAR_NAME}` syntax. If a variable is not set, returns an error.
/// Use `${VAR_NAME:-default}` for default values.
fn interpolate_env_vars(content: &str) -> Result<String> {
    let mut errors = Vec::new();

    let result = ENV_VAR_PATTERN.replace_all(content, |cap: &regex::Captures| {
        let var_name = &cap[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    errors.push(format!("Environment variable '{}' is not set", var_name));
                    String::new()
                }
            },
        }
    });

    if !errors.is_empty() {
        anyhow::bail!("Missing environment variables:\n  - {}", errors.join("\n  - "));
    }

    Ok(result.into_owned())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_from_env() {
        env::remove_var("DISCORD_TOKEN");
        assert!(Config::from_env().is_err());

        env::set_var("DISCORD_TOKEN", "test_discord_token");
        env::remove_var("TICKETS_DATA_PATH");
        env::remove_var("LOG_LEVEL");

        let config = Config::from_env().unwrap();
        assert_eq!(config.discord_token, "test_discord_token");
        assert_eq!(config.data_path, "data/tickets.json");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.timeouts, TimeoutConfig::default());

        env::remove_var("DISCORD_TOKEN");
    }

    #[test]
    fn test_interpolate_env_vars_simple() {
        env::set_var("TICKETDESK_TEST_VAR_1", "value1");
        let input = "key: ${TICKETDESK_TEST_VAR_1}";
        let result = interpolate_env_vars(input).unwrap();
        assert_eq!(result, "key: value1");
        env::remove_var("TICKETDESK_TEST_VAR_1");
    }

    #[test]
    fn test_interpolate_env_vars_with_default() {
        env::remove_var("TICKETDESK_NONEXISTENT_VAR");
        let input = "key: ${TICKETDESK_NONEXISTENT_VAR:-default_value}";
        let result = interpolate_env_vars(input).unwrap();
        assert_eq!(result, "key: default_value");
    }

    #[test]
    fn test_interpolate_env_vars_missing_no_default() {
        env::remove_var("TICKETDESK_MISSING_VAR");
        let input = "key: ${TICKETDESK_MISSING_VAR}";
        let result = interpolate_env_vars(input);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        env::set_var("TICKETDESK_TEST_TOKEN", "test_token_123");

        let yaml = r#"
discord_token: "${TICKETDESK_TEST_TOKEN}"
data_path: "/var/lib/ticketdesk/tickets.json"
log_level: "debug"
discord_guild_id: "123456789"
timeouts:
  custom_text: 300
"#;

        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.discord_token, "test_token_123");
        assert_eq!(config.data_path, "/var/lib/ticketdesk/tickets.json");
        assert_eq!(config.guild_id(), Some(123456789));
        assert_eq!(config.timeouts.custom_text(), Duration::from_secs(300));
        // Unspecified timeouts keep their defaults
        assert_eq!(config.timeouts.role(), Duration::from_secs(60));
        assert_eq!(config.timeouts.category_choice(), Duration::from_secs(120));
        assert_eq!(config.waiter_sweep_interval(), Duration::from_secs(5));

        env::remove_var("TICKETDESK_TEST_TOKEN");
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let yaml = r#"
discord_token: "token"
timeouts:
  role: 0
"#;
        let result = Config::from_yaml(yaml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timeouts.role"));
    }

    #[test]
    fn test_validation_rejects_bad_guild_id() {
        let yaml = r#"
discord_token: "token"
discord_guild_id: "not-a-number"
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}
