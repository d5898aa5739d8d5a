use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ai: AiConfig,
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// External AI question source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Quiz session and corpus tuning
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Countdown for a theme training session, in seconds.
    pub training_duration_secs: u32,
    /// Countdown for a timed exam session, in seconds.
    pub exam_duration_secs: u32,
    /// Question count for a composed exam.
    pub exam_question_count: usize,
    /// Default sample size for a theme training session.
    pub default_sample_count: usize,
    /// Store-side ceiling on operations per write batch.
    pub write_batch_limit: usize,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            ai: AiConfig::from_env()?,
            server: ServerConfig::from_env()?,
            session: SessionConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            ai_model = ?self.ai.model,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            exam_question_count = self.session.exam_question_count,
            write_batch_limit = self.session.write_batch_limit,
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.contains("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.session.exam_question_count == 0 {
            return Err(anyhow!("EXAM_QUESTION_COUNT must be greater than 0"));
        }

        if self.session.write_batch_limit == 0 {
            return Err(anyhow!("WRITE_BATCH_LIMIT must be greater than 0"));
        }

        if self.ai.api_key.is_empty() || self.ai.api_key == "your-api-key" {
            warn!("AI API key appears to be placeholder or empty - AI quiz generation may not work");
        }

        // Directive strings like "info,quiz_corpus=debug" are handed to the
        // EnvFilter as-is; only plain single levels are checked here.
        let level = self.logging.level.to_lowercase();
        if !level.contains(',')
            && !level.contains('=')
            && !["trace", "debug", "info", "warn", "error"].contains(&level.as_str())
        {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:quiz_corpus.db".to_string());
        Ok(DatabaseConfig { url })
    }
}

impl AiConfig {
    fn from_env() -> Result<Self> {
        Ok(AiConfig {
            api_key: env::var("AI_API_KEY").unwrap_or_else(|_| "your-api-key".to_string()),
            base_url: env::var("AI_BASE_URL").ok(),
            model: env::var("AI_MODEL").ok(),
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port_str
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str))?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl SessionConfig {
    fn from_env() -> Result<Self> {
        Ok(SessionConfig {
            training_duration_secs: parse_env("TRAINING_DURATION_SECS", 600)?,
            exam_duration_secs: parse_env("EXAM_DURATION_SECS", 1800)?,
            exam_question_count: parse_env("EXAM_QUESTION_COUNT", 40)?,
            default_sample_count: parse_env("DEFAULT_SAMPLE_COUNT", 10)?,
            write_batch_limit: parse_env("WRITE_BATCH_LIMIT", 500)?,
        })
    }
}

impl LoggingConfig {
    /// Public so the binary can bring up the subscriber before the rest of
    /// the configuration is loaded and logged.
    pub fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,quiz_corpus=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'", name, value)),
        Err(_) => Ok(default),
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    if data.len() <= 8 {
        "*".repeat(data.len())
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}
