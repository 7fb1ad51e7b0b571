use anyhow::{bail, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub verification: VerificationConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    pub interval_secs: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub data_dir: PathBuf,
    pub token_override: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl VerificationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            api: ApiConfig {
                base_url: env::var("PAYPORTAL_API_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/api/v1".to_string()),
                timeout_secs: env::var("PAYPORTAL_HTTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
            },
            verification: VerificationConfig {
                interval_secs: env::var("PAYPORTAL_POLL_INTERVAL_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
                max_attempts: env::var("PAYPORTAL_POLL_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            },
            session: SessionConfig {
                data_dir: env::var("PAYPORTAL_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| default_data_dir()),
                token_override: env::var("PAYPORTAL_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            },
            logging: LoggingConfig {
                log_dir: env::var("PAYPORTAL_LOG_DIR").ok().map(PathBuf::from),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Err(e) = reqwest::Url::parse(&self.api.base_url) {
            bail!("PAYPORTAL_API_URL is not a valid URL ({}): {}", self.api.base_url, e);
        }
        if self.api.timeout_secs == 0 {
            bail!("PAYPORTAL_HTTP_TIMEOUT_SECS must be greater than zero");
        }
        if self.verification.interval_secs == 0 {
            bail!("PAYPORTAL_POLL_INTERVAL_SECS must be greater than zero");
        }
        if self.verification.max_attempts == 0 {
            bail!("PAYPORTAL_POLL_MAX_ATTEMPTS must be at least 1");
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("payportal")
}
