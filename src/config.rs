use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::aggregator::AggregateConfig;
use crate::extractor::DigitPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scraper: ScraperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub max_concurrent_checks: usize,
    /// Per-fetch timeout in seconds.
    pub request_timeout: u64,
    pub user_agent: String,
    pub retry_attempts: usize,
    pub retry_delay_ms: u64,
    /// Optional limit on a whole aggregation run, in seconds.
    #[serde(default)]
    pub batch_deadline: Option<u64>,
    #[serde(default)]
    pub digit_policy: DigitPolicy,
}

impl ScraperConfig {
    pub fn aggregate_config(&self) -> AggregateConfig {
        AggregateConfig {
            concurrency_limit: self.max_concurrent_checks,
            per_fetch_timeout: Duration::from_secs(self.request_timeout),
            batch_deadline: self.batch_deadline.map(Duration::from_secs),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        Self::load(Path::new("config"), &run_mode)
    }

    pub fn load(dir: &Path, run_mode: &str) -> Result<Self, ConfigError> {
        let file = |name: &str| File::with_name(&dir.join(name).to_string_lossy()).required(false);

        let s = Config::builder()
            // Built-in defaults so the binary runs without any config file
            .set_default("database.url", "sqlite://sites.db")?
            .set_default("database.max_connections", 5)?
            .set_default("scraper.max_concurrent_checks", 5)?
            .set_default("scraper.request_timeout", 10)?
            .set_default("scraper.user_agent", concat!("PriceAverage/", env!("CARGO_PKG_VERSION")))?
            .set_default("scraper.retry_attempts", 0)?
            .set_default("scraper.retry_delay_ms", 500)?
            .set_default("scraper.digit_policy", "concatenate")?
            .add_source(file("default"))
            // Add environment-specific config
            .add_source(file(run_mode))
            // Add local config (ignored by git)
            .add_source(file("local"))
            // Add environment variables with prefix "PRICE_AVERAGE"
            .add_source(Environment::with_prefix("PRICE_AVERAGE").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate database configuration
        if !self.database.url.starts_with("sqlite:") {
            return Err(ConfigError::Message("Database url must be a sqlite: url".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        // Validate scraper configuration
        if self.scraper.max_concurrent_checks == 0 {
            return Err(ConfigError::Message("Scraper max_concurrent_checks must be greater than 0".into()));
        }

        if self.scraper.request_timeout == 0 {
            return Err(ConfigError::Message("Scraper request_timeout must be greater than 0".into()));
        }

        if self.scraper.batch_deadline == Some(0) {
            return Err(ConfigError::Message("Scraper batch_deadline must be greater than 0 when set".into()));
        }

        if self.scraper.user_agent.trim().is_empty() {
            return Err(ConfigError::Message("Scraper user_agent must not be empty".into()));
        }

        Ok(())
    }
}
