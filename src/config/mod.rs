use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::features::extractor::DEFAULT_VELOCITY_WINDOW_DAYS;
use crate::model::{PriceBounds, DEFAULT_MAX_RATIO, DEFAULT_MIN_RATIO};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub pricing: PricingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Lower bound of the adjustment ratio (0.8 = -20% of base price)
    pub min_ratio: f64,
    /// Upper bound of the adjustment ratio (1.2 = +20% of base price)
    pub max_ratio: f64,
    /// Trailing window for sales velocity
    pub velocity_window_days: i32,
}

impl PricingConfig {
    pub fn bounds(&self) -> Result<PriceBounds> {
        PriceBounds::new(self.min_ratio, self.max_ratio)
            .context("Invalid PRICE_MIN_RATIO / PRICE_MAX_RATIO combination")
    }
}

fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {} value", key))
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file - this sets env vars that aren't already set
        dotenv::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL environment variable is required but not set")?;

        let config = Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_or("DB_MAX_CONNECTIONS", "5")?,
                min_connections: env_or("DB_MIN_CONNECTIONS", "1")?,
            },
            pricing: PricingConfig {
                min_ratio: env_or("PRICE_MIN_RATIO", &DEFAULT_MIN_RATIO.to_string())?,
                max_ratio: env_or("PRICE_MAX_RATIO", &DEFAULT_MAX_RATIO.to_string())?,
                velocity_window_days: env_or(
                    "SALES_VELOCITY_WINDOW_DAYS",
                    &DEFAULT_VELOCITY_WINDOW_DAYS.to_string(),
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pricing.bounds()?;
        if self.pricing.velocity_window_days <= 0 {
            bail!(
                "SALES_VELOCITY_WINDOW_DAYS must be positive, got {}",
                self.pricing.velocity_window_days
            );
        }
        if self.database.min_connections > self.database.max_connections {
            bail!(
                "DB_MIN_CONNECTIONS ({}) exceeds DB_MAX_CONNECTIONS ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/pulse".to_string(),
                max_connections: 5,
                min_connections: 1,
            },
            pricing: PricingConfig {
                min_ratio: DEFAULT_MIN_RATIO,
                max_ratio: DEFAULT_MAX_RATIO,
                velocity_window_days: DEFAULT_VELOCITY_WINDOW_DAYS,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pricing.min_ratio, 0.8);
        assert_eq!(config.pricing.max_ratio, 1.2);
        assert_eq!(config.pricing.velocity_window_days, 30);
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut config = Config::default();
        config.pricing.min_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_window_rejected() {
        let mut config = Config::default();
        config.pricing.velocity_window_days = 0;
        assert!(config.validate().is_err());
    }
}
