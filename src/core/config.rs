use crate::core::aggregate::AggregatorOptions;
use crate::core::position::TimestampFallback;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_BINANCE_URL: &str = "https://api.binance.com";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BinanceProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub binance: Option<BinanceProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            binance: Some(BinanceProviderConfig {
                base_url: DEFAULT_BINANCE_URL.to_string(),
            }),
        }
    }
}

fn default_quote_currency() -> String {
    "USDT".to_string()
}

fn default_interval() -> String {
    "1m".to_string()
}

fn default_max_concurrency() -> usize {
    16
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Path of the `timestamp;amount;currency` positions file.
    pub input: Option<String>,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    /// Kline interval used for historical prices.
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default)]
    pub timestamp_fallback: TimestampFallback,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            input: None,
            quote_currency: default_quote_currency(),
            interval: default_interval(),
            timestamp_fallback: TimestampFallback::default(),
            max_concurrency: default_max_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the config from the default path, or the built-in defaults when
    /// no config file has been written there yet.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_or_default(&config_path)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            debug!(path = %path.as_ref().display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "coinpnl", "coinpnl")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn binance_url(&self) -> &str {
        self.providers
            .binance
            .as_ref()
            .map_or(DEFAULT_BINANCE_URL, |p| &p.base_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn aggregator_options(&self) -> AggregatorOptions {
        AggregatorOptions {
            quote_currency: self.quote_currency.to_uppercase(),
            max_concurrency: self.max_concurrency,
            request_timeout: self.request_timeout(),
        }
    }
}
