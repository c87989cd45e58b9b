use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::strategies::types::RiskProfile;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub default_risk_profile: RiskProfile,
    #[serde(default = "default_fallback_sigma")]
    pub fallback_sigma_f: f64,
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfrastructureConfig {
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,
    #[serde(default = "default_geocode_url")]
    pub geocode_url: String,
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_summary_cache_ttl")]
    pub summary_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_true")]
    pub model_enabled: bool,
    #[serde(default = "default_summary_model")]
    pub model: String,
    #[serde(default = "default_openai_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub csv_logging: bool,
    #[serde(default = "default_csv_log_path")]
    pub csv_log_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_database_path() -> String { "weather_edge.db".to_string() }
fn default_fallback_sigma() -> f64 { 4.5 }
fn default_upstream_timeout() -> u64 { 20 }
fn default_history_limit() -> usize { 120 }
fn default_gamma_url() -> String { "https://gamma-api.polymarket.com".to_string() }
fn default_geocode_url() -> String { "https://geocoding-api.open-meteo.com/v1/search".to_string() }
fn default_forecast_url() -> String { "https://api.open-meteo.com/v1/forecast".to_string() }
fn default_http_timeout() -> u64 { 10 }
fn default_summary_cache_ttl() -> u64 { 3600 }
fn default_true() -> bool { true }
fn default_summary_model() -> String { "gpt-4o-mini".to_string() }
fn default_openai_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_csv_log_path() -> String { "analyses.csv".to_string() }
fn default_log_level() -> String { "info".to_string() }

impl Default for SystemConfig {
    fn default() -> Self {
        Self { database_path: default_database_path() }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_risk_profile: RiskProfile::default(),
            fallback_sigma_f: default_fallback_sigma(),
            upstream_timeout_secs: default_upstream_timeout(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            gamma_url: default_gamma_url(),
            geocode_url: default_geocode_url(),
            forecast_url: default_forecast_url(),
            http_timeout_secs: default_http_timeout(),
            summary_cache_ttl_secs: default_summary_cache_ttl(),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            model_enabled: default_true(),
            model: default_summary_model(),
            base_url: default_openai_url(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            csv_logging: false,
            csv_log_path: default_csv_log_path(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

impl InfrastructureConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn summary_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.summary_cache_ttl_secs)
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub polymarket_gamma_url: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    /// Load `path` if it exists, otherwise run on defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides on top of the file values.
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(url) = &env.polymarket_gamma_url {
            self.infrastructure.gamma_url = url.clone();
        }
        if let Some(model) = &env.openai_model {
            self.summary.model = model.clone();
        }
    }

    fn validate(&self) -> Result<()> {
        let sigma = self.analysis.fallback_sigma_f;
        if sigma.is_nan() || sigma <= 0.0 {
            anyhow::bail!("analysis.fallback_sigma_f must be positive");
        }
        if self.analysis.upstream_timeout_secs == 0 || self.infrastructure.http_timeout_secs == 0 {
            anyhow::bail!("timeouts must be at least one second");
        }
        Ok(())
    }
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_model: non_empty_var("OPENAI_MODEL"),
            polymarket_gamma_url: non_empty_var("POLYMARKET_GAMMA_URL"),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
