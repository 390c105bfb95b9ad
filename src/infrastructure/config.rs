use crate::domain::error::PhishError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_enable_emoji")]
    pub enable_emoji: bool,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: Logging,
}

/// Remote scoring service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ask the service to run its heavier transformer model as well.
    #[serde(default)]
    pub use_bert: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    pub http_proxy: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// 0 disables the background sweep; expired entries are still dropped on lookup.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Upper bound on how long a burst of arrivals can keep postponing a flush.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrchestratorConfig {
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_high_risk_threshold")]
    pub high_risk_threshold: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_enable")]
    pub enable: bool,
    pub path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Logging {
    #[serde(default = "default_enable")]
    pub enable: bool,
    pub path: Option<String>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_emoji: true,
            service: ServiceConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            scheduler: SchedulerConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            history: HistoryConfig::default(),
            logging: Logging::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            use_bert: false,
            user_agent: default_user_agent(),
            http_proxy: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_delay_ms: default_batch_delay_ms(),
            max_batch_size: default_max_batch_size(),
            cooldown_ms: default_cooldown_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            high_risk_threshold: default_high_risk_threshold(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enable: true,
            path: None,
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            enable: true,
            path: None,
            level: "WARN".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl SchedulerConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl OrchestratorConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

// Defaults
fn default_enable_emoji() -> bool {
    true
}
fn default_endpoint() -> String {
    "http://127.0.0.1:5000".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    concat!("phishguard/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_window_secs() -> u64 {
    60
}
fn default_max_requests() -> usize {
    10
}
fn default_batch_delay_ms() -> u64 {
    3000
}
fn default_max_batch_size() -> usize {
    3
}
fn default_cooldown_ms() -> u64 {
    2000
}
fn default_max_wait_ms() -> u64 {
    15000
}
fn default_retry_delay_secs() -> u64 {
    10
}
fn default_high_risk_threshold() -> f64 {
    0.9
}
fn default_enable() -> bool {
    true
}
fn default_log_level() -> String {
    "WARN".to_string()
}

pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("phishguard").join("config.toml"))
}

/// Get history database path (config override, else the config directory)
pub fn get_history_path(config: &Config) -> PathBuf {
    if let Some(path) = config.history.path.as_deref().filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    // ~/.config/phishguard/history.db (Linux)
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("phishguard")
        .join("history.db")
}

pub fn parse_config(content: &str) -> Result<Config, PhishError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), PhishError> {
    if config.scheduler.max_batch_size == 0 {
        return Err(PhishError::Config(
            "scheduler.max_batch_size must be at least 1".to_string(),
        ));
    }
    if config.rate_limit.max_requests == 0 {
        return Err(PhishError::Config(
            "rate_limit.max_requests must be at least 1".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.orchestrator.high_risk_threshold) {
        return Err(PhishError::Config(
            "orchestrator.high_risk_threshold must lie in [0, 1]".to_string(),
        ));
    }
    Ok(())
}

pub fn load_config() -> Result<Config, PhishError> {
    let config_path = get_config_path();

    if let Some(path) = config_path {
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            match parse_config(&content) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    eprintln!(
                        "Warning: Failed to parse config file: {}. Using defaults.",
                        e
                    );
                }
            }
        }
    }

    Ok(Config::default())
}

pub fn generate_config_sample() -> Result<(), PhishError> {
    let config_path = get_config_path();

    if let Some(path) = config_path {
        if path.exists() {
            eprintln!("Config file already exists at: {}", path.display());
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let sample = Config::default();
        let toml_content = toml::to_string_pretty(&sample)
            .map_err(|e| PhishError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(&path, toml_content)
            .map_err(|e| PhishError::Config(format!("Failed to write config file: {}", e)))?;
        println!("Generated config file at: {}", path.display());
    } else {
        return Err(PhishError::Config(
            "Cannot determine config directory".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.scheduler.batch_delay(), Duration::from_secs(3));
        assert_eq!(config.scheduler.max_batch_size, 3);
        assert_eq!(config.scheduler.cooldown(), Duration::from_secs(2));
        assert_eq!(config.orchestrator.retry_delay(), Duration::from_secs(10));
        assert_eq!(config.orchestrator.high_risk_threshold, 0.9);
        assert_eq!(config.logging.level, "WARN");
        assert!(!config.service.use_bert);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_content = r#"
enable_emoji = false

[service]
endpoint = "http://scoring.internal:8080"
use_bert = true

[scheduler]
max_batch_size = 5

[logging]
level = "DEBUG"
"#;
        let config = parse_config(toml_content).unwrap();
        assert!(!config.enable_emoji);
        assert_eq!(config.service.endpoint, "http://scoring.internal:8080");
        assert!(config.service.use_bert);
        assert_eq!(config.service.timeout_secs, 10);
        assert_eq!(config.scheduler.max_batch_size, 5);
        assert_eq!(config.scheduler.batch_delay_ms, 3000);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.logging.level, "DEBUG");
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let err = parse_config("[scheduler]\nmax_batch_size = 0\n").unwrap_err();
        assert!(matches!(err, PhishError::Config(_)));
    }

    #[test]
    fn test_sweep_can_be_disabled() {
        let config = parse_config("[cache]\nsweep_interval_secs = 0\n").unwrap();
        assert!(config.cache.sweep_interval().is_none());
    }

    #[test]
    fn test_sample_round_trips() {
        let sample = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed = parse_config(&sample).unwrap();
        assert_eq!(parsed.service.endpoint, "http://127.0.0.1:5000");
        assert_eq!(parsed.scheduler.max_wait_ms, 15000);
    }

    #[test]
    fn test_history_path_override() {
        let mut config = Config::default();
        config.history.path = Some("/tmp/phishguard-test.db".to_string());
        assert_eq!(
            get_history_path(&config),
            PathBuf::from("/tmp/phishguard-test.db")
        );
    }
}
