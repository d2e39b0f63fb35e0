// =============================================================================
// Runtime Configuration — JSON file + environment overrides
// =============================================================================
//
// Every tunable of the dashboard service lives here: which assets to poll,
// how often, provider credentials and limits, cache lifetime, and the
// indicator parameters.
//
// Load order: JSON file (every field carries a serde default, so a missing or
// partial file is fine) then environment variables. Persistence uses an
// atomic tmp + rename pattern to prevent corruption on crash.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::AnalysisParams;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_coins() -> Vec<String> {
    vec!["bitcoin".to_string(), "ethereum".to_string()]
}

fn default_equities() -> Vec<String> {
    vec!["SPY".to_string(), "^GSPC".to_string()]
}

fn default_update_interval_ms() -> u64 {
    600_000
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_chart_days() -> u32 {
    1
}

fn default_coingecko_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    10_000
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_cache_ttl_secs() -> u64 {
    900
}

fn default_stale_retention_secs() -> u64 {
    86_400
}

/// Calls per window allowed on the public CoinGecko tier.
pub const FREE_TIER_RATE_LIMIT: u32 = 8;
/// Calls per window allowed with an API key.
pub const KEYED_RATE_LIMIT: u32 = 30;

// =============================================================================
// CoinGeckoConfig
// =============================================================================

/// CoinGecko credentials and request budget.
#[derive(Clone, Serialize, Deserialize)]
pub struct CoinGeckoConfig {
    /// Optional pro API key. Never written back to disk.
    #[serde(default, skip_serializing)]
    pub api_key: String,

    #[serde(default = "default_coingecko_base_url")]
    pub base_url: String,

    /// Requests allowed per `rate_limit_window_secs`. `None` derives the value
    /// from whether an API key is present.
    #[serde(default)]
    pub rate_limit: Option<u32>,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Retries after an HTTP 429 before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial back-off when the server gives no `Retry-After`.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl CoinGeckoConfig {
    pub fn effective_rate_limit(&self) -> u32 {
        self.rate_limit.unwrap_or(if self.api_key.is_empty() {
            FREE_TIER_RATE_LIMIT
        } else {
            KEYED_RATE_LIMIT
        })
    }
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_coingecko_base_url(),
            rate_limit: None,
            rate_limit_window_secs: default_rate_limit_window_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for CoinGeckoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinGeckoConfig")
            .field("api_key", &if self.api_key.is_empty() { "<none>" } else { "<redacted>" })
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.effective_rate_limit())
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

// =============================================================================
// CacheConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of a cached provider response.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// How long an expired response is kept as a fallback for failed fetches.
    #[serde(default = "default_stale_retention_secs")]
    pub stale_retention_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            stale_retention_secs: default_stale_retention_secs(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the dashboard service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// CoinGecko coin ids to track.
    #[serde(default = "default_coins")]
    pub coins: Vec<String>,

    /// Yahoo Finance symbols to track.
    #[serde(default = "default_equities")]
    pub equities: Vec<String>,

    /// Base delay between dashboard refreshes.
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// History window requested from `/market_chart`.
    #[serde(default = "default_chart_days")]
    pub chart_days: u32,

    #[serde(default)]
    pub coingecko: CoinGeckoConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub analysis: AnalysisParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            coins: default_coins(),
            equities: default_equities(),
            update_interval_ms: default_update_interval_ms(),
            bind_addr: default_bind_addr(),
            chart_days: default_chart_days(),
            coingecko: CoinGeckoConfig::default(),
            cache: CacheConfig::default(),
            analysis: AnalysisParams::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            coins = ?config.coins,
            equities = ?config.equities,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Load `path`, or write the defaults there when no file exists yet so
    /// operators have a template to edit. Call before any environment
    /// overrides are applied.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        let config = Self::default();
        config.save(path)?;
        info!(path = %path.display(), "no runtime config found, wrote defaults");
        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename). The API key is not written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are ignored
    /// with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(list) = lookup("PULSE_COINS") {
            self.coins = split_list(&list, false);
        }
        if let Some(list) = lookup("PULSE_EQUITIES") {
            self.equities = split_list(&list, true);
        }
        if let Some(raw) = lookup("UPDATE_INTERVAL_MS") {
            match raw.trim().parse() {
                Ok(ms) => self.update_interval_ms = ms,
                Err(_) => warn!(value = %raw, "ignoring invalid UPDATE_INTERVAL_MS"),
            }
        }
        if let Some(raw) = lookup("PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) => {
                    let host = self
                        .bind_addr
                        .rsplit_once(':')
                        .map(|(host, _)| host.to_string())
                        .unwrap_or_else(|| "0.0.0.0".to_string());
                    self.bind_addr = format!("{host}:{port}");
                }
                Err(_) => warn!(value = %raw, "ignoring invalid PORT"),
            }
        }
        if let Some(key) = lookup("COINGECKO_API_KEY") {
            self.coingecko.api_key = key.trim().to_string();
        }
        if let Some(raw) = lookup("CACHE_TTL") {
            match raw.trim().parse() {
                Ok(secs) => self.cache.ttl_secs = secs,
                Err(_) => warn!(value = %raw, "ignoring invalid CACHE_TTL"),
            }
        }
    }
}

fn split_list(raw: &str, uppercase: bool) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| if uppercase { s.to_uppercase() } else { s.to_lowercase() })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.coins, vec!["bitcoin", "ethereum"]);
        assert_eq!(cfg.equities, vec!["SPY", "^GSPC"]);
        assert_eq!(cfg.update_interval_ms, 600_000);
        assert_eq!(cfg.bind_addr, "0.0.0.0:3000");
        assert_eq!(cfg.cache.ttl_secs, 900);
        assert_eq!(cfg.coingecko.max_retries, 2);
        assert_eq!(cfg.coingecko.retry_delay_ms, 10_000);
        assert_eq!(cfg.analysis.sma_period, 50);
        assert_eq!(cfg.analysis.swing_left_bars, 3);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.coins.len(), 2);
        assert_eq!(cfg.coingecko.base_url, "https://api.coingecko.com/api/v3");
        assert_eq!(cfg.analysis, AnalysisParams::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "coins": ["solana"], "analysis": { "rsi_period": 7 } }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.coins, vec!["solana"]);
        assert_eq!(cfg.analysis.rsi_period, 7);
        assert_eq!(cfg.analysis.macd_slow, 26);
        assert_eq!(cfg.update_interval_ms, 600_000);
    }

    #[test]
    fn rate_limit_depends_on_api_key() {
        let mut cg = CoinGeckoConfig::default();
        assert_eq!(cg.effective_rate_limit(), FREE_TIER_RATE_LIMIT);
        cg.api_key = "abc".into();
        assert_eq!(cg.effective_rate_limit(), KEYED_RATE_LIMIT);
        cg.rate_limit = Some(3);
        assert_eq!(cg.effective_rate_limit(), 3);
    }

    #[test]
    fn api_key_is_not_serialised() {
        let mut cfg = RuntimeConfig::default();
        cfg.coingecko.api_key = "secret-key".into();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("secret-key"));
        assert!(!format!("{:?}", cfg.coingecko).contains("secret-key"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = RuntimeConfig::default();
        cfg.apply_overrides(env(&[
            ("PULSE_COINS", "Bitcoin, solana,,"),
            ("PULSE_EQUITIES", "qqq"),
            ("UPDATE_INTERVAL_MS", "60000"),
            ("PORT", "8080"),
            ("COINGECKO_API_KEY", " key "),
            ("CACHE_TTL", "120"),
        ]));
        assert_eq!(cfg.coins, vec!["bitcoin", "solana"]);
        assert_eq!(cfg.equities, vec!["QQQ"]);
        assert_eq!(cfg.update_interval_ms, 60_000);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.coingecko.api_key, "key");
        assert_eq!(cfg.cache.ttl_secs, 120);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut cfg = RuntimeConfig::default();
        cfg.apply_overrides(env(&[("UPDATE_INTERVAL_MS", "soon"), ("PORT", "99999")]));
        assert_eq!(cfg.update_interval_ms, 600_000);
        assert_eq!(cfg.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = std::env::temp_dir().join(format!("market_pulse_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("market_pulse.json");

        let mut cfg = RuntimeConfig::default();
        cfg.coins = vec!["dogecoin".into()];
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.coins, vec!["dogecoin"]);
        assert_eq!(loaded.analysis, cfg.analysis);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_or_init_writes_defaults_once() {
        let dir = std::env::temp_dir().join(format!("market_pulse_init_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("market_pulse.json");

        let created = RuntimeConfig::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.bind_addr, "0.0.0.0:3000");

        let mut edited = created.clone();
        edited.coins = vec!["solana".into()];
        edited.save(&path).unwrap();

        let reloaded = RuntimeConfig::load_or_init(&path).unwrap();
        assert_eq!(reloaded.coins, vec!["solana"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn env_overrides_never_reach_the_file() {
        let dir = std::env::temp_dir().join(format!("market_pulse_env_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("market_pulse.json");

        let mut cfg = RuntimeConfig::load_or_init(&path).unwrap();
        cfg.apply_overrides(env(&[("PORT", "8080"), ("PULSE_COINS", "dogecoin")]));
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");

        let on_disk = RuntimeConfig::load_or_init(&path).unwrap();
        assert_eq!(on_disk.bind_addr, "0.0.0.0:3000");
        assert_eq!(on_disk.coins, vec!["bitcoin", "ethereum"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(RuntimeConfig::load("/definitely/not/here.json").is_err());
    }
}
