use crate::Result;
use crate::logging::*;
use anyhow::anyhow;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// TOML configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub quote_api: QuoteApiConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub drilldown: DrilldownConfig,
    #[serde(default)]
    pub widgets: WidgetsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct QuoteApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: String,
    #[serde(default = "default_refresh_interval")]
    pub interval: String,
    #[serde(default = "default_selection_debounce")]
    pub selection_debounce: String,
    #[serde(default = "default_price_history_days")]
    pub price_history_days: u32,
}

#[derive(Debug, Deserialize)]
pub struct DrilldownConfig {
    #[serde(default = "default_drilldown_lookback_days")]
    pub lookback_days: u32,
}

#[derive(Debug, Deserialize)]
pub struct WidgetsConfig {
    #[serde(default = "default_sparkline_interval")]
    pub sparkline_interval: String,
    #[serde(default = "default_sparkline_points")]
    pub sparkline_points: usize,
    #[serde(default = "default_gauge_interval")]
    pub gauge_interval: String,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_rust_log_format")]
    pub rust_log_format: String,
}

// Default values
fn default_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}
fn default_timeout() -> String {
    "10s".to_string()
}
fn default_cache_ttl() -> String {
    "5m".to_string()
}
fn default_refresh_interval() -> String {
    "60s".to_string()
}
fn default_selection_debounce() -> String {
    "500ms".to_string()
}
fn default_price_history_days() -> u32 {
    365
}
fn default_drilldown_lookback_days() -> u32 {
    90
}
fn default_sparkline_interval() -> String {
    "1s".to_string()
}
fn default_sparkline_points() -> usize {
    30
}
fn default_gauge_interval() -> String {
    "3s".to_string()
}
fn default_rust_log_format() -> String {
    "term".to_string()
}

impl Default for QuoteApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_timeout(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            interval: default_refresh_interval(),
            selection_debounce: default_selection_debounce(),
            price_history_days: default_price_history_days(),
        }
    }
}

impl Default for DrilldownConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_drilldown_lookback_days(),
        }
    }
}

impl Default for WidgetsConfig {
    fn default() -> Self {
        Self {
            sparkline_interval: default_sparkline_interval(),
            sparkline_points: default_sparkline_points(),
            gauge_interval: default_gauge_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            rust_log_format: default_rust_log_format(),
        }
    }
}

static CONFIG: Lazy<Config> = Lazy::new(|| {
    load_config().unwrap_or_else(|e| {
        eprintln!(
            "Warning: Failed to load config files: {}. Using defaults.",
            e
        );
        Config::default()
    })
});

static CONFIG_STORE: Lazy<Arc<Mutex<HashMap<String, String>>>> =
    Lazy::new(|| Arc::new(Mutex::new(HashMap::new())));

pub fn get(name: &str) -> Result<String> {
    // Priority 1: CONFIG_STORE (runtime overrides)
    if let Some(value) = get_from_store(name) {
        if value.is_empty() {
            return Err(anyhow!("{} is empty", name));
        }
        return Ok(value);
    }

    // Priority 2: Environment variables
    if let Ok(val) = std::env::var(name)
        && !val.is_empty()
    {
        return Ok(val);
    }

    // Priority 3: TOML config
    let toml_value = match name {
        "QUOTE_API_BASE_URL" => Some(CONFIG.quote_api.base_url.clone()),
        "QUOTE_API_TIMEOUT" => Some(CONFIG.quote_api.timeout.clone()),
        "QUOTE_CACHE_TTL" => Some(CONFIG.refresh.cache_ttl.clone()),
        "REFRESH_INTERVAL" => Some(CONFIG.refresh.interval.clone()),
        "SELECTION_DEBOUNCE" => Some(CONFIG.refresh.selection_debounce.clone()),
        "PRICE_HISTORY_DAYS" => Some(CONFIG.refresh.price_history_days.to_string()),
        "DRILLDOWN_LOOKBACK_DAYS" => Some(CONFIG.drilldown.lookback_days.to_string()),
        "SPARKLINE_INTERVAL" => Some(CONFIG.widgets.sparkline_interval.clone()),
        "SPARKLINE_POINTS" => Some(CONFIG.widgets.sparkline_points.to_string()),
        "GAUGE_INTERVAL" => Some(CONFIG.widgets.gauge_interval.clone()),
        "RUST_LOG_FORMAT" => Some(CONFIG.logging.rust_log_format.clone()),
        _ => None,
    };

    if let Some(value) = toml_value
        && !value.is_empty()
    {
        return Ok(value);
    }

    Err(anyhow!("Configuration key not found: {}", name))
}

/// テスト用: 設定値を上書きする
#[doc(hidden)]
pub fn set(name: &str, value: &str) {
    if let Ok(mut store) = CONFIG_STORE.lock() {
        store.insert(name.to_string(), value.to_string());
    }
}

/// テスト用: 設定値を CONFIG_STORE から削除する
#[doc(hidden)]
pub fn remove(name: &str) {
    if let Ok(mut store) = CONFIG_STORE.lock() {
        store.remove(name);
    }
}

/// テスト用: CONFIG_STORE に値をセットし、Drop 時に自動で元に戻す RAII ガード。
#[doc(hidden)]
pub struct ConfigGuard {
    key: String,
    previous: Option<String>,
}

impl ConfigGuard {
    pub fn new(key: &str, value: &str) -> Self {
        let previous = get_from_store(key);
        set(key, value);
        Self {
            key: key.to_string(),
            previous,
        }
    }
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(prev) => set(&self.key, prev),
            None => remove(&self.key),
        }
    }
}

fn get_from_store(name: &str) -> Option<String> {
    if let Ok(store) = CONFIG_STORE.lock() {
        store.get(name).cloned()
    } else {
        None
    }
}

/// Load configuration from TOML files with priority:
/// 1. config/config.local.toml (git-ignored, for local overrides)
/// 2. config/config.toml (git-managed template)
/// 3. Default values
fn load_config() -> Result<Config> {
    let mut config = Config::default();

    let base_path = "config/config.toml";
    if Path::new(base_path).exists() {
        let content = fs::read_to_string(base_path)?;
        config = toml::from_str(&content)?;
    }

    let local_path = "config/config.local.toml";
    if Path::new(local_path).exists() {
        let content = fs::read_to_string(local_path)?;
        let local_config: Config = toml::from_str(&content)?;
        merge_config(&mut config, local_config);
    }

    Ok(config)
}

/// Merge local config into base config (local values override base values)
fn merge_config(base: &mut Config, local: Config) {
    // Quote API
    if local.quote_api.base_url != default_base_url() {
        base.quote_api.base_url = local.quote_api.base_url;
    }
    if local.quote_api.timeout != default_timeout() {
        base.quote_api.timeout = local.quote_api.timeout;
    }

    // Refresh
    if local.refresh.cache_ttl != default_cache_ttl() {
        base.refresh.cache_ttl = local.refresh.cache_ttl;
    }
    if local.refresh.interval != default_refresh_interval() {
        base.refresh.interval = local.refresh.interval;
    }
    if local.refresh.selection_debounce != default_selection_debounce() {
        base.refresh.selection_debounce = local.refresh.selection_debounce;
    }
    if local.refresh.price_history_days != default_price_history_days() {
        base.refresh.price_history_days = local.refresh.price_history_days;
    }

    // Drilldown
    if local.drilldown.lookback_days != default_drilldown_lookback_days() {
        base.drilldown.lookback_days = local.drilldown.lookback_days;
    }

    // Widgets
    if local.widgets.sparkline_interval != default_sparkline_interval() {
        base.widgets.sparkline_interval = local.widgets.sparkline_interval;
    }
    if local.widgets.sparkline_points != default_sparkline_points() {
        base.widgets.sparkline_points = local.widgets.sparkline_points;
    }
    if local.widgets.gauge_interval != default_gauge_interval() {
        base.widgets.gauge_interval = local.widgets.gauge_interval;
    }

    // Logging
    if local.logging.rust_log_format != default_rust_log_format() {
        base.logging.rust_log_format = local.logging.rust_log_format;
    }
}

/// ダッシュボード全体のタイミング・取得パラメータ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub refresh_interval: Duration,
    pub selection_debounce: Duration,
    pub price_history_days: u32,
    pub drilldown_lookback_days: u32,
    pub sparkline_interval: Duration,
    pub sparkline_points: usize,
    pub gauge_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(5 * 60),
            refresh_interval: Duration::from_secs(60),
            selection_debounce: Duration::from_millis(500),
            price_history_days: default_price_history_days(),
            drilldown_lookback_days: default_drilldown_lookback_days(),
            sparkline_interval: Duration::from_secs(1),
            sparkline_points: default_sparkline_points(),
            gauge_interval: Duration::from_secs(3),
        }
    }
}

impl Settings {
    /// 設定値を読み込む。解釈できない値は警告を出してデフォルトを使う。
    pub fn load() -> Self {
        let defaults = Settings::default();
        Self {
            base_url: get("QUOTE_API_BASE_URL").unwrap_or(defaults.base_url),
            request_timeout: get_duration("QUOTE_API_TIMEOUT", defaults.request_timeout),
            cache_ttl: get_duration("QUOTE_CACHE_TTL", defaults.cache_ttl),
            refresh_interval: get_duration("REFRESH_INTERVAL", defaults.refresh_interval),
            selection_debounce: get_duration("SELECTION_DEBOUNCE", defaults.selection_debounce),
            price_history_days: get_parsed("PRICE_HISTORY_DAYS", defaults.price_history_days),
            drilldown_lookback_days: get_parsed(
                "DRILLDOWN_LOOKBACK_DAYS",
                defaults.drilldown_lookback_days,
            ),
            sparkline_interval: get_duration("SPARKLINE_INTERVAL", defaults.sparkline_interval),
            sparkline_points: get_parsed("SPARKLINE_POINTS", defaults.sparkline_points),
            gauge_interval: get_duration("GAUGE_INTERVAL", defaults.gauge_interval),
        }
    }
}

fn get_duration(name: &str, default: Duration) -> Duration {
    let Ok(value) = get(name) else {
        return default;
    };
    match humantime::parse_duration(&value) {
        Ok(d) if !d.is_zero() => d,
        Ok(_) | Err(_) => {
            let log = DEFAULT.new(o!("function" => "config::get_duration"));
            warn!(log, "invalid duration, using default";
                "key" => name, "value" => &value, "default" => ?default);
            default
        }
    }
}

fn get_parsed<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Debug,
{
    let Ok(value) = get(name) else {
        return default;
    };
    value.parse().unwrap_or_else(|_| {
        let log = DEFAULT.new(o!("function" => "config::get_parsed"));
        warn!(log, "invalid value, using default";
            "key" => name, "value" => &value, "default" => ?default);
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_store_priority() {
        // CONFIG_STOREの値が最優先
        const TEST_KEY: &str = "REFRESH_INTERVAL";
        unsafe {
            std::env::set_var(TEST_KEY, "30s");
        }
        set(TEST_KEY, "15s");
        let result = get(TEST_KEY).unwrap();
        assert_eq!(result, "15s");

        // Cleanup
        remove(TEST_KEY);
        unsafe {
            std::env::remove_var(TEST_KEY);
        }
    }

    #[test]
    #[serial]
    fn test_env_overrides_toml() {
        const TEST_KEY: &str = "PRICE_HISTORY_DAYS";
        remove(TEST_KEY);
        unsafe {
            std::env::set_var(TEST_KEY, "30");
        }
        assert_eq!(get(TEST_KEY).unwrap(), "30");
        unsafe {
            std::env::remove_var(TEST_KEY);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        let keys_and_defaults = [
            ("QUOTE_CACHE_TTL", "5m"),
            ("REFRESH_INTERVAL", "60s"),
            ("SELECTION_DEBOUNCE", "500ms"),
            ("PRICE_HISTORY_DAYS", "365"),
            ("DRILLDOWN_LOOKBACK_DAYS", "90"),
            ("SPARKLINE_INTERVAL", "1s"),
            ("GAUGE_INTERVAL", "3s"),
        ];

        for (key, expected) in &keys_and_defaults {
            unsafe {
                std::env::remove_var(key);
            }
            remove(key);
            let result = get(key).unwrap();
            assert_eq!(result, *expected, "key={key}");
        }
    }

    #[test]
    #[serial]
    fn test_unknown_key() {
        assert!(get("NO_SUCH_KEY_ANYWHERE").is_err());
    }

    #[test]
    #[serial]
    fn test_empty_store_value_is_error() {
        let _guard = ConfigGuard::new("QUOTE_API_BASE_URL", "");
        assert!(get("QUOTE_API_BASE_URL").is_err());
    }

    #[test]
    #[serial]
    fn test_config_guard_restores() {
        {
            let _guard = ConfigGuard::new("SPARKLINE_POINTS", "5");
            assert_eq!(get("SPARKLINE_POINTS").unwrap(), "5");
        }
        assert!(get_from_store("SPARKLINE_POINTS").is_none());
    }

    #[test]
    #[serial]
    fn test_settings_default_timing() {
        let settings = Settings::load();
        assert_eq!(settings.cache_ttl, Duration::from_secs(300));
        assert_eq!(settings.refresh_interval, Duration::from_secs(60));
        assert_eq!(settings.selection_debounce, Duration::from_millis(500));
        assert_eq!(settings.sparkline_interval, Duration::from_secs(1));
        assert_eq!(settings.gauge_interval, Duration::from_secs(3));
    }

    #[test]
    #[serial]
    fn test_settings_overrides_and_fallbacks() {
        let _ttl = ConfigGuard::new("QUOTE_CACHE_TTL", "2m");
        let _bad = ConfigGuard::new("REFRESH_INTERVAL", "soon");
        let _zero = ConfigGuard::new("SELECTION_DEBOUNCE", "0s");
        let _days = ConfigGuard::new("PRICE_HISTORY_DAYS", "many");

        let settings = Settings::load();
        assert_eq!(settings.cache_ttl, Duration::from_secs(120));
        assert_eq!(settings.refresh_interval, Duration::from_secs(60));
        assert_eq!(settings.selection_debounce, Duration::from_millis(500));
        assert_eq!(settings.price_history_days, 365);
    }
}
