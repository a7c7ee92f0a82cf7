use crate::error::ConfigError;
use dotenv::{from_filename, from_filename_iter};
use notify::Watcher;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_ENV_FILE: &str = "vars.env";

#[derive(Debug, Clone)]
pub struct Config {
    pub binance_base_url: String,
    pub quote_asset: String,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
    pub pump_telegram_token: Option<String>,
    pub pump_telegram_chat_id: Option<i64>,
    pub change_threshold_percent: f64,
    pub pump_threshold_ratio: f64,
    pub pump_window_minutes: u64,
    pub detection_interval_seconds: u64,
    pub digest_interval_seconds: u64,
    pub debug_interval_seconds: u64,
    pub log_dir: String,
    pub log_file: String,
    pub event_log_folder: String,
}

impl Config {
    /// Loads configuration from the env file, then the process environment.
    pub fn load(env_file: &str) -> Self {
        let _ = from_filename(env_file);
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup. Absent or unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // Percent in the env file, ratio in memory: 5 means +5%.
        let pump_threshold_percent = parse_or(&lookup, "PUMP_THRESHOLD_PERCENT", 5.0_f64);

        Config {
            binance_base_url: text("BINANCE_BASE_URL", "https://api.binance.com/api/v3"),
            quote_asset: text("QUOTE_ASSET", "USDT"),
            telegram_token: optional("TELEGRAM_TOKEN"),
            telegram_chat_id: optional("TELEGRAM_CHAT_ID").and_then(|v| v.parse().ok()),
            pump_telegram_token: optional("PUMP_TELEGRAM_TOKEN"),
            pump_telegram_chat_id: optional("PUMP_TELEGRAM_CHAT_ID").and_then(|v| v.parse().ok()),
            change_threshold_percent: parse_or(&lookup, "CHANGE_THRESHOLD_PERCENT", 20.0),
            pump_threshold_ratio: pump_threshold_percent / 100.0,
            pump_window_minutes: parse_or(&lookup, "PUMP_WINDOW_MINUTES", 30),
            detection_interval_seconds: parse_or(&lookup, "DETECTION_INTERVAL_SECONDS", 5),
            digest_interval_seconds: parse_or(&lookup, "DIGEST_INTERVAL_SECONDS", 60),
            debug_interval_seconds: parse_or(&lookup, "DEBUG_INTERVAL_SECONDS", 2),
            log_dir: text("LOG_DIR", "log"),
            log_file: text("LOG_FILE", "pump_watch.log"),
            event_log_folder: text("EVENT_LOG_FOLDER", "logs/pumps"),
        }
    }

    pub fn pump_window(&self) -> Duration {
        Duration::from_secs(self.pump_window_minutes.saturating_mul(60))
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Point-in-time copy of the tunables, read once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub change_threshold_percent: f64,
    pub pump_threshold_ratio: f64,
    pub pump_window: Duration,
}

/// Tunables shared between the polling loop and whatever mutates them.
/// Each value sits behind its own lock.
#[derive(Debug)]
pub struct ThresholdConfig {
    change_threshold_percent: RwLock<f64>,
    pump_threshold_ratio: RwLock<f64>,
    pump_window: RwLock<Duration>,
}

impl ThresholdConfig {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            change_threshold_percent: RwLock::new(thresholds.change_threshold_percent),
            pump_threshold_ratio: RwLock::new(thresholds.pump_threshold_ratio),
            pump_window: RwLock::new(thresholds.pump_window),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Thresholds {
            change_threshold_percent: config.change_threshold_percent,
            pump_threshold_ratio: config.pump_threshold_ratio,
            pump_window: config.pump_window(),
        })
    }

    pub fn change_threshold_percent(&self) -> f64 {
        *self.change_threshold_percent.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pump_threshold_ratio(&self) -> f64 {
        *self.pump_threshold_ratio.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pump_window(&self) -> Duration {
        *self.pump_window.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_change_threshold_percent(&self, percent: f64) -> Result<(), ConfigError> {
        check_non_negative("CHANGE_THRESHOLD_PERCENT", percent)?;
        *self.change_threshold_percent.write().unwrap_or_else(PoisonError::into_inner) = percent;
        Ok(())
    }

    pub fn set_pump_threshold_ratio(&self, ratio: f64) -> Result<(), ConfigError> {
        check_non_negative("PUMP_THRESHOLD_PERCENT", ratio)?;
        *self.pump_threshold_ratio.write().unwrap_or_else(PoisonError::into_inner) = ratio;
        Ok(())
    }

    pub fn set_pump_window(&self, window: Duration) {
        *self.pump_window.write().unwrap_or_else(PoisonError::into_inner) = window;
    }

    pub fn current(&self) -> Thresholds {
        Thresholds {
            change_threshold_percent: self.change_threshold_percent(),
            pump_threshold_ratio: self.pump_threshold_ratio(),
            pump_window: self.pump_window(),
        }
    }

    /// Applies the tunables of a freshly loaded config. Values are validated
    /// first so a bad file leaves everything untouched.
    pub fn apply(&self, config: &Config) -> Result<Thresholds, ConfigError> {
        check_non_negative("CHANGE_THRESHOLD_PERCENT", config.change_threshold_percent)?;
        check_non_negative("PUMP_THRESHOLD_PERCENT", config.pump_threshold_ratio)?;
        self.set_change_threshold_percent(config.change_threshold_percent)?;
        self.set_pump_threshold_ratio(config.pump_threshold_ratio)?;
        self.set_pump_window(config.pump_window());
        Ok(self.current())
    }
}

fn check_non_negative(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid { key, value: value.to_string() })
    }
}

/// Validates a timer period coming from configuration.
pub fn non_zero_period(key: &'static str, seconds: u64) -> Result<Duration, ConfigError> {
    if seconds == 0 {
        return Err(ConfigError::Invalid { key, value: seconds.to_string() });
    }
    Ok(Duration::from_secs(seconds))
}

/// Re-reads the env file and pushes its tunables into `thresholds`.
/// Keys missing from the file fall back to the process environment.
pub fn reload_thresholds(path: &Path, thresholds: &ThresholdConfig) -> Result<Thresholds, ConfigError> {
    let file_values: HashMap<String, String> = from_filename_iter(path)
        .map_err(|e| ConfigError::Invalid {
            key: "env file",
            value: format!("{}: {}", path.display(), e),
        })?
        .filter_map(Result::ok)
        .collect();
    let config = Config::from_lookup(|key| file_values.get(key).cloned().or_else(|| env::var(key).ok()));
    thresholds.apply(&config)
}

/// Spawns a file watcher that monitors the env file and reloads the thresholds.
pub fn watch_config(path: impl Into<PathBuf>, thresholds: Arc<ThresholdConfig>) -> Result<(), ConfigError> {
    let config_file = path.into();
    let (tx, rx) = std::sync::mpsc::channel();

    let mut watcher = notify::RecommendedWatcher::new(tx, notify::Config::default())?;
    watcher.watch(&config_file, notify::RecursiveMode::NonRecursive)?;

    std::thread::spawn(move || {
        // Keeps the watcher alive for as long as the thread runs.
        let _watcher = watcher;
        while let Ok(event) = rx.recv() {
            match event {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match reload_thresholds(&config_file, &thresholds) {
                        Ok(current) => info!("Configuration reloaded: {:?}", current),
                        Err(e) => warn!("Configuration reload rejected: {}", e),
                    }
                    // Throttle rapid events.
                    std::thread::sleep(Duration::from_millis(200));
                }
                Ok(_) => {}
                Err(e) => warn!("Config watch error: {:?}", e),
            }
        }
    });

    Ok(())
}
