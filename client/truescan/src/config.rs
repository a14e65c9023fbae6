use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::backoff::Backoff;
use crate::error::ConfigError;
use crate::poller::{EarlyAccept, PollerConfig};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: Url,
    pub bundle_id: String,
    pub apphud_id: String,
    pub connect_timeout: Duration,
    pub premium: bool,
    pub poller: PollerConfig,
}

impl ClientConfig {
    pub fn for_url(api_url: Url) -> Self {
        let bundle_id = DEFAULT_BUNDLE_ID.to_string();
        Self {
            api_url,
            apphud_id: format!("debug-{bundle_id}"),
            bundle_id,
            connect_timeout: Duration::from_secs(15),
            premium: false,
            poller: PollerConfig::default(),
        }
    }
}

const DEFAULT_API_URL: &str = "http://localhost:8090";
const DEFAULT_BUNDLE_ID: &str = "dev.truescan";
const MAX_SECS: f64 = 86_400.0;

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub bundle_id: Option<String>,
    pub apphud_id: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub premium: Option<bool>,
    pub poll_max_duration_secs: Option<f64>,
    pub poll_max_server_errors: Option<u32>,
    pub reverse_cold_start_server_errors: Option<u32>,
    pub analysis_min_interval_secs: Option<f64>,
    pub reverse_min_interval_secs: Option<f64>,
    pub analysis_backoff_start_secs: Option<f64>,
    pub analysis_backoff_factor: Option<f64>,
    pub analysis_backoff_max_secs: Option<f64>,
    pub reverse_backoff_start_secs: Option<f64>,
    pub reverse_backoff_factor: Option<f64>,
    pub reverse_backoff_max_secs: Option<f64>,
    pub early_accept_min_matches: Option<usize>,
}

pub fn resolve_config_path() -> PathBuf {
    if let Ok(path) = env::var("TRUESCAN_CONFIG_PATH") {
        return PathBuf::from(path);
    }

    let repo_path = PathBuf::from("client/truescan/config.toml");
    if repo_path.exists() {
        return repo_path;
    }

    PathBuf::from("truescan.toml")
}

// Loads the config file (if any) and applies environment overrides; env wins.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    let path = resolve_config_path();
    let file_config = read_file_config(&path)?;
    build_config(file_config, |key| env::var(key).ok())
}

pub fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str::<FileConfig>(&content)?)
}

pub fn build_config(
    file: FileConfig,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig, ConfigError> {
    let string = |key: &str, fallback: Option<String>| env_lookup(key).or(fallback);

    let raw_url = string("TRUESCAN_API_URL", file.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let api_url = Url::parse(&raw_url).map_err(|err| ConfigError::InvalidUrl {
        url: raw_url.clone(),
        reason: err.to_string(),
    })?;
    if api_url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl {
            url: raw_url,
            reason: "not a base url".to_string(),
        });
    }

    let bundle_id = string("TRUESCAN_BUNDLE_ID", file.bundle_id.clone())
        .unwrap_or_else(|| DEFAULT_BUNDLE_ID.to_string());
    let apphud_id = string("TRUESCAN_APPHUD_ID", file.apphud_id.clone())
        .unwrap_or_else(|| format!("debug-{bundle_id}"));
    let connect_timeout_secs = lookup(&env_lookup, "TRUESCAN_CONNECT_TIMEOUT_SECS")
        .or(file.connect_timeout_secs)
        .unwrap_or(15);
    let premium = env_lookup("TRUESCAN_PREMIUM")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .or(file.premium)
        .unwrap_or(false);

    let defaults = PollerConfig::default();
    let secs = |key: &str, fallback: Option<f64>, default: Duration| {
        lookup::<f64>(&env_lookup, key)
            .or(fallback)
            .filter(|value| value.is_finite() && (0.0..MAX_SECS).contains(value))
            .map(Duration::from_secs_f64)
            .unwrap_or(default)
    };
    let factor = |key: &str, fallback: Option<f64>, default: f64| {
        lookup::<f64>(&env_lookup, key)
            .or(fallback)
            .filter(|value| value.is_finite() && *value > 0.0)
            .unwrap_or(default)
    };

    let poller = PollerConfig {
        max_duration: secs(
            "POLL_MAX_DURATION_SECS",
            file.poll_max_duration_secs,
            defaults.max_duration,
        ),
        max_server_errors: lookup(&env_lookup, "POLL_MAX_SERVER_ERRORS")
            .or(file.poll_max_server_errors)
            .unwrap_or(defaults.max_server_errors),
        reverse_cold_start_server_errors: lookup(&env_lookup, "REVERSE_COLD_START_SERVER_ERRORS")
            .or(file.reverse_cold_start_server_errors)
            .unwrap_or(defaults.reverse_cold_start_server_errors),
        analysis_min_interval: secs(
            "ANALYSIS_MIN_INTERVAL_SECS",
            file.analysis_min_interval_secs,
            defaults.analysis_min_interval,
        ),
        reverse_min_interval: secs(
            "REVERSE_MIN_INTERVAL_SECS",
            file.reverse_min_interval_secs,
            defaults.reverse_min_interval,
        ),
        analysis_backoff: BackoffConfig {
            start: secs(
                "ANALYSIS_BACKOFF_START_SECS",
                file.analysis_backoff_start_secs,
                defaults.analysis_backoff.start,
            ),
            factor: factor(
                "ANALYSIS_BACKOFF_FACTOR",
                file.analysis_backoff_factor,
                defaults.analysis_backoff.factor,
            ),
            max_delay: secs(
                "ANALYSIS_BACKOFF_MAX_SECS",
                file.analysis_backoff_max_secs,
                defaults.analysis_backoff.max_delay,
            ),
            ..defaults.analysis_backoff
        },
        reverse_backoff: BackoffConfig {
            start: secs(
                "REVERSE_BACKOFF_START_SECS",
                file.reverse_backoff_start_secs,
                defaults.reverse_backoff.start,
            ),
            factor: factor(
                "REVERSE_BACKOFF_FACTOR",
                file.reverse_backoff_factor,
                defaults.reverse_backoff.factor,
            ),
            max_delay: secs(
                "REVERSE_BACKOFF_MAX_SECS",
                file.reverse_backoff_max_secs,
                defaults.reverse_backoff.max_delay,
            ),
            ..defaults.reverse_backoff
        },
        early_accept: EarlyAccept {
            min_engine_matches: lookup(&env_lookup, "EARLY_ACCEPT_MIN_MATCHES")
                .or(file.early_accept_min_matches)
                .unwrap_or(defaults.early_accept.min_engine_matches),
        },
        ..defaults
    };

    Ok(ClientConfig {
        api_url,
        bundle_id,
        apphud_id,
        connect_timeout: Duration::from_secs(connect_timeout_secs),
        premium,
        poller,
    })
}

fn lookup<T: FromStr>(env_lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env_lookup(key).and_then(|value| value.trim().parse::<T>().ok())
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub start: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub jitter_min: f64,
    pub jitter_max: f64,
}

impl BackoffConfig {
    pub fn build(&self) -> Backoff {
        Backoff::new(
            self.start,
            self.factor,
            self.max_delay,
            self.jitter_min..=self.jitter_max,
        )
    }
}
