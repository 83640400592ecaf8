//! Configuration loading.
//!
//! Reads `~/.safesearch/config.toml`. Every section has defaults, so an
//! empty or missing file is valid. Environment variables override file
//! values: env > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use crate::alert::confirmation::MAX_EXPIRY_SECS;
use crate::contacts::DEFAULT_CONTACTS_KEY;
use crate::dispatch::MIN_INTER_SEND_DELAY_MS;
use crate::location::geocoder::DEFAULT_NOMINATIM_URL;
use crate::location::LocationOptions;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Location acquisition settings.
    #[serde(default)]
    pub location: LocationConfig,

    /// Dispatch pacing.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Contact persistence.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Reverse geocoding.
    #[serde(default)]
    pub geocoder: GeocoderConfig,

    /// SMS gateway.
    #[serde(default)]
    pub sms: SmsConfig,

    /// Recording upload target.
    #[serde(default)]
    pub upload: UploadConfig,

    /// Pending confirmation lifetime.
    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Fixed position used when no device positioning is available.
    #[serde(default)]
    pub position: Option<PositionConfig>,
}

/// Location acquisition settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    /// Request a GPS-grade fix.
    #[serde(default = "default_true")]
    pub high_accuracy: bool,

    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_location_timeout_ms")]
    pub timeout_ms: u64,

    /// Oldest acceptable cached fix in milliseconds.
    #[serde(default = "default_maximum_age_ms")]
    pub maximum_age_ms: u64,

    /// Total attempts.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: default_location_timeout_ms(),
            maximum_age_ms: default_maximum_age_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl LocationConfig {
    /// Acquisition options for this configuration.
    pub fn options(&self) -> LocationOptions {
        LocationOptions {
            enable_high_accuracy: self.high_accuracy,
            timeout_ms: self.timeout_ms,
            maximum_age_ms: self.maximum_age_ms,
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
        }
    }
}

/// Dispatch pacing.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Pause between consecutive sends, in milliseconds (minimum 500).
    #[serde(default = "default_inter_send_delay_ms")]
    pub inter_send_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            inter_send_delay_ms: default_inter_send_delay_ms(),
        }
    }
}

/// Contact persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path. Defaults to `~/.safesearch/safesearch.db`.
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Key under which the contact collection is stored.
    #[serde(default = "default_contacts_key")]
    pub contacts_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: None,
            contacts_key: default_contacts_key(),
        }
    }
}

/// Reverse geocoding.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderConfig {
    /// Whether to resolve addresses at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Nominatim-compatible base URL.
    #[serde(default = "default_geocoder_url")]
    pub base_url: String,

    /// User-Agent sent to the geocoder.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_geocoder_url(),
            user_agent: default_user_agent(),
        }
    }
}

/// SMS gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmsConfig {
    /// Gateway endpoint. Without one, sends are dry runs.
    #[serde(default)]
    pub gateway_url: Option<String>,

    /// Environment variable holding the gateway bearer token.
    #[serde(default)]
    pub token_env: Option<String>,
}

/// Recording upload target.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadConfig {
    /// Storage base URL. Without one, audio alerts are unavailable.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the upload bearer token.
    #[serde(default)]
    pub token_env: Option<String>,
}

/// Pending confirmation lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    /// Seconds a prepared alert stays confirmable.
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: i64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            expiry_secs: default_expiry_secs(),
        }
    }
}

/// Fixed position.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionConfig {
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
    /// Accuracy in meters.
    #[serde(default)]
    pub accuracy: f64,
}

// Default value functions for serde

fn default_true() -> bool {
    true
}
fn default_location_timeout_ms() -> u64 {
    30_000
}
fn default_maximum_age_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    2_000
}
fn default_inter_send_delay_ms() -> u64 {
    MIN_INTER_SEND_DELAY_MS
}
fn default_contacts_key() -> String {
    DEFAULT_CONTACTS_KEY.to_owned()
}
fn default_geocoder_url() -> String {
    DEFAULT_NOMINATIM_URL.to_owned()
}
fn default_user_agent() -> String {
    concat!("safesearch/", env!("CARGO_PKG_VERSION")).to_owned()
}
fn default_expiry_secs() -> i64 {
    300
}

impl Config {
    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids unsafe `set_var` in tests).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("SAFESEARCH_SMS_GATEWAY_URL") {
            self.sms.gateway_url = Some(v);
        }
        if let Some(v) = env("SAFESEARCH_UPLOAD_URL") {
            self.upload.base_url = Some(v);
        }
        if let Some(v) = env("SAFESEARCH_DATABASE") {
            self.storage.database = Some(PathBuf::from(v));
        }
        if let Some(v) = env("SAFESEARCH_GEOCODER_URL") {
            self.geocoder.base_url = v;
        }
        if let Some(v) = env("SAFESEARCH_INTER_SEND_DELAY_MS") {
            match v.parse() {
                Ok(n) => self.dispatch.inter_send_delay_ms = n,
                Err(_) => warn!(
                    var = "SAFESEARCH_INTER_SEND_DELAY_MS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    /// Reject values that cannot be used as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if `confirmation.expiry_secs` is not within
    /// `1..=86400`.
    pub fn validate(&self) -> anyhow::Result<()> {
        let expiry = self.confirmation.expiry_secs;
        anyhow::ensure!(
            (1..=MAX_EXPIRY_SECS).contains(&expiry),
            "confirmation.expiry_secs must be between 1 and {MAX_EXPIRY_SECS}, got {expiry}"
        );
        Ok(())
    }

    /// Resolve a token through the named environment variable.
    pub fn token_from(
        token_env: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        token_env.and_then(env).filter(|t| !t.is_empty())
    }
}

/// Load the config from a TOML file. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed or
/// validated.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("failed to parse config at {}", path.display()))?;
            config
                .validate()
                .with_context(|| format!("invalid config at {}", path.display()))?;
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(anyhow::anyhow!(
            "failed to read config at {}: {e}",
            path.display()
        )),
    }
}

/// Resolve the default config directory (`~/.safesearch/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".safesearch"))
}

/// Load `config.toml` from the default directory and apply env overrides.
///
/// # Errors
///
/// Returns an error if the home directory cannot be found or the file is
/// malformed.
pub fn load_default_config() -> anyhow::Result<Config> {
    let mut config = load_config(&config_dir()?.join("config.toml"))?;
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}
