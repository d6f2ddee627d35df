//! Configuration management
//!
//! Settings come from the process environment. Non-secret settings may also
//! be placed in a TOML file (named by `REPOST_CONFIG`, or
//! `~/.config/repostbot/config.toml` if present); environment variables
//! always win over the file. API tokens are only read from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::poster::RetryPolicy;
use crate::scheduling::RotationMode;
use crate::selector::SelectionFilter;

pub const ENV_CONFIG_PATH: &str = "REPOST_CONFIG";
pub const ENV_CONSUMER_KEY: &str = "X_CONSUMER_KEY";
pub const ENV_CONSUMER_SECRET: &str = "X_CONSUMER_SECRET";
pub const ENV_ACCESS_TOKEN: &str = "X_ACCESS_TOKEN";
pub const ENV_ACCESS_SECRET: &str = "X_ACCESS_SECRET";
pub const ENV_BEARER_TOKEN: &str = "X_BEARER_TOKEN";
pub const ENV_SOURCES: &str = "SOURCE_USERNAMES";
pub const ENV_QUOTA: &str = "REPOST_QUOTA";
pub const ENV_FETCH_LIMIT: &str = "MAX_TWEETS_TO_FETCH";
pub const ENV_HISTORY_FILE: &str = "HISTORY_FILE";
pub const ENV_CURSOR_FILE: &str = "SINCE_FILE";
pub const ENV_ROTATION_SLOTS: &str = "ROTATION_SLOTS";
pub const ENV_REQUIRE_MEDIA: &str = "REQUIRE_MEDIA";
pub const ENV_INCLUDE_REPOSTS: &str = "INCLUDE_REPOSTS";
pub const ENV_STARTUP_JITTER: &str = "STARTUP_JITTER";
pub const ENV_MAX_RETRIES: &str = "MAX_RETRIES";
pub const ENV_RATE_LIMIT_MAX_WAIT: &str = "RATE_LIMIT_MAX_WAIT";
pub const ENV_REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
pub const ENV_API_BASE_URL: &str = "X_API_BASE_URL";

pub const DEFAULT_API_BASE_URL: &str = "https://api.twitter.com";
pub const DEFAULT_HISTORY_FILE: &str = "posted_history.json";
const DEFAULT_QUOTA: usize = 1;
const DEFAULT_FETCH_LIMIT: usize = 10;
const DEFAULT_STARTUP_JITTER: Duration = Duration::from_secs(8);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_HANDLE_LEN: usize = 15;

/// Fully resolved runtime configuration
#[derive(Debug)]
pub struct Config {
    pub credentials: Credentials,
    /// Source account handles, without `@`, in configured order
    pub sources: Vec<String>,
    /// Maximum reposts per run
    pub quota: usize,
    /// Posts requested per source account
    pub fetch_limit: usize,
    pub history_file: PathBuf,
    pub cursor_file: Option<PathBuf>,
    pub rotation: RotationMode,
    pub filter: SelectionFilter,
    pub startup_jitter: Duration,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub api_base_url: String,
}

/// API keys. Never read from the config file.
///
/// The first four are the OAuth 1.0a consumer keys of the X app and the
/// access token pair of the bot account.
#[derive(Debug)]
pub struct Credentials {
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
    pub access_token: SecretString,
    pub access_secret: SecretString,
    /// App-only token used for read endpoints when present
    pub bearer_token: Option<SecretString>,
}

/// Optional settings file. Every field may be overridden from the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub sources: Option<Vec<String>>,
    pub quota: Option<usize>,
    pub fetch_limit: Option<usize>,
    pub history_file: Option<String>,
    pub cursor_file: Option<String>,
    pub rotation_slots: Option<u32>,
    pub require_media: Option<bool>,
    pub include_reposts: Option<bool>,
    pub startup_jitter: Option<String>,
    pub max_retries: Option<u32>,
    pub rate_limit_max_wait: Option<String>,
    pub request_timeout: Option<String>,
    pub api_base_url: Option<String>,
}

impl FileConfig {
    /// Load a settings file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: FileConfig = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }
}

impl Config {
    /// Load configuration from the settings file (if any) and the environment
    pub fn load() -> Result<Self> {
        let file = match resolve_config_path()? {
            Some(path) => {
                tracing::debug!("Loading settings from {}", path.display());
                FileConfig::load_from_path(&path)?
            }
            None => FileConfig::default(),
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Build configuration from a settings file and an environment lookup.
    ///
    /// Empty environment values count as unset.
    pub fn from_sources<F>(file: FileConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let required = |key: &str| {
            env(key)
                .map(SecretString::from)
                .ok_or_else(|| ConfigError::MissingField(key.to_string()))
        };
        let credentials = Credentials {
            consumer_key: required(ENV_CONSUMER_KEY)?,
            consumer_secret: required(ENV_CONSUMER_SECRET)?,
            access_token: required(ENV_ACCESS_TOKEN)?,
            access_secret: required(ENV_ACCESS_SECRET)?,
            bearer_token: env(ENV_BEARER_TOKEN).map(SecretString::from),
        };

        let sources = match env(ENV_SOURCES) {
            Some(raw) => parse_handles(raw.split(','))?,
            None => parse_handles(file.sources.iter().flatten().map(String::as_str))?,
        };
        if sources.is_empty() {
            return Err(ConfigError::MissingField(ENV_SOURCES.to_string()).into());
        }

        let quota = match env(ENV_QUOTA) {
            Some(v) => parse_number(ENV_QUOTA, &v)?,
            None => file.quota.unwrap_or(DEFAULT_QUOTA),
        };

        let fetch_limit = match env(ENV_FETCH_LIMIT) {
            Some(v) => parse_number(ENV_FETCH_LIMIT, &v)?,
            None => file.fetch_limit.unwrap_or(DEFAULT_FETCH_LIMIT),
        };
        if fetch_limit == 0 {
            return Err(invalid(ENV_FETCH_LIMIT, "must be at least 1").into());
        }

        let history_file = env(ENV_HISTORY_FILE)
            .or(file.history_file)
            .unwrap_or_else(|| DEFAULT_HISTORY_FILE.to_string());
        let cursor_file = env(ENV_CURSOR_FILE).or(file.cursor_file);

        let rotation_slots = match env(ENV_ROTATION_SLOTS) {
            Some(v) => parse_number(ENV_ROTATION_SLOTS, &v)?,
            None => file.rotation_slots.unwrap_or(0),
        };

        let filter = SelectionFilter {
            require_media: match env(ENV_REQUIRE_MEDIA) {
                Some(v) => parse_bool(ENV_REQUIRE_MEDIA, &v)?,
                None => file.require_media.unwrap_or(false),
            },
            include_reposts: match env(ENV_INCLUDE_REPOSTS) {
                Some(v) => parse_bool(ENV_INCLUDE_REPOSTS, &v)?,
                None => file.include_reposts.unwrap_or(false),
            },
        };

        let startup_jitter = duration_setting(
            ENV_STARTUP_JITTER,
            env(ENV_STARTUP_JITTER).or(file.startup_jitter),
            DEFAULT_STARTUP_JITTER,
        )?;
        let request_timeout = duration_setting(
            ENV_REQUEST_TIMEOUT,
            env(ENV_REQUEST_TIMEOUT).or(file.request_timeout),
            DEFAULT_REQUEST_TIMEOUT,
        )?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: match env(ENV_MAX_RETRIES) {
                Some(v) => parse_number(ENV_MAX_RETRIES, &v)?,
                None => file.max_retries.unwrap_or(defaults.max_retries),
            },
            max_rate_limit_wait: duration_setting(
                ENV_RATE_LIMIT_MAX_WAIT,
                env(ENV_RATE_LIMIT_MAX_WAIT).or(file.rate_limit_max_wait),
                defaults.max_rate_limit_wait,
            )?,
            ..defaults
        };

        let api_base_url = env(ENV_API_BASE_URL)
            .or(file.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(invalid(ENV_API_BASE_URL, "must start with http:// or https://").into());
        }

        Ok(Self {
            credentials,
            sources,
            quota,
            fetch_limit,
            history_file: expand_path(&history_file),
            cursor_file: cursor_file.as_deref().map(expand_path),
            rotation: RotationMode::from_slots(rotation_slots),
            filter,
            startup_jitter,
            retry,
            request_timeout,
            api_base_url,
        })
    }
}

/// Resolve the settings file path.
///
/// `REPOST_CONFIG` must point at an existing file when set; otherwise the
/// XDG config location is used only if the file is there.
pub fn resolve_config_path() -> Result<Option<PathBuf>> {
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        if !path.trim().is_empty() {
            let path = expand_path(&path);
            if !path.exists() {
                return Err(invalid(
                    ENV_CONFIG_PATH,
                    &format!("{} does not exist", path.display()),
                )
                .into());
            }
            return Ok(Some(path));
        }
    }

    let default_path = dirs::config_dir().map(|dir| dir.join("repostbot").join("config.toml"));
    Ok(default_path.filter(|p| p.exists()))
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Normalize handles: trim, strip a leading `@`, drop blanks and repeats.
fn parse_handles<'a, I>(raw: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut handles: Vec<String> = Vec::new();
    for item in raw {
        let handle = item.trim().trim_start_matches('@');
        if handle.is_empty() {
            continue;
        }
        let valid = handle.len() <= MAX_HANDLE_LEN
            && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(invalid(ENV_SOURCES, &format!("'{}' is not a valid account handle", handle)).into());
        }
        if !handles.iter().any(|h| h.eq_ignore_ascii_case(handle)) {
            handles.push(handle.to_string());
        }
    }
    Ok(handles)
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        invalid(
            field,
            &format!("expected a non-negative integer, got '{}'", value),
        )
        .into()
    })
}

fn parse_bool(field: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(field, &format!("expected true or false, got '{}'", value)).into()),
    }
}

/// Accepts humantime strings ("8s", "15m") or a bare number of seconds
fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value)
        .map_err(|e| invalid(field, &format!("could not parse duration '{}': {}", value, e)).into())
}

fn duration_setting(field: &str, value: Option<String>, default: Duration) -> Result<Duration> {
    match value {
        Some(v) => parse_duration(field, &v),
        None => Ok(default),
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}
