use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors raised while loading or validating a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("unsupported configuration format {0:?}; use yaml, json or toml")]
    UnsupportedFormat(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Settings for talking to the auction backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL for REST calls; request paths are appended to it.
    pub api_base_url: Url,

    /// Base URL the event streams are opened against.
    pub stream_base_url: Url,

    /// Sent as `Accept-Language` on every request.
    pub language: String,

    /// Safety margin subtracted from the credential expiry.
    pub expiry_skew_secs: u64,

    /// Page size used for paginated history loads.
    pub page_size: u32,

    /// Where the session is persisted; falls back to [`Config::default_session_path`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_file: Option<PathBuf>,

    pub logging: LoggingConfig,
}

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

impl Default for Config {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Config {
    pub const ENV_API_BASE_URL: &'static str = "GAVEL_API_BASE_URL";
    pub const ENV_STREAM_BASE_URL: &'static str = "GAVEL_STREAM_BASE_URL";
    pub const ENV_LANGUAGE: &'static str = "GAVEL_LANGUAGE";
    pub const ENV_EXPIRY_SKEW_SECS: &'static str = "GAVEL_EXPIRY_SKEW_SECS";
    pub const ENV_PAGE_SIZE: &'static str = "GAVEL_PAGE_SIZE";
    pub const ENV_LOG_LEVEL: &'static str = "GAVEL_LOG_LEVEL";

    /// Generates a default configuration pointing at a local backend.
    #[must_use]
    pub fn with_defaults() -> Self {
        let base = Url::parse(DEFAULT_API_BASE_URL).unwrap_or_else(|_| unreachable!());
        Self {
            api_base_url: base.clone(),
            stream_base_url: base,
            language: "en".to_string(),
            expiry_skew_secs: 60,
            page_size: 15,
            session_file: None,
            logging: LoggingConfig::default(),
        }
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file cannot be read or parsed, when an
    /// environment override is malformed, or when validation fails.
    pub fn load_config(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_config_with(config_path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load_config`] with an explicit environment lookup.
    ///
    /// # Errors
    /// See [`Config::load_config`].
    pub fn load_config_with<F>(config_path: Option<PathBuf>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => Self::with_defaults(),
        };

        config.apply_env_overrides(lookup)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Parses a configuration file, picking the format from its extension.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for unreadable files, unknown extensions or
    /// malformed content.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => serde_yml::from_str(&content).map_err(|err| ConfigError::Parse {
                format: "yaml",
                message: err.to_string(),
            }),
            Some("json") => serde_json::from_str(&content).map_err(|err| ConfigError::Parse {
                format: "json",
                message: err.to_string(),
            }),
            Some("toml") => toml::from_str(&content).map_err(|err| ConfigError::Parse {
                format: "toml",
                message: err.to_string(),
            }),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(Self::ENV_API_BASE_URL) {
            self.api_base_url = parse_url(Self::ENV_API_BASE_URL, &value)?;
        }
        if let Some(value) = lookup(Self::ENV_STREAM_BASE_URL) {
            self.stream_base_url = parse_url(Self::ENV_STREAM_BASE_URL, &value)?;
        }
        if let Some(value) = lookup(Self::ENV_LANGUAGE) {
            self.language = value;
        }
        if let Some(value) = lookup(Self::ENV_EXPIRY_SKEW_SECS) {
            self.expiry_skew_secs =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: Self::ENV_EXPIRY_SKEW_SECS,
                        message: format!("expected a number of seconds, got {value:?}"),
                    })?;
        }
        if let Some(value) = lookup(Self::ENV_PAGE_SIZE) {
            self.page_size = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: Self::ENV_PAGE_SIZE,
                    message: format!("expected a positive integer, got {value:?}"),
                })?;
        }
        if let Some(value) = lookup(Self::ENV_LOG_LEVEL) {
            self.logging.level = value;
        }
        Ok(())
    }

    /// Validates the configuration, collecting every problem found.
    ///
    /// # Errors
    /// Returns one message per invalid field.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (name, url) in [
            ("api_base_url", &self.api_base_url),
            ("stream_base_url", &self.stream_base_url),
        ] {
            if !matches!(url.scheme(), "http" | "https") {
                errors.push(format!("{name} must use http or https, got {}", url.scheme()));
            }
        }

        if self.language.trim().is_empty() {
            errors.push("language must not be empty".to_string());
        }

        if self.page_size == 0 {
            errors.push("page_size must be greater than 0".to_string());
        }

        if self.logging.level.trim().is_empty() {
            errors.push("logging.level must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Resolves `path` (optionally with a query) against the REST base URL.
    #[must_use]
    pub fn api_url(&self, path: &str) -> Url {
        join(&self.api_base_url, path)
    }

    /// Resolves `path` against the stream base URL.
    #[must_use]
    pub fn stream_url(&self, path: &str) -> Url {
        join(&self.stream_base_url, path)
    }

    /// Session file in use: the configured override or the per-user default.
    #[must_use]
    pub fn session_path(&self) -> Option<PathBuf> {
        self.session_file
            .clone()
            .or_else(Self::default_session_path)
    }

    /// `session.json` under the platform config directory.
    #[must_use]
    pub fn default_session_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "gavel", "gavel")
            .map(|dirs| dirs.config_dir().join("session.json"))
    }
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|err| ConfigError::InvalidValue {
        key,
        message: err.to_string(),
    })
}

/// Appends `path` (optionally with a query) to `base` instead of replacing
/// the base's last segment the way [`Url::join`] does.
#[must_use]
pub fn join(base: &Url, path: &str) -> Url {
    let (path, query) = match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    };
    let mut joined = base.clone();
    joined.set_path(&format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    ));
    joined.set_query(query);
    joined
}
