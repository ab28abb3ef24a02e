//! Runtime configuration.
//!
//! Every tunable is one row of [`SETTINGS`]: its dotted file key, the
//! `CLAIMFLOW_*` variables that may set it, and how to parse and render it.
//! Layers apply in order: defaults, config file, environment, then
//! programmatic [`ConfigOverrides`]. [`AppConfig::load_with_sources`] reports
//! which layer won for each key.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_FILES: [&str; 2] = ["claimflow.toml", "config/claimflow.toml"];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Pool acquire timeout and SQLite busy timeout.
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unsupported log format `{other}` (expected compact|pretty|json)")),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("unknown key `{key}` in config file `{path}`")]
    UnknownKey { path: PathBuf, key: String },
    #[error("invalid value for `{key}` in config file `{path}`: {reason}")]
    InvalidFileValue { path: PathBuf, key: String, reason: String },
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// One configurable key.
pub struct Setting {
    pub key: &'static str,
    /// Environment variables consulted in order; the first non-blank one wins.
    pub env: &'static [&'static str],
    apply: fn(&mut AppConfig, &str) -> Result<(), String>,
    render: fn(&AppConfig) -> String,
}

pub static SETTINGS: &[Setting] = &[
    Setting {
        key: "database.url",
        env: &["CLAIMFLOW_DATABASE_URL"],
        apply: |config, raw| {
            config.database.url = raw.trim().to_string();
            Ok(())
        },
        render: |config| config.database.url.clone(),
    },
    Setting {
        key: "database.max_connections",
        env: &["CLAIMFLOW_DATABASE_MAX_CONNECTIONS"],
        apply: |config, raw| {
            config.database.max_connections = number(raw)?;
            Ok(())
        },
        render: |config| config.database.max_connections.to_string(),
    },
    Setting {
        key: "database.timeout_secs",
        env: &["CLAIMFLOW_DATABASE_TIMEOUT_SECS"],
        apply: |config, raw| {
            config.database.timeout_secs = number(raw)?;
            Ok(())
        },
        render: |config| config.database.timeout_secs.to_string(),
    },
    Setting {
        key: "server.bind_address",
        env: &["CLAIMFLOW_SERVER_BIND_ADDRESS"],
        apply: |config, raw| {
            config.server.bind_address = raw.trim().to_string();
            Ok(())
        },
        render: |config| config.server.bind_address.clone(),
    },
    Setting {
        key: "server.port",
        env: &["CLAIMFLOW_SERVER_PORT"],
        apply: |config, raw| {
            config.server.port = number(raw)?;
            Ok(())
        },
        render: |config| config.server.port.to_string(),
    },
    Setting {
        key: "server.graceful_shutdown_secs",
        env: &["CLAIMFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        apply: |config, raw| {
            config.server.graceful_shutdown_secs = number(raw)?;
            Ok(())
        },
        render: |config| config.server.graceful_shutdown_secs.to_string(),
    },
    Setting {
        key: "logging.level",
        env: &["CLAIMFLOW_LOGGING_LEVEL", "CLAIMFLOW_LOG_LEVEL"],
        apply: |config, raw| {
            config.logging.level = raw.trim().to_ascii_lowercase();
            Ok(())
        },
        render: |config| config.logging.level.clone(),
    },
    Setting {
        key: "logging.format",
        env: &["CLAIMFLOW_LOGGING_FORMAT", "CLAIMFLOW_LOG_FORMAT"],
        apply: |config, raw| {
            config.logging.format = raw.parse()?;
            Ok(())
        },
        render: |config| config.logging.format.as_str().to_string(),
    },
];

fn number<T: FromStr>(raw: &str) -> Result<T, String> {
    raw.trim().parse().map_err(|_| format!("`{}` is not a valid number", raw.trim()))
}

fn setting_index(key: &str) -> Option<usize> {
    SETTINGS.iter().position(|setting| setting.key == key)
}

/// Where the effective value of a setting came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "from", rename_all = "snake_case")]
pub enum SettingSource {
    Default,
    File(PathBuf),
    Env(&'static str),
    Override,
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::File(path) => write!(f, "file ({})", path.display()),
            Self::Env(var) => write!(f, "env ({var})"),
            Self::Override => f.write_str("override"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedSetting {
    pub key: &'static str,
    pub value: String,
    pub source: SettingSource,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://claimflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        Self::load_with_sources(options).map(|(config, _)| config)
    }

    /// Loads and validates the configuration, returning one entry per
    /// [`SETTINGS`] row with its effective value and winning layer.
    pub fn load_with_sources(
        options: LoadOptions,
    ) -> Result<(Self, Vec<ResolvedSetting>), ConfigError> {
        let mut config = Self::default();
        let mut sources = vec![SettingSource::Default; SETTINGS.len()];

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => {
                for (key, raw) in read_file_values(&path)? {
                    let index = setting_index(&key).ok_or_else(|| ConfigError::UnknownKey {
                        path: path.clone(),
                        key: key.clone(),
                    })?;
                    (SETTINGS[index].apply)(&mut config, &raw).map_err(|reason| {
                        ConfigError::InvalidFileValue { path: path.clone(), key, reason }
                    })?;
                    sources[index] = SettingSource::File(path.clone());
                }
            }
            None if options.require_file => {
                let expected =
                    options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_FILES[0]));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        for (setting, source) in SETTINGS.iter().zip(sources.iter_mut()) {
            let Some((var, raw)) =
                setting.env.iter().find_map(|var| read_env(var).map(|raw| (*var, raw)))
            else {
                continue;
            };
            (setting.apply)(&mut config, &raw).map_err(|_| ConfigError::InvalidEnvOverride {
                key: var.to_string(),
                value: raw.clone(),
            })?;
            *source = SettingSource::Env(var);
        }

        for key in config.apply_overrides(options.overrides) {
            if let Some(index) = setting_index(key) {
                sources[index] = SettingSource::Override;
            }
        }

        config.validate()?;

        let resolved = SETTINGS
            .iter()
            .zip(sources)
            .map(|(setting, source)| ResolvedSetting {
                key: setting.key,
                value: (setting.render)(&config),
                source,
            })
            .collect();
        Ok((config, resolved))
    }

    /// Applies the set overrides and returns the keys they touched.
    fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Vec<&'static str> {
        let mut touched = Vec::new();
        if let Some(url) = overrides.database_url {
            self.database.url = url;
            touched.push("database.url");
        }
        if let Some(max_connections) = overrides.database_max_connections {
            self.database.max_connections = max_connections;
            touched.push("database.max_connections");
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level.trim().to_ascii_lowercase();
            touched.push("logging.level");
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
            touched.push("server.bind_address");
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
            touched.push("server.port");
        }
        touched
    }

    /// Checks every rule and reports all violations together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let url = self.database.url.trim();
        if !(url.starts_with("sqlite://") || url.starts_with("sqlite::")) {
            problems.push("database.url must be a sqlite URL (`sqlite://path` or `sqlite::memory:`)");
        }
        if self.database.max_connections == 0 {
            problems.push("database.max_connections must be greater than zero");
        }
        if !(1..=300).contains(&self.database.timeout_secs) {
            problems.push("database.timeout_secs must be in range 1..=300");
        }
        if self.server.bind_address.trim().is_empty() {
            problems.push("server.bind_address must not be empty");
        }
        if self.server.port == 0 {
            problems.push("server.port must be greater than zero");
        }
        if self.server.graceful_shutdown_secs == 0 {
            problems.push("server.graceful_shutdown_secs must be greater than zero");
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            problems.push("logging.level must be one of trace|debug|info|warn|error");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems.join("; ")))
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => DEFAULT_FILES.iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

/// Flattens `[section] name = value` into `("section.name", "value")` pairs.
fn read_file_values(path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let table = interpolate_env_vars(&raw)?
        .parse::<toml::Table>()
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })?;

    let mut values = Vec::new();
    for (section, body) in table {
        let toml::Value::Table(fields) = body else {
            return Err(ConfigError::UnknownKey { path: path.to_path_buf(), key: section });
        };
        for (name, value) in fields {
            let key = format!("{section}.{name}");
            let raw = match value {
                toml::Value::String(text) => text,
                toml::Value::Integer(number) => number.to_string(),
                other => {
                    return Err(ConfigError::InvalidFileValue {
                        path: path.to_path_buf(),
                        key,
                        reason: format!("expected a string or integer, found {}", other.type_str()),
                    })
                }
            };
            values.push((key, raw));
        }
    }
    Ok(values)
}

/// Replaces each `${VAR}` with the value of `VAR`; an unset variable is an error.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &after[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
