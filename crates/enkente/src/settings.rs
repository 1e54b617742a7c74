//! Layered application configuration.
//!
//! Built-in defaults, then the TOML config file, then `ENKENTE__SECTION__KEY`
//! environment variables. Command-line flags are applied on top by the binary.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchConfig;
use crate::tailer::DEFAULT_POLL_INTERVAL;

pub const APP_NAME: &str = "enkente";

/// Prefix of environment overrides, e.g. `ENKENTE__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "ENKENTE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub tail: TailConfig,
    pub dispatch: DispatchConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Milliseconds between modification-time checks.
    pub poll_interval_ms: u64,
}

impl TailConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persist every handled message.
    pub enabled: bool,
    /// Store location. Defaults to the XDG data directory.
    pub data_dir: Option<String>,
}

/// Load configuration from `path` (optional) and the environment.
pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    Config::builder()
        .set_default("logging.level", "info")?
        .add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

/// Render the default configuration as a commented TOML document.
pub fn default_toml(path: &Path) -> Result<String, toml::ser::Error> {
    let mut body = String::new();
    body.push_str("# Configuration for ");
    body.push_str(APP_NAME);
    body.push('\n');
    body.push_str("# File: ");
    body.push_str(&path.display().to_string());
    body.push_str("\n\n");
    body.push_str(&toml::to_string_pretty(&AppConfig::default())?);
    Ok(body)
}
