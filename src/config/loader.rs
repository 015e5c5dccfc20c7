//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use crate::port::BaudRate;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_LINE";

/// Config file name looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "serial-line.toml";

/// Config file name inside the platform config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_LINE_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIAL_LINE_CONFIG` environment variable (explicit path)
    /// 2. `./serial-line.toml`
    /// 3. `config.toml` in the platform config directory
    /// 4. Built-in defaults
    ///
    /// Environment variables override values from any of these.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();
        let config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };
        Self::finish(config_path, config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let config = load_from_file(&path)?;
        Self::finish(Some(path), config)
    }

    /// Built-in defaults plus environment overrides, no file.
    pub fn with_defaults() -> ConfigResult<Self> {
        Self::finish(None, Config::default())
    }

    fn finish(config_path: Option<PathBuf>, mut config: Config) -> ConfigResult<Self> {
        apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        config.validate()?;
        debug!("Loaded configuration from {:?}", config_path);
        Ok(Self {
            config_path,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    default_config_path().filter(|path| path.exists())
}

/// Where a user-level config file lives on this platform.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "serial-line")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Apply `SERIAL_LINE_<SECTION>_<KEY>` overrides.
///
/// - `SERIAL_LINE_SERIAL_BAUD`
/// - `SERIAL_LINE_SERIAL_TIMEOUT_MS` (`none` disables the timeout)
/// - `SERIAL_LINE_SERIAL_CHUNK_SIZE`
/// - `SERIAL_LINE_LOG_LEVEL`
fn apply_overrides<F>(config: &mut Config, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| format!("{}_{}", ENV_PREFIX, suffix);

    let name = var("SERIAL_BAUD");
    if let Some(val) = lookup(&name) {
        let raw: u32 = val
            .parse()
            .map_err(|_| ConfigError::env_parse(&name, "not a number"))?;
        config.serial.default_baud = BaudRate::try_from(raw)
            .map_err(|e| ConfigError::env_parse(&name, e.to_string()))?;
    }

    let name = var("SERIAL_TIMEOUT_MS");
    if let Some(val) = lookup(&name) {
        config.serial.default_timeout_ms = if val.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(
                val.parse()
                    .map_err(|_| ConfigError::env_parse(&name, "not a number of milliseconds"))?,
            )
        };
    }

    let name = var("SERIAL_CHUNK_SIZE");
    if let Some(val) = lookup(&name) {
        config.serial.chunk_size = val
            .parse()
            .map_err(|_| ConfigError::env_parse(&name, "not a number"))?;
    }

    if let Some(val) = lookup(&var("LOG_LEVEL")) {
        config.logging.level = val;
    }

    Ok(())
}
