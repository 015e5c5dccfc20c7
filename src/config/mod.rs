//! Configuration for the `serial-line` tool.
//!
//! Settings come from a TOML file, overridden by environment variables.
//!
//! # Configuration Resolution
//!
//! 1. `SERIAL_LINE_CONFIG` environment variable (explicit path)
//! 2. `./serial-line.toml` (current directory)
//! 3. `config.toml` in the platform config directory
//!    (`~/.config/serial-line/` on Linux)
//! 4. Built-in defaults (no file required)
//!
//! # Example file
//!
//! ```toml
//! [serial]
//! default_baud = 9600
//! default_timeout_ms = 500
//! chunk_size = 64
//!
//! [serial.port_aliases]
//! arduino = "/dev/ttyACM0"
//!
//! [logging]
//! level = "debug"
//! format = "compact"
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig};
