// src/config.rs
pub use leiriposti_shared::config::*;

use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "leiriposti.toml";

/// Load `path`, or the default file when `path` is `None`. Only the implicit default may be
/// missing, in which case built-in defaults apply.
pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH),
        None => {
            tracing::info!("No {} found, using default configuration", DEFAULT_CONFIG_PATH);
            Ok(Config::default())
        }
    }
}
