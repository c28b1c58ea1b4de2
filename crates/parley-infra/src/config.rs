//! Broker configuration loader for Parley.
//!
//! Reads `config.toml` from the data directory (`~/.parley/` by default)
//! and deserializes it into [`BrokerConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use parley_types::config::BrokerConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PARLEY_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `PARLEY_DATA_DIR` environment variable
/// 2. `~/.parley`
/// 3. `./.parley`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".parley");
    }

    PathBuf::from(".parley")
}

/// Load broker configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`BrokerConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and
///   returns the default.
/// - A zero `inbound_capacity` is raised to one.
pub async fn load_broker_config(data_dir: &Path) -> BrokerConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return BrokerConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return BrokerConfig::default();
        }
    };

    match toml::from_str::<BrokerConfig>(&content) {
        Ok(mut config) => {
            if config.inbound_capacity == 0 {
                tracing::warn!("inbound_capacity = 0 in {}, using 1", config_path.display());
                config.inbound_capacity = config.effective_capacity();
            }
            config
        }
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            BrokerConfig::default()
        }
    }
}
