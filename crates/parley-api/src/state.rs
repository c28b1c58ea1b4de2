//! Application state shared by CLI commands.
//!
//! Holds the resolved data directory and the broker configuration loaded
//! from it. Brokers themselves are created per command.

use std::path::PathBuf;

use parley_infra::config::{load_broker_config, resolve_data_dir};
use parley_types::config::BrokerConfig;

#[derive(Debug, Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: BrokerConfig,
}

impl AppState {
    /// Resolve the data directory (unless overridden) and load its config.
    pub async fn init(data_dir: Option<PathBuf>) -> Self {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        let config = load_broker_config(&data_dir).await;
        Self { data_dir, config }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::config::DeliveryMode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn init_reads_config_from_override_dir() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "delivery_mode = \"isolated\"")
            .await
            .unwrap();

        let state = AppState::init(Some(tmp.path().to_path_buf())).await;
        assert_eq!(state.data_dir, tmp.path());
        assert_eq!(state.config.delivery_mode, DeliveryMode::Isolated);
    }
}
