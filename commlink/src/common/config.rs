/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::path::PathBuf;
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::common::{CommLinkError, Result};

/// Configuration for CommLink services and the socket broker.
///
/// Loaded from `$XDG_CONFIG_HOME/commlink/config.toml`; every field has a
/// default, so a partial file is valid.
///
/// ```toml
/// [timeouts]
/// retry_interval_ms = 200
///
/// [broker]
/// socket_path = "/run/user/1000/commlink/broker.sock"
///
/// [logging]
/// filter = "commlink=debug"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommLinkConfig {
    /// Timing configuration.
    pub timeouts: TimeoutConfig,
    /// Limits and capacities.
    pub limits: LimitsConfig,
    /// Socket broker location.
    pub broker: BrokerConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Timing configuration, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Pause between rounds of the hub's ping/quit broadcast.
    pub retry_interval_ms: u64,
    /// How long a socket transport waits for the broker to confirm a
    /// subscribe, unsubscribe or publish.
    pub broker_confirm_ms: u64,
}

/// Limits and capacity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent connections accepted by the socket broker.
    pub max_connections: usize,
    /// Largest frame, in bytes, either side of the socket broker will accept.
    pub max_frame_size: usize,
    /// Deliveries buffered per broker connection before new ones are dropped.
    pub subscription_buffer: usize,
}

/// Socket broker location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Override for the socket path.
    ///
    /// Defaults to `$XDG_RUNTIME_DIR/commlink/<app_name>/broker.sock`.
    pub socket_path: Option<PathBuf>,
    /// Name used to shard the default socket path.
    pub app_name: String,
    /// Socket file permissions (Unix only).
    pub mode: u32,
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    /// Directory for log files; stdout when unset.
    pub log_directory: Option<PathBuf>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 200,
            broker_confirm_ms: 5_000,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_frame_size: 1_048_576,
            subscription_buffer: 1_024,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            app_name: "default".to_string(),
            mode: 0o660,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            log_directory: None,
        }
    }
}

impl CommLinkConfig {
    /// Pause between hub broadcast rounds.
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.timeouts.retry_interval_ms)
    }

    /// Bound on broker confirmations.
    #[must_use]
    pub const fn broker_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.broker_confirm_ms)
    }

    /// The broker socket path, configured or derived.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.broker.socket_path.clone().unwrap_or_else(|| {
            let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
                .map_or_else(|_| PathBuf::from("/tmp"), PathBuf::from);
            runtime_dir
                .join("commlink")
                .join(&self.broker.app_name)
                .join("broker.sock")
        })
    }

    /// Parses a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| CommLinkError::Config(e.to_string()))
    }

    /// Loads configuration from XDG-compliant locations.
    ///
    /// Falls back to defaults when no file exists or the file is malformed;
    /// the reason is logged either way.
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("commlink") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match std::fs::read_to_string(&path) {
            Ok(source) => match Self::from_toml_str(&source) {
                Ok(config) => config,
                Err(e) => {
                    error!("Failed to parse configuration file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

lazy_static! {
    /// Process-wide configuration, loaded on first use.
    pub static ref CONFIG: CommLinkConfig = CommLinkConfig::load();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CommLinkConfig::default();
        assert_eq!(config.retry_interval(), Duration::from_millis(200));
        assert_eq!(config.limits.max_frame_size, 1_048_576);
        assert!(config.socket_path().ends_with("commlink/default/broker.sock"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() -> anyhow::Result<()> {
        let config = CommLinkConfig::from_toml_str(
            "[timeouts]\nretry_interval_ms = 50\n\n[broker]\nsocket_path = \"/tmp/x.sock\"\n",
        )?;
        assert_eq!(config.retry_interval(), Duration::from_millis(50));
        assert_eq!(config.timeouts.broker_confirm_ms, 5_000);
        assert_eq!(config.socket_path(), PathBuf::from("/tmp/x.sock"));
        Ok(())
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        assert!(matches!(
            CommLinkConfig::from_toml_str("[timeouts]\nretry_interval_ms = \"soon\""),
            Err(CommLinkError::Config(_))
        ));
    }
}
