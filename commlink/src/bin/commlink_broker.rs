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

//! Standalone socket broker.
//!
//! ```text
//! commlink-broker [SOCKET_PATH]
//! ```
//!
//! Without an argument the socket path comes from configuration. Logs go to
//! stderr, or to `commlink-broker.log` under `logging.log_directory` when set.
//! `RUST_LOG` overrides `logging.filter`.

use std::path::PathBuf;

use anyhow::Context;
use commlink::config::CommLinkConfig;
use commlink::ipc::SocketBroker;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = CommLinkConfig::load();
    if let Some(path) = std::env::args_os().nth(1) {
        config.broker.socket_path = Some(PathBuf::from(path));
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("invalid log filter")?;
    let _guard = match &config.logging.log_directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)
                .with_context(|| format!("could not create {}", directory.display()))?;
            let appender = RollingFileAppender::new(Rotation::DAILY, directory, "commlink-broker.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    };

    let cancel = CancellationToken::new();
    let handle = SocketBroker::run(config, cancel.clone()).await?;
    info!("Press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!(
        published = handle.stats.published(),
        delivered = handle.stats.delivered(),
        dropped = handle.stats.dropped(),
        "Stopping broker"
    );
    handle.shutdown().await;
    Ok(())
}
