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

//! Unix domain socket broker.
//!
//! Each connection may subscribe to any number of channels. Publishes are
//! fanned out to every subscribed connection through a bounded per-connection
//! queue; a full queue drops the delivery for that subscriber only.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::protocol::{read_frame, write_frame, BrokerFrame};
use crate::common::{CommLinkConfig, CommLinkError, Result};

type ConnectionId = usize;
type ChannelTable = DashMap<String, HashMap<ConnectionId, mpsc::Sender<BrokerFrame>>>;

/// Counters kept by a running broker.
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicUsize,
    /// Currently active connections.
    pub connections_active: AtomicUsize,
    /// Total publish requests handled.
    pub published: AtomicUsize,
    /// Total deliveries queued to subscribers.
    pub delivered: AtomicUsize,
    /// Deliveries dropped because a subscriber queue was full.
    pub dropped: AtomicUsize,
    /// Total errors encountered.
    pub errors: AtomicUsize,
}

impl BrokerStats {
    /// Number of connections accepted.
    #[must_use]
    pub fn connections_accepted(&self) -> usize {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    /// Number of active connections.
    #[must_use]
    pub fn connections_active(&self) -> usize {
        self.connections_active.load(Ordering::Relaxed)
    }

    /// Number of publish requests handled.
    #[must_use]
    pub fn published(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }

    /// Number of deliveries queued.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of deliveries dropped.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of errors.
    #[must_use]
    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Handle to a running [`SocketBroker`].
#[derive(Debug)]
pub struct BrokerHandle {
    /// Statistics for the broker.
    pub stats: Arc<BrokerStats>,
    socket_path: PathBuf,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl BrokerHandle {
    /// Path the broker is bound to.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Requests the broker to stop.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Whether the broker has been asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Stops the broker and waits for the accept loop to exit and the socket
    /// file to be removed.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.task.await {
            error!("Broker task failed: {}", e);
        }
    }
}

/// Publish/subscribe broker serving [`BrokerFrame`]s over a Unix socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketBroker;

impl SocketBroker {
    /// Binds the socket named by `config` and starts accepting connections.
    ///
    /// A stale socket file left by a dead broker is removed; a socket with a
    /// live broker behind it is an error.
    pub async fn run(config: CommLinkConfig, cancel_token: CancellationToken) -> Result<BrokerHandle> {
        let socket_path = config.socket_path();
        let stats = Arc::new(BrokerStats::default());

        if let Some(parent) = socket_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CommLinkError::Transport(format!(
                    "Failed to create socket directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        if socket_path.exists() {
            if UnixStream::connect(&socket_path).await.is_ok() {
                return Err(CommLinkError::Transport(format!(
                    "Another broker is already running at {}",
                    socket_path.display()
                )));
            }
            warn!("Removing stale socket: {}", socket_path.display());
            tokio::fs::remove_file(&socket_path).await.map_err(|e| {
                CommLinkError::Transport(format!(
                    "Failed to remove stale socket {}: {}",
                    socket_path.display(),
                    e
                ))
            })?;
        }

        let listener = UnixListener::bind(&socket_path).map_err(|e| {
            CommLinkError::Transport(format!(
                "Failed to bind socket at {}: {}",
                socket_path.display(),
                e
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(config.broker.mode);
            std::fs::set_permissions(&socket_path, perms).map_err(|e| {
                CommLinkError::Transport(format!(
                    "Failed to set socket permissions on {}: {}",
                    socket_path.display(),
                    e
                ))
            })?;
        }

        info!("Broker listening on: {}", socket_path.display());

        let semaphore = Arc::new(Semaphore::new(config.limits.max_connections));
        let channels: Arc<ChannelTable> = Arc::new(DashMap::new());
        let task = tokio::spawn({
            let stats = stats.clone();
            let cancel_token = cancel_token.clone();
            let socket_path = socket_path.clone();
            async move {
                accept_loop(listener, config, channels, cancel_token, semaphore, stats).await;

                if let Err(e) = tokio::fs::remove_file(&socket_path).await {
                    warn!("Failed to remove socket file on shutdown: {}", e);
                } else {
                    debug!("Socket file removed: {}", socket_path.display());
                }
                info!("Broker shut down");
            }
        });

        Ok(BrokerHandle {
            stats,
            socket_path,
            cancel_token,
            task,
        })
    }
}

async fn accept_loop(
    listener: UnixListener,
    config: CommLinkConfig,
    channels: Arc<ChannelTable>,
    cancel_token: CancellationToken,
    semaphore: Arc<Semaphore>,
    stats: Arc<BrokerStats>,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => {
                info!("Broker received shutdown signal");
                break;
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _addr)) => {
                        let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                            warn!("Maximum concurrent connections reached, rejecting connection");
                            stats.errors.fetch_add(1, Ordering::Relaxed);
                            continue;
                        };

                        let conn_id = stats.connections_accepted.fetch_add(1, Ordering::Relaxed) + 1;
                        stats.connections_active.fetch_add(1, Ordering::Relaxed);
                        trace!("Accepted connection #{}", conn_id);

                        let config = config.clone();
                        let channels = channels.clone();
                        let cancel_token = cancel_token.clone();
                        let stats = stats.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, conn_id, &config, &channels, &cancel_token, &stats).await;
                            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        stats.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    conn_id: ConnectionId,
    config: &CommLinkConfig,
    channels: &ChannelTable,
    cancel_token: &CancellationToken,
    stats: &BrokerStats,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (outbound, mut outbound_rx) = mpsc::channel::<BrokerFrame>(config.limits.subscription_buffer.max(1));

    // Replies and deliveries share one queue so a subscriber sees them in order.
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                debug!("Connection #{} writer closed: {}", conn_id, e);
                break;
            }
        }
    });

    let mut subscribed: HashSet<String> = HashSet::new();
    debug!("Connection #{} handler started", conn_id);

    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => {
                trace!("Connection #{} received shutdown signal", conn_id);
                break;
            }

            frame_result = read_frame(&mut reader, config.limits.max_frame_size) => {
                let frame = match frame_result {
                    Ok(frame) => frame,
                    Err(e) => {
                        trace!("Connection #{} closed: {}", conn_id, e);
                        break;
                    }
                };
                let reply = match frame {
                    BrokerFrame::Subscribe { channel } => {
                        channels
                            .entry(channel.clone())
                            .or_default()
                            .insert(conn_id, outbound.clone());
                        subscribed.insert(channel.clone());
                        debug!("Connection #{} subscribed to {}", conn_id, channel);
                        BrokerFrame::Subscribed { channel }
                    }
                    BrokerFrame::Unsubscribe { channel } => {
                        remove_subscriber(channels, &channel, conn_id);
                        subscribed.remove(&channel);
                        debug!("Connection #{} unsubscribed from {}", conn_id, channel);
                        BrokerFrame::Unsubscribed { channel }
                    }
                    BrokerFrame::Publish { channel, payload } => {
                        let receivers = fan_out(channels, &channel, &payload, stats);
                        stats.published.fetch_add(1, Ordering::Relaxed);
                        BrokerFrame::Published { receivers }
                    }
                    other => {
                        stats.errors.fetch_add(1, Ordering::Relaxed);
                        warn!("Connection #{} sent unexpected frame: {:?}", conn_id, other);
                        BrokerFrame::Error {
                            message: format!("unexpected frame type {:#04x}", other.frame_type()),
                        }
                    }
                };
                if outbound.send(reply).await.is_err() {
                    break;
                }
            }
        }
    }

    for channel in &subscribed {
        remove_subscriber(channels, channel, conn_id);
    }
    drop(outbound);
    if let Err(e) = writer_task.await {
        error!("Connection #{} writer task failed: {}", conn_id, e);
    }
    debug!("Connection #{} handler finished", conn_id);
}

fn remove_subscriber(channels: &ChannelTable, channel: &str, conn_id: ConnectionId) {
    if let Some(mut subscribers) = channels.get_mut(channel) {
        subscribers.remove(&conn_id);
    }
    channels.remove_if(channel, |_, subscribers| subscribers.is_empty());
}

fn fan_out(channels: &ChannelTable, channel: &str, payload: &str, stats: &BrokerStats) -> usize {
    let Some(subscribers) = channels.get(channel) else {
        trace!("No subscribers on {}", channel);
        return 0;
    };
    let mut receivers = 0;
    for (conn_id, sender) in subscribers.iter() {
        let frame = BrokerFrame::Deliver {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        match sender.try_send(frame) {
            Ok(()) => {
                receivers += 1;
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Subscriber #{} on {} is full, dropping delivery", conn_id, channel);
                stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Subscriber #{} on {} has gone away", conn_id, channel);
            }
        }
    }
    receivers
}
