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

//! Client side of the socket broker.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use super::protocol::{read_frame, write_frame, BrokerFrame};
use crate::common::{CommLinkConfig, CommLinkError, Result};
use crate::traits::{Publisher, Subscription, Transport};

/// [`Transport`] backed by a [`SocketBroker`](super::SocketBroker).
///
/// Every subscription and every publisher gets its own connection.
#[derive(Debug, Clone)]
pub struct SocketTransport {
    socket_path: PathBuf,
    max_frame_size: usize,
    confirm_timeout: Duration,
    buffer: usize,
}

impl SocketTransport {
    /// Transport for the broker at `socket_path`, with default limits.
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        let config = CommLinkConfig::default();
        Self {
            socket_path: socket_path.into(),
            ..Self::from_config(&config)
        }
    }

    /// Transport for the broker named by `config`.
    #[must_use]
    pub fn from_config(config: &CommLinkConfig) -> Self {
        Self {
            socket_path: config.socket_path(),
            max_frame_size: config.limits.max_frame_size,
            confirm_timeout: config.broker_confirm_timeout(),
            buffer: config.limits.subscription_buffer.max(1),
        }
    }

    /// Path of the broker socket.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn connect(&self) -> Result<UnixStream> {
        UnixStream::connect(&self.socket_path).await.map_err(|e| {
            CommLinkError::Transport(format!(
                "Failed to connect to broker at {}: {}",
                self.socket_path.display(),
                e
            ))
        })
    }

    async fn confirm<T>(&self, pending: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.confirm_timeout, pending)
            .await
            .map_err(|_| CommLinkError::Transport("Timed out waiting for broker".to_string()))?
    }
}

#[async_trait]
impl Transport for SocketTransport {
    #[instrument(skip(self))]
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>> {
        let (mut reader, mut writer) = self.connect().await?.into_split();
        write_frame(
            &mut writer,
            &BrokerFrame::Subscribe {
                channel: channel.to_string(),
            },
        )
        .await?;

        let max_frame_size = self.max_frame_size;
        let early = self
            .confirm(await_subscribed(&mut reader, channel, max_frame_size))
            .await?;
        debug!(early = early.len(), "Subscribed to {}", channel);

        let (payloads, payload_rx) = mpsc::channel(self.buffer);
        let (unsubscribed, unsubscribed_rx) = oneshot::channel();
        let reader_task = tokio::spawn(pump_deliveries(
            reader,
            max_frame_size,
            early,
            payloads,
            unsubscribed,
        ));

        Ok(Box::new(SocketSubscription {
            channel: channel.to_string(),
            writer,
            payload_rx,
            unsubscribed_rx,
            reader_task,
            confirm_timeout: self.confirm_timeout,
        }))
    }

    async fn open_publisher(&self) -> Result<Box<dyn Publisher>> {
        let (reader, writer) = self.connect().await?.into_split();
        Ok(Box::new(SocketPublisher {
            reader,
            writer,
            max_frame_size: self.max_frame_size,
            confirm_timeout: self.confirm_timeout,
        }))
    }
}

/// Waits for the broker to confirm `channel`, returning any payloads
/// delivered ahead of the confirmation in arrival order.
async fn await_subscribed(
    reader: &mut OwnedReadHalf,
    channel: &str,
    max_frame_size: usize,
) -> Result<Vec<String>> {
    let mut early = Vec::new();
    loop {
        match read_frame(reader, max_frame_size).await? {
            BrokerFrame::Subscribed { channel: confirmed } if confirmed == channel => return Ok(early),
            BrokerFrame::Deliver { payload, .. } => early.push(payload),
            BrokerFrame::Error { message } => return Err(CommLinkError::Transport(message)),
            other => trace!("Ignoring frame before subscription: {:?}", other),
        }
    }
}

/// Reads frames off a subscription connection so that
/// [`Subscription::next_payload`] only ever waits on a channel.
async fn pump_deliveries(
    mut reader: OwnedReadHalf,
    max_frame_size: usize,
    early: Vec<String>,
    payloads: mpsc::Sender<String>,
    unsubscribed: oneshot::Sender<()>,
) {
    for payload in early {
        if payloads.send(payload).await.is_err() {
            trace!("Subscription closed, dropping delivery");
        }
    }
    loop {
        match read_frame(&mut reader, max_frame_size).await {
            Ok(BrokerFrame::Deliver { payload, .. }) => {
                if payloads.send(payload).await.is_err() {
                    trace!("Subscription closed, dropping delivery");
                }
            }
            Ok(BrokerFrame::Unsubscribed { .. }) => {
                let _ = unsubscribed.send(());
                break;
            }
            Ok(other) => trace!("Ignoring frame on subscription: {:?}", other),
            Err(e) => {
                debug!("Subscription connection closed: {}", e);
                break;
            }
        }
    }
}

struct SocketSubscription {
    channel: String,
    writer: OwnedWriteHalf,
    payload_rx: mpsc::Receiver<String>,
    unsubscribed_rx: oneshot::Receiver<()>,
    reader_task: JoinHandle<()>,
    confirm_timeout: Duration,
}

#[async_trait]
impl Subscription for SocketSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next_payload(&mut self) -> Option<String> {
        self.payload_rx.recv().await
    }

    async fn unsubscribe(self: Box<Self>) -> Result<()> {
        let mut this = self;
        write_frame(
            &mut this.writer,
            &BrokerFrame::Unsubscribe {
                channel: this.channel.clone(),
            },
        )
        .await?;

        // Deliveries still in flight must not block the confirmation.
        this.payload_rx.close();
        let confirmed = tokio::time::timeout(this.confirm_timeout, &mut this.unsubscribed_rx).await;
        this.reader_task.abort();
        if let Err(e) = this.writer.shutdown().await {
            trace!("Shutdown after unsubscribe failed: {}", e);
        }
        match confirmed {
            Ok(Ok(())) => {
                debug!("Unsubscribed from {}", this.channel);
                Ok(())
            }
            Ok(Err(_)) => Err(CommLinkError::Transport(
                "Broker closed the connection before confirming".to_string(),
            )),
            Err(_) => {
                warn!("Timed out waiting for unsubscribe confirmation on {}", this.channel);
                Err(CommLinkError::Transport("Timed out waiting for broker".to_string()))
            }
        }
    }
}

struct SocketPublisher {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    max_frame_size: usize,
    confirm_timeout: Duration,
}

#[async_trait]
impl Publisher for SocketPublisher {
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<usize> {
        write_frame(
            &mut self.writer,
            &BrokerFrame::Publish {
                channel: channel.to_string(),
                payload: payload.to_string(),
            },
        )
        .await?;

        let reply = tokio::time::timeout(
            self.confirm_timeout,
            read_frame(&mut self.reader, self.max_frame_size),
        )
        .await
        .map_err(|_| CommLinkError::Transport("Timed out waiting for broker".to_string()))??;

        match reply {
            BrokerFrame::Published { receivers } => Ok(receivers),
            BrokerFrame::Error { message } => Err(CommLinkError::Transport(message)),
            other => Err(CommLinkError::Transport(format!(
                "Unexpected reply to publish: {other:?}"
            ))),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.writer.shutdown().await?;
        Ok(())
    }
}
