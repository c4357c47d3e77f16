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

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{instrument, trace};

use crate::common::{CommLinkError, Result};
use crate::traits::{Publisher, Subscription, Transport};

type SubscriberId = u64;

/// Subscribers per channel.
type Channels = DashMap<String, Vec<(SubscriberId, mpsc::UnboundedSender<String>)>>;

/// An in-process publish/subscribe broker.
///
/// Clones share the same channel table, so every [`CommLink`](crate::common::CommLink)
/// in a process can be given a clone. Delivery is fan-out: each subscriber of a
/// channel gets its own copy of every payload published after it subscribed, and
/// payloads published to a channel nobody listens on are dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<MemoryBrokerInner>,
}

#[derive(Debug)]
struct MemoryBrokerInner {
    channels: Channels,
    next_subscriber: AtomicU64,
    published: AtomicUsize,
    delivered: AtomicUsize,
    available: AtomicBool,
}

impl Default for MemoryBrokerInner {
    fn default() -> Self {
        Self {
            channels: DashMap::new(),
            next_subscriber: AtomicU64::new(1),
            published: AtomicUsize::new(0),
            delivered: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// This broker as a shared [`Transport`] handle.
    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    /// Publishes `payload` on `channel`, returning the number of receivers.
    pub fn publish(&self, channel: &str, payload: &str) -> usize {
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        let Some(mut subscribers) = self.inner.channels.get_mut(channel) else {
            trace!(channel, "No subscribers, payload dropped");
            return 0;
        };
        subscribers.retain(|(_, sender)| !sender.is_closed());
        let mut receivers = 0;
        for (_, sender) in subscribers.iter() {
            if sender.send(payload.to_string()).is_ok() {
                receivers += 1;
            }
        }
        self.inner.delivered.fetch_add(receivers, Ordering::Relaxed);
        trace!(channel, receivers, "Published");
        receivers
    }

    /// Number of live subscriptions on `channel`.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner.channels.get(channel).map_or(0, |subscribers| {
            subscribers
                .iter()
                .filter(|(_, sender)| !sender.is_closed())
                .count()
        })
    }

    /// Total publish operations seen.
    #[must_use]
    pub fn published(&self) -> usize {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Total payload copies handed to subscribers.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Simulates the broker going down (`false`) or coming back (`true`).
    ///
    /// While unavailable, new subscriptions and publisher connections fail.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Ends every subscription on `channel` from the broker side, as a
    /// restarting broker would. Subscribers see their stream end.
    pub fn close_channel(&self, channel: &str) {
        if let Some((_, subscribers)) = self.inner.channels.remove(channel) {
            trace!(channel, closed = subscribers.len(), "Closed channel");
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CommLinkError::Transport(
                "memory broker is unavailable".to_string(),
            ))
        }
    }

    fn remove(&self, channel: &str, id: SubscriberId) {
        if let Some(mut subscribers) = self.inner.channels.get_mut(channel) {
            subscribers.retain(|(subscriber, _)| *subscriber != id);
        }
        self.inner
            .channels
            .remove_if(channel, |_, subscribers| subscribers.is_empty());
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    #[instrument(skip(self))]
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>> {
        self.ensure_available()?;
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner
            .channels
            .entry(channel.to_string())
            .or_default()
            .push((id, sender));
        trace!(channel, id, "Subscribed");
        Ok(Box::new(MemorySubscription {
            broker: self.clone(),
            channel: channel.to_string(),
            id,
            receiver,
        }))
    }

    async fn open_publisher(&self) -> Result<Box<dyn Publisher>> {
        self.ensure_available()?;
        Ok(Box::new(MemoryPublisher {
            broker: self.clone(),
        }))
    }
}

struct MemorySubscription {
    broker: MemoryBroker,
    channel: String,
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next_payload(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    async fn unsubscribe(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.receiver.close();
        this.broker.remove(&this.channel, this.id);
        trace!(channel = %this.channel, id = this.id, "Unsubscribed");
        Ok(())
    }
}

struct MemoryPublisher {
    broker: MemoryBroker,
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<usize> {
        self.broker.ensure_available()?;
        Ok(self.broker.publish(channel, payload))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
