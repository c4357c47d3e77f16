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

use std::fmt::Debug;

use async_trait::async_trait;

use crate::common::Result;

/// Access to a publish/subscribe broker.
///
/// Channel names are service names. A [`CommLink`](crate::common::CommLink)
/// holds one long-lived [`Subscription`] on its own channel and opens a fresh
/// [`Publisher`] for every send.
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// Subscribes to `channel`, returning once the broker has confirmed.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>>;

    /// Opens a connection used for publishing.
    async fn open_publisher(&self) -> Result<Box<dyn Publisher>>;
}

/// A confirmed subscription to a single channel.
#[async_trait]
pub trait Subscription: Send {
    /// The subscribed channel.
    fn channel(&self) -> &str;

    /// Waits for the next payload published on the channel.
    ///
    /// Returns `None` once the broker side has gone away.
    async fn next_payload(&mut self) -> Option<String>;

    /// Ends the subscription, returning once the broker has confirmed.
    async fn unsubscribe(self: Box<Self>) -> Result<()>;
}

/// A publishing connection.
#[async_trait]
pub trait Publisher: Send {
    /// Publishes `payload` on `channel`, returning how many subscribers received it.
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<usize>;

    /// Closes the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}
