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

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::common::handler_table::HandlerTable;
use crate::common::{CommLinkBuilder, CommLinkError, Handler, HandlerFuture, MethodRegistry, Result};
use crate::message::{address, pack, unpack, Body, HeaderPatch, Kind, Message, MessageQuery};
use crate::traits::{Subscription, Transport};

/// One service's messaging endpoint.
///
/// A `CommLink` owns a subscription on the broker channel named after it, an
/// append-only table of message handlers, and the client whose methods remote
/// services invoke by name. It is a cheap handle: clones share all state.
///
/// Every inbound message is decoded on the receive loop and dispatched on its
/// own task. Dispatches are not awaited by the loop, so they overlap and may
/// finish in any order; only the steps of a single call (call, cyield,
/// creturn) are ordered, because each is triggered by the previous one.
pub struct CommLink<Client> {
    pub(crate) inner: Arc<CommLinkInner<Client>>,
}

pub(crate) struct CommLinkInner<Client> {
    name: String,
    client: Arc<Client>,
    methods: MethodRegistry<Client>,
    handlers: HandlerTable<Client>,
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
    is_shutdown: AtomicBool,
    cancellation_token: CancellationToken,
    receive_loop: Mutex<Option<JoinHandle<()>>>,
}

impl<Client> CommLinkInner<Client> {
    pub(crate) fn new(
        name: String,
        client: Arc<Client>,
        methods: MethodRegistry<Client>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            name,
            client,
            methods,
            handlers: HandlerTable::default(),
            transport,
            next_id: AtomicU64::new(1),
            is_shutdown: AtomicBool::new(false),
            cancellation_token: CancellationToken::new(),
            receive_loop: Mutex::new(None),
        }
    }
}

impl<Client> Clone for CommLink<Client> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Client> fmt::Debug for CommLink<Client> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommLink")
            .field("name", &self.inner.name)
            .field("methods", &self.inner.methods)
            .field("handlers", &self.inner.handlers.len())
            .field("is_shutdown", &self.inner.is_shutdown.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<Client: Send + Sync + 'static> CommLink<Client> {
    /// Starts configuring a link named `name` around `client`.
    pub fn builder(name: impl Into<String>, client: Client) -> CommLinkBuilder<Client> {
        CommLinkBuilder::new(name, Arc::new(client))
    }

    /// Like [`builder`](Self::builder), for a client that is already shared.
    pub fn builder_shared(name: impl Into<String>, client: Arc<Client>) -> CommLinkBuilder<Client> {
        CommLinkBuilder::new(name, client)
    }

    /// The service name, which is also the channel this link listens on.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The client whose methods are callable by name.
    #[must_use]
    pub fn client(&self) -> &Arc<Client> {
        &self.inner.client
    }

    /// Whether [`quit`](Self::quit) has been called. Never reset.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::SeqCst)
    }

    /// Number of registered handlers, built-ins included.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    /// Subscribes to this link's channel and starts the receive loop.
    ///
    /// Returns once the broker has confirmed the subscription. A link whose
    /// subscription was closed by the broker may connect again.
    ///
    /// # Errors
    ///
    /// [`CommLinkError::Transport`] when the subscription fails,
    /// [`CommLinkError::AlreadyConnected`] while the receive loop is running and
    /// [`CommLinkError::Shutdown`] after [`quit`](Self::quit).
    #[instrument(skip(self), fields(name = %self.inner.name))]
    pub async fn connect(&self) -> Result<()> {
        if self.is_shutdown() {
            return Err(CommLinkError::Shutdown);
        }
        let mut receive_loop = self.inner.receive_loop.lock().await;
        match receive_loop.take() {
            Some(running) if !running.is_finished() => {
                *receive_loop = Some(running);
                return Err(CommLinkError::AlreadyConnected);
            }
            Some(finished) => {
                // The broker ended the previous subscription.
                if let Err(e) = finished.await {
                    error!(error = %e, "Previous receive loop failed");
                }
                debug!("Reconnecting");
            }
            None => {}
        }
        let subscription = self.inner.transport.subscribe(&self.inner.name).await?;
        *receive_loop = Some(tokio::spawn(self.clone().receive(subscription)));
        debug!("Connected");
        Ok(())
    }

    /// Whether the receive loop is running.
    pub async fn is_connected(&self) -> bool {
        self.inner
            .receive_loop
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Shuts the link down: later sends are ignored, the subscription is
    /// closed, and this returns once the broker has confirmed.
    ///
    /// Calling it again is harmless.
    #[instrument(skip(self), fields(name = %self.inner.name))]
    pub async fn quit(&self) -> Result<()> {
        self.inner.is_shutdown.store(true, Ordering::SeqCst);
        self.inner.cancellation_token.cancel();
        let receive_loop = self.inner.receive_loop.lock().await.take();
        if let Some(handle) = receive_loop {
            handle
                .await
                .map_err(|e| CommLinkError::Transport(format!("receive loop failed: {e}")))?;
            debug!("Quit");
        }
        Ok(())
    }

    /// Appends a handler run for every inbound message matching `query`.
    ///
    /// All matching handlers run, in registration order for the purpose of
    /// merging their mods. Handlers are never removed.
    pub fn on<F, Fut>(&self, query: MessageQuery, handler: F)
    where
        F: Fn(Self, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        self.push_handler(
            query,
            Box::new(move |link: Self, message: Message| -> HandlerFuture {
                Box::pin(handler(link, message))
            }),
        );
    }

    pub(crate) fn push_handler(&self, query: MessageQuery, handler: Box<Handler<Client>>) {
        trace!(name = %self.inner.name, ?query, "Registering handler");
        self.inner.handlers.push(query, handler);
    }

    /// Publishes `message` on the channel named by its `to` header.
    ///
    /// `from` is stamped with this link's name when empty. Each send uses its
    /// own publisher connection. After [`quit`](Self::quit) this logs a warning
    /// and does nothing.
    #[instrument(skip(self, message), fields(name = %self.inner.name))]
    pub async fn send(&self, message: impl Into<Message>) -> Result<()> {
        let mut message = message.into();
        if self.is_shutdown() {
            warn!("Ignoring send after shutdown: {message}");
            return Ok(());
        }
        if message.headers.from.is_empty() {
            message.headers.from.clone_from(&self.inner.name);
        }
        let wire = pack(&message)?;

        let mut publisher = self.inner.transport.open_publisher().await?;
        let published = publisher.publish(message.recipient(), &wire).await;
        let closed = publisher.close().await;
        let receivers = published?;
        closed?;

        trace!(receivers, "Sent {message}");
        Ok(())
    }

    /// Calls `func` on this link's own client.
    pub async fn call<A>(&self, func: &str, arg: &A) -> Result<A>
    where
        A: Serialize + DeserializeOwned,
    {
        let to = self.inner.name.clone();
        self.call_to(&to, func, arg).await
    }

    /// Calls `func` on the client of the service named `to`.
    ///
    /// Waits indefinitely for the reply; see [`call_value_with`](Self::call_value_with)
    /// for a cancellable wait.
    pub async fn call_to<A>(&self, to: &str, func: &str, arg: &A) -> Result<A>
    where
        A: Serialize + DeserializeOwned,
    {
        let value = self.call_value(to, func, serde_json::to_value(arg)?).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Untyped [`call_to`](Self::call_to).
    pub async fn call_value(&self, to: &str, func: &str, arg: Value) -> Result<Value> {
        self.call_value_with(to, func, arg, &CancellationToken::new())
            .await
    }

    /// Calls `func` on `to`, giving up with [`CommLinkError::Cancelled`] when
    /// `cancel` fires first.
    ///
    /// Allocates the next correlation id, registers a one-shot handler for the
    /// matching `creturn`, then sends the `call`. A second reply with the same
    /// id is ignored.
    #[instrument(skip(self, arg, cancel), fields(name = %self.inner.name))]
    pub async fn call_value_with(
        &self,
        to: &str,
        func: &str,
        arg: Value,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (reply_sender, reply_receiver) = oneshot::channel::<Result<Value>>();
        let reply_sender = Arc::new(parking_lot::Mutex::new(Some(reply_sender)));

        self.on(MessageQuery::any().kind(Kind::CReturn).id(id), move |_, reply| {
            let reply_sender = reply_sender.lock().take();
            async move {
                let Some(reply_sender) = reply_sender else {
                    trace!(id, "Ignoring duplicate reply");
                    return Ok(None);
                };
                let outcome = match reply.body {
                    Body::CReturn { value, .. } => Ok(value),
                    other => Err(CommLinkError::ProtocolMismatch(format!(
                        "call #{id} answered with {}",
                        other.kind()
                    ))),
                };
                // The caller may have been cancelled.
                let _ = reply_sender.send(outcome);
                Ok(None)
            }
        });

        self.send(address(
            Body::call(func, arg),
            HeaderPatch::new().to(to).id(id),
        ))
        .await?;
        trace!(id, to, func, "Awaiting reply");

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CommLinkError::Cancelled),
            reply = reply_receiver => reply.map_err(|_| {
                CommLinkError::Transport(format!("reply handler for call #{id} dropped"))
            })?,
        }
    }

    pub(crate) fn install_builtin_handlers(&self) {
        self.on(MessageQuery::any().kind(Kind::Ping), |link, ping| async move {
            link.send(address(
                ping.body.ack(),
                HeaderPatch::new().to(ping.sender()).id(ping.id()),
            ))
            .await?;
            Ok(None)
        });

        self.on(MessageQuery::any().kind(Kind::Quit), |link, quit| async move {
            link.send(address(
                quit.body.ack(),
                HeaderPatch::new().to(quit.sender()).id(quit.id()),
            ))
            .await?;
            link.quit().await?;
            Ok(None)
        });
    }

    async fn receive(self, mut subscription: Box<dyn Subscription>) {
        let cancel = self.inner.cancellation_token.clone();
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    trace!(name = %self.inner.name, "Receive loop cancelled");
                    break;
                }

                payload = subscription.next_payload() => {
                    let Some(payload) = payload else {
                        warn!(name = %self.inner.name, "Subscription closed by broker");
                        break;
                    };
                    match unpack(&payload) {
                        Ok(message) => {
                            tokio::spawn(self.clone().dispatch(message));
                        }
                        Err(e) => {
                            warn!(name = %self.inner.name, error = %e, "Dropping undecodable payload");
                        }
                    }
                }
            }
        }

        if let Err(e) = subscription.unsubscribe().await {
            error!(name = %self.inner.name, error = %e, "Failed to unsubscribe");
        }
    }

    async fn dispatch(self, message: Message) {
        trace!(name = %self.inner.name, "Dispatching {message}");
        match message.kind() {
            Kind::CYield => self.dispatch_yield(message).await,
            Kind::Call => {
                futures::join!(self.dispatch_call(&message), self.run_handlers(&message));
            }
            _ => {
                self.run_handlers(&message).await;
            }
        }
    }

    /// Invokes the named client method and yields its result back to this link.
    async fn dispatch_call(&self, message: &Message) {
        let Body::Call { func, arg } = &message.body else {
            return;
        };
        let Some(method) = self.inner.methods.get(func) else {
            debug!(name = %self.inner.name, func, "No client method, call ignored");
            return;
        };

        // The method is called inside the guarded future so a panic raised
        // before its first await is caught as well.
        let client = Arc::clone(&self.inner.client);
        let outcome = AssertUnwindSafe(async { method(client, arg.clone()).await })
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(Ok(result)) => coerce_result(result),
            Ok(Err(e)) => {
                error!(name = %self.inner.name, func, error = %e, "Client method failed");
                return;
            }
            Err(_) => {
                error!(name = %self.inner.name, func, "Client method panicked");
                return;
            }
        };

        let cyield = address(
            Body::cyield(func.clone(), result),
            HeaderPatch::new()
                .from(message.sender())
                .to(self.inner.name.clone())
                .id(message.id()),
        );
        if let Err(e) = self.send(cyield).await {
            error!(name = %self.inner.name, func, error = %e, "Failed to send cyield");
        }
    }

    /// Runs the matching handlers and answers the original caller with the
    /// default reply plus every handler's mod.
    async fn dispatch_yield(&self, message: Message) {
        let Body::CYield { func, value } = &message.body else {
            return;
        };
        let mods = self.run_handlers(&message).await;
        let reply = address(
            Body::creturn(func.clone(), value.clone()),
            HeaderPatch::new()
                .id(message.id())
                .from(self.inner.name.clone())
                .to(message.sender()),
        );
        let reply = match apply_mods(reply, mods) {
            Ok(reply) => reply,
            Err(e) => {
                error!(name = %self.inner.name, func, error = %e, "Handler mods produced an invalid reply");
                return;
            }
        };
        if let Err(e) = self.send(reply).await {
            error!(name = %self.inner.name, func, error = %e, "Failed to send creturn");
        }
    }

    /// Runs every handler matching `message` concurrently and collects their
    /// mods in registration order. A failing handler contributes nothing.
    async fn run_handlers(&self, message: &Message) -> Vec<Value> {
        let entries = self.inner.handlers.matching(message);
        if entries.is_empty() {
            trace!(name = %self.inner.name, "No handler for {message}");
            return Vec::new();
        }

        let runs = entries.iter().map(|entry| {
            let link = self.clone();
            let message = message.clone();
            AssertUnwindSafe(async move { (entry.handler)(link, message).await }).catch_unwind()
        });

        join_all(runs)
            .await
            .into_iter()
            .filter_map(|outcome| match outcome {
                Ok(Ok(reply_mod)) => reply_mod,
                Ok(Err(e)) => {
                    error!(name = %self.inner.name, error = %e, "Handler failed for {message}");
                    None
                }
                Err(_) => {
                    error!(name = %self.inner.name, "Handler panicked for {message}");
                    None
                }
            })
            .collect()
    }
}

/// Method results that are not objects or arrays become `{}`.
pub(crate) fn coerce_result(result: Value) -> Value {
    match result {
        Value::Object(_) | Value::Array(_) => result,
        _ => Value::Object(serde_json::Map::new()),
    }
}

/// Deep-merges each mod onto `reply`, later mods winning.
pub(crate) fn apply_mods(reply: Message, mods: Vec<Value>) -> Result<Message> {
    if mods.is_empty() {
        return Ok(reply);
    }
    let mut merged = serde_json::to_value(&reply)?;
    for reply_mod in mods {
        if reply_mod.is_object() {
            deep_merge(&mut merged, reply_mod);
        } else {
            warn!("Ignoring non-object handler mod: {reply_mod}");
        }
    }
    Ok(serde_json::from_value(merged)?)
}

fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                deep_merge(target.entry(key).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::common::MemoryBroker;

    #[test]
    fn scalar_results_become_empty_objects() {
        assert_eq!(coerce_result(Value::Null), json!({}));
        assert_eq!(coerce_result(json!(3)), json!({}));
        assert_eq!(coerce_result(json!("done")), json!({}));
        assert_eq!(coerce_result(json!({ "a": 1 })), json!({ "a": 1 }));
        assert_eq!(coerce_result(json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn mods_merge_deeply_and_later_wins() -> anyhow::Result<()> {
        let reply = address(
            Body::creturn("run", json!({ "a": 1, "nested": { "keep": true, "x": 1 } })),
            HeaderPatch::new().from("s0").to("caller").id(4),
        );
        let merged = apply_mods(
            reply,
            vec![
                json!({ "value": { "nested": { "x": 2 }, "list": [1, 2] } }),
                json!({ "value": { "nested": { "x": 3 }, "list": [9] } }),
            ],
        )?;
        assert_eq!(
            merged.body.value(),
            Some(&json!({ "a": 1, "nested": { "keep": true, "x": 3 }, "list": [9] }))
        );
        assert_eq!(merged.recipient(), "caller");
        assert_eq!(merged.id(), 4);
        Ok(())
    }

    #[test]
    fn non_object_mods_are_skipped() -> anyhow::Result<()> {
        let reply = address(
            Body::creturn("run", json!({})),
            HeaderPatch::new().from("s0").to("caller").id(1),
        );
        let merged = apply_mods(reply.clone(), vec![json!(5)])?;
        assert_eq!(merged, reply);
        Ok(())
    }

    #[tokio::test]
    async fn debug_output_does_not_require_a_debug_client() -> anyhow::Result<()> {
        struct Opaque;

        let broker = MemoryBroker::new();
        let link = CommLink::builder("opaque", Opaque).build(broker.transport());
        assert!(format!("{link:?}").contains("is_shutdown: false"));

        link.connect().await?;
        link.quit().await?;
        assert!(format!("{link:?}").contains("is_shutdown: true"));
        Ok(())
    }
}
