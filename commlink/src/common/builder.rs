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

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::common::comm_link::CommLinkInner;
use crate::common::{CommLink, Handler, HandlerFuture, Method, MethodFuture, MethodRegistry};
use crate::message::{Message, MessageQuery};
use crate::traits::Transport;

/// Configures a [`CommLink`] before it exists: its name, its client and the
/// client methods that remote callers may invoke by name.
///
/// ```rust,ignore
/// let link = CommLink::builder("counter", Counter::default())
///     .method("increment", |counter, arg| async move {
///         Ok(serde_json::json!({ "count": counter.increment(arg) }))
///     })
///     .build(broker.transport());
/// link.connect().await?;
/// ```
pub struct CommLinkBuilder<Client> {
    name: String,
    client: Arc<Client>,
    methods: MethodRegistry<Client>,
    handlers: Vec<(MessageQuery, Box<Handler<Client>>)>,
}

impl<Client: Send + Sync + 'static> CommLinkBuilder<Client> {
    pub(crate) fn new(name: impl Into<String>, client: Arc<Client>) -> Self {
        Self {
            name: name.into(),
            client,
            methods: MethodRegistry::default(),
            handlers: Vec::new(),
        }
    }

    /// Registers a client method callable as `name`.
    #[must_use]
    pub fn method<F, Fut>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Arc<Client>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let method: Arc<Method<Client>> =
            Arc::new(move |client: Arc<Client>, arg: Value| -> MethodFuture {
                Box::pin(method(client, arg))
            });
        self.methods.insert(name, method);
        self
    }

    /// Registers an already boxed method.
    #[must_use]
    pub fn boxed_method(mut self, name: impl Into<String>, method: Arc<Method<Client>>) -> Self {
        self.methods.insert(name, method);
        self
    }

    /// Registers a handler installed when the link is built, after the
    /// built-in ones. See [`CommLink::on`].
    #[must_use]
    pub fn on<F, Fut>(mut self, query: MessageQuery, handler: F) -> Self
    where
        F: Fn(CommLink<Client>, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        self.handlers.push((
            query,
            Box::new(move |link: CommLink<Client>, message: Message| -> HandlerFuture {
                Box::pin(handler(link, message))
            }),
        ));
        self
    }

    /// Creates the link with the built-in `ping` and `quit` handlers installed.
    ///
    /// The link is not subscribed yet; call [`CommLink::connect`].
    pub fn build(self, transport: Arc<dyn Transport>) -> CommLink<Client> {
        let link = CommLink {
            inner: Arc::new(CommLinkInner::new(
                self.name,
                self.client,
                self.methods,
                transport,
            )),
        };
        link.install_builtin_handlers();
        for (query, handler) in self.handlers {
            link.push_handler(query, handler);
        }
        link
    }
}
