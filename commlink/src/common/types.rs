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

//! Type aliases for handlers, client methods and their futures.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::common::CommLink;
use crate::message::Message;

/// Future returned by a message handler.
///
/// Resolves to an optional "mod": a partial message (JSON object) merged onto
/// the reply when the handler ran for a `cyield`. Ignored for other kinds.
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<Option<Value>>> + Send + 'static>>;

/// A message handler. Receives the link it is registered on (and through it,
/// the client) plus the matched message.
pub type Handler<Client> = dyn Fn(CommLink<Client>, Message) -> HandlerFuture + Send + Sync + 'static;

/// Future returned by a client method.
pub type MethodFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'static>>;

/// A named client method, invoked with the client and the call argument.
pub type Method<Client> = dyn Fn(Arc<Client>, Value) -> MethodFuture + Send + Sync + 'static;
