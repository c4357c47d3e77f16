//! Core runtime components.
//!
//! *   [`CommLink`]: the per-service runtime handle (connect, send, on, call, quit).
//! *   [`CommLinkBuilder`]: registers client methods before a link is built.
//! *   [`MemoryBroker`]: an in-process broker implementing [`Transport`](crate::traits::Transport).
//! *   [`CommLinkConfig`]: layered configuration, loaded once into [`CONFIG`].
//! *   [`CommLinkError`]: the crate error type.

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

// --- Public Re-exports ---
pub use builder::CommLinkBuilder;
pub use comm_link::CommLink;
pub use config::{CommLinkConfig, CONFIG};
pub use error::{CommLinkError, Result};
pub use memory_broker::MemoryBroker;
pub use method_registry::MethodRegistry;
pub use types::*;

// --- Submodules ---

/// Handler and method signatures.
mod types;

/// Builder for `CommLink`.
mod builder;
/// The `CommLink` runtime.
mod comm_link;
/// Configuration loading.
pub mod config;
/// Error type.
mod error;
/// Ordered handler registrations.
pub(crate) mod handler_table;
/// In-process broker.
mod memory_broker;
/// Client method registry.
mod method_registry;

/// Unix domain socket broker and transport.
///
/// Only available when the `ipc` feature is enabled.
#[cfg(feature = "ipc")]
pub mod ipc;
