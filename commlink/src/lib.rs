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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # CommLink
//!
//! Named services exchanging messages over a publish/subscribe broker.
//!
//! ## Key Concepts
//!
//! - **Messages (`Message`)**: routing headers (`from`, `to`, `id`) plus a body
//!   tagged by `kind` (`ping`, `ack`, `quit`, `call`, `cyield`, `creturn`).
//! - **Queries (`MessageQuery`)**: partial patterns over `kind`, `qual`, `from`,
//!   `to` and `id` used to select handlers.
//! - **Links (`CommLink`)**: one per service. A link subscribes to the channel
//!   named after it, dispatches each inbound message to every matching
//!   handler, and exposes its client's methods to remote `call`s.
//! - **Calls**: `call` → `cyield` → `creturn`, correlated by id. Handlers on
//!   the `cyield` may amend the reply before it reaches the caller.
//! - **Chaining (`chain_services`)**: a pipeline of links built from calls.
//! - **Supervision (`ServiceHub`, `SatelliteService`)**: a hub pings its
//!   satellites until all have answered, and stops them the same way.
//! - **Transports**: [`MemoryBroker`](prelude::MemoryBroker) in process, or the
//!   Unix socket broker in [`ipc`] across processes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use commlink::prelude::*;
//! use serde_json::json;
//!
//! let broker = MemoryBroker::new();
//! let echo = CommLink::builder("echo", ())
//!     .method("echo", |_, arg| async move { Ok(arg) })
//!     .build(broker.transport());
//! echo.connect().await?;
//!
//! let caller = CommLink::builder("caller", ()).build(broker.transport());
//! caller.connect().await?;
//! let reply = caller.call_value("echo", "echo", json!({ "hello": "world" })).await?;
//! ```

/// Links, configuration, errors and the in-process broker.
pub(crate) mod common;

/// Message model, query matching and wire codecs.
pub(crate) mod message;

/// Broker abstraction.
pub(crate) mod traits;

/// Service chaining.
pub(crate) mod chain;

/// Hub/satellite supervision.
pub(crate) mod supervision;

/// Unix domain socket broker for linking services across processes.
///
/// # Feature Gate
///
/// This module is only available when the `ipc` feature is enabled.
#[cfg(feature = "ipc")]
pub mod ipc {
    pub use crate::common::ipc::{BrokerFrame, BrokerHandle, BrokerStats, SocketBroker, SocketTransport};

    /// Length-prefixed framing used by the socket broker.
    pub mod protocol {
        pub use crate::common::ipc::protocol::{
            read_frame, write_frame, BrokerFrame, HEADER_SIZE, MAX_FRAME_SIZE, PROTOCOL_VERSION,
        };
    }
}

/// Configuration types.
pub mod config {
    pub use crate::common::config::{
        BrokerConfig, CommLinkConfig, LimitsConfig, LoggingConfig, TimeoutConfig, CONFIG,
    };
}

/// A prelude module for conveniently importing the most commonly used items.
pub mod prelude {
    pub use async_trait::async_trait;

    // Core types
    pub use crate::chain::chain_services;
    pub use crate::common::{
        CommLink, CommLinkBuilder, CommLinkConfig, CommLinkError, Handler, HandlerFuture,
        MemoryBroker, Method, MethodFuture, MethodRegistry, Result, CONFIG,
    };
    pub use crate::message::{
        address, match_message_to_query, pack, pack_with, unpack, unpack_with, Body, Format,
        HeaderPatch, Headers, Kind, Message, MessageQuery,
    };
    pub use crate::supervision::{
        create_satellite_service, message_all_satellites, CargoInit, Lifecycle, LifecycleHandlers,
        SatelliteDefinition, SatelliteLink, SatelliteService, SatelliteState, ServiceHub,
    };
    pub use crate::traits::{Publisher, Subscription, Transport};

    // IPC types (feature-gated)
    #[cfg(feature = "ipc")]
    pub use crate::common::ipc::{BrokerHandle, SocketBroker, SocketTransport};
}
