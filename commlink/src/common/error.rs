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

/// Errors surfaced by CommLink operations.
#[derive(Debug, Clone)]
pub enum CommLinkError {
    /// The broker could not be reached, or a subscribe/publish failed.
    Transport(String),

    /// A wire string could not be encoded or decoded.
    Codec(String),

    /// A call's correlated reply was not a `creturn`.
    ProtocolMismatch(String),

    /// The link has been shut down.
    Shutdown,

    /// `connect` was called on a link that already holds a subscription.
    AlreadyConnected,

    /// A wait was abandoned through its cancellation token.
    Cancelled,

    /// A satellite's cargo could not be initialised.
    CargoInit(String),

    /// Configuration could not be loaded or is invalid.
    Config(String),
}

impl fmt::Display for CommLinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {e}"),
            Self::Codec(e) => write!(f, "Codec error: {e}"),
            Self::ProtocolMismatch(e) => write!(f, "Protocol mismatch: {e}"),
            Self::Shutdown => write!(f, "CommLink is shut down"),
            Self::AlreadyConnected => write!(f, "CommLink is already connected"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::CargoInit(e) => write!(f, "Cargo initialisation failed: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for CommLinkError {}

impl From<serde_json::Error> for CommLinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<std::io::Error> for CommLinkError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CommLinkError>;
