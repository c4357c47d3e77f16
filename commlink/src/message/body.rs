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

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The discriminant of a [`Body`], as it appears in the `kind` field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Liveness probe.
    Ping,
    /// Acknowledgement of another kind.
    Ack,
    /// Shutdown request.
    Quit,
    /// Remote method invocation.
    Call,
    /// Local "call finished" signal.
    CYield,
    /// Correlated reply to the original caller.
    CReturn,
}

impl Kind {
    /// Wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Ack => "ack",
            Self::Quit => "quit",
            Self::Call => "call",
            Self::CYield => "cyield",
            Self::CReturn => "creturn",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ping" => Some(Self::Ping),
            "ack" => Some(Self::Ack),
            "quit" => Some(Self::Quit),
            "call" => Some(Self::Call),
            "cyield" => Some(Self::CYield),
            "creturn" => Some(Self::CReturn),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload of a message, tagged by `kind`.
///
/// A bare `Body` carries no addressing; see [`address`](super::address) for
/// turning one into a [`Message`](super::Message).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Body {
    /// Liveness probe.
    Ping,
    /// Acknowledges a body of kind `subk`.
    Ack {
        /// The kind being acknowledged.
        subk: Kind,
    },
    /// Shutdown request.
    Quit,
    /// Invoke `func` on the recipient's client with `arg`.
    Call {
        /// Registered method name.
        func: String,
        /// Method argument.
        arg: Value,
    },
    /// Emitted after a `Call` has been dispatched locally.
    CYield {
        /// The method that ran.
        func: String,
        /// Its (coerced) result.
        value: Value,
    },
    /// Final reply to the caller of `func`.
    CReturn {
        /// The method that ran.
        func: String,
        /// The accumulated result.
        value: Value,
    },
}

impl Body {
    /// The discriminant of this body.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Ping => Kind::Ping,
            Self::Ack { .. } => Kind::Ack,
            Self::Quit => Kind::Quit,
            Self::Call { .. } => Kind::Call,
            Self::CYield { .. } => Kind::CYield,
            Self::CReturn { .. } => Kind::CReturn,
        }
    }

    /// The qualifier matched by the `qual` field of a query.
    ///
    /// Only acknowledgements are qualified, by the kind they acknowledge.
    #[must_use]
    pub fn qual(&self) -> Option<&'static str> {
        match self {
            Self::Ack { subk } => Some(subk.as_str()),
            _ => None,
        }
    }

    /// The acknowledgement for this body.
    #[must_use]
    pub const fn ack(&self) -> Self {
        Self::Ack { subk: self.kind() }
    }

    /// Shorthand for a `Call` body.
    pub fn call(func: impl Into<String>, arg: Value) -> Self {
        Self::Call {
            func: func.into(),
            arg,
        }
    }

    /// Shorthand for a `CYield` body.
    pub fn cyield(func: impl Into<String>, value: Value) -> Self {
        Self::CYield {
            func: func.into(),
            value,
        }
    }

    /// Shorthand for a `CReturn` body.
    pub fn creturn(func: impl Into<String>, value: Value) -> Self {
        Self::CReturn {
            func: func.into(),
            value,
        }
    }

    /// The method name carried by call-family bodies.
    #[must_use]
    pub fn func(&self) -> Option<&str> {
        match self {
            Self::Call { func, .. } | Self::CYield { func, .. } | Self::CReturn { func, .. } => {
                Some(func)
            }
            _ => None,
        }
    }

    /// The result value carried by `CYield` and `CReturn`.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::CYield { value, .. } | Self::CReturn { value, .. } => Some(value),
            _ => None,
        }
    }
}
