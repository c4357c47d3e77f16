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

use derive_new::new;
use serde::{Deserialize, Serialize};

use super::{Body, Kind};

/// Addressing carried by every message in flight.
///
/// `from` and `to` are service names, which double as broker channel names.
/// `id` correlates a call with its reply and is unique per originating link.
#[derive(new, Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Headers {
    /// Sending service.
    #[new(into)]
    pub from: String,
    /// Receiving service.
    #[new(into)]
    pub to: String,
    /// Correlation id.
    pub id: u64,
}

/// A partial set of headers, overlaid onto a message by [`address`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderPatch {
    from: Option<String>,
    to: Option<String>,
    id: Option<u64>,
}

impl HeaderPatch {
    /// An empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `from`.
    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Sets `to`.
    #[must_use]
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Sets `id`.
    #[must_use]
    pub const fn id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

/// A body together with its headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Addressing.
    #[serde(flatten)]
    pub headers: Headers,
    /// Payload.
    #[serde(flatten)]
    pub body: Body,
}

/// A bare body becomes a message with empty headers.
impl From<Body> for Message {
    fn from(body: Body) -> Self {
        Self {
            headers: Headers::default(),
            body,
        }
    }
}

impl Message {
    /// The body's kind.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        self.body.kind()
    }

    /// The body's qualifier; see [`Body::qual`].
    #[must_use]
    pub fn qual(&self) -> Option<&'static str> {
        self.body.qual()
    }

    /// Sending service.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.headers.from
    }

    /// Receiving service.
    #[must_use]
    pub fn recipient(&self) -> &str {
        &self.headers.to
    }

    /// Correlation id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.headers.id
    }

    /// One-line description used in exchange logs, e.g. `service-1→Hub:ack/ping`.
    #[must_use]
    pub fn summary(&self) -> String {
        match self.qual() {
            Some(qual) => format!("{}→{}:{}/{}", self.sender(), self.recipient(), self.kind(), qual),
            None => format!("{}→{}:{}", self.sender(), self.recipient(), self.kind()),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.summary(), self.id())
    }
}

/// Overlays `patch` onto `message`.
///
/// A bare [`Body`] is first given the default headers `{from: "", to: "", id: 0}`;
/// a [`Message`] keeps its headers and only the fields present in `patch` change.
pub fn address(message: impl Into<Message>, patch: HeaderPatch) -> Message {
    let mut message = message.into();
    if let Some(from) = patch.from {
        message.headers.from = from;
    }
    if let Some(to) = patch.to {
        message.headers.to = to;
    }
    if let Some(id) = patch.id {
        message.headers.id = id;
    }
    message
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bare_body_gets_default_headers() {
        let message = address(Body::Ping, HeaderPatch::new().to("hub"));
        assert_eq!(message.headers, Headers::new("", "hub", 0));
    }

    #[test]
    fn addressing_a_message_keeps_unpatched_fields() {
        let first = address(
            Body::call("run", json!({})),
            HeaderPatch::new().from("a").to("b").id(7),
        );
        let second = address(first, HeaderPatch::new().to("c"));
        assert_eq!(second.headers, Headers::new("a", "c", 7));
    }

    #[test]
    fn summary_includes_ack_qualifier() {
        let message = address(
            Body::Ping.ack(),
            HeaderPatch::new().from("service-1").to("Hub"),
        );
        assert_eq!(message.summary(), "service-1→Hub:ack/ping");
    }
}
