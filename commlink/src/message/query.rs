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

use super::{Kind, Message};

/// A partial message used only for matching.
///
/// Matching looks at exactly five properties: `kind`, `qual`, `from`, `to` and
/// `id`. A property left unset matches anything; a set property must equal the
/// message's. Nothing else about a message (method names, arguments, values)
/// can be matched on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    kind: Option<Kind>,
    qual: Option<String>,
    from: Option<String>,
    to: Option<String>,
    id: Option<u64>,
}

impl MessageQuery {
    /// A query matching every message.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// A query pinning all five properties to those of `message`.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            kind: Some(message.kind()),
            qual: message.qual().map(str::to_string),
            from: Some(message.sender().to_string()),
            to: Some(message.recipient().to_string()),
            id: Some(message.id()),
        }
    }

    /// Requires `kind`.
    #[must_use]
    pub const fn kind(mut self, kind: Kind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Requires `qual`.
    #[must_use]
    pub fn qual(mut self, qual: impl Into<String>) -> Self {
        self.qual = Some(qual.into());
        self
    }

    /// Requires `from`.
    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Requires `to`.
    #[must_use]
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Requires `id`.
    #[must_use]
    pub const fn id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether `message` satisfies this query.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        match_message_to_query(message, self)
    }
}

/// Fixed-field match of `message` against `query`.
#[must_use]
pub fn match_message_to_query(message: &Message, query: &MessageQuery) -> bool {
    query.kind.map_or(true, |kind| kind == message.kind())
        && query
            .qual
            .as_deref()
            .map_or(true, |qual| message.qual() == Some(qual))
        && query
            .from
            .as_deref()
            .map_or(true, |from| from == message.sender())
        && query.to.as_deref().map_or(true, |to| to == message.recipient())
        && query.id.map_or(true, |id| id == message.id())
}
