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

use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::Handler;
use crate::message::{Message, MessageQuery};

/// A registered `(query, handler)` pair.
pub(crate) struct HandlerEntry<Client> {
    pub(crate) query: MessageQuery,
    pub(crate) handler: Box<Handler<Client>>,
}

/// Append-only, ordered list of handlers.
///
/// Entries are never removed. Readers take a snapshot of the matching entries
/// under a short read lock, so a handler registered while a dispatch is
/// iterating is simply not part of that dispatch.
pub(crate) struct HandlerTable<Client> {
    entries: RwLock<Vec<Arc<HandlerEntry<Client>>>>,
}

impl<Client> Default for HandlerTable<Client> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<Client> HandlerTable<Client> {
    pub(crate) fn push(&self, query: MessageQuery, handler: Box<Handler<Client>>) {
        self.entries
            .write()
            .push(Arc::new(HandlerEntry { query, handler }));
    }

    /// Matching entries, in registration order.
    pub(crate) fn matching(&self, message: &Message) -> Vec<Arc<HandlerEntry<Client>>> {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.query.matches(message))
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CommLink, HandlerFuture};
    use crate::message::{Body, Kind};

    fn noop() -> Box<Handler<()>> {
        Box::new(|_: CommLink<()>, _: Message| -> HandlerFuture { Box::pin(async { Ok(None) }) })
    }

    #[test]
    fn matching_preserves_registration_order() {
        let table = HandlerTable::<()>::default();
        table.push(MessageQuery::any().kind(Kind::Ping).id(1), noop());
        table.push(MessageQuery::any().kind(Kind::Quit), noop());
        table.push(MessageQuery::any(), noop());
        table.push(MessageQuery::any().kind(Kind::Ping), noop());

        let ping: Message = Body::Ping.into();
        let matched: Vec<_> = table
            .matching(&ping)
            .iter()
            .map(|entry| entry.query.clone())
            .collect();
        assert_eq!(
            matched,
            vec![MessageQuery::any(), MessageQuery::any().kind(Kind::Ping)]
        );
        assert_eq!(table.len(), 4);
    }
}
