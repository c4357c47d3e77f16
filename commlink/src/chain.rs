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

//! Linear pipelines built from call correlation.

use serde_json::json;
use tracing::{debug, trace};

use crate::common::CommLink;
use crate::message::{Body, Kind, MessageQuery};

/// Chains `links` on `function_name`.
///
/// Every link but the last gets a `cyield` handler that forwards its own
/// result for `function_name` to the next link and replaces the reply value
/// with what comes back. Calling `function_name` on the first link therefore
/// runs it on every link in order, and the caller receives the value produced
/// by the last hop.
pub fn chain_services<Client>(function_name: &str, links: &[CommLink<Client>])
where
    Client: Send + Sync + 'static,
{
    for pair in links.windows(2) {
        let next = pair[1].name().to_string();
        let function_name = function_name.to_string();
        debug!(from = pair[0].name(), to = %next, function = %function_name, "Chaining");

        pair[0].on(MessageQuery::any().kind(Kind::CYield), move |link, message| {
            let next = next.clone();
            let function_name = function_name.clone();
            async move {
                let Body::CYield { func, value } = message.body else {
                    return Ok(None);
                };
                if func != function_name {
                    return Ok(None);
                }
                trace!(name = link.name(), to = %next, id = message.headers.id, "Forwarding {func}");
                let result = link.call_value(&next, &func, value).await?;
                Ok(Some(json!({ "value": result })))
            }
        });
    }
}
