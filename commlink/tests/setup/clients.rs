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

//! Sample services shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use commlink::prelude::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Arguments of `calculator.add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addends {
    pub a: i64,
    pub b: i64,
}

/// A link exposing `add`, `noop` (returns nothing useful), `fail` and `slow`.
pub fn calculator(name: &str, transport: Arc<dyn Transport>) -> CommLink<()> {
    CommLink::builder(name, ())
        .method("add", |_, arg| async move {
            let Addends { a, b } = serde_json::from_value(arg)?;
            Ok(json!({ "sum": a + b }))
        })
        .method("noop", |_, _| async { Ok(Value::Null) })
        .method("fail", |_, _| async { Err(anyhow!("refusing to work")) })
        .method("slow", |_, arg| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(arg)
        })
        .build(transport)
}

/// A link with no client methods.
pub fn caller(name: &str, transport: Arc<dyn Transport>) -> CommLink<()> {
    CommLink::builder(name, ()).build(transport)
}

/// A link whose `run` returns its argument unchanged.
pub fn pass_through(name: &str, transport: Arc<dyn Transport>) -> CommLink<String> {
    CommLink::builder(name, name.to_string())
        .method("run", |_, arg| async move { Ok(arg) })
        .build(transport)
}

/// A link whose `run` appends its own name to `arg.callees`.
pub fn appender(name: &str, transport: Arc<dyn Transport>) -> CommLink<String> {
    CommLink::builder(name, name.to_string())
        .method("run", |me: Arc<String>, mut arg: Value| async move {
            let callees = arg
                .get_mut("callees")
                .and_then(Value::as_array_mut)
                .ok_or_else(|| anyhow!("run expects a callees list"))?;
            callees.push(json!(me.as_str()));
            Ok(arg)
        })
        .build(transport)
}

/// Shared record of the messages seen by recorder handlers.
pub type ExchangeLog = Arc<Mutex<Vec<Message>>>;

/// Records every message `link` receives into `log`.
pub fn record_exchanges<Client>(link: &CommLink<Client>, log: &ExchangeLog)
where
    Client: Send + Sync + 'static,
{
    let log = Arc::clone(log);
    link.on(MessageQuery::any(), move |_, message| {
        log.lock().push(message);
        async { Ok(None) }
    });
}

/// Renders `message` from the receiving side, `recipient→sender:kind[/qual]`,
/// so a ping the hub sends to `service-1` reads `service-1→Hub:ping`.
pub fn as_received(message: &Message) -> String {
    match message.qual() {
        Some(qual) => format!("{}→{}:{}/{}", message.recipient(), message.sender(), message.kind(), qual),
        None => format!("{}→{}:{}", message.recipient(), message.sender(), message.kind()),
    }
}
