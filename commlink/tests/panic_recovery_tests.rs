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

//! Panics in handlers and client methods are caught and logged.
//!
//! These tests use `#[tokio::test]` instead of `#[commlink_test]` because the
//! `commlink_test` macro's panic detection would fail the test when a panic
//! is raised on purpose to check that the link survives it.

use std::future::Ready;
use std::time::Duration;

use commlink::prelude::*;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::setup::clients::caller;
use crate::setup::initialize_tracing;

mod setup;

/// A link whose `work` method answers `{done: true}` and whose `explode`
/// method panics.
fn volatile_worker(broker: &MemoryBroker) -> CommLink<()> {
    CommLink::builder("worker", ())
        .method("work", |_, _| async { Ok(json!({ "done": true })) })
        .method("explode", |_, _| async {
            panic!("Intentional test panic in client method");
            #[allow(unreachable_code)]
            Ok(Value::Null)
        })
        .build(broker.transport())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_panicking_yield_handler_counts_as_no_mod() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let worker = volatile_worker(&broker);
    worker.on(MessageQuery::any().kind(Kind::CYield), |_, _| async {
        panic!("Intentional test panic in yield handler");
        #[allow(unreachable_code)]
        Ok(None)
    });
    worker.on(MessageQuery::any().kind(Kind::CYield), |_, _| async {
        Ok(Some(json!({ "value": { "b": 1 } })))
    });
    let client = caller("client", broker.transport());
    worker.connect().await?;
    client.connect().await?;

    let reply = client.call_value("worker", "work", json!({})).await?;
    assert_eq!(reply, json!({ "done": true, "b": 1 }));

    client.quit().await?;
    worker.quit().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_handler_panicking_before_its_future_is_caught() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let worker = volatile_worker(&broker);
    worker.on(
        MessageQuery::any().kind(Kind::CYield),
        |_, _| -> Ready<anyhow::Result<Option<Value>>> {
            panic!("Intentional test panic while building a handler future");
        },
    );
    let client = caller("client", broker.transport());
    worker.connect().await?;
    client.connect().await?;

    let reply = client.call_value("worker", "work", json!({})).await?;
    assert_eq!(reply, json!({ "done": true }));

    client.quit().await?;
    worker.quit().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_link_keeps_serving_after_method_panic() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let worker = volatile_worker(&broker);
    let client = caller("client", broker.transport());
    worker.connect().await?;
    client.connect().await?;

    // A panicking method yields nothing, so the call can only be abandoned.
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        }
    });
    let exploded = client
        .call_value_with("worker", "explode", json!({}), &cancel)
        .await;
    assert!(matches!(exploded, Err(CommLinkError::Cancelled)));

    let reply = client.call_value("worker", "work", json!({})).await?;
    assert_eq!(reply, json!({ "done": true }));
    assert!(worker.is_connected().await);

    client.quit().await?;
    worker.quit().await?;
    Ok(())
}
