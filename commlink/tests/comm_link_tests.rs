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

use std::time::Duration;

use anyhow::anyhow;
use commlink::prelude::*;
use commlink_test::prelude::*;
use serde_json::json;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::setup::clients::{caller, calculator, Addends};
use crate::setup::initialize_tracing;

mod setup;

#[commlink_test]
async fn test_call_resolves_with_method_result() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let calc = calculator("calc", broker.transport());
    let client = caller("client", broker.transport());
    calc.connect().await?;
    client.connect().await?;

    let sum = client
        .call_value("calc", "add", json!({ "a": 2, "b": 40 }))
        .await?;
    assert_eq!(sum, json!({ "sum": 42 }));

    client.quit().await?;
    calc.quit().await?;
    Ok(())
}

#[commlink_test]
async fn test_call_on_own_client() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let calc = calculator("calc", broker.transport());
    calc.connect().await?;

    let echoed: Addends = calc.call("slow", &Addends { a: 1, b: 2 }).await?;
    assert_eq!(echoed, Addends { a: 1, b: 2 });

    calc.quit().await?;
    Ok(())
}

#[commlink_test]
async fn test_scalar_results_become_empty_objects() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let calc = calculator("calc", broker.transport());
    let client = caller("client", broker.transport());
    calc.connect().await?;
    client.connect().await?;

    let reply = client.call_value("calc", "noop", json!({})).await?;
    assert_eq!(reply, json!({}));

    client.quit().await?;
    calc.quit().await?;
    Ok(())
}

#[commlink_test]
async fn test_concurrent_calls_are_correlated() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let calc = calculator("calc", broker.transport());
    let client = caller("client", broker.transport());
    calc.connect().await?;
    client.connect().await?;

    let calls = (0..16).map(|n| {
        let client = client.clone();
        async move {
            let reply = client
                .call_value("calc", "slow", json!({ "n": n }))
                .await?;
            anyhow::Ok((n, reply))
        }
    });
    for outcome in futures::future::join_all(calls).await {
        let (n, reply) = outcome?;
        assert_eq!(reply, json!({ "n": n }));
    }

    client.quit().await?;
    calc.quit().await?;
    Ok(())
}

#[commlink_test]
async fn test_late_duplicate_replies_are_ignored() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let calc = calculator("calc", broker.transport());
    let client = caller("client", broker.transport());
    calc.connect().await?;
    client.connect().await?;

    let first = client.call_value("calc", "add", json!({ "a": 1, "b": 1 })).await?;
    assert_eq!(first, json!({ "sum": 2 }));

    // Correlation ids start at 1.
    calc.send(address(
        Body::creturn("add", json!({ "sum": -1 })),
        HeaderPatch::new().to("client").id(1),
    ))
    .await?;

    let second = client.call_value("calc", "add", json!({ "a": 2, "b": 2 })).await?;
    assert_eq!(second, json!({ "sum": 4 }));

    client.quit().await?;
    calc.quit().await?;
    Ok(())
}

#[commlink_test]
async fn test_quit_is_idempotent() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let link = caller("solo", broker.transport());
    link.connect().await?;
    assert_eq!(broker.subscriber_count("solo"), 1);

    link.quit().await?;
    link.quit().await?;
    assert!(link.is_shutdown());
    assert!(!link.is_connected().await);
    assert_eq!(broker.subscriber_count("solo"), 0);
    Ok(())
}

#[commlink_test]
async fn test_quit_without_connect() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let link = caller("never-connected", broker.transport());
    link.quit().await?;
    assert!(link.is_shutdown());
    Ok(())
}

#[commlink_test]
async fn test_send_after_quit_is_ignored() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let link = caller("quitter", broker.transport());
    link.connect().await?;
    link.quit().await?;

    let published = broker.published();
    link.send(address(Body::Ping, HeaderPatch::new().to("anyone")))
        .await?;
    assert_eq!(broker.published(), published);
    Ok(())
}

#[commlink_test]
async fn test_connect_errors() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();

    broker.set_available(false);
    let offline = caller("offline", broker.transport());
    assert!(matches!(
        offline.connect().await,
        Err(CommLinkError::Transport(_))
    ));
    broker.set_available(true);

    let link = caller("twice", broker.transport());
    link.connect().await?;
    assert!(matches!(
        link.connect().await,
        Err(CommLinkError::AlreadyConnected)
    ));

    link.quit().await?;
    assert!(matches!(link.connect().await, Err(CommLinkError::Shutdown)));
    Ok(())
}

#[commlink_test]
async fn test_reconnect_after_broker_closes_subscription() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let calc = calculator("calc", broker.transport());
    let client = caller("client", broker.transport());
    calc.connect().await?;
    client.connect().await?;

    broker.close_channel("calc");
    tokio::time::timeout(Duration::from_secs(5), async {
        while calc.is_connected().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    assert!(!calc.is_shutdown());

    calc.connect().await?;
    assert!(matches!(
        calc.connect().await,
        Err(CommLinkError::AlreadyConnected)
    ));
    let sum = client.call_value("calc", "add", json!({ "a": 3, "b": 4 })).await?;
    assert_eq!(sum, json!({ "sum": 7 }));

    client.quit().await?;
    calc.quit().await?;
    Ok(())
}

#[commlink_test]
async fn test_send_fails_when_broker_is_down() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let link = caller("sender", broker.transport());
    link.connect().await?;

    broker.set_available(false);
    let sent = link
        .send(address(Body::Ping, HeaderPatch::new().to("anyone")))
        .await;
    assert!(matches!(sent, Err(CommLinkError::Transport(_))));
    broker.set_available(true);

    link.quit().await?;
    Ok(())
}

#[commlink_test]
async fn test_ping_is_acknowledged() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let target = caller("target", broker.transport());
    let pinger = caller("pinger", broker.transport());
    target.connect().await?;
    pinger.connect().await?;

    let (ack_sender, ack_receiver) = oneshot::channel();
    let ack_sender = std::sync::Arc::new(parking_lot::Mutex::new(Some(ack_sender)));
    pinger.on(MessageQuery::any().kind(Kind::Ack).qual("ping"), move |_, ack| {
        if let Some(sender) = ack_sender.lock().take() {
            let _ = sender.send(ack);
        }
        async { Ok(None) }
    });

    pinger
        .send(address(Body::Ping, HeaderPatch::new().to("target").id(7)))
        .await?;
    let ack = tokio::time::timeout(Duration::from_secs(5), ack_receiver).await??;
    assert_eq!(ack.summary(), "target→pinger:ack/ping");
    assert_eq!(ack.id(), 7);

    pinger.quit().await?;
    target.quit().await?;
    Ok(())
}

#[commlink_test]
async fn test_remote_quit_shuts_the_target_down() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let target = caller("target", broker.transport());
    let boss = caller("boss", broker.transport());
    target.connect().await?;
    boss.connect().await?;

    boss.send(address(Body::Quit, HeaderPatch::new().to("target")))
        .await?;
    tokio::time::timeout(Duration::from_secs(5), async {
        while !target.is_shutdown() || broker.subscriber_count("target") > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    boss.quit().await?;
    Ok(())
}

#[commlink_test]
async fn test_yield_handlers_merge_in_registration_order() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let greeter = CommLink::builder("greeter", ())
        .method("greet", |_, _| async { Ok(json!({ "greeting": "hi", "who": "method" })) })
        .build(broker.transport());
    greeter.on(MessageQuery::any().kind(Kind::CYield), |_, _| async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(Some(json!({ "value": { "first": true, "who": "first" } })))
    });
    greeter.on(MessageQuery::any().kind(Kind::CYield), |_, _| async {
        Ok(Some(json!({ "value": { "who": "second" } })))
    });
    let client = caller("client", broker.transport());
    greeter.connect().await?;
    client.connect().await?;

    let reply = client.call_value("greeter", "greet", json!({})).await?;
    assert_eq!(
        reply,
        json!({ "greeting": "hi", "first": true, "who": "second" })
    );

    client.quit().await?;
    greeter.quit().await?;
    Ok(())
}

#[commlink_test]
async fn test_failing_handler_does_not_block_others() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let worker = CommLink::builder("worker", ())
        .method("work", |_, _| async { Ok(json!({ "done": true })) })
        .on(MessageQuery::any().kind(Kind::CYield), |_, _| async {
            Err(anyhow!("handler exploded"))
        })
        .build(broker.transport());
    assert_eq!(worker.handler_count(), 3);
    worker.on(MessageQuery::any().kind(Kind::CYield), |_, _| async {
        Ok(Some(json!({ "value": { "audited": true } })))
    });
    let client = caller("client", broker.transport());
    worker.connect().await?;
    client.connect().await?;

    let reply = client.call_value("worker", "work", json!({})).await?;
    assert_eq!(reply, json!({ "done": true, "audited": true }));

    client.quit().await?;
    worker.quit().await?;
    Ok(())
}

#[commlink_test]
async fn test_hanging_call_can_be_cancelled() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let calc = calculator("calc", broker.transport());
    let client = caller("client", broker.transport());
    calc.connect().await?;
    client.connect().await?;

    // A failing method never yields, so nothing ever answers.
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        }
    });
    let outcome = client
        .call_value_with("calc", "fail", json!({}), &cancel)
        .await;
    assert!(matches!(outcome, Err(CommLinkError::Cancelled)));

    let missing = CancellationToken::new();
    missing.cancel();
    let outcome = client
        .call_value_with("nobody", "anything", json!({}), &missing)
        .await;
    assert!(matches!(outcome, Err(CommLinkError::Cancelled)));

    client.quit().await?;
    calc.quit().await?;
    Ok(())
}

#[commlink_test]
async fn test_compact_and_json_formats_agree() -> anyhow::Result<()> {
    initialize_tracing();
    let message = address(
        Body::call("add", json!({ "a": 1, "b": 2 })),
        HeaderPatch::new().from("client").to("calc").id(3),
    );
    for format in [Format::Json, Format::Compact] {
        let wire = pack_with(&message, format)?;
        assert_eq!(unpack_with(&wire, format)?, message);
    }
    Ok(())
}
