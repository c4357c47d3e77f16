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

use commlink::prelude::*;
use commlink_test::prelude::*;
use serde_json::json;

use crate::setup::clients::{appender, caller, pass_through};
use crate::setup::initialize_tracing;

mod setup;

#[commlink_test]
async fn test_three_services_chain_concurrently() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let links = vec![
        pass_through("service-0", broker.transport()),
        appender("service-1", broker.transport()),
        appender("service-2", broker.transport()),
    ];
    chain_services("run", &links);
    for link in &links {
        link.connect().await?;
    }

    let first = &links[0];
    let (zero, one) = tokio::join!(
        first.call_value("service-0", "run", json!({ "callees": [], "which": 0 })),
        first.call_value("service-0", "run", json!({ "callees": [], "which": 1 })),
    );
    assert_eq!(zero?, json!({ "callees": ["service-1", "service-2"], "which": 0 }));
    assert_eq!(one?, json!({ "callees": ["service-1", "service-2"], "which": 1 }));

    for link in &links {
        link.quit().await?;
    }
    Ok(())
}

#[commlink_test]
async fn test_chain_is_driven_from_an_outside_caller() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let links = vec![
        appender("stage-a", broker.transport()),
        appender("stage-b", broker.transport()),
    ];
    chain_services("run", &links);
    let client = caller("client", broker.transport());
    for link in &links {
        link.connect().await?;
    }
    client.connect().await?;

    let reply = client
        .call_value("stage-a", "run", json!({ "callees": ["client"] }))
        .await?;
    assert_eq!(reply, json!({ "callees": ["client", "stage-a", "stage-b"] }));

    client.quit().await?;
    for link in &links {
        link.quit().await?;
    }
    Ok(())
}

#[commlink_test]
async fn test_chain_ignores_other_functions() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let head = CommLink::builder("head", ())
        .method("run", |_, arg| async move { Ok(arg) })
        .method("status", |_, _| async { Ok(json!({ "status": "head" })) })
        .build(broker.transport());
    let tail = CommLink::builder("tail", ())
        .method("run", |_, _| async { Ok(json!({ "ran": "tail" })) })
        .build(broker.transport());
    let links = vec![head, tail];
    chain_services("run", &links);
    for link in &links {
        link.connect().await?;
    }

    let status = links[0].call_value("head", "status", json!({})).await?;
    assert_eq!(status, json!({ "status": "head" }));
    let ran = links[0].call_value("head", "run", json!({})).await?;
    assert_eq!(ran, json!({ "ran": "tail" }));

    for link in &links {
        link.quit().await?;
    }
    Ok(())
}
