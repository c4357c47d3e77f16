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

//! A hub supervising three satellites over the in-process broker.
//!
//! ```text
//! cargo run --example hub_satellites
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use commlink::prelude::*;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Stand-in for a pooled resource acquired before a satellite is ready.
#[derive(Debug)]
struct Pool {
    name: String,
    jobs: AtomicUsize,
}

fn lifecycle() -> LifecycleHandlers<Pool> {
    LifecycleHandlers::new()
        .on(Lifecycle::Startup, |pool: Arc<Pool>, _| async move {
            info!("{} starting", pool.name);
            Ok(json!({ "ready": true }))
        })
        .on(Lifecycle::Run, |pool: Arc<Pool>, arg| async move {
            let jobs = pool.jobs.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "worker": pool.name, "job": arg, "jobs": jobs }))
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("commlink=info".parse()?))
        .init();

    let broker = MemoryBroker::new();
    let names = ["service-0", "service-1", "service-2"];
    let hub = ServiceHub::connect("Hub", names, broker.transport()).await?;

    for name in names {
        let definition = SatelliteDefinition::new(
            move |_link| async move {
                Ok(Pool {
                    name: name.to_string(),
                    jobs: AtomicUsize::new(0),
                })
            },
            lifecycle(),
        );
        create_satellite_service("Hub", name, definition, broker.transport()).await?;
    }

    hub.add_satellite_services().await?;
    for name in names {
        hub.comm_link.call_value(name, "startup", json!({})).await?;
        let result = hub
            .comm_link
            .call_value(name, "run", json!({ "task": "index" }))
            .await?;
        println!("{name}: {result}");
    }
    hub.shutdown_satellites().await?;
    hub.quit().await?;
    Ok(())
}
