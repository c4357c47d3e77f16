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

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use crate::common::{CommLink, CommLinkError, Result, CONFIG};
use crate::message::{address, Body, HeaderPatch, Kind, MessageQuery};
use crate::traits::Transport;

/// Supervisor of an ordered set of satellites.
#[derive(Debug)]
pub struct ServiceHub {
    /// The hub's service name.
    pub name: String,
    /// The hub's link.
    pub comm_link: CommLink<()>,
    satellite_names: Vec<String>,
}

impl ServiceHub {
    /// Builds and connects a hub named `name` supervising `satellites`.
    pub async fn connect<I, S>(name: &str, satellites: I, transport: Arc<dyn Transport>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let comm_link = CommLink::builder(name, ()).build(transport);
        comm_link.connect().await?;
        let hub = Self {
            name: name.to_string(),
            comm_link,
            satellite_names: satellites.into_iter().map(Into::into).collect(),
        };
        debug!(hub = %hub.name, satellites = ?hub.satellite_names, "Hub connected");
        Ok(hub)
    }

    /// The supervised satellites, in order.
    #[must_use]
    pub fn satellite_names(&self) -> &[String] {
        &self.satellite_names
    }

    /// Pings every satellite until all have acknowledged.
    ///
    /// Never gives up on a satellite that does not answer; use
    /// [`add_satellite_services_with`](Self::add_satellite_services_with) to
    /// bound the wait.
    pub async fn add_satellite_services(&self) -> Result<()> {
        self.add_satellite_services_with(&CancellationToken::new())
            .await
    }

    /// Cancellable [`add_satellite_services`](Self::add_satellite_services).
    pub async fn add_satellite_services_with(&self, cancel: &CancellationToken) -> Result<()> {
        message_all_satellites(&self.comm_link, &self.satellite_names, Body::Ping, cancel).await?;
        info!(hub = %self.name, "All satellites up");
        Ok(())
    }

    /// Sends `quit` to every satellite until all have acknowledged.
    pub async fn shutdown_satellites(&self) -> Result<()> {
        self.shutdown_satellites_with(&CancellationToken::new())
            .await
    }

    /// Cancellable [`shutdown_satellites`](Self::shutdown_satellites).
    pub async fn shutdown_satellites_with(&self, cancel: &CancellationToken) -> Result<()> {
        message_all_satellites(&self.comm_link, &self.satellite_names, Body::Quit, cancel).await?;
        info!(hub = %self.name, "All satellites down");
        Ok(())
    }

    /// Shuts the hub's own link down.
    pub async fn quit(&self) -> Result<()> {
        self.comm_link.quit().await
    }
}

/// Sends `body` to every satellite in `satellite_names` not yet heard from,
/// every retry interval, until each has answered with the matching `ack`.
///
/// There is no retry limit. Fails with [`CommLinkError::Cancelled`] when
/// `cancel` fires first, or with the first send error.
#[instrument(skip(hub, satellite_names, cancel), fields(hub = hub.name(), kind = %body.kind()))]
pub async fn message_all_satellites<Client>(
    hub: &CommLink<Client>,
    satellite_names: &[String],
    body: Body,
    cancel: &CancellationToken,
) -> Result<()>
where
    Client: Send + Sync + 'static,
{
    let acked: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    hub.on(MessageQuery::any().kind(Kind::Ack).qual(body.kind().as_str()), {
        let acked = Arc::clone(&acked);
        move |_, ack| {
            trace!("Acknowledged by {}", ack.sender());
            acked.lock().insert(ack.sender().to_string());
            async { Ok(None) }
        }
    });

    let retry_interval = CONFIG.retry_interval();
    loop {
        let remaining: Vec<String> = {
            let acked = acked.lock();
            satellite_names
                .iter()
                .filter(|name| !acked.contains(*name))
                .cloned()
                .collect()
        };
        if remaining.is_empty() {
            return Ok(());
        }

        trace!(?remaining, "Messaging satellites");
        for name in remaining {
            hub.send(address(body.clone(), HeaderPatch::new().to(name)))
                .await?;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CommLinkError::Cancelled),
            () = tokio::time::sleep(retry_interval) => {}
        }
    }
}
