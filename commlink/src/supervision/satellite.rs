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
use std::future::Future;
use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use tracing::{info, instrument};

use super::LifecycleHandlers;
use crate::common::{CommLink, CommLinkError, Result};
use crate::message::{address, Body, HeaderPatch};
use crate::traits::Transport;

/// The client behind every satellite link: identity plus the cargo, which is
/// installed once `cargo_init` has finished.
#[derive(Debug)]
pub struct SatelliteState<Cargo> {
    service_name: String,
    hub_name: String,
    cargo: OnceLock<Arc<Cargo>>,
}

impl<Cargo> SatelliteState<Cargo> {
    /// This satellite's service name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The supervising hub's name.
    #[must_use]
    pub fn hub_name(&self) -> &str {
        &self.hub_name
    }

    /// The cargo, or `None` while `cargo_init` is still running.
    #[must_use]
    pub fn cargo(&self) -> Option<&Arc<Cargo>> {
        self.cargo.get()
    }
}

/// Link type of a satellite.
pub type SatelliteLink<Cargo> = CommLink<SatelliteState<Cargo>>;

/// Builds a satellite's cargo from its (not yet connected) link.
pub type CargoInit<Cargo> =
    Box<dyn FnOnce(SatelliteLink<Cargo>) -> BoxFuture<'static, anyhow::Result<Cargo>> + Send>;

/// Everything needed to start a satellite.
pub struct SatelliteDefinition<Cargo> {
    cargo_init: CargoInit<Cargo>,
    lifecycle: LifecycleHandlers<Cargo>,
}

impl<Cargo: Send + Sync + 'static> SatelliteDefinition<Cargo> {
    /// A definition whose cargo is produced by `cargo_init`.
    pub fn new<F, Fut>(cargo_init: F, lifecycle: LifecycleHandlers<Cargo>) -> Self
    where
        F: FnOnce(SatelliteLink<Cargo>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Cargo>> + Send + 'static,
    {
        Self {
            cargo_init: Box::new(move |link: SatelliteLink<Cargo>| -> BoxFuture<'static, anyhow::Result<Cargo>> {
                Box::pin(cargo_init(link))
            }),
            lifecycle,
        }
    }

    /// A definition with ready-made cargo.
    pub fn with_cargo(cargo: Cargo, lifecycle: LifecycleHandlers<Cargo>) -> Self {
        Self::new(move |_| async move { Ok(cargo) }, lifecycle)
    }
}

impl<Cargo> fmt::Debug for SatelliteDefinition<Cargo> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SatelliteDefinition")
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

/// A running satellite.
#[derive(Debug)]
pub struct SatelliteService<Cargo> {
    /// This satellite's service name.
    pub service_name: String,
    /// The supervising hub's name.
    pub hub_name: String,
    /// The satellite's link.
    pub comm_link: SatelliteLink<Cargo>,
    /// State produced by `cargo_init`.
    pub cargo: Arc<Cargo>,
}

impl<Cargo: Send + Sync + 'static> SatelliteService<Cargo> {
    /// Sends `body` to the hub.
    pub async fn send_hub(&self, body: Body) -> Result<()> {
        self.comm_link
            .send(address(body, HeaderPatch::new().to(self.hub_name.clone())))
            .await
    }

    /// Shuts the satellite's link down.
    pub async fn quit(&self) -> Result<()> {
        self.comm_link.quit().await
    }
}

/// Builds, initialises and connects a satellite.
///
/// The lifecycle handlers become client methods of the link. `cargo_init`
/// runs before the link subscribes, so the hub cannot reach the satellite
/// until its cargo exists.
///
/// # Errors
///
/// [`CommLinkError::CargoInit`] when `cargo_init` fails, or the error from
/// [`CommLink::connect`].
#[instrument(skip(definition, transport))]
pub async fn create_satellite_service<Cargo>(
    hub_name: &str,
    satellite_name: &str,
    definition: SatelliteDefinition<Cargo>,
    transport: Arc<dyn Transport>,
) -> Result<SatelliteService<Cargo>>
where
    Cargo: Send + Sync + 'static,
{
    let state = Arc::new(SatelliteState {
        service_name: satellite_name.to_string(),
        hub_name: hub_name.to_string(),
        cargo: OnceLock::new(),
    });

    let mut builder = CommLink::builder_shared(satellite_name, Arc::clone(&state));
    for (lifecycle, handler) in definition.lifecycle.into_handlers() {
        builder = builder.method(lifecycle.as_str(), move |state: Arc<SatelliteState<Cargo>>, arg| {
            let handler = Arc::clone(&handler);
            let cargo = state.cargo.get().cloned();
            async move {
                let cargo = cargo.ok_or_else(|| anyhow::anyhow!("{lifecycle} called before cargo was ready"))?;
                handler(cargo, arg).await
            }
        });
    }
    let comm_link = builder.build(transport);

    let cargo = (definition.cargo_init)(comm_link.clone())
        .await
        .map(Arc::new)
        .map_err(|e| CommLinkError::CargoInit(format!("{e:#}")))?;
    if state.cargo.set(Arc::clone(&cargo)).is_err() {
        return Err(CommLinkError::CargoInit("cargo installed twice".to_string()));
    }

    comm_link.connect().await?;
    info!("Satellite {satellite_name} ready for {hub_name}");

    Ok(SatelliteService {
        service_name: satellite_name.to_string(),
        hub_name: hub_name.to_string(),
        comm_link,
        cargo,
    })
}
