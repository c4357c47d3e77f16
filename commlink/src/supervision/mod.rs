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

//! Hub/satellite supervision.
//!
//! A [`ServiceHub`] supervises a fixed, ordered set of satellites. It brings
//! them up by pinging until every one has acknowledged, and takes them down
//! the same way with `quit`. Satellites carry application state ("cargo")
//! built before they subscribe, and expose the reserved [`Lifecycle`] methods
//! that the hub invokes with ordinary calls.

mod hub;
mod lifecycle;
mod satellite;

pub use hub::{message_all_satellites, ServiceHub};
pub use lifecycle::{Lifecycle, LifecycleHandlers};
pub use satellite::{
    create_satellite_service, CargoInit, SatelliteDefinition, SatelliteLink, SatelliteService,
    SatelliteState,
};
