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

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{Method, MethodFuture};

/// The reserved satellite method names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Prepare for work.
    Startup,
    /// Release resources.
    Shutdown,
    /// Perform one unit of work.
    Step,
    /// Perform work until done.
    Run,
}

impl Lifecycle {
    /// Every lifecycle name, in declaration order.
    pub const ALL: [Self; 4] = [Self::Startup, Self::Shutdown, Self::Step, Self::Run];

    /// The method name a hub calls.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Step => "step",
            Self::Run => "run",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implementations of the [`Lifecycle`] methods, given the satellite's cargo
/// and the call argument. Lifecycle names left unset are not callable.
pub struct LifecycleHandlers<Cargo> {
    handlers: BTreeMap<Lifecycle, Arc<Method<Cargo>>>,
}

impl<Cargo> Default for LifecycleHandlers<Cargo> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<Cargo> fmt::Debug for LifecycleHandlers<Cargo> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl<Cargo: Send + Sync + 'static> LifecycleHandlers<Cargo> {
    /// No handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handler for `lifecycle`, replacing any earlier one.
    #[must_use]
    pub fn on<F, Fut>(mut self, lifecycle: Lifecycle, handler: F) -> Self
    where
        F: Fn(Arc<Cargo>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: Arc<Method<Cargo>> =
            Arc::new(move |cargo: Arc<Cargo>, arg: Value| -> MethodFuture {
                Box::pin(handler(cargo, arg))
            });
        self.handlers.insert(lifecycle, handler);
        self
    }

    /// Whether `lifecycle` has a handler.
    #[must_use]
    pub fn contains(&self, lifecycle: Lifecycle) -> bool {
        self.handlers.contains_key(&lifecycle)
    }

    pub(crate) fn into_handlers(self) -> impl Iterator<Item = (Lifecycle, Arc<Method<Cargo>>)> {
        self.handlers.into_iter()
    }
}
