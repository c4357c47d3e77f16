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

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::common::Method;

/// Client methods callable by name through `call`.
///
/// Built once while constructing a link and read-only afterwards.
pub struct MethodRegistry<Client> {
    methods: HashMap<String, Arc<Method<Client>>>,
}

impl<Client> Default for MethodRegistry<Client> {
    fn default() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }
}

impl<Client> fmt::Debug for MethodRegistry<Client> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.methods.keys().collect();
        names.sort();
        f.debug_struct("MethodRegistry").field("methods", &names).finish()
    }
}

impl<Client> MethodRegistry<Client> {
    /// Registers `method` under `name`, replacing any earlier registration.
    pub fn insert(&mut self, name: impl Into<String>, method: Arc<Method<Client>>) {
        self.methods.insert(name.into(), method);
    }

    /// Looks up a method by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Method<Client>>> {
        self.methods.get(name).cloned()
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether no methods are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
