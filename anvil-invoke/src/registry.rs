// Copyright 2026 Anvil Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Resolves a plugin id to the execution backend that should serve its invocations.
//! The broker depends only on the trait; a host binary wires up the concrete mapping
//! (one backend per plugin, or a shared one for every plugin running the same mode).

use anvil_exec::ExecutionBackend;
use dashmap::DashMap;
use std::sync::Arc;

pub trait PluginBackendRegistry: Send + Sync {
    fn backend_for(&self, plugin_id: &str) -> Option<Arc<dyn ExecutionBackend>>;
}

#[derive(Default)]
pub struct InMemoryBackendRegistry {
    backends: DashMap<String, Arc<dyn ExecutionBackend>>,
}

impl InMemoryBackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, plugin_id: impl Into<String>, backend: Arc<dyn ExecutionBackend>) {
        self.backends.insert(plugin_id.into(), backend);
    }
}

impl PluginBackendRegistry for InMemoryBackendRegistry {
    fn backend_for(&self, plugin_id: &str) -> Option<Arc<dyn ExecutionBackend>> {
        self.backends.get(plugin_id).map(|entry| entry.clone())
    }
}
