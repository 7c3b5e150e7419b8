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

//! Handler registry: `(file, export)` keyed lookup into an already-linked table of
//! native handler functions, standing in for the source's dynamic-module-load step.

use crate::context::ExecutionContext;
use anvil_core::{HandlerOutput, PluginError};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

pub type HandlerFn = Arc<dyn Fn(&mut ExecutionContext, Value) -> BoxFuture<'_, Result<HandlerOutput, PluginError>> + Send + Sync>;

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Arc<DashMap<(String, String), HandlerFn>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, file: impl Into<String>, export: impl Into<String>, handler: HandlerFn) {
        self.handlers.insert((file.into(), export.into()), handler);
    }

    pub fn lookup(&self, file: &str, export: &str) -> Option<HandlerFn> {
        self.handlers.get(&(file.to_string(), export.to_string())).map(|entry| entry.clone())
    }

    /// True if any export is registered under `file`, regardless of which export. Used
    /// to distinguish a missing handler module (`HANDLER_NOT_FOUND`) from a module that
    /// exists but lacks the requested export (`HANDLER_CONTRACT_ERROR`).
    pub fn has_file(&self, file: &str) -> bool {
        self.handlers.iter().any(|entry| entry.key().0 == file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_misses_return_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.lookup("handlers/echo", "execute").is_none());
    }

    #[test]
    fn registered_handler_is_found_by_exact_key() {
        let registry = HandlerRegistry::new();
        registry.register("handlers/echo", "execute", Arc::new(|_ctx, input| Box::pin(async move { Ok(HandlerOutput::Raw(input)) })));
        assert!(registry.lookup("handlers/echo", "execute").is_some());
        assert!(registry.lookup("handlers/echo", "other").is_none());
    }

    #[test]
    fn has_file_is_true_for_any_registered_export_under_that_file() {
        let registry = HandlerRegistry::new();
        assert!(!registry.has_file("handlers/echo"));
        registry.register("handlers/echo", "execute", Arc::new(|_ctx, input| Box::pin(async move { Ok(HandlerOutput::Raw(input)) })));
        assert!(registry.has_file("handlers/echo"));
        assert!(registry.lookup("handlers/echo", "other_export").is_none());
        assert!(registry.has_file("handlers/echo"));
    }
}
