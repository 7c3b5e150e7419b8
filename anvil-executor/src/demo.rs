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

//! Stand-in manifest registry for this binary. Manifest parsing and plugin discovery
//! are external collaborators this workspace never implements; a real deployment
//! supplies its own `ManifestRegistry` wired up the same way this one is.

use anvil_core::manifest::testing::FixtureRegistry;
use anvil_core::manifest::{HandlerMetadata, Manifest, PermissionSpec};
use anvil_core::HandlerRef;
use std::collections::HashMap;

fn handler(file: &str) -> HandlerMetadata {
    HandlerMetadata {
        handler_ref: HandlerRef::new(file, "execute"),
        warmup: false,
        input_schema: None,
        output_schema: None,
        artifacts: None,
    }
}

pub fn registry() -> FixtureRegistry {
    let fixtures = FixtureRegistry::new();

    let mut handlers = HashMap::new();
    handlers.insert("execute".to_string(), handler("handlers/echo"));
    fixtures.insert(
        Manifest {
            id: "demo".to_string(),
            version: "1.0.0".to_string(),
            permissions: PermissionSpec::default(),
            capabilities: Vec::new(),
            handlers,
        },
        std::env::temp_dir(),
    );

    fixtures
}
