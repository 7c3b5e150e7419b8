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

//! Manifest and permission data model. The manifest itself is an external input —
//! parsing and validating it from its on-disk representation is out of scope — but the
//! core needs a stable in-memory shape to reason about permissions, quotas, and capabilities.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// `(file, export)` — constructed from a manifest, passed by value, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerRef {
    pub file: String,
    pub export: String,
}

impl HandlerRef {
    pub fn new(file: impl Into<String>, export: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            export: export.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsMode {
    None,
    Read,
    Write,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FsPermission {
    pub mode: Option<FsMode>,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetPermission {
    /// `None` means network access is disabled entirely.
    pub enabled: bool,
    #[serde(default)]
    pub allow_hosts: Vec<String>,
    #[serde(default)]
    pub deny_hosts: Vec<String>,
    #[serde(default)]
    pub allow_cidrs: Vec<String>,
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvPermission {
    #[serde(default)]
    pub allow: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellPermission {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub require_confirmation: Vec<String>,
    pub max_concurrent: Option<u32>,
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSubmitPermission {
    /// `None` means `own-plugin` (the default scope).
    pub allow: Option<Vec<String>>,
    #[serde(default, with = "humantime_serde::option")]
    pub max_duration: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub min_interval: Option<Duration>,
    pub per_minute: Option<u32>,
    pub per_hour: Option<u32>,
    pub per_day: Option<u32>,
    pub max_concurrent: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsPermission {
    #[serde(default)]
    pub submit: JobSubmitPermission,
    #[serde(default)]
    pub schedule: JobSubmitPermission,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatePermission {
    #[serde(default)]
    pub namespaces: HashMap<String, StateNamespacePermission>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StateNamespacePermission {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSpec {
    pub timeout_ms: u64,
    pub cpu_ms: Option<u64>,
    pub memory_mb: Option<u64>,
}

impl Default for QuotaSpec {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            cpu_ms: None,
            memory_mb: None,
        }
    }
}

/// Invoke permission: which plugins a handler is allowed to reach through the invoke broker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokePermission {
    #[serde(default)]
    pub allow: Vec<String>,
}

/// A record enumerating, per resource class, what is allowed. Normalization (deny wins,
/// default deny) happens in `anvil-sandbox`; this type is the pure data the sandbox consults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionSpec {
    #[serde(default)]
    pub filesystem: FsPermission,
    #[serde(default)]
    pub network: NetPermission,
    #[serde(default)]
    pub environment: EnvPermission,
    #[serde(default)]
    pub shell: ShellPermission,
    #[serde(default)]
    pub jobs: JobsPermission,
    #[serde(default)]
    pub state: StatePermission,
    #[serde(default)]
    pub invoke: InvokePermission,
    #[serde(default)]
    pub quotas: QuotaSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarmupMode {
    None,
    Marked,
    TopN,
}

impl Default for WarmupMode {
    fn default() -> Self {
        WarmupMode::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerMetadata {
    pub handler_ref: HandlerRef,
    #[serde(default)]
    pub warmup: bool,
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub artifacts: Option<ArtifactSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSpec {
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub upload: bool,
}

/// Identifies a plugin and declares its permissions, capabilities, quotas, and handler
/// metadata. Treated as an immutable input by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub permissions: PermissionSpec,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub handlers: HashMap<String, HandlerMetadata>,
}

impl Manifest {
    pub fn plugin_id(&self) -> super::ids::PluginId {
        super::ids::PluginId(self.id.clone())
    }

    pub fn handler(&self, name: &str) -> Option<&HandlerMetadata> {
        self.handlers.get(name)
    }
}

/// Resolves a plugin id to its manifest and a handler file to an absolute path. Manifest
/// parsing itself lives outside the core; this trait is the seam the core depends on.
pub trait ManifestRegistry: Send + Sync {
    fn manifest(&self, plugin_id: &str) -> Option<Manifest>;
    fn plugin_root(&self, plugin_id: &str) -> Option<std::path::PathBuf>;
}

#[cfg(feature = "testing")]
pub mod testing {
    use super::*;
    use std::collections::HashMap as Map;
    use std::path::PathBuf;
    use std::sync::RwLock;

    /// In-memory manifest registry used by the core's own tests and by host adapter tests.
    #[derive(Default)]
    pub struct FixtureRegistry {
        entries: RwLock<Map<String, (Manifest, PathBuf)>>,
    }

    impl FixtureRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, manifest: Manifest, plugin_root: PathBuf) {
            self.entries
                .write()
                .unwrap()
                .insert(manifest.id.clone(), (manifest, plugin_root));
        }
    }

    impl ManifestRegistry for FixtureRegistry {
        fn manifest(&self, plugin_id: &str) -> Option<Manifest> {
            self.entries.read().unwrap().get(plugin_id).map(|(m, _)| m.clone())
        }

        fn plugin_root(&self, plugin_id: &str) -> Option<PathBuf> {
            self.entries.read().unwrap().get(plugin_id).map(|(_, p)| p.clone())
        }
    }
}
