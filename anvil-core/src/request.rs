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

//! `ExecutionRequest` and its nested shapes. Created by a host adapter, consumed
//! by the execution backend façade, never mutated after submission.

use crate::ids::{ExecutionId, PluginId, RequestId, TenantId};
use crate::manifest::PermissionSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKind {
    Cli,
    Http,
    Scheduled,
    Webhook,
    Workflow,
    Invoke,
}

/// The part of a request passed unchanged to the runner and exposed to the handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub host: HostKind,
    pub plugin_id: PluginId,
    pub plugin_version: String,
    pub request_id: RequestId,
    pub tenant_id: Option<TenantId>,
    pub permissions: PermissionSpec,
    /// Host-specific context (CLI argv/flags, HTTP method/path, webhook payload, …) — opaque
    /// to the core, interpreted only by the handler and the host adapter that produced it.
    pub host_context: serde_json::Value,
    pub config: Option<serde_json::Value>,
    pub parent_request_id: Option<RequestId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceKind {
    Local,
    Ephemeral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSpec {
    pub kind: WorkspaceKind,
    pub cwd: PathBuf,
    pub repo: Option<String>,
    pub git_ref: Option<String>,
    pub commit: Option<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    pub snapshot_id: Option<String>,
}

impl WorkspaceSpec {
    pub fn local(cwd: PathBuf) -> Self {
        Self {
            kind: WorkspaceKind::Local,
            cwd,
            repo: None,
            git_ref: None,
            commit: None,
            include: Vec::new(),
            exclude: Vec::new(),
            snapshot_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactsSpec {
    pub outdir: Option<PathBuf>,
    #[serde(default)]
    pub upload: bool,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub execution_id: ExecutionId,
    pub descriptor: Descriptor,
    pub plugin_root: PathBuf,
    pub handler_ref_file: String,
    pub export_name: Option<String>,
    pub input: serde_json::Value,
    pub workspace: WorkspaceSpec,
    pub artifacts: ArtifactsSpec,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl ExecutionRequest {
    pub fn effective_export(&self) -> &str {
        self.export_name.as_deref().unwrap_or("execute")
    }
}
