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

//! Shared data model, error taxonomy, and ambient config/tracing support for the anvil
//! plugin execution substrate. Every other crate in the workspace depends on this one; it
//! depends on nothing else in the workspace.

pub mod chain;
pub mod config;
pub mod error;
pub mod ids;
pub mod manifest;
pub mod request;
pub mod result;
pub mod tracing_init;

pub use error::{ErrorEnvelope, ErrorKind, PluginError};
pub use ids::{ExecutionId, PluginId, RequestId, TenantId, TraceContext, WorkerId, WorkspaceId};
pub use manifest::{HandlerRef, Manifest, ManifestRegistry, PermissionSpec};
pub use request::{Descriptor, ExecutionRequest, HostKind, WorkspaceSpec};
pub use result::{BackendMetadata, ExecutionMeta, HandlerOutput, RunResult};
