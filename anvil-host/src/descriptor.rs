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

//! Shared plumbing every host adapter uses to build a [`Descriptor`] and turn a
//! finished [`OrchestratorOutcome`] (or the [`PluginError`] it failed with) into the
//! handful of fields every host response needs.

use anvil_core::ids::{PluginId, RequestId, TenantId};
use anvil_core::manifest::PermissionSpec;
use anvil_core::request::{Descriptor, HostKind};
use anvil_core::{ErrorEnvelope, PluginError};
use anvil_exec::OrchestratorOutcome;

/// Arguments common to every host: which plugin/version/tenant is being invoked and
/// under which permission grant, independent of how the host itself is shaped.
pub struct DescriptorArgs {
    pub plugin_id: PluginId,
    pub plugin_version: String,
    pub request_id: RequestId,
    pub tenant_id: Option<TenantId>,
    pub permissions: PermissionSpec,
    pub config: Option<serde_json::Value>,
    pub parent_request_id: Option<RequestId>,
}

pub fn build_descriptor(host: HostKind, args: DescriptorArgs, host_context: serde_json::Value) -> Descriptor {
    Descriptor {
        host,
        plugin_id: args.plugin_id,
        plugin_version: args.plugin_version,
        request_id: args.request_id,
        tenant_id: args.tenant_id,
        permissions: args.permissions,
        host_context,
        config: args.config,
        parent_request_id: args.parent_request_id,
    }
}

/// Fields every adapter needs out of a successful execution, independent of how it
/// gets serialized on the wire.
pub struct SuccessFields<'a> {
    pub data: &'a serde_json::Value,
    pub plugin_id: &'a str,
    pub plugin_version: &'a str,
    pub request_id: String,
    pub tenant_id: Option<String>,
    pub handler_id: Option<&'a str>,
    pub duration_ms: u128,
}

impl<'a> SuccessFields<'a> {
    pub fn from_outcome(outcome: &'a OrchestratorOutcome) -> Self {
        let meta = &outcome.result.execution_meta;
        Self {
            data: &outcome.result.data,
            plugin_id: meta.plugin_id.0.as_str(),
            plugin_version: meta.plugin_version.as_str(),
            request_id: meta.request_id.to_string(),
            tenant_id: meta.tenant_id.as_ref().map(|t| t.0.clone()),
            handler_id: meta.handler_id.as_deref(),
            duration_ms: meta.duration.as_millis(),
        }
    }
}

/// Normalizes a failed execution into the envelope every host adapter serializes
/// the same way, regardless of transport.
pub fn error_envelope(error: PluginError) -> ErrorEnvelope {
    ErrorEnvelope::from_plugin_error(error, None)
}
