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

//! HTTP host: maps method/path/query/body into a `RestHostContext`, and wraps a
//! finished execution into a status + header set + body a thin HTTP layer can emit
//! without knowing anything about the execution substrate.

use crate::descriptor::{build_descriptor, error_envelope, SuccessFields};
use anvil_core::request::{Descriptor, HostKind};
use anvil_core::PluginError;
use anvil_exec::OrchestratorOutcome;
use serde_json::Value;

use crate::descriptor::DescriptorArgs;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RestHostContext {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query: Value,
    #[serde(default)]
    pub body: Value,
}

impl RestHostContext {
    fn into_value(self) -> Value {
        serde_json::json!({
            "method": self.method,
            "path": self.path,
            "query": self.query,
            "body": self.body,
        })
    }
}

pub fn rest_descriptor(args: DescriptorArgs, context: RestHostContext) -> Descriptor {
    build_descriptor(HostKind::Http, args, context.into_value())
}

/// The canonical header set for an HTTP host response: `X-Plugin-Id`, `X-Plugin-Version`,
/// `X-Request-Id`, `X-Duration-Ms`, and the optional `X-Handler-Id` / `X-Tenant-Id`.
pub struct RestResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

fn common_headers(plugin_id: &str, plugin_version: &str, request_id: &str, duration_ms: u128) -> Vec<(String, String)> {
    vec![
        ("X-Plugin-Id".to_string(), plugin_id.to_string()),
        ("X-Plugin-Version".to_string(), plugin_version.to_string()),
        ("X-Request-Id".to_string(), request_id.to_string()),
        ("X-Duration-Ms".to_string(), duration_ms.to_string()),
    ]
}

pub fn rest_response_for_success(outcome: &OrchestratorOutcome) -> RestResponse {
    let fields = SuccessFields::from_outcome(outcome);
    let mut headers = common_headers(fields.plugin_id, fields.plugin_version, &fields.request_id, fields.duration_ms);
    if let Some(handler_id) = fields.handler_id {
        headers.push(("X-Handler-Id".to_string(), handler_id.to_string()));
    }
    if let Some(tenant_id) = fields.tenant_id {
        headers.push(("X-Tenant-Id".to_string(), tenant_id));
    }
    RestResponse { status: 200, headers, body: fields.data.clone() }
}

/// Error kinds map to status codes per the shared taxonomy (`ErrorKind::http_status`);
/// this adapter only adds the envelope shape and content framing.
pub fn rest_response_for_error(error: PluginError) -> RestResponse {
    let envelope = error_envelope(error);
    RestResponse {
        status: envelope.http,
        headers: Vec::new(),
        body: serde_json::to_value(&envelope).unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::ids::{PluginId, RequestId};
    use anvil_core::{ErrorKind, ExecutionMeta, RunResult};
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn success_response_carries_canonical_headers() {
        let now = Utc::now();
        let outcome = OrchestratorOutcome {
            result: RunResult {
                data: serde_json::json!({"ok": true}),
                execution_meta: ExecutionMeta {
                    start_time: now,
                    end_time: now,
                    duration: Duration::from_millis(12),
                    plugin_id: PluginId::from("demo"),
                    plugin_version: "1.2.0".to_string(),
                    handler_id: Some("execute".to_string()),
                    request_id: RequestId::new(),
                    tenant_id: None,
                },
            },
            metadata: anvil_core::BackendMetadata { backend: "in-process".to_string(), worker_id: None, workspace_id: "ws".to_string() },
            artifacts: Vec::new(),
            insights: Vec::new(),
        };

        let response = rest_response_for_success(&outcome);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, serde_json::json!({"ok": true}));
        assert!(response.headers.iter().any(|(k, v)| k == "X-Plugin-Id" && v == "demo"));
        assert!(response.headers.iter().any(|(k, v)| k == "X-Plugin-Version" && v == "1.2.0"));
        assert!(response.headers.iter().any(|(k, _)| k == "X-Handler-Id"));
        assert!(!response.headers.iter().any(|(k, _)| k == "X-Tenant-Id"));
    }

    #[test]
    fn error_response_status_follows_the_error_taxonomy() {
        let error = PluginError::new(ErrorKind::HandlerNotFound, "no such handler");
        let response = rest_response_for_error(error);
        assert_eq!(response.status, 404);
        assert_eq!(response.body["code"], serde_json::json!("HANDLER_NOT_FOUND"));
    }
}
