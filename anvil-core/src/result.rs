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

//! `RunResult` and friends. Errors are never represented as a success value here —
//! the runner returns `Result<RunResult<T>, PluginError>`, and the orchestrator is the
//! only place that turns a `PluginError` into a serialized `ErrorEnvelope`.

use crate::ids::{PluginId, RequestId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMeta {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub plugin_id: PluginId,
    pub plugin_version: String,
    pub handler_id: Option<String>,
    pub request_id: RequestId,
    pub tenant_id: Option<TenantId>,
}

/// `{data, executionMeta}` — what the runner hands back to the façade on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult<T = serde_json::Value> {
    pub data: T,
    pub execution_meta: ExecutionMeta,
}

/// A handler may return raw data, or explicitly shape its return as
/// `{exitCode, result, meta?}`; the runner keeps whichever shape it receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandlerOutput {
    Shaped {
        exit_code: i32,
        result: serde_json::Value,
        meta: Option<serde_json::Value>,
    },
    Raw(serde_json::Value),
}

impl HandlerOutput {
    pub fn into_data(self) -> serde_json::Value {
        match self {
            HandlerOutput::Shaped { result, .. } => result,
            HandlerOutput::Raw(value) => value,
        }
    }
}

/// Backend-level metadata attached to every façade result: which backend served the
/// request, which worker (if any), and which workspace was leased.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendMetadata {
    pub backend: String,
    pub worker_id: Option<String>,
    pub workspace_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_output_raw_is_kept_as_data() {
        let out = HandlerOutput::Raw(serde_json::json!({"echo": "hi"}));
        assert_eq!(out.into_data(), serde_json::json!({"echo": "hi"}));
    }

    #[test]
    fn handler_output_shaped_keeps_result_field() {
        let out = HandlerOutput::Shaped {
            exit_code: 0,
            result: serde_json::json!({"ok": true}),
            meta: None,
        };
        assert_eq!(out.into_data(), serde_json::json!({"ok": true}));
    }
}
