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

//! Parent ↔ child control messages for the subprocess runner, carried as
//! newline-delimited JSON over stdin/stdout of the spawned child.

use anvil_core::ids::{PluginId, RequestId, TenantId};
use anvil_core::{ErrorEnvelope, HandlerOutput};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParentMessage {
    Execute {
        plugin_id: PluginId,
        plugin_version: String,
        request_id: RequestId,
        tenant_id: Option<TenantId>,
        parent_trace: Option<(String, String)>,
        handler_path: String,
        handler_export: String,
        input: Value,
        socket_path: String,
        cwd: Option<String>,
        outdir: Option<String>,
    },
    Health,
    Abort,
    Shutdown { graceful: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChildMessage {
    Ready,
    HealthOk,
    Result {
        exit_code: i32,
        result: Value,
        meta: Option<Value>,
    },
    Error {
        error: ErrorEnvelope,
    },
}

impl ChildMessage {
    pub fn from_output(output: HandlerOutput) -> Self {
        match output {
            HandlerOutput::Shaped { exit_code, result, meta } => ChildMessage::Result { exit_code, result, meta },
            HandlerOutput::Raw(value) => ChildMessage::Result {
                exit_code: 0,
                result: value,
                meta: None,
            },
        }
    }
}
