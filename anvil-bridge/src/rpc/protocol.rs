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

//! Wire shapes for the cross-process platform bridge: newline-delimited JSON over a
//! Unix-domain stream socket. Framing is UTF-8 JSON objects separated by `\n`; readers
//! must buffer partial reads (handled by [`tokio::io::AsyncBufReadExt::read_line`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AdapterCall {
    #[serde(rename = "adapter:call")]
    Call {
        request_id: String,
        adapter: String,
        method: String,
        args: Vec<Value>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AdapterResponse {
    #[serde(rename = "adapter:response")]
    Response {
        request_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<anvil_core::ErrorEnvelope>,
    },
}

impl AdapterResponse {
    pub fn ok(request_id: String, result: Value) -> Self {
        AdapterResponse::Response {
            request_id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(request_id: String, error: anvil_core::ErrorEnvelope) -> Self {
        AdapterResponse::Response {
            request_id,
            result: None,
            error: Some(error),
        }
    }
}
