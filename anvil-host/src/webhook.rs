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

//! Webhook host: the context a received inbound webhook runs under.

use crate::descriptor::{build_descriptor, DescriptorArgs};
use anvil_core::request::{Descriptor, HostKind};
use serde_json::Value;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WebhookHostContext {
    pub event: String,
    pub source: Option<String>,
    pub payload: Value,
}

impl WebhookHostContext {
    fn into_value(self) -> Value {
        serde_json::json!({ "event": self.event, "source": self.source, "payload": self.payload })
    }
}

pub fn webhook_descriptor(args: DescriptorArgs, context: WebhookHostContext) -> Descriptor {
    build_descriptor(HostKind::Webhook, args, context.into_value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_payload_opaque() {
        let context = WebhookHostContext {
            event: "push".to_string(),
            source: Some("github".to_string()),
            payload: serde_json::json!({"ref": "refs/heads/main"}),
        };
        let value = context.into_value();
        assert_eq!(value["event"], serde_json::json!("push"));
        assert_eq!(value["payload"]["ref"], serde_json::json!("refs/heads/main"));
    }
}
