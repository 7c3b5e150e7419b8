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

//! Newtype identifiers used throughout the execution substrate.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

// `ExecutionId` identifies one attempt and is never propagated outside the core.
uuid_id!(ExecutionId);
// `RequestId` is the end-to-end correlation identifier, propagated to children.
uuid_id!(RequestId);
uuid_id!(WorkerId);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(pub String);

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PluginId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic workspace identity: `lease(execution_id, plugin_root)` always yields the
/// same id for a local workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(pub String);

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `traceId:spanId` tracing identity propagated across invocation chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
}

impl TraceContext {
    /// Root of a new chain: `traceId == spanId` formatted as `traceId:spanId`.
    pub fn root() -> Self {
        let span_id = Uuid::new_v4().to_string();
        Self {
            trace_id: span_id.clone(),
            span_id,
            parent_span_id: None,
        }
    }

    /// Derives a trace id from a parent request id, as required for nested executions.
    pub fn child_of(parent_trace_id: &str, parent_span_id: &str) -> Self {
        Self {
            trace_id: parent_trace_id.to_string(),
            span_id: Uuid::new_v4().to_string(),
            parent_span_id: Some(parent_span_id.to_string()),
        }
    }

    pub fn formatted(&self) -> String {
        format!("{}:{}", self.trace_id, self.span_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_context_root_has_matching_trace_and_span() {
        let ctx = TraceContext::root();
        assert_eq!(ctx.trace_id, ctx.span_id);
        assert!(ctx.parent_span_id.is_none());
    }

    #[test]
    fn trace_context_child_preserves_trace_id() {
        let root = TraceContext::root();
        let child = TraceContext::child_of(&root.trace_id, &root.span_id);
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_span_id.as_deref(), Some(root.span_id.as_str()));
        assert_ne!(child.span_id, root.span_id);
    }

    #[test]
    fn execution_id_is_unique() {
        let a = ExecutionId::new();
        let b = ExecutionId::new();
        assert_ne!(a, b);
    }
}
