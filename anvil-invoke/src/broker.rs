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

//! Cross-plugin invocation: a handler in one plugin calling a handler in another,
//! with depth/hop/timeout chaining and trace propagation, never unwinding through
//! the caller's own error handling.

use crate::config::InvokeConfig;
use crate::registry::PluginBackendRegistry;
use anvil_core::chain::ChainState;
use anvil_core::ids::{ExecutionId, PluginId, RequestId};
use anvil_core::manifest::{HandlerRef, ManifestRegistry, PermissionSpec};
use anvil_core::{ErrorEnvelope, ErrorKind, ExecutionMeta, PluginError, TraceContext};
use anvil_exec::BackendRequest;
use anvil_sandbox::{Sandbox, SandboxMode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct CallerContext {
    pub plugin_id: PluginId,
    pub trace: TraceContext,
    pub chain: ChainState,
}

pub struct InvokeRequest {
    pub caller: CallerContext,
    pub caller_permissions: PermissionSpec,
    pub target_plugin_id: PluginId,
    pub handler: Option<String>,
    pub input: Value,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct InvokeResult {
    pub data: Option<Value>,
    pub execution_meta: Option<ExecutionMeta>,
    pub error: Option<ErrorEnvelope>,
}

impl InvokeResult {
    fn ok(data: Value, execution_meta: ExecutionMeta) -> Self {
        Self { data: Some(data), execution_meta: Some(execution_meta), error: None }
    }

    fn err(error: PluginError) -> Self {
        Self {
            data: None,
            execution_meta: None,
            error: Some(ErrorEnvelope::from_plugin_error(error, None)),
        }
    }
}

pub struct InvokeBroker {
    manifests: Arc<dyn ManifestRegistry>,
    backends: Arc<dyn PluginBackendRegistry>,
    config: InvokeConfig,
}

impl InvokeBroker {
    pub fn new(manifests: Arc<dyn ManifestRegistry>, backends: Arc<dyn PluginBackendRegistry>, config: InvokeConfig) -> Self {
        Self { manifests, backends, config }
    }

    /// Dispatches the call and maps any failure into `InvokeResult.error` — this
    /// never returns `Err`, matching the "no unwinding through the caller" contract.
    pub async fn invoke(&self, request: InvokeRequest) -> InvokeResult {
        match self.try_invoke(request).await {
            Ok((data, meta)) => InvokeResult::ok(data, meta),
            Err(err) => InvokeResult::err(err),
        }
    }

    async fn try_invoke(&self, request: InvokeRequest) -> Result<(Value, ExecutionMeta), PluginError> {
        let target = request.target_plugin_id.0.as_str();
        if !request.caller_permissions.invoke.allow.iter().any(|allowed| allowed.as_str() == target) {
            return Err(PluginError::permission_denied(format!("{} is not permitted to invoke {target}", request.caller.plugin_id))
                .with_context("code", "INVOKE_NOT_ALLOWED"));
        }

        if request.caller.chain.depth + 1 > self.config.max_depth {
            return Err(PluginError::new(ErrorKind::ValidationError, "invoke call chain depth exceeded").with_context("code", "DEPTH_EXCEEDED"));
        }
        if request.caller.chain.hops + 1 > self.config.max_hops {
            return Err(PluginError::new(ErrorKind::ValidationError, "invoke call chain hop count exceeded").with_context("code", "HOPS_EXCEEDED"));
        }

        let manifest = self
            .manifests
            .manifest(target)
            .ok_or_else(|| PluginError::new(ErrorKind::HandlerNotFound, format!("no manifest registered for plugin {target}")))?;

        let backend = self
            .backends
            .backend_for(target)
            .ok_or_else(|| PluginError::new(ErrorKind::HandlerNotFound, format!("no execution backend registered for plugin {target}")))?;

        let handler_name = request.handler.clone().unwrap_or_else(|| "execute".to_string());
        let handler_ref = manifest
            .handler(&handler_name)
            .map(|metadata| metadata.handler_ref.clone())
            .unwrap_or_else(|| HandlerRef::new(format!("handlers/{handler_name}"), handler_name.clone()));

        let quota_timeout = Duration::from_millis(manifest.permissions.quotas.timeout_ms);
        let requested_timeout = request.timeout.unwrap_or(quota_timeout);
        let child_chain = request.caller.chain.child(requested_timeout, quota_timeout);

        let sandbox = Arc::new(Sandbox::new(SandboxMode::Enforce, manifest.permissions.clone(), std::env::temp_dir()));

        let backend_request = BackendRequest {
            execution_id: ExecutionId::new(),
            plugin_id: request.target_plugin_id.clone(),
            plugin_version: manifest.version.clone(),
            request_id: RequestId::new(),
            tenant_id: None,
            parent_trace: Some((request.caller.trace.trace_id.clone(), request.caller.trace.span_id.clone())),
            handler_ref,
            handler_id: Some(handler_name),
            input: request.input,
            sandbox,
            cwd: std::env::temp_dir(),
            outdir: None,
            timeout: child_chain.remaining,
            cancellation: CancellationToken::new(),
        };

        let (result, _metadata) = backend.execute(backend_request).await?;
        self.record_trace(&request.caller, &child_chain, target);
        Ok((result.data, result.execution_meta))
    }

    fn record_trace(&self, caller: &CallerContext, child_chain: &ChainState, target: &str) {
        tracing::info!(
            trace_id = %caller.trace.trace_id,
            parent_span_id = %caller.trace.span_id,
            caller_plugin = %caller.plugin_id,
            target_plugin = target,
            depth = child_chain.depth,
            hops = child_chain.hops,
            "invoke.trace"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryBackendRegistry;
    use anvil_core::manifest::{testing::FixtureRegistry, HandlerMetadata, Manifest};
    use anvil_core::ErrorKind as CoreErrorKind;
    use anvil_exec::InProcessBackend;
    use anvil_runner::HandlerRegistry;
    use std::collections::HashMap;

    fn echo_manifest(invoke_allow: Vec<String>) -> Manifest {
        let mut handlers = HashMap::new();
        handlers.insert(
            "execute".to_string(),
            HandlerMetadata {
                handler_ref: HandlerRef::new("handlers/echo", "execute"),
                warmup: false,
                input_schema: None,
                output_schema: None,
                artifacts: None,
            },
        );
        let mut permissions = PermissionSpec::default();
        permissions.invoke.allow = invoke_allow;
        Manifest {
            id: "callee".to_string(),
            version: "1.0.0".to_string(),
            permissions,
            capabilities: vec![],
            handlers,
        }
    }

    fn broker_with_callee() -> InvokeBroker {
        let registry = HandlerRegistry::new();
        registry.register(
            "handlers/echo",
            "execute",
            Arc::new(|_ctx, input| Box::pin(async move { Ok(anvil_core::HandlerOutput::Raw(input)) })),
        );

        let fixtures = FixtureRegistry::new();
        fixtures.insert(echo_manifest(vec![]), std::env::temp_dir());

        let backends = InMemoryBackendRegistry::new();
        backends.insert("callee", Arc::new(InProcessBackend::new(registry)));

        InvokeBroker::new(Arc::new(fixtures), Arc::new(backends), InvokeConfig::default())
    }

    fn caller(depth: u32, hops: u32, allow: Vec<String>) -> InvokeRequest {
        let mut permissions = PermissionSpec::default();
        permissions.invoke.allow = allow;
        InvokeRequest {
            caller: CallerContext {
                plugin_id: PluginId::from("caller"),
                trace: TraceContext::root(),
                chain: ChainState { remaining: Duration::from_secs(5), hops, depth },
            },
            caller_permissions: permissions,
            target_plugin_id: PluginId::from("callee"),
            handler: None,
            input: serde_json::json!({"hi": "there"}),
            timeout: None,
        }
    }

    #[tokio::test]
    async fn disallowed_target_is_rejected_before_dispatch() {
        let broker = broker_with_callee();
        let result = broker.invoke(caller(0, 0, vec![])).await;
        let error = result.error.unwrap();
        assert_eq!(error.code, CoreErrorKind::PermissionDenied);
        assert_eq!(error.context.get("code").map(String::as_str), Some("INVOKE_NOT_ALLOWED"));
    }

    #[tokio::test]
    async fn allowed_target_dispatches_and_returns_data() {
        let broker = broker_with_callee();
        let result = broker.invoke(caller(0, 0, vec!["callee".to_string()])).await;
        assert!(result.error.is_none());
        assert_eq!(result.data, Some(serde_json::json!({"hi": "there"})));
    }

    #[tokio::test]
    async fn exceeding_max_depth_is_rejected() {
        let broker = broker_with_callee();
        let result = broker.invoke(caller(4, 0, vec!["callee".to_string()])).await;
        let error = result.error.unwrap();
        assert_eq!(error.context.get("code").map(String::as_str), Some("DEPTH_EXCEEDED"));
    }

    #[tokio::test]
    async fn exceeding_max_hops_is_rejected() {
        let broker = broker_with_callee();
        let result = broker.invoke(caller(0, 8, vec!["callee".to_string()])).await;
        let error = result.error.unwrap();
        assert_eq!(error.context.get("code").map(String::as_str), Some("HOPS_EXCEEDED"));
    }
}
