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

//! In-process handler runner: loads a handler from the registry, builds the execution
//! context, invokes it, and drains cleanup — all inside the host process's threads.

use crate::context::ExecutionContext;
use crate::registry::HandlerRegistry;
use anvil_bridge::DirectBridge;
use anvil_core::ids::{PluginId, RequestId, TenantId};
use anvil_core::manifest::HandlerRef;
use anvil_core::{ErrorKind, ExecutionMeta, HandlerOutput, PluginError, RunResult, TraceContext};
use anvil_sandbox::Sandbox;
use chrono::Utc;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

pub struct InProcessRunInput {
    pub plugin_id: PluginId,
    pub plugin_version: String,
    pub request_id: RequestId,
    pub tenant_id: Option<TenantId>,
    pub parent_trace: Option<(String, String)>,
    pub handler_ref: HandlerRef,
    pub handler_id: Option<String>,
    pub input: Value,
    pub sandbox: Arc<Sandbox>,
    pub cwd: PathBuf,
    pub outdir: Option<PathBuf>,
    pub cancellation: tokio_util::sync::CancellationToken,
}

#[derive(Default, Clone)]
pub struct InProcessRunner {
    registry: HandlerRegistry,
}

impl InProcessRunner {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    pub async fn run(&self, input: InProcessRunInput) -> Result<RunResult<Value>, PluginError> {
        let handler = match self.registry.lookup(&input.handler_ref.file, &input.handler_ref.export) {
            Some(handler) => handler,
            None if !self.registry.has_file(&input.handler_ref.file) => {
                return Err(PluginError::new(
                    ErrorKind::HandlerNotFound,
                    format!("no handler module registered at {}", input.handler_ref.file),
                ));
            }
            None => {
                return Err(PluginError::new(
                    ErrorKind::HandlerContractError,
                    format!("handler module {} has no export {}", input.handler_ref.file, input.handler_ref.export),
                ));
            }
        };

        let trace = match &input.parent_trace {
            Some((trace_id, span_id)) => TraceContext::child_of(trace_id, span_id),
            None => TraceContext::root(),
        };

        let bridge = Arc::new(DirectBridge::bound(&input.plugin_id.to_string(), &input.request_id.to_string(), &trace.trace_id));

        let mut context = ExecutionContext::new(
            input.plugin_id.clone(),
            input.plugin_version.clone(),
            input.request_id,
            input.tenant_id.clone(),
            trace,
            input.sandbox,
            bridge,
            input.cwd,
            input.outdir,
            input.cancellation,
        );

        let start_time = Utc::now();
        let outcome = handler(&mut context, input.input).await;
        context.drain_cleanup().await;
        let end_time = Utc::now();

        let output = outcome?;
        let duration = (end_time - start_time).to_std().unwrap_or_default();

        Ok(RunResult {
            data: output.into_data(),
            execution_meta: ExecutionMeta {
                start_time,
                end_time,
                duration,
                plugin_id: input.plugin_id,
                plugin_version: input.plugin_version,
                handler_id: input.handler_id,
                request_id: context.request_id,
                tenant_id: input.tenant_id,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::manifest::PermissionSpec;
    use anvil_sandbox::SandboxMode;

    fn sandbox() -> Arc<Sandbox> {
        Arc::new(Sandbox::new(SandboxMode::Trusted, PermissionSpec::default(), std::env::temp_dir()))
    }

    #[tokio::test]
    async fn missing_handler_module_fails_with_handler_not_found() {
        let runner = InProcessRunner::new(HandlerRegistry::new());
        let result = runner
            .run(InProcessRunInput {
                plugin_id: PluginId::from("demo"),
                plugin_version: "1.0.0".to_string(),
                request_id: RequestId::new(),
                tenant_id: None,
                parent_trace: None,
                handler_ref: HandlerRef::new("handlers/missing", "execute"),
                handler_id: None,
                input: Value::Null,
                sandbox: sandbox(),
                cwd: std::env::temp_dir(),
                outdir: None,
                cancellation: tokio_util::sync::CancellationToken::new(),
            })
            .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::HandlerNotFound);
    }

    #[tokio::test]
    async fn known_module_with_missing_export_fails_with_contract_error() {
        let registry = HandlerRegistry::new();
        registry.register(
            "handlers/echo",
            "execute",
            Arc::new(|_ctx, input| Box::pin(async move { Ok(HandlerOutput::Raw(input)) })),
        );
        let runner = InProcessRunner::new(registry);
        let result = runner
            .run(InProcessRunInput {
                plugin_id: PluginId::from("demo"),
                plugin_version: "1.0.0".to_string(),
                request_id: RequestId::new(),
                tenant_id: None,
                parent_trace: None,
                handler_ref: HandlerRef::new("handlers/echo", "dry_run"),
                handler_id: None,
                input: Value::Null,
                sandbox: sandbox(),
                cwd: std::env::temp_dir(),
                outdir: None,
                cancellation: tokio_util::sync::CancellationToken::new(),
            })
            .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::HandlerContractError);
    }

    #[tokio::test]
    async fn registered_handler_runs_and_produces_a_trace_rooted_in_the_call() {
        let registry = HandlerRegistry::new();
        registry.register(
            "handlers/echo",
            "execute",
            Arc::new(|_ctx, input| Box::pin(async move { Ok(HandlerOutput::Raw(input)) })),
        );
        let runner = InProcessRunner::new(registry);
        let result = runner
            .run(InProcessRunInput {
                plugin_id: PluginId::from("demo"),
                plugin_version: "1.0.0".to_string(),
                request_id: RequestId::new(),
                tenant_id: None,
                parent_trace: None,
                handler_ref: HandlerRef::new("handlers/echo", "execute"),
                handler_id: Some("echo".to_string()),
                input: serde_json::json!({"hello": "world"}),
                sandbox: sandbox(),
                cwd: std::env::temp_dir(),
                outdir: None,
                cancellation: tokio_util::sync::CancellationToken::new(),
            })
            .await
            .unwrap();
        assert_eq!(result.data, serde_json::json!({"hello": "world"}));
        assert_eq!(result.execution_meta.handler_id.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn child_trace_preserves_parent_trace_id() {
        let registry = HandlerRegistry::new();
        registry.register(
            "handlers/echo",
            "execute",
            Arc::new(|_ctx, input| Box::pin(async move { Ok(HandlerOutput::Raw(input)) })),
        );
        let runner = InProcessRunner::new(registry);
        let parent_trace = TraceContext::root();
        let result = runner
            .run(InProcessRunInput {
                plugin_id: PluginId::from("demo"),
                plugin_version: "1.0.0".to_string(),
                request_id: RequestId::new(),
                tenant_id: None,
                parent_trace: Some((parent_trace.trace_id.clone(), parent_trace.span_id.clone())),
                handler_ref: HandlerRef::new("handlers/echo", "execute"),
                handler_id: None,
                input: Value::Null,
                sandbox: sandbox(),
                cwd: std::env::temp_dir(),
                outdir: None,
                cancellation: tokio_util::sync::CancellationToken::new(),
            })
            .await
            .unwrap();
        // The execution meta does not carry the trace directly; this asserts the run
        // completed using a derived child trace without panicking on the parent lookup.
        assert_eq!(result.execution_meta.plugin_id, PluginId::from("demo"));
    }
}
