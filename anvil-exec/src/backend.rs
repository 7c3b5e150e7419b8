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

//! Uniform `{execute, health, stats, shutdown, start?}` surface over the concrete
//! runners, plus the `auto` factory that picks one.

use anvil_bridge::DirectBridge;
use anvil_core::ids::{ExecutionId, PluginId, RequestId, TenantId, WorkerId, WorkspaceId};
use anvil_core::manifest::HandlerRef;
use anvil_core::{BackendMetadata, ErrorKind, PluginError, RunResult, TraceContext};
use anvil_runner::{HandlerRegistry, InProcessRunInput, InProcessRunner};
use anvil_runner::subprocess::parent::{SubprocessSpawnOptions, SubprocessWorker};
use anvil_runner::subprocess::protocol::ParentMessage;
use anvil_sandbox::Sandbox;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A fully-resolved request aimed at one concrete backend. The orchestrator builds
/// this from an `ExecutionRequest` plus the resolved manifest/permissions.
pub struct BackendRequest {
    pub execution_id: ExecutionId,
    pub workspace_id: WorkspaceId,
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
    pub timeout: Duration,
    pub cancellation: CancellationToken,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendHealth {
    pub healthy: bool,
    pub detail: Option<String>,
}

impl BackendHealth {
    pub fn ok() -> Self {
        Self { healthy: true, detail: None }
    }
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute(&self, request: BackendRequest) -> Result<(RunResult<Value>, BackendMetadata), PluginError>;
    async fn health(&self) -> BackendHealth;
    async fn stats(&self) -> Value;
    async fn shutdown(&self);

    async fn start(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

async fn with_timeout<T>(timeout: Duration, future: impl std::future::Future<Output = Result<T, PluginError>>) -> Result<T, PluginError> {
    tokio::time::timeout(timeout, future)
        .await
        .unwrap_or_else(|_| Err(PluginError::timeout("backend execution exceeded its timeout")))
}

/// Runs handlers on the calling task, inside the host address space.
pub struct InProcessBackend {
    runner: InProcessRunner,
}

impl InProcessBackend {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { runner: InProcessRunner::new(registry) }
    }
}

#[async_trait]
impl ExecutionBackend for InProcessBackend {
    async fn execute(&self, request: BackendRequest) -> Result<(RunResult<Value>, BackendMetadata), PluginError> {
        let workspace_id = request.workspace_id.to_string();
        let input = InProcessRunInput {
            plugin_id: request.plugin_id,
            plugin_version: request.plugin_version,
            request_id: request.request_id,
            tenant_id: request.tenant_id,
            parent_trace: request.parent_trace,
            handler_ref: request.handler_ref,
            handler_id: request.handler_id,
            input: request.input,
            sandbox: request.sandbox,
            cwd: request.cwd,
            outdir: request.outdir,
            cancellation: request.cancellation,
        };
        let result = with_timeout(request.timeout, self.runner.run(input)).await?;
        let metadata = BackendMetadata {
            backend: "in-process".to_string(),
            worker_id: None,
            workspace_id,
        };
        Ok((result, metadata))
    }

    async fn health(&self) -> BackendHealth {
        BackendHealth::ok()
    }

    async fn stats(&self) -> Value {
        serde_json::json!({"backend": "in-process"})
    }

    async fn shutdown(&self) {}
}

/// Dispatches onto a bounded population of workers, themselves wrapping in-process
/// runners — see [`anvil_pool::WorkerPool`].
pub struct PoolBackend {
    pool: Arc<anvil_pool::WorkerPool>,
}

impl PoolBackend {
    pub fn new(pool: Arc<anvil_pool::WorkerPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionBackend for PoolBackend {
    async fn execute(&self, request: BackendRequest) -> Result<(RunResult<Value>, BackendMetadata), PluginError> {
        let workspace_id = request.workspace_id.to_string();
        let plugin_id = request.plugin_id.clone();
        let cancellation = request.cancellation.clone();
        let input = InProcessRunInput {
            plugin_id: request.plugin_id,
            plugin_version: request.plugin_version,
            request_id: request.request_id,
            tenant_id: request.tenant_id,
            parent_trace: request.parent_trace,
            handler_ref: request.handler_ref,
            handler_id: request.handler_id,
            input: request.input,
            sandbox: request.sandbox,
            cwd: request.cwd,
            outdir: request.outdir,
            cancellation: cancellation.clone(),
        };
        let result = with_timeout(request.timeout, self.pool.dispatch(plugin_id, input, cancellation)).await?;
        let metadata = BackendMetadata {
            backend: "worker-pool".to_string(),
            worker_id: None,
            workspace_id,
        };
        Ok((result, metadata))
    }

    async fn health(&self) -> BackendHealth {
        let stats = self.pool.stats().await;
        BackendHealth {
            healthy: stats.worker_count > 0 || stats.queue_length == 0,
            detail: Some(format!("{} workers, {} idle, queue {}", stats.worker_count, stats.idle_worker_count, stats.queue_length)),
        }
    }

    async fn stats(&self) -> Value {
        serde_json::to_value(self.pool.stats().await).unwrap_or(Value::Null)
    }

    async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

/// Spawns one fresh subprocess per invocation. No pooling: the worker pool backend
/// is the pooled alternative for untrusted high-throughput handlers.
pub struct SubprocessBackend {
    bootstrap_command: String,
    bootstrap_args: Vec<String>,
    socket_dir: PathBuf,
}

impl SubprocessBackend {
    pub fn new(bootstrap_command: impl Into<String>, bootstrap_args: Vec<String>, socket_dir: PathBuf) -> Self {
        Self {
            bootstrap_command: bootstrap_command.into(),
            bootstrap_args,
            socket_dir,
        }
    }
}

#[async_trait]
impl ExecutionBackend for SubprocessBackend {
    async fn execute(&self, request: BackendRequest) -> Result<(RunResult<Value>, BackendMetadata), PluginError> {
        let workspace_id = request.workspace_id.to_string();
        let socket_path = self.socket_dir.join(format!("{}.sock", WorkerId::new()));

        let trace = match &request.parent_trace {
            Some((trace_id, span_id)) => TraceContext::child_of(trace_id, span_id),
            None => TraceContext::root(),
        };
        let bridge = Arc::new(DirectBridge::bound(&request.plugin_id.to_string(), &request.request_id.to_string(), &trace.trace_id));

        let mut options = SubprocessSpawnOptions::new(self.bootstrap_command.clone(), socket_path.clone(), bridge);
        options.bootstrap_args = self.bootstrap_args.clone();

        let mut worker = with_timeout(request.timeout, SubprocessWorker::spawn(options)).await?;
        let worker_id = worker.worker_id;

        let message = ParentMessage::Execute {
            plugin_id: request.plugin_id.clone(),
            plugin_version: request.plugin_version.clone(),
            request_id: request.request_id,
            tenant_id: request.tenant_id.clone(),
            parent_trace: Some((trace.trace_id.clone(), trace.span_id.clone())),
            handler_path: request.handler_ref.file,
            handler_export: request.handler_ref.export,
            input: request.input,
            socket_path: socket_path.display().to_string(),
            cwd: Some(request.cwd.display().to_string()),
            outdir: request.outdir.as_ref().map(|p| p.display().to_string()),
        };

        let outcome = with_timeout(request.timeout, worker.execute(message)).await;
        let _ = worker.wait().await;

        let result = outcome.map_err(|err| {
            if err.kind == ErrorKind::Timeout {
                PluginError::new(ErrorKind::WorkerCrashed, "subprocess worker timed out and was reclaimed")
            } else {
                err
            }
        })?;

        let metadata = BackendMetadata {
            backend: "subprocess".to_string(),
            worker_id: Some(worker_id.to_string()),
            workspace_id,
        };
        Ok((result, metadata))
    }

    async fn health(&self) -> BackendHealth {
        BackendHealth::ok()
    }

    async fn stats(&self) -> Value {
        serde_json::json!({"backend": "subprocess"})
    }

    async fn shutdown(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    InProcess,
    WorkerPool,
    Subprocess,
    Auto,
}

/// Selection policy for `auto`: in-process when the workload is local and trusted,
/// otherwise the worker pool. Subprocess mode is never auto-selected — it is an
/// explicit opt-in for handlers that need OS-level isolation.
pub struct AutoSelectionHint {
    pub plugin_is_trusted: bool,
}

pub fn build_backend(
    mode: BackendMode,
    hint: AutoSelectionHint,
    registry: HandlerRegistry,
    pool_config: anvil_pool::PoolConfig,
    subprocess_bootstrap: Option<(String, Vec<String>, PathBuf)>,
) -> Arc<dyn ExecutionBackend> {
    let resolved = match mode {
        BackendMode::Auto if hint.plugin_is_trusted => BackendMode::InProcess,
        BackendMode::Auto => BackendMode::WorkerPool,
        other => other,
    };

    match resolved {
        BackendMode::InProcess | BackendMode::Auto => Arc::new(InProcessBackend::new(registry)),
        BackendMode::WorkerPool => Arc::new(PoolBackend::new(anvil_pool::WorkerPool::new(pool_config, registry))),
        BackendMode::Subprocess => {
            let (command, args, socket_dir) = subprocess_bootstrap.expect("subprocess mode requires a bootstrap command");
            Arc::new(SubprocessBackend::new(command, args, socket_dir))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::manifest::PermissionSpec;
    use anvil_sandbox::SandboxMode;

    fn registry_with_echo() -> HandlerRegistry {
        let registry = HandlerRegistry::new();
        registry.register(
            "handlers/echo",
            "execute",
            Arc::new(|_ctx, input| Box::pin(async move { Ok(anvil_core::HandlerOutput::Raw(input)) })),
        );
        registry
    }

    fn request() -> BackendRequest {
        BackendRequest {
            execution_id: ExecutionId::new(),
            workspace_id: WorkspaceId("test-workspace".to_string()),
            plugin_id: PluginId::from("demo"),
            plugin_version: "1.0.0".to_string(),
            request_id: RequestId::new(),
            tenant_id: None,
            parent_trace: None,
            handler_ref: HandlerRef::new("handlers/echo", "execute"),
            handler_id: None,
            input: serde_json::json!({"n": 1}),
            sandbox: Arc::new(Sandbox::new(SandboxMode::Trusted, PermissionSpec::default(), std::env::temp_dir())),
            cwd: std::env::temp_dir(),
            outdir: None,
            timeout: Duration::from_secs(5),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn in_process_backend_reports_backend_name() {
        let backend = InProcessBackend::new(registry_with_echo());
        let (result, metadata) = backend.execute(request()).await.unwrap();
        assert_eq!(result.data, serde_json::json!({"n": 1}));
        assert_eq!(metadata.backend, "in-process");
    }

    #[tokio::test]
    async fn pool_backend_reports_backend_name() {
        let pool = anvil_pool::WorkerPool::new(anvil_pool::PoolConfig { min: 1, max: 1, ..Default::default() }, registry_with_echo());
        let backend = PoolBackend::new(pool);
        let (_, metadata) = backend.execute(request()).await.unwrap();
        assert_eq!(metadata.backend, "worker-pool");
    }

    #[tokio::test]
    async fn auto_mode_prefers_in_process_for_trusted_plugins() {
        let backend = build_backend(
            BackendMode::Auto,
            AutoSelectionHint { plugin_is_trusted: true },
            registry_with_echo(),
            anvil_pool::PoolConfig::default(),
            None,
        );
        let (_, metadata) = backend.execute(request()).await.unwrap();
        assert_eq!(metadata.backend, "in-process");
    }

    #[tokio::test]
    async fn auto_mode_prefers_worker_pool_for_untrusted_plugins() {
        let backend = build_backend(
            BackendMode::Auto,
            AutoSelectionHint { plugin_is_trusted: false },
            registry_with_echo(),
            anvil_pool::PoolConfig { min: 1, max: 1, ..Default::default() },
            None,
        );
        let (_, metadata) = backend.execute(request()).await.unwrap();
        assert_eq!(metadata.backend, "worker-pool");
    }
}
