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

//! Per-invocation pipeline wrapped around an [`ExecutionBackend`]: capability check,
//! chain-limit propagation, input/output validation, artifact collection, failure
//! snapshotting, and analytics — everything that sits around the runner itself.

use crate::artifacts::collect_artifacts;
use crate::backend::{BackendRequest, ExecutionBackend};
use crate::snapshot::SnapshotStore;
use crate::validation::validate_against_schema;
use anvil_bridge::contract::Analytics;
use anvil_core::chain::ChainState;
use anvil_core::manifest::{Manifest, ManifestRegistry};
use anvil_core::{BackendMetadata, ErrorKind, ExecutionRequest, PluginError, RunResult};
use anvil_sandbox::{Sandbox, SandboxMode};
use anvil_workspace::{Lease, WorkspaceManager};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Debug-level human-readable notes synthesized from timing — emitted only when the
/// caller asks for insights, never required for correctness.
fn synthesize_insights(duration: Duration, quota_timeout: Duration) -> Vec<String> {
    let mut notes = Vec::new();
    if duration > quota_timeout.mul_f64(0.8) {
        notes.push(format!("execution took {duration:?}, approaching its {quota_timeout:?} quota"));
    }
    if duration > Duration::from_secs(5) {
        notes.push("slow phase: execution exceeded 5s".to_string());
    }
    notes
}

#[derive(Debug)]
pub struct OrchestratorOutcome {
    pub result: RunResult<Value>,
    pub metadata: BackendMetadata,
    pub artifacts: Vec<std::path::PathBuf>,
    pub insights: Vec<String>,
}

pub struct Orchestrator {
    manifests: Arc<dyn ManifestRegistry>,
    backend: Arc<dyn ExecutionBackend>,
    analytics: Arc<dyn Analytics>,
    workspaces: Arc<dyn WorkspaceManager>,
    snapshots: SnapshotStore,
    debug_insights: bool,
}

impl Orchestrator {
    pub fn new(
        manifests: Arc<dyn ManifestRegistry>,
        backend: Arc<dyn ExecutionBackend>,
        analytics: Arc<dyn Analytics>,
        workspaces: Arc<dyn WorkspaceManager>,
        snapshots: SnapshotStore,
        debug_insights: bool,
    ) -> Self {
        Self {
            manifests,
            backend,
            analytics,
            workspaces,
            snapshots,
            debug_insights,
        }
    }

    pub async fn execute(&self, request: ExecutionRequest, granted_capabilities: &[String], parent_chain: Option<ChainState>) -> Result<OrchestratorOutcome, PluginError> {
        let plugin_id = request.descriptor.plugin_id.to_string();
        let manifest = self
            .manifests
            .manifest(&plugin_id)
            .ok_or_else(|| PluginError::new(ErrorKind::HandlerNotFound, format!("no manifest registered for plugin {plugin_id}")))?;

        self.analytics
            .track("execution.started", serde_json::json!({"pluginId": plugin_id, "executionId": request.execution_id.to_string()}))
            .await
            .ok();

        // Lease the workspace before anything else: even a capability or validation
        // failure needs a `cwd` to snapshot into.
        let lease = self.workspaces.lease(&request.execution_id, &request.plugin_root, &request.workspace).await?;

        match self.run_pipeline(&request, &manifest, granted_capabilities, parent_chain, &lease).await {
            Ok(outcome) => {
                self.analytics
                    .track(
                        "execution.finished",
                        serde_json::json!({"pluginId": plugin_id, "durationMs": outcome.result.execution_meta.duration.as_millis()}),
                    )
                    .await
                    .ok();
                lease.release().await;
                Ok(outcome)
            }
            Err(err) => {
                self.analytics
                    .track("execution.failed", serde_json::json!({"pluginId": plugin_id, "code": err.kind.to_string(), "message": err.message}))
                    .await
                    .ok();
                self.snapshot_failure(&request, &lease, &err);
                lease.release().await;
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        request: &ExecutionRequest,
        manifest: &Manifest,
        granted_capabilities: &[String],
        parent_chain: Option<ChainState>,
        lease: &Lease,
    ) -> Result<OrchestratorOutcome, PluginError> {
        // 1. capability check
        let missing: Vec<&String> = manifest.capabilities.iter().filter(|cap| !granted_capabilities.contains(cap)).collect();
        if !missing.is_empty() {
            self.analytics
                .track("capability.missing", serde_json::json!({"pluginId": manifest.id, "missing": missing}))
                .await
                .ok();
            return Err(PluginError::permission_denied(format!("missing capabilities: {}", missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")))
                .with_context("code", "CAPABILITY_MISSING"));
        }

        // 2. chain limits
        let quota = manifest.permissions.quotas.clone();
        let quota_timeout = Duration::from_millis(quota.timeout_ms);
        let chain = match parent_chain {
            Some(parent) => parent.child(request.timeout, quota_timeout),
            None => ChainState::root(request.timeout.min(quota_timeout)),
        };
        let effective_timeout = chain.effective_timeout(request.timeout, quota_timeout);

        // 3. broker construction is the responsibility of the caller (invoke broker,
        // job broker) which hand this orchestrator an already-built ExecutionRequest;
        // nothing further to assemble here.

        // 4. input validation
        let handler_name = request.export_name.clone().unwrap_or_else(|| "execute".to_string());
        let handler_metadata = manifest.handler(&handler_name);
        if let Some(schema) = handler_metadata.and_then(|h| h.input_schema.as_ref()) {
            validate_against_schema(schema, &request.input)?;
        }

        // 5. runner
        let cwd = lease.cwd.clone();
        let outdir = request.artifacts.outdir.clone();
        let sandbox = Arc::new(Sandbox::new(SandboxMode::Enforce, manifest.permissions.clone(), cwd.clone()));

        let backend_request = BackendRequest {
            execution_id: request.execution_id,
            workspace_id: lease.workspace_id.clone(),
            plugin_id: request.descriptor.plugin_id.clone(),
            plugin_version: request.descriptor.plugin_version.clone(),
            request_id: request.descriptor.request_id,
            tenant_id: request.descriptor.tenant_id.clone(),
            parent_trace: None,
            handler_ref: anvil_core::HandlerRef::new(request.handler_ref_file.clone(), handler_name.clone()),
            handler_id: Some(handler_name.clone()),
            input: request.input.clone(),
            sandbox,
            cwd: cwd.clone(),
            outdir: outdir.clone(),
            timeout: effective_timeout,
            cancellation: CancellationToken::new(),
        };

        let started_at = Instant::now();
        let (result, metadata) = self.backend.execute(backend_request).await?;

        // 6. output validation
        if let Some(schema) = handler_metadata.and_then(|h| h.output_schema.as_ref()) {
            validate_against_schema(schema, &result.data)?;
        }

        // 7. artifacts (non-fatal)
        let mut artifacts = Vec::new();
        if let (Some(spec), Some(outdir)) = (handler_metadata.and_then(|h| h.artifacts.as_ref()), outdir.as_ref()) {
            match collect_artifacts(&cwd, outdir, &spec.patterns) {
                Ok(copied) => artifacts = copied,
                Err(err) => {
                    self.analytics
                        .track("artifact.failed", serde_json::json!({"pluginId": manifest.id, "reason": err.message}))
                        .await
                        .ok();
                }
            }
        }

        // 10. insights
        let insights = if self.debug_insights {
            synthesize_insights(started_at.elapsed(), quota_timeout)
        } else {
            Vec::new()
        };

        Ok(OrchestratorOutcome { result, metadata, artifacts, insights })
    }

    fn snapshot_failure(&self, request: &ExecutionRequest, lease: &Lease, error: &PluginError) {
        let snapshot = serde_json::json!({
            "command": format!("{}#{}", request.handler_ref_file, request.effective_export()),
            "pluginId": request.descriptor.plugin_id.to_string(),
            "pluginVersion": request.descriptor.plugin_version,
            "input": request.input,
            "context": request.descriptor.host_context,
            "env": {},
            "result": Value::Null,
            "error": {"code": error.kind.to_string(), "message": error.message},
            "logs": [],
            "metrics": {},
        });
        let snapshot_dir = lease.cwd.join(".anvil").join("snapshots");
        if let Err(err) = self.snapshots.record(&snapshot_dir, &request.descriptor.request_id.to_string(), &snapshot) {
            tracing::warn!(error = %err, "failed to persist failure snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InProcessBackend;
    use anvil_bridge::inprocess::MemoryAnalytics;
    use anvil_core::manifest::{testing::FixtureRegistry, HandlerMetadata, PermissionSpec};
    use anvil_core::request::{ArtifactsSpec, Descriptor, HostKind, WorkspaceSpec};
    use anvil_core::ids::{ExecutionId, PluginId, RequestId};
    use anvil_runner::HandlerRegistry;
    use std::collections::HashMap;

    fn manifest_with_echo(capabilities: Vec<String>) -> Manifest {
        let mut handlers = HashMap::new();
        handlers.insert(
            "execute".to_string(),
            HandlerMetadata {
                handler_ref: anvil_core::HandlerRef::new("handlers/echo", "execute"),
                warmup: false,
                input_schema: None,
                output_schema: None,
                artifacts: None,
            },
        );
        Manifest {
            id: "demo".to_string(),
            version: "1.0.0".to_string(),
            permissions: PermissionSpec::default(),
            capabilities,
            handlers,
        }
    }

    fn orchestrator(manifest: Manifest) -> Orchestrator {
        let registry = HandlerRegistry::new();
        registry.register(
            "handlers/echo",
            "execute",
            Arc::new(|_ctx, input| Box::pin(async move { Ok(anvil_core::HandlerOutput::Raw(input)) })),
        );
        let fixtures = FixtureRegistry::new();
        fixtures.insert(manifest, std::env::temp_dir());
        Orchestrator::new(
            Arc::new(fixtures),
            Arc::new(InProcessBackend::new(registry)),
            Arc::new(MemoryAnalytics::default()),
            Arc::new(anvil_workspace::LocalWorkspaceManager::new()),
            SnapshotStore::new(),
            false,
        )
    }

    fn request() -> ExecutionRequest {
        ExecutionRequest {
            execution_id: ExecutionId::new(),
            descriptor: Descriptor {
                host: HostKind::Cli,
                plugin_id: PluginId::from("demo"),
                plugin_version: "1.0.0".to_string(),
                request_id: RequestId::new(),
                tenant_id: None,
                permissions: PermissionSpec::default(),
                host_context: Value::Null,
                config: None,
                parent_request_id: None,
            },
            plugin_root: std::env::temp_dir(),
            handler_ref_file: "handlers/echo".to_string(),
            export_name: Some("execute".to_string()),
            input: serde_json::json!({"hello": "world"}),
            workspace: WorkspaceSpec::local(std::env::temp_dir()),
            artifacts: ArtifactsSpec::default(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn missing_capability_fails_fast_without_running_the_handler() {
        let orchestrator = orchestrator(manifest_with_echo(vec!["net".to_string()]));
        let err = orchestrator.execute(request(), &[], None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
        assert_eq!(err.context.get("code").map(String::as_str), Some("CAPABILITY_MISSING"));
    }

    #[tokio::test]
    async fn granted_capability_allows_execution_through() {
        let orchestrator = orchestrator(manifest_with_echo(vec!["net".to_string()]));
        let outcome = orchestrator.execute(request(), &["net".to_string()], None).await.unwrap();
        assert_eq!(outcome.result.data, serde_json::json!({"hello": "world"}));
        assert_eq!(outcome.metadata.backend, "in-process");
    }

    #[tokio::test]
    async fn chain_state_shrinks_the_effective_timeout() {
        let orchestrator = orchestrator(manifest_with_echo(vec![]));
        let parent = ChainState::root(Duration::from_millis(50));
        let outcome = orchestrator.execute(request(), &[], Some(parent)).await.unwrap();
        assert_eq!(outcome.result.data, serde_json::json!({"hello": "world"}));
    }
}
