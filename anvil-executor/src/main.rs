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

//! Server bootstrap: loads configuration, initializes tracing, wires the execution
//! backend, invoke broker, and job broker together, and runs until interrupted.

mod config;
mod demo;

use anvil_bridge::inprocess::{MemoryAnalytics, MemoryCache};
use anvil_bridge::{Analytics, Cache};
use anvil_core::config::ConfigLoader;
use anvil_core::ids::{ExecutionId, PluginId, RequestId};
use anvil_core::manifest::PermissionSpec;
use anvil_core::request::{ArtifactsSpec, ExecutionRequest, WorkspaceSpec};
use anvil_exec::{build_backend, AutoSelectionHint, BackendMode, Orchestrator, SnapshotStore};
use anvil_workspace::{CompositeWorkspaceManager, EphemeralWorkspaceManager, LocalWorkspaceManager};
use anvil_host::{cli_descriptor, derive_exit_code, CliHostContext, DescriptorArgs, ExitCodePolicy};
use anvil_invoke::{InMemoryBackendRegistry, InvokeBroker, InvokeConfig};
use anvil_jobs::{DegradationController, JobBroker, QuotaTracker};
use anvil_runner::fixtures::{register_cleanup_then_fail, register_echo, register_sleep_then_echo};
use anvil_runner::HandlerRegistry;
use config::ExecutorConfig;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let loader = ConfigLoader::<ExecutorConfig>::new("anvil-executor.toml", "ANVIL_EXECUTOR");
    let Some(config) = loader.load_or_dump_config() else {
        return Ok(());
    };

    anvil_core::tracing_init::init_tracing(&config.tracing);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(config))
}

async fn run(config: ExecutorConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.socket_dir)?;

    let registry = HandlerRegistry::new();
    register_echo(&registry);
    register_sleep_then_echo(&registry);
    register_cleanup_then_fail(&registry, Arc::new(AtomicBool::new(false)));

    let manifests = Arc::new(demo::registry());
    let backend = build_backend(
        BackendMode::Auto,
        AutoSelectionHint { plugin_is_trusted: true },
        registry,
        config.pool.clone(),
        None,
    );
    backend.start().await.map_err(|err| anyhow::anyhow!("backend failed to start: {err}"))?;

    let analytics: Arc<dyn Analytics> = Arc::new(MemoryAnalytics::default());
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::default());

    let workspaces = Arc::new(CompositeWorkspaceManager::new(
        LocalWorkspaceManager::new(),
        EphemeralWorkspaceManager::new(config.socket_dir.join("ephemeral-workspaces")),
    ));

    let orchestrator = Orchestrator::new(
        manifests.clone(),
        backend.clone(),
        analytics.clone(),
        workspaces,
        SnapshotStore::new(),
        config.debug_insights,
    );
    run_smoke_execution(&orchestrator).await;

    let invoke_backends = Arc::new(InMemoryBackendRegistry::new());
    invoke_backends.insert("demo", backend.clone());
    let _invoke_broker = Arc::new(InvokeBroker::new(manifests.clone(), invoke_backends.clone(), InvokeConfig::default()));

    let quotas = Arc::new(QuotaTracker::new(cache));
    let degradation = Arc::new(DegradationController::new(config.degradation, Some(analytics)));
    let job_broker = Arc::new(JobBroker::new(manifests, invoke_backends, quotas, degradation));
    let trigger_listener = job_broker.clone().spawn_trigger_listener();

    tracing::info!(socket_dir = %config.socket_dir.display(), "anvil-executor started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining backend");

    trigger_listener.abort();
    backend.shutdown().await;
    Ok(())
}

/// Drives one request through the CLI host adapter at startup so a broken wiring
/// (manifest, backend, or orchestrator pipeline) is visible in the logs immediately
/// rather than on the first real request.
async fn run_smoke_execution(orchestrator: &Orchestrator) {
    let descriptor_args = DescriptorArgs {
        plugin_id: PluginId::from("demo"),
        plugin_version: "1.0.0".to_string(),
        request_id: RequestId::new(),
        tenant_id: None,
        permissions: PermissionSpec::default(),
        config: None,
        parent_request_id: None,
    };
    let descriptor = cli_descriptor(
        descriptor_args,
        CliHostContext::new(vec!["anvil-executor".to_string(), "--smoke-test".to_string()], serde_json::json!({})),
    );
    let request = ExecutionRequest {
        execution_id: ExecutionId::new(),
        descriptor,
        plugin_root: std::env::temp_dir(),
        handler_ref_file: "handlers/echo".to_string(),
        export_name: Some("execute".to_string()),
        input: serde_json::json!({"ping": "pong"}),
        workspace: WorkspaceSpec::local(std::env::temp_dir()),
        artifacts: ArtifactsSpec::default(),
        timeout: Duration::from_secs(5),
    };

    match orchestrator.execute(request, &[], None).await {
        Ok(outcome) => {
            let exit_code = derive_exit_code(Ok(&outcome), ExitCodePolicy::Major);
            tracing::info!(exit_code, "startup smoke execution succeeded");
        }
        Err(err) => {
            let exit_code = derive_exit_code(Err(&err), ExitCodePolicy::Major);
            tracing::warn!(code = %err.kind, exit_code, "startup smoke execution failed");
        }
    }
}
