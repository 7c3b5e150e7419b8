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

//! Background job broker: one-shot `submit`, recurring `schedule`, and `cancel`,
//! dispatching through the same execution façade every other caller uses, with
//! degradation feedback and quota enforcement ahead of every admission.

use crate::degradation::{Admission, DegradationController};
use crate::handle::{JobHandle, JobStatus, ScheduleHandle};
use crate::quota::QuotaTracker;
use crate::scheduler::{self, ScheduleSpec, Triggered};
use anvil_core::ids::{ExecutionId, PluginId, RequestId, TenantId};
use anvil_core::manifest::{HandlerRef, JobSubmitPermission, ManifestRegistry};
use anvil_core::{ErrorKind, PluginError, TraceContext};
use anvil_exec::BackendRequest;
use anvil_invoke::PluginBackendRegistry;
use anvil_sandbox::{Sandbox, SandboxMode};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct JobSubmitRequest {
    pub caller_plugin_id: PluginId,
    pub target_plugin_id: PluginId,
    pub handler: Option<String>,
    pub input: Value,
    pub tenant_id: Option<TenantId>,
    pub timeout: Option<Duration>,
}

pub struct JobScheduleRequest {
    pub caller_plugin_id: PluginId,
    pub target_plugin_id: PluginId,
    pub handler: Option<String>,
    pub input: Value,
    pub expression: String,
}

struct ScheduleEntry {
    target_plugin_id: PluginId,
    handler: Option<String>,
    input: Value,
    cancellation: CancellationToken,
}

fn degraded_rejection() -> PluginError {
    PluginError::new(ErrorKind::WorkerUnhealthy, "job broker is in a critical degradation state")
        .with_context("code", "JOB_SUBMIT_REJECTED_DEGRADED")
}

fn not_allowed(caller: &str, target: &str, op: &str) -> PluginError {
    PluginError::permission_denied(format!("{caller} is not permitted to {op} jobs on {target}"))
        .with_context("code", "JOB_SUBMIT_NOT_ALLOWED")
}

/// `None` allow list defaults to `own-plugin`: only the plugin itself may submit or
/// schedule jobs charged against its own quota.
fn permission_allows(permission: &JobSubmitPermission, caller: &str, target: &str) -> bool {
    match &permission.allow {
        Some(list) => list.iter().any(|allowed| allowed.as_str() == caller),
        None => caller == target,
    }
}

pub struct JobBroker {
    manifests: Arc<dyn ManifestRegistry>,
    backends: Arc<dyn PluginBackendRegistry>,
    quotas: Arc<QuotaTracker>,
    degradation: Arc<DegradationController>,
    schedules: DashMap<Uuid, ScheduleEntry>,
    trigger_tx: broadcast::Sender<Triggered>,
}

impl JobBroker {
    pub fn new(
        manifests: Arc<dyn ManifestRegistry>,
        backends: Arc<dyn PluginBackendRegistry>,
        quotas: Arc<QuotaTracker>,
        degradation: Arc<DegradationController>,
    ) -> Self {
        let (trigger_tx, _rx) = broadcast::channel(1_024);
        Self {
            manifests,
            backends,
            quotas,
            degradation,
            schedules: DashMap::new(),
            trigger_tx,
        }
    }

    /// Subscribes to the shared trigger channel and re-enters `submit` for every
    /// `Triggered` message whose schedule is still registered. Intended to run for
    /// the lifetime of the broker — spawn once after wrapping it in an `Arc`.
    pub fn spawn_trigger_listener(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut receiver = self.trigger_tx.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(triggered) => self.handle_trigger(triggered).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }

    async fn handle_trigger(&self, triggered: Triggered) {
        let Some(entry) = self.schedules.get(&triggered.schedule_id) else {
            return;
        };
        if entry.cancellation.is_cancelled() {
            return;
        }
        let request = JobSubmitRequest {
            caller_plugin_id: entry.target_plugin_id.clone(),
            target_plugin_id: entry.target_plugin_id.clone(),
            handler: entry.handler.clone(),
            input: entry.input.clone(),
            tenant_id: None,
            timeout: None,
        };
        drop(entry);
        if let Err(err) = self.submit(request).await {
            tracing::warn!(code = "JOB_TRIGGER_FAILED", schedule_id = %triggered.schedule_id, error = %err, "scheduled job failed to submit");
        }
    }

    fn resolve_permission<'a>(&self, op: &str, permission: &'a anvil_core::manifest::JobsPermission) -> &'a JobSubmitPermission {
        if op == "schedule" {
            &permission.schedule
        } else {
            &permission.submit
        }
    }

    async fn admit(&self, caller: &PluginId, target: &PluginId, op: &str) -> Result<JobSubmitPermission, PluginError> {
        match self.degradation.admission() {
            Admission::Reject => return Err(degraded_rejection()),
            Admission::Delay(delay) => tokio::time::sleep(delay).await,
            Admission::Proceed => {}
        }

        let manifest = self
            .manifests
            .manifest(target.0.as_str())
            .ok_or_else(|| PluginError::new(ErrorKind::HandlerNotFound, format!("no manifest registered for plugin {target}")))?;

        let permission = self.resolve_permission(op, &manifest.permissions.jobs).clone();
        if !permission_allows(&permission, caller.0.as_str(), target.0.as_str()) {
            return Err(not_allowed(caller.0.as_str(), target.0.as_str(), op));
        }

        self.quotas.check_rolling_windows(target.0.as_str(), op, &permission).await?;
        self.quotas.check_min_interval(target.0.as_str(), op, permission.min_interval)?;

        Ok(permission)
    }

    /// One-shot background execution. Dispatches to the target plugin's own execution
    /// backend as a single-step run; the returned handle tracks it to completion.
    pub async fn submit(&self, request: JobSubmitRequest) -> Result<JobHandle, PluginError> {
        let permission = self.admit(&request.caller_plugin_id, &request.target_plugin_id, "submit").await?;

        self.quotas.concurrency.try_acquire(request.target_plugin_id.0.as_str(), permission.max_concurrent)?;

        let manifest = self
            .manifests
            .manifest(request.target_plugin_id.0.as_str())
            .ok_or_else(|| PluginError::new(ErrorKind::HandlerNotFound, "manifest disappeared between admission and dispatch"))?;

        let backend = self.backends.backend_for(request.target_plugin_id.0.as_str()).ok_or_else(|| {
            self.quotas.concurrency.release(request.target_plugin_id.0.as_str());
            PluginError::new(ErrorKind::HandlerNotFound, format!("no execution backend registered for plugin {}", request.target_plugin_id))
        })?;

        let handler_name = request.handler.clone().unwrap_or_else(|| "execute".to_string());
        let handler_ref = manifest
            .handler(&handler_name)
            .map(|metadata| metadata.handler_ref.clone())
            .unwrap_or_else(|| HandlerRef::new(format!("handlers/{handler_name}"), handler_name.clone()));

        let quota_timeout = Duration::from_millis(manifest.permissions.quotas.timeout_ms);
        let requested = request.timeout.unwrap_or(quota_timeout);
        let effective_timeout = match permission.max_duration {
            Some(cap) => requested.min(cap),
            None => requested,
        };

        let sandbox = Arc::new(Sandbox::new(SandboxMode::Enforce, manifest.permissions.clone(), std::env::temp_dir()));
        let cancellation = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(JobStatus::Pending);

        let backend_request = BackendRequest {
            execution_id: ExecutionId::new(),
            plugin_id: request.target_plugin_id.clone(),
            plugin_version: manifest.version.clone(),
            request_id: RequestId::new(),
            tenant_id: request.tenant_id,
            parent_trace: Some({
                let trace = TraceContext::root();
                (trace.trace_id, trace.span_id)
            }),
            handler_ref,
            handler_id: Some(handler_name),
            input: request.input,
            sandbox,
            cwd: std::env::temp_dir(),
            outdir: None,
            timeout: effective_timeout,
            cancellation: cancellation.clone(),
        };

        let job_id = Uuid::new_v4();
        let job_cancellation = cancellation.clone();
        let quotas = self.quotas.clone();
        let gauge_plugin = request.target_plugin_id.0.clone();

        let _ = status_tx.send(JobStatus::Running);

        tokio::spawn(async move {
            let final_status = if job_cancellation.is_cancelled() {
                JobStatus::Cancelled
            } else {
                tokio::select! {
                    result = backend.execute(backend_request) => match result {
                        Ok((result, _metadata)) => JobStatus::Succeeded(result),
                        Err(err) => JobStatus::Failed(Arc::new(err)),
                    },
                    _ = job_cancellation.cancelled() => JobStatus::Cancelled,
                }
            };
            quotas.concurrency.release(&gauge_plugin);
            let _ = status_tx.send(final_status);
        });

        Ok(JobHandle { id: job_id, status: status_rx, cancellation })
    }

    /// Registers a recurring job on a cron expression or interval shorthand.
    pub async fn schedule(&self, request: JobScheduleRequest) -> Result<ScheduleHandle, PluginError> {
        let permission = self.admit(&request.caller_plugin_id, &request.target_plugin_id, "schedule").await?;

        let spec = scheduler::parse_schedule_spec(&request.expression)?;
        if let (ScheduleSpec::Interval(interval), Some(min_interval)) = (&spec, permission.min_interval) {
            if *interval < min_interval {
                return Err(
                    PluginError::new(ErrorKind::ValidationError, format!("schedule interval {interval:?} is below the permitted minInterval {min_interval:?}"))
                        .with_context("code", "JOB_MIN_INTERVAL_VIOLATION"),
                );
            }
        }

        let schedule_id = Uuid::new_v4();
        let cancellation = CancellationToken::new();
        self.schedules.insert(
            schedule_id,
            ScheduleEntry {
                target_plugin_id: request.target_plugin_id.clone(),
                handler: request.handler,
                input: request.input,
                cancellation: cancellation.clone(),
            },
        );

        scheduler::spawn_ticker(spec, schedule_id, request.target_plugin_id.0, self.trigger_tx.clone(), cancellation.clone());

        Ok(ScheduleHandle { id: schedule_id, cancellation })
    }

    pub fn cancel_schedule(&self, schedule_id: Uuid) {
        if let Some((_, entry)) = self.schedules.remove(&schedule_id) {
            entry.cancellation.cancel();
        }
    }

    pub fn health_check(&self) -> serde_json::Value {
        self.degradation.health_check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DegradationThresholds;
    use anvil_bridge::inprocess::MemoryCache;
    use anvil_core::manifest::{HandlerMetadata, JobsPermission, Manifest, PermissionSpec};
    use anvil_core::manifest::testing::FixtureRegistry;
    use anvil_exec::InProcessBackend;
    use anvil_invoke::InMemoryBackendRegistry;
    use anvil_runner::HandlerRegistry;
    use std::collections::HashMap;

    fn manifest_with_jobs(submit: JobSubmitPermission) -> Manifest {
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
        permissions.jobs = JobsPermission { submit, schedule: JobSubmitPermission::default() };
        Manifest {
            id: "worker-plugin".to_string(),
            version: "1.0.0".to_string(),
            permissions,
            capabilities: vec![],
            handlers,
        }
    }

    fn broker_with(submit: JobSubmitPermission) -> JobBroker {
        broker_with_jobs(submit, JobSubmitPermission::default())
    }

    fn broker_with_jobs(submit: JobSubmitPermission, schedule: JobSubmitPermission) -> JobBroker {
        let registry = HandlerRegistry::new();
        registry.register(
            "handlers/echo",
            "execute",
            Arc::new(|_ctx, input| Box::pin(async move { Ok(anvil_core::HandlerOutput::Raw(input)) })),
        );

        let mut manifest = manifest_with_jobs(submit);
        manifest.permissions.jobs.schedule = schedule;

        let fixtures = FixtureRegistry::new();
        fixtures.insert(manifest, std::env::temp_dir());

        let backends = InMemoryBackendRegistry::new();
        backends.insert("worker-plugin", Arc::new(InProcessBackend::new(registry)));

        let quotas = Arc::new(QuotaTracker::new(Arc::new(MemoryCache::default())));
        let degradation = Arc::new(DegradationController::new(DegradationThresholds::default(), None));

        JobBroker::new(Arc::new(fixtures), Arc::new(backends), quotas, degradation)
    }

    fn submit_request() -> JobSubmitRequest {
        JobSubmitRequest {
            caller_plugin_id: PluginId::from("worker-plugin"),
            target_plugin_id: PluginId::from("worker-plugin"),
            handler: None,
            input: serde_json::json!({"hi": "there"}),
            tenant_id: None,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn submit_dispatches_and_succeeds() {
        let broker = broker_with(JobSubmitPermission::default());
        let mut handle = broker.submit(submit_request()).await.unwrap();
        let status = handle.await_result().await;
        match status {
            JobStatus::Succeeded(result) => assert_eq!(result.data, serde_json::json!({"hi": "there"})),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_is_rejected_when_caller_is_not_the_owning_plugin_and_not_allow_listed() {
        let broker = broker_with(JobSubmitPermission::default());
        let mut request = submit_request();
        request.caller_plugin_id = PluginId::from("someone-else");
        let err = broker.submit(request).await.unwrap_err();
        assert_eq!(err.context.get("code").map(String::as_str), Some("JOB_SUBMIT_NOT_ALLOWED"));
    }

    #[tokio::test]
    async fn submit_honors_an_explicit_allow_list() {
        let broker = broker_with(JobSubmitPermission { allow: Some(vec!["someone-else".to_string()]), ..Default::default() });
        let mut request = submit_request();
        request.caller_plugin_id = PluginId::from("someone-else");
        let mut handle = broker.submit(request).await.unwrap();
        assert!(matches!(handle.await_result().await, JobStatus::Succeeded(_)));
    }

    #[tokio::test]
    async fn max_concurrent_gauge_rejects_a_second_in_flight_job() {
        let broker = broker_with(JobSubmitPermission { max_concurrent: Some(1), ..Default::default() });
        let first = broker.submit(submit_request()).await.unwrap();
        let second = broker.submit(submit_request()).await;
        assert!(second.is_err());
        drop(first);
    }

    #[tokio::test]
    async fn cancel_stops_a_running_job_before_it_completes() {
        let broker = broker_with(JobSubmitPermission::default());
        let mut handle = broker.submit(submit_request()).await.unwrap();
        handle.cancel();
        let status = handle.await_result().await;
        assert!(matches!(status, JobStatus::Cancelled | JobStatus::Succeeded(_)));
    }

    #[tokio::test]
    async fn schedule_rejects_a_malformed_expression() {
        let broker = broker_with(JobSubmitPermission::default());
        let request = JobScheduleRequest {
            caller_plugin_id: PluginId::from("worker-plugin"),
            target_plugin_id: PluginId::from("worker-plugin"),
            handler: None,
            input: serde_json::json!({}),
            expression: "not a schedule".to_string(),
        };
        let err = broker.schedule(request).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn schedule_rejects_an_interval_below_min_interval() {
        let broker = broker_with_jobs(
            JobSubmitPermission::default(),
            JobSubmitPermission { min_interval: Some(Duration::from_secs(60)), ..Default::default() },
        );
        let request = JobScheduleRequest {
            caller_plugin_id: PluginId::from("worker-plugin"),
            target_plugin_id: PluginId::from("worker-plugin"),
            handler: None,
            input: serde_json::json!({}),
            expression: "5s".to_string(),
        };
        let err = broker.schedule(request).await.unwrap_err();
        assert_eq!(err.context.get("code").map(String::as_str), Some("JOB_MIN_INTERVAL_VIOLATION"));
    }

    #[tokio::test]
    async fn schedule_then_cancel_removes_the_registration() {
        let broker = broker_with(JobSubmitPermission::default());
        let request = JobScheduleRequest {
            caller_plugin_id: PluginId::from("worker-plugin"),
            target_plugin_id: PluginId::from("worker-plugin"),
            handler: None,
            input: serde_json::json!({}),
            expression: "5m".to_string(),
        };
        let handle = broker.schedule(request).await.unwrap();
        assert!(broker.schedules.contains_key(&handle.id));
        broker.cancel_schedule(handle.id);
        assert!(!broker.schedules.contains_key(&handle.id));
        assert!(handle.is_cancelled());
    }
}
