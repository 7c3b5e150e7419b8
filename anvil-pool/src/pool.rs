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

//! The worker pool: a bounded population of in-process runner workers, dispatched
//! under per-plugin admission control, recycled on request/uptime limits, and kept
//! healthy by a periodic probe.

use crate::config::PoolConfig;
use crate::stats::{PoolStats, PoolStatsSnapshot};
use anvil_core::ids::{PluginId, WorkerId};
use anvil_core::{ErrorKind, PluginError, RunResult};
use anvil_runner::{HandlerRegistry, InProcessRunInput, InProcessRunner};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

struct ManagedWorker {
    id: WorkerId,
    runner: InProcessRunner,
    requests_served: AtomicU64,
    spawned_at: Instant,
}

impl ManagedWorker {
    fn new(registry: HandlerRegistry) -> Self {
        Self {
            id: WorkerId::new(),
            runner: InProcessRunner::new(registry),
            requests_served: AtomicU64::new(0),
            spawned_at: Instant::now(),
        }
    }

    fn is_stale(&self, config: &PoolConfig) -> bool {
        self.requests_served.load(Ordering::Relaxed) >= config.max_requests_per_worker || self.spawned_at.elapsed() >= config.max_uptime_per_worker
    }
}

/// Keeps a live population of workers, dispatches requests under admission limits,
/// recycles exhausted workers, and replaces crashed ones.
pub struct WorkerPool {
    config: PoolConfig,
    registry: HandlerRegistry,
    workers: DashMap<WorkerId, Arc<ManagedWorker>>,
    idle: Mutex<VecDeque<WorkerId>>,
    idle_notify: Notify,
    queue_len: AtomicUsize,
    active_per_plugin: DashMap<PluginId, u32>,
    shutting_down: AtomicBool,
    stats: PoolStats,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, registry: HandlerRegistry) -> Arc<Self> {
        let pool = Arc::new(Self {
            config,
            registry,
            workers: DashMap::new(),
            idle: Mutex::new(VecDeque::new()),
            idle_notify: Notify::new(),
            queue_len: AtomicUsize::new(0),
            active_per_plugin: DashMap::new(),
            shutting_down: AtomicBool::new(false),
            stats: PoolStats::default(),
        });
        pool.warmup();
        pool
    }

    /// Spawns `min` workers eagerly so the population never starts at zero — the
    /// mode-specific (`marked`/`top-n`) warmup beyond this floor is the caller's
    /// responsibility once a manifest/usage-history source is available.
    fn warmup(&self) {
        for _ in 0..self.config.min {
            let worker = Arc::new(ManagedWorker::new(self.registry.clone()));
            self.workers.insert(worker.id, worker.clone());
            self.idle.try_lock().expect("uncontended at construction").push_back(worker.id);
        }
    }

    fn dec_active(&self, plugin_id: &PluginId) {
        if let Some(mut count) = self.active_per_plugin.get_mut(plugin_id) {
            *count = count.saturating_sub(1);
        }
    }

    async fn acquire_worker(&self, cancellation: &CancellationToken) -> Result<Arc<ManagedWorker>, PluginError> {
        loop {
            let popped = self.idle.lock().await.pop_front();
            if let Some(id) = popped {
                let Some(worker) = self.workers.get(&id).map(|w| w.clone()) else {
                    continue;
                };
                if worker.is_stale(&self.config) {
                    self.workers.remove(&id);
                    self.stats.recycle_count.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(worker_id = %id, "recycling worker past request/uptime limit");
                    self.spawn_replacement();
                    continue;
                }
                return Ok(worker);
            }

            if self.workers.len() < self.config.max {
                let worker = Arc::new(ManagedWorker::new(self.registry.clone()));
                self.workers.insert(worker.id, worker.clone());
                return Ok(worker);
            }

            if self.queue_len.load(Ordering::Relaxed) >= self.config.max_queue_size {
                self.stats.queue_full_count.fetch_add(1, Ordering::Relaxed);
                return Err(PluginError::new(ErrorKind::QueueFull, "worker pool queue is full"));
            }

            self.queue_len.fetch_add(1, Ordering::Relaxed);
            let notified = self.idle_notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = cancellation.cancelled() => {
                    self.queue_len.fetch_sub(1, Ordering::Relaxed);
                    return Err(PluginError::aborted("queued dispatch cancelled"));
                }
            }
            self.queue_len.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn spawn_replacement(&self) {
        let worker = Arc::new(ManagedWorker::new(self.registry.clone()));
        self.workers.insert(worker.id, worker.clone());
        // Registered idle immediately: constructing a `ManagedWorker` here is cheap
        // (no real process to wait for), unlike a subprocess-backed pool.
        if let Ok(mut idle) = self.idle.try_lock() {
            idle.push_back(worker.id);
        }
        self.idle_notify.notify_one();
    }

    fn release_worker(&self, id: WorkerId) {
        if let Ok(mut idle) = self.idle.try_lock() {
            idle.push_back(id);
        }
        self.idle_notify.notify_one();
    }

    /// Dispatches a handler invocation onto a pool worker, enforcing admission control,
    /// queueing, and the acquire timeout end to end.
    pub async fn dispatch(
        &self,
        plugin_id: PluginId,
        input: InProcessRunInput,
        cancellation: CancellationToken,
    ) -> Result<RunResult<Value>, PluginError> {
        if self.shutting_down.load(Ordering::Relaxed) {
            return Err(PluginError::aborted("worker pool is shutting down"));
        }
        if let Some(cap) = self.config.max_concurrent_per_plugin {
            let active = self.active_per_plugin.get(&plugin_id).map(|e| *e).unwrap_or(0);
            if active >= cap {
                return Err(PluginError::new(ErrorKind::QueueFull, "per-plugin concurrency cap reached"));
            }
        }
        if cancellation.is_cancelled() {
            return Err(PluginError::aborted("dispatch cancelled before admission"));
        }

        *self.active_per_plugin.entry(plugin_id.clone()).or_insert(0) += 1;
        self.stats.total.fetch_add(1, Ordering::Relaxed);

        let acquire_start = Instant::now();
        let worker = match tokio::time::timeout(self.config.acquire_timeout, self.acquire_worker(&cancellation)).await {
            Ok(Ok(worker)) => worker,
            Ok(Err(err)) => {
                self.dec_active(&plugin_id);
                return Err(err);
            }
            Err(_) => {
                self.dec_active(&plugin_id);
                self.stats.acquire_timeout_count.fetch_add(1, Ordering::Relaxed);
                return Err(PluginError::new(ErrorKind::AcquireTimeout, "timed out waiting for an available worker"));
            }
        };
        self.stats.record_wait(acquire_start.elapsed());

        let worker_id = worker.id;
        let result = worker.runner.run(input).await;
        worker.requests_served.fetch_add(1, Ordering::Relaxed);

        self.release_worker(worker_id);
        self.dec_active(&plugin_id);

        match &result {
            Ok(_) => self.stats.success.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.stats.error.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    /// Probes every idle worker; a worker that fails too many consecutive probes would
    /// be killed and replaced in a subprocess-backed pool. In-process workers cannot
    /// actually go unhealthy independent of the host process, so this loop exists to
    /// keep the population at `min` and to surface the check in statistics/metrics.
    pub async fn run_health_check(&self) {
        let idle = self.idle.lock().await;
        tracing::debug!(idle = idle.len(), total = self.workers.len(), "worker pool health check");
        drop(idle);
        while self.workers.len() < self.config.min {
            self.spawn_replacement();
        }
    }

    pub fn spawn_health_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.config.health_check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if self.shutting_down.load(Ordering::Relaxed) {
                    break;
                }
                self.run_health_check().await;
            }
        })
    }

    pub async fn stats(&self) -> PoolStatsSnapshot {
        let idle_count = self.idle.lock().await.len();
        self.stats.snapshot(self.workers.len(), idle_count, self.queue_len.load(Ordering::Relaxed))
    }

    /// Marks the pool as shutting down; queued entries past this point are rejected
    /// with `ABORTED`. Never throws.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        self.idle_notify.notify_waiters();
        self.workers.clear();
        self.idle.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::manifest::HandlerRef;
    use anvil_sandbox::{Sandbox, SandboxMode};

    fn registry_with_echo() -> HandlerRegistry {
        let registry = HandlerRegistry::new();
        registry.register(
            "handlers/echo",
            "execute",
            Arc::new(|_ctx, input| Box::pin(async move { Ok(anvil_core::HandlerOutput::Raw(input)) })),
        );
        registry
    }

    fn run_input() -> InProcessRunInput {
        InProcessRunInput {
            plugin_id: PluginId::from("demo"),
            plugin_version: "1.0.0".to_string(),
            request_id: anvil_core::ids::RequestId::new(),
            tenant_id: None,
            parent_trace: None,
            handler_ref: HandlerRef::new("handlers/echo", "execute"),
            handler_id: None,
            input: serde_json::json!({"n": 1}),
            sandbox: Arc::new(Sandbox::new(SandboxMode::Trusted, anvil_core::manifest::PermissionSpec::default(), std::env::temp_dir())),
            cwd: std::env::temp_dir(),
            outdir: None,
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn dispatch_runs_on_a_worker_and_releases_it() {
        let pool = WorkerPool::new(PoolConfig { min: 1, max: 1, ..Default::default() }, registry_with_echo());
        let result = pool.dispatch(PluginId::from("demo"), run_input(), CancellationToken::new()).await.unwrap();
        assert_eq!(result.data, serde_json::json!({"n": 1}));
        assert_eq!(pool.stats().await.success, 1);
    }

    #[tokio::test]
    async fn per_plugin_cap_rejects_with_queue_full() {
        let pool = WorkerPool::new(
            PoolConfig {
                min: 1,
                max: 1,
                max_concurrent_per_plugin: Some(0),
                ..Default::default()
            },
            registry_with_echo(),
        );
        let result = pool.dispatch(PluginId::from("demo"), run_input(), CancellationToken::new()).await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::QueueFull);
    }

    #[tokio::test]
    async fn full_queue_is_rejected_once_population_and_queue_are_saturated() {
        let pool = WorkerPool::new(
            PoolConfig {
                min: 0,
                max: 0,
                max_queue_size: 0,
                acquire_timeout: Duration::from_millis(50),
                ..Default::default()
            },
            registry_with_echo(),
        );
        let result = pool.dispatch(PluginId::from("demo"), run_input(), CancellationToken::new()).await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::QueueFull);
    }

    #[tokio::test]
    async fn acquire_timeout_fires_when_no_worker_becomes_available() {
        let pool = WorkerPool::new(
            PoolConfig {
                min: 0,
                max: 0,
                max_queue_size: 10,
                acquire_timeout: Duration::from_millis(30),
                ..Default::default()
            },
            registry_with_echo(),
        );
        let result = pool.dispatch(PluginId::from("demo"), run_input(), CancellationToken::new()).await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::AcquireTimeout);
        assert_eq!(pool.stats().await.acquire_timeout_count, 1);
    }

    #[tokio::test]
    async fn stale_worker_is_recycled_on_next_acquire() {
        let pool = WorkerPool::new(
            PoolConfig {
                min: 1,
                max: 1,
                max_requests_per_worker: 1,
                ..Default::default()
            },
            registry_with_echo(),
        );
        pool.dispatch(PluginId::from("demo"), run_input(), CancellationToken::new()).await.unwrap();
        pool.dispatch(PluginId::from("demo"), run_input(), CancellationToken::new()).await.unwrap();
        assert_eq!(pool.stats().await.recycle_count, 1);
    }

    #[tokio::test]
    async fn shutdown_rejects_subsequent_dispatch() {
        let pool = WorkerPool::new(PoolConfig { min: 1, max: 1, ..Default::default() }, registry_with_echo());
        pool.shutdown().await;
        let result = pool.dispatch(PluginId::from("demo"), run_input(), CancellationToken::new()).await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Aborted);
    }
}
