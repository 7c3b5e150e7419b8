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

//! The execution context handed to a handler: descriptor, sandbox, platform bridge,
//! workspace paths, and a LIFO cleanup stack drained after the handler returns.

use anvil_bridge::PlatformBridge;
use anvil_core::ids::{PluginId, RequestId, TenantId};
use anvil_core::TraceContext;
use anvil_sandbox::Sandbox;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;

pub type Finalizer = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

pub struct ExecutionContext {
    pub plugin_id: PluginId,
    pub plugin_version: String,
    pub request_id: RequestId,
    pub tenant_id: Option<TenantId>,
    pub trace: TraceContext,
    pub sandbox: Arc<Sandbox>,
    pub bridge: Arc<dyn PlatformBridge>,
    pub cwd: PathBuf,
    pub outdir: Option<PathBuf>,
    pub cancellation: tokio_util::sync::CancellationToken,
    cleanup_stack: Vec<Finalizer>,
}

impl ExecutionContext {
    pub fn new(
        plugin_id: PluginId,
        plugin_version: String,
        request_id: RequestId,
        tenant_id: Option<TenantId>,
        trace: TraceContext,
        sandbox: Arc<Sandbox>,
        bridge: Arc<dyn PlatformBridge>,
        cwd: PathBuf,
        outdir: Option<PathBuf>,
        cancellation: tokio_util::sync::CancellationToken,
    ) -> Self {
        Self {
            plugin_id,
            plugin_version,
            request_id,
            tenant_id,
            trace,
            sandbox,
            bridge,
            cwd,
            outdir,
            cancellation,
            cleanup_stack: Vec::new(),
        }
    }

    /// Registers a finalizer to run during teardown. Finalizers run in LIFO order
    /// (last registered, first run), mirroring a `defer`/`finally` stack.
    pub fn defer(&mut self, finalizer: Finalizer) {
        self.cleanup_stack.push(finalizer);
    }

    /// Drains the cleanup stack in LIFO order, awaiting each finalizer. A finalizer
    /// cannot fail outright (it returns `()`); components that need to report a
    /// cleanup failure do so by logging inside the finalizer itself before returning,
    /// so draining never stops partway through.
    pub async fn drain_cleanup(&mut self) {
        while let Some(finalizer) = self.cleanup_stack.pop() {
            finalizer().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_bridge::DirectBridge;
    use anvil_core::manifest::PermissionSpec;
    use anvil_sandbox::SandboxMode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> ExecutionContext {
        let sandbox = Arc::new(Sandbox::new(SandboxMode::Trusted, PermissionSpec::default(), std::env::temp_dir()));
        let bridge = Arc::new(DirectBridge::bound("demo@1.0.0", "req-1", "trace-1"));
        ExecutionContext::new(
            PluginId::from("demo"),
            "1.0.0".to_string(),
            RequestId::new(),
            None,
            TraceContext::root(),
            sandbox,
            bridge,
            std::env::temp_dir(),
            None,
            tokio_util::sync::CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn cleanup_drains_in_lifo_order() {
        let mut ctx = context();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            ctx.defer(Box::new(move || {
                Box::pin(async move {
                    order.lock().unwrap().push(i);
                })
            }));
        }

        ctx.drain_cleanup().await;
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn cleanup_continues_after_a_finalizer_panics_to_log_only() {
        let mut ctx = context();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran1 = ran.clone();
        let ran2 = ran.clone();

        ctx.defer(Box::new(move || {
            Box::pin(async move {
                ran1.fetch_add(1, Ordering::SeqCst);
            })
        }));
        ctx.defer(Box::new(move || {
            Box::pin(async move {
                ran2.fetch_add(1, Ordering::SeqCst);
            })
        }));

        ctx.drain_cleanup().await;
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }
}
