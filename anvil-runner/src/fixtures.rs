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

//! A small set of fixture handlers used across this workspace's test suites, so every
//! crate that needs a stand-in handler (pool, invoke, jobs, host adapters) registers
//! the same behavior instead of reinventing an echo function.

use crate::context::ExecutionContext;
use crate::registry::HandlerRegistry;
use anvil_core::{HandlerOutput, PluginError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// `handlers/echo#execute` — returns its input unchanged.
pub fn register_echo(registry: &HandlerRegistry) {
    registry.register(
        "handlers/echo",
        "execute",
        Arc::new(|_ctx: &mut ExecutionContext, input: Value| Box::pin(async move { Ok(HandlerOutput::Raw(input)) })),
    );
}

/// `handlers/sleep-then-echo#execute` — reads `input.sleepMs` (default 10), sleeps that
/// long observing cancellation, then echoes the input back. Exercises timeout and
/// cancellation paths without a real I/O dependency.
pub fn register_sleep_then_echo(registry: &HandlerRegistry) {
    registry.register(
        "handlers/sleep-then-echo",
        "execute",
        Arc::new(|ctx: &mut ExecutionContext, input: Value| {
            let cancellation = ctx.cancellation.clone();
            Box::pin(async move {
                let sleep_ms = input.get("sleepMs").and_then(Value::as_u64).unwrap_or(10);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {}
                    _ = cancellation.cancelled() => {
                        return Err(PluginError::aborted("sleep-then-echo cancelled before it finished sleeping"));
                    }
                }
                Ok(HandlerOutput::Raw(input))
            })
        }),
    );
}

/// `handlers/cleanup-then-fail#execute` — registers a finalizer that flips `ran` before
/// returning a `HANDLER_ERROR`, so callers can assert cleanup still drains on failure.
pub fn register_cleanup_then_fail(registry: &HandlerRegistry, ran: Arc<std::sync::atomic::AtomicBool>) {
    registry.register(
        "handlers/cleanup-then-fail",
        "execute",
        Arc::new(move |ctx: &mut ExecutionContext, _input: Value| {
            let ran = ran.clone();
            ctx.defer(Box::new(move || {
                Box::pin(async move {
                    ran.store(true, std::sync::atomic::Ordering::SeqCst);
                })
            }));
            Box::pin(async move { Err(PluginError::new(anvil_core::ErrorKind::HandlerError, "cleanup-then-fail always fails")) })
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_bridge::DirectBridge;
    use anvil_core::ids::{PluginId, RequestId};
    use anvil_core::manifest::PermissionSpec;
    use anvil_core::TraceContext;
    use anvil_sandbox::{Sandbox, SandboxMode};
    use std::sync::atomic::{AtomicBool, Ordering};

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
    async fn echo_returns_its_input() {
        let registry = HandlerRegistry::new();
        register_echo(&registry);
        let handler = registry.lookup("handlers/echo", "execute").unwrap();
        let mut ctx = context();
        let out = handler(&mut ctx, serde_json::json!({"a": 1})).await.unwrap();
        assert_eq!(out.into_data(), serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn sleep_then_echo_observes_cancellation() {
        let registry = HandlerRegistry::new();
        register_sleep_then_echo(&registry);
        let handler = registry.lookup("handlers/sleep-then-echo", "execute").unwrap();
        let mut ctx = context();
        ctx.cancellation.cancel();
        let err = handler(&mut ctx, serde_json::json!({"sleepMs": 500})).await.unwrap_err();
        assert_eq!(err.kind, anvil_core::ErrorKind::Aborted);
    }

    #[tokio::test]
    async fn cleanup_then_fail_drains_its_finalizer_despite_the_error() {
        let registry = HandlerRegistry::new();
        let ran = Arc::new(AtomicBool::new(false));
        register_cleanup_then_fail(&registry, ran.clone());
        let handler = registry.lookup("handlers/cleanup-then-fail", "execute").unwrap();
        let mut ctx = context();
        let result = handler(&mut ctx, Value::Null).await;
        assert!(result.is_err());
        ctx.drain_cleanup().await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
