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

//! Child-side bootstrap loop: a subprocess binary built against this crate calls
//! [`run_worker_main`] as its entire `main`. It applies the sandbox, connects to the
//! platform socket as an RPC client, imports the handler, runs it exactly like the
//! in-process runner, and reports back over stdout.

use crate::context::ExecutionContext;
use crate::registry::HandlerRegistry;
use crate::subprocess::protocol::{ChildMessage, ParentMessage};
use anvil_bridge::rpc::{RpcBridgeClient, RpcClientBridge};
use anvil_bridge::PlatformBridge;
use anvil_core::ids::{PluginId, RequestId, TenantId};
use anvil_core::manifest::PermissionSpec;
use anvil_core::{ErrorEnvelope, ErrorKind, PluginError, TraceContext};
use anvil_sandbox::{Sandbox, SandboxMode};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};

pub struct WorkerBootstrap {
    registry: HandlerRegistry,
    permissions: PermissionSpec,
}

impl WorkerBootstrap {
    pub fn new(registry: HandlerRegistry, permissions: PermissionSpec) -> Self {
        Self { registry, permissions }
    }

    async fn write(stdout: &mut Stdout, message: &ChildMessage) {
        if let Ok(serialized) = serde_json::to_string(message) {
            let _ = stdout.write_all(serialized.as_bytes()).await;
            let _ = stdout.write_all(b"\n").await;
        }
    }

    /// Runs the bootstrap loop to completion: announces readiness, then serves exactly
    /// one `execute` (a fresh worker process is spawned per dispatch in this mode),
    /// responding to `health`/`abort` in between.
    pub async fn run(self, stdin: Stdin, mut stdout: Stdout) {
        Self::write(&mut stdout, &ChildMessage::Ready).await;

        let mut lines = BufReader::new(stdin).lines();
        let cancellation = tokio_util::sync::CancellationToken::new();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                _ => break,
            };
            let message: ParentMessage = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(err) => {
                    tracing::warn!(error = %err, "malformed parent message");
                    continue;
                }
            };

            match message {
                ParentMessage::Health => {
                    Self::write(&mut stdout, &ChildMessage::HealthOk).await;
                }
                ParentMessage::Abort => {
                    cancellation.cancel();
                }
                ParentMessage::Shutdown { .. } => break,
                ParentMessage::Execute {
                    plugin_id,
                    plugin_version,
                    request_id,
                    tenant_id,
                    parent_trace,
                    handler_path,
                    handler_export,
                    input,
                    socket_path,
                    cwd,
                    outdir,
                } => {
                    let response = self
                        .execute(
                            plugin_id,
                            plugin_version,
                            request_id,
                            tenant_id,
                            parent_trace,
                            &handler_path,
                            &handler_export,
                            input,
                            socket_path,
                            cwd,
                            outdir,
                            cancellation.clone(),
                        )
                        .await;
                    Self::write(&mut stdout, &response).await;
                    break;
                }
            }
        }
    }

    async fn execute(
        &self,
        plugin_id: PluginId,
        plugin_version: String,
        request_id: RequestId,
        tenant_id: Option<TenantId>,
        parent_trace: Option<(String, String)>,
        handler_path: &str,
        handler_export: &str,
        input: serde_json::Value,
        socket_path: String,
        cwd: Option<String>,
        outdir: Option<String>,
        cancellation: tokio_util::sync::CancellationToken,
    ) -> ChildMessage {
        let handler = match self.registry.lookup(handler_path, handler_export) {
            Some(handler) => handler,
            None if !self.registry.has_file(handler_path) => {
                return ChildMessage::Error {
                    error: ErrorEnvelope::from_plugin_error(
                        PluginError::new(ErrorKind::HandlerNotFound, format!("no handler module registered at {handler_path}")),
                        None,
                    ),
                };
            }
            None => {
                return ChildMessage::Error {
                    error: ErrorEnvelope::from_plugin_error(
                        PluginError::new(ErrorKind::HandlerContractError, format!("handler module {handler_path} has no export {handler_export}")),
                        None,
                    ),
                };
            }
        };

        let cwd = cwd.map(std::path::PathBuf::from).unwrap_or_else(std::env::temp_dir);
        let outdir = outdir.map(std::path::PathBuf::from);
        let sandbox = Arc::new(Sandbox::new(SandboxMode::Enforce, self.permissions.clone(), cwd.clone()));

        let trace = match &parent_trace {
            Some((trace_id, span_id)) => TraceContext::child_of(trace_id, span_id),
            None => TraceContext::root(),
        };

        let client = match RpcBridgeClient::connect(std::path::Path::new(&socket_path)).await {
            Ok(client) => Arc::new(client),
            Err(err) => return ChildMessage::Error { error: ErrorEnvelope::from_plugin_error(err, None) },
        };
        let bridge: Arc<dyn PlatformBridge> = Arc::new(RpcClientBridge::new(client, &plugin_id.to_string(), &request_id.to_string(), &trace.trace_id));

        let mut context = ExecutionContext::new(plugin_id, plugin_version, request_id, tenant_id, trace, sandbox, bridge, cwd, outdir, cancellation);

        let outcome = handler(&mut context, input).await;
        context.drain_cleanup().await;

        match outcome {
            Ok(output) => ChildMessage::from_output(output),
            Err(err) => ChildMessage::Error {
                error: ErrorEnvelope::from_plugin_error(err, None),
            },
        }
    }
}
