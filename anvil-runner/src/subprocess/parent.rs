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

//! Parent side of the subprocess runner: binds the platform socket the child will
//! connect to, spawns a child pointed at a bootstrap entry, waits for readiness,
//! dispatches one execution, and can abort it.

use crate::subprocess::protocol::{ChildMessage, ParentMessage};
use anvil_bridge::rpc::RpcBridgeServer;
use anvil_bridge::DirectBridge;
use anvil_core::ids::WorkerId;
use anvil_core::{ErrorKind, ExecutionMeta, PluginError, RunResult};
use chrono::Utc;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

const DEFAULT_READY_DEADLINE: Duration = Duration::from_secs(10);

pub struct SubprocessSpawnOptions {
    pub bootstrap_command: String,
    pub bootstrap_args: Vec<String>,
    pub socket_path: PathBuf,
    pub ready_deadline: Duration,
    pub bridge: Arc<DirectBridge>,
}

impl SubprocessSpawnOptions {
    pub fn new(bootstrap_command: impl Into<String>, socket_path: PathBuf, bridge: Arc<DirectBridge>) -> Self {
        Self {
            bootstrap_command: bootstrap_command.into(),
            bootstrap_args: Vec::new(),
            socket_path,
            ready_deadline: DEFAULT_READY_DEADLINE,
            bridge,
        }
    }
}

pub struct SubprocessWorker {
    pub worker_id: WorkerId,
    child: Child,
    server_handle: JoinHandle<()>,
    socket_path: PathBuf,
}

impl SubprocessWorker {
    /// Binds the platform socket and starts serving it, spawns the child, and blocks
    /// until it reports `ready` or the startup deadline elapses (a startup failure,
    /// distinct from a crash once running).
    pub async fn spawn(options: SubprocessSpawnOptions) -> Result<Self, PluginError> {
        let worker_id = WorkerId::new();

        let server = RpcBridgeServer::bind(&options.socket_path, options.bridge.clone()).await?;
        let server_handle = tokio::spawn(server.serve());

        let mut command = Command::new(&options.bootstrap_command);
        command
            .args(&options.bootstrap_args)
            .env("ANVIL_WORKER_ID", worker_id.to_string())
            .env("ANVIL_IPC_SOCKET_PATH", &options.socket_path)
            .env("ANVIL_SANDBOX_MODE", "enforce")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                server_handle.abort();
                return Err(PluginError::new(ErrorKind::WorkerCrashed, format!("failed to spawn worker: {err}")));
            }
        };

        let stdout = child.stdout.take().expect("piped stdout");
        let mut lines = BufReader::new(stdout).lines();

        let ready = tokio::time::timeout(options.ready_deadline, async {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Ok(ChildMessage::Ready) = serde_json::from_str::<ChildMessage>(&line) {
                            return Ok(());
                        }
                    }
                    _ => return Err(()),
                }
            }
        })
        .await;

        match ready {
            Ok(Ok(())) => {}
            _ => {
                let _ = child.start_kill();
                server_handle.abort();
                return Err(PluginError::new(ErrorKind::WorkerCrashed, "worker did not become ready within the startup deadline"));
            }
        }

        Ok(Self {
            worker_id,
            child,
            server_handle,
            socket_path: options.socket_path,
        })
    }

    pub async fn execute(&mut self, message: ParentMessage) -> Result<RunResult<Value>, PluginError> {
        let start_time = Utc::now();
        let (plugin_id, plugin_version, request_id, tenant_id) = match &message {
            ParentMessage::Execute {
                plugin_id,
                plugin_version,
                request_id,
                tenant_id,
                ..
            } => (plugin_id.clone(), plugin_version.clone(), *request_id, tenant_id.clone()),
            _ => (
                anvil_core::ids::PluginId::from("unknown"),
                "0.0.0".to_string(),
                anvil_core::ids::RequestId::new(),
                None,
            ),
        };

        let stdin = self.child.stdin.as_mut().expect("piped stdin");
        let serialized = serde_json::to_string(&message).map_err(|err| PluginError::new(ErrorKind::ValidationError, err.to_string()))?;
        stdin
            .write_all(serialized.as_bytes())
            .await
            .map_err(|err| PluginError::new(ErrorKind::WorkerCrashed, err.to_string()))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|err| PluginError::new(ErrorKind::WorkerCrashed, err.to_string()))?;

        let stdout = self.child.stdout.as_mut().expect("piped stdout");
        let mut lines = BufReader::new(stdout).lines();
        let response = lines
            .next_line()
            .await
            .map_err(|err| PluginError::new(ErrorKind::WorkerCrashed, err.to_string()))?
            .ok_or_else(|| PluginError::new(ErrorKind::WorkerCrashed, "worker closed its stream before responding"))?;

        let child_message: ChildMessage =
            serde_json::from_str(&response).map_err(|err| PluginError::new(ErrorKind::WorkerCrashed, format!("malformed worker response: {err}")))?;

        match child_message {
            ChildMessage::Result { result, .. } => {
                let end_time = Utc::now();
                Ok(RunResult {
                    data: result,
                    execution_meta: ExecutionMeta {
                        start_time,
                        end_time,
                        duration: (end_time - start_time).to_std().unwrap_or_default(),
                        plugin_id,
                        plugin_version,
                        handler_id: None,
                        request_id,
                        tenant_id,
                    },
                })
            }
            ChildMessage::Error { error } => Err(PluginError::new(error.code, error.message)),
            other => Err(PluginError::new(ErrorKind::WorkerCrashed, format!("unexpected worker response: {other:?}"))),
        }
    }

    /// Signals the child to abort; the child is expected to finish cleanup and exit.
    pub async fn abort(&mut self) -> Result<(), PluginError> {
        if let Some(stdin) = self.child.stdin.as_mut() {
            let serialized = serde_json::to_string(&ParentMessage::Abort).unwrap();
            let _ = stdin.write_all(serialized.as_bytes()).await;
            let _ = stdin.write_all(b"\n").await;
        }
        Ok(())
    }

    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        let status = self.child.wait().await;
        self.server_handle.abort();
        let _ = std::fs::remove_file(&self.socket_path);
        status
    }
}
