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

//! Client side of the cross-process platform bridge. One client per subprocess; the
//! client multiplexes concurrent calls over a single socket by `requestId`.

use crate::rpc::protocol::{AdapterCall, AdapterResponse};
use anvil_core::{ErrorEnvelope, ErrorKind, PluginError};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, Mutex};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

type Pending = Arc<DashMap<String, oneshot::Sender<AdapterResponse>>>;

/// Connects to the parent's Unix-domain platform socket and exposes `call`, multiplexing
/// concurrent requests by `requestId`. Streaming responses (e.g. LLM token streams)
/// degrade to a single final `adapter:response` chunk.
pub struct RpcBridgeClient {
    writer: Mutex<mpsc::UnboundedSender<String>>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    call_timeout: Duration,
}

impl RpcBridgeClient {
    pub async fn connect(socket_path: &std::path::Path) -> Result<Self, PluginError> {
        Self::connect_with_timeout(socket_path, DEFAULT_CALL_TIMEOUT).await
    }

    pub async fn connect_with_timeout(socket_path: &std::path::Path, call_timeout: Duration) -> Result<Self, PluginError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|err| PluginError::new(ErrorKind::WorkspaceError, format!("failed to connect to platform socket: {err}")))?;
        let (read_half, mut write_half) = stream.into_split();

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        let pending: Pending = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if write_half.write_all(b"\n").await.is_err() {
                    break;
                }
            }
        });

        let read_pending = pending.clone();
        let read_closed = closed.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Ok(response) = serde_json::from_str::<AdapterResponse>(&line) {
                            let AdapterResponse::Response { ref request_id, .. } = response;
                            if let Some((_, sender)) = read_pending.remove(request_id) {
                                let _ = sender.send(response);
                            }
                        }
                    }
                    _ => break,
                }
            }
            read_closed.store(true, Ordering::SeqCst);
            let keys: Vec<String> = read_pending.iter().map(|e| e.key().clone()).collect();
            for key in keys {
                if let Some((_, sender)) = read_pending.remove(&key) {
                    let error = ErrorEnvelope::from_plugin_error(
                        PluginError::new(ErrorKind::WorkspaceError, "platform socket connection lost"),
                        None,
                    );
                    let _ = sender.send(AdapterResponse::Response {
                        request_id: key,
                        result: None,
                        error: Some(error),
                    });
                }
            }
        });

        Ok(Self {
            writer: Mutex::new(line_tx),
            pending,
            closed,
            call_timeout,
        })
    }

    pub async fn call(&self, adapter: &str, method: &str, args: Vec<Value>) -> Result<Value, PluginError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PluginError::new(ErrorKind::Aborted, "platform bridge client is closed"));
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        let call = AdapterCall::Call {
            request_id: request_id.clone(),
            adapter: adapter.to_string(),
            method: method.to_string(),
            args,
        };
        let serialized = serde_json::to_string(&call)
            .map_err(|err| PluginError::new(ErrorKind::ValidationError, err.to_string()))?;

        self.writer
            .lock()
            .await
            .send(serialized)
            .map_err(|_| PluginError::new(ErrorKind::Aborted, "platform bridge client is closed"))?;

        let response = tokio::time::timeout(self.call_timeout, rx).await;
        match response {
            Ok(Ok(AdapterResponse::Response { result, error, .. })) => {
                if let Some(envelope) = error {
                    Err(PluginError::new(envelope.code, envelope.message))
                } else {
                    Ok(result.unwrap_or(Value::Null))
                }
            }
            Ok(Err(_)) => Err(PluginError::new(ErrorKind::WorkspaceError, "platform bridge connection closed before responding")),
            Err(_) => {
                self.pending.remove(&request_id);
                Err(PluginError::timeout(format!("platform call {adapter}.{method} timed out")))
            }
        }
    }

    /// Idempotent: calling `close` more than once, or after a connection loss, is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let keys: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, sender)) = self.pending.remove(&key) {
                let error = ErrorEnvelope::from_plugin_error(PluginError::new(ErrorKind::Aborted, "platform bridge client closed"), None);
                let _ = sender.send(AdapterResponse::Response {
                    request_id: key,
                    result: None,
                    error: Some(error),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::server::RpcBridgeServer;
    use crate::inprocess::DirectBridge;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn call_round_trips_through_the_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("platform.sock");
        let bridge = StdArc::new(DirectBridge::bound("demo@1.0.0", "req-1", "trace-1"));
        let server = RpcBridgeServer::bind(&socket_path, bridge).await.unwrap();
        tokio::spawn(server.serve());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let client = RpcBridgeClient::connect(&socket_path).await.unwrap();
        let result = client
            .call("cache", "set", vec![Value::String("k".into()), serde_json::json!("v"), Value::Null])
            .await
            .unwrap();
        assert_eq!(result, Value::Null);

        let got = client.call("cache", "get", vec![Value::String("k".into())]).await.unwrap();
        assert_eq!(got, serde_json::json!("v"));
    }

    #[tokio::test]
    async fn calls_after_close_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("platform.sock");
        let bridge = StdArc::new(DirectBridge::bound("demo@1.0.0", "req-1", "trace-1"));
        let server = RpcBridgeServer::bind(&socket_path, bridge).await.unwrap();
        tokio::spawn(server.serve());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let client = RpcBridgeClient::connect(&socket_path).await.unwrap();
        client.close();
        client.close();
        let result = client.call("cache", "get", vec![Value::String("k".into())]).await;
        assert!(result.is_err());
    }
}
