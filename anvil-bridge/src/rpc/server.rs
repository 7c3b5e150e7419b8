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

//! Server side of the cross-process platform bridge: binds a Unix-domain stream socket
//! at a deterministic path per platform instance and dispatches `adapter:call` messages
//! to the in-process [`crate::inprocess::DirectBridge`] behind it.

use crate::contract::PlatformBridge;
use crate::inprocess::DirectBridge;
use crate::rpc::protocol::{AdapterCall, AdapterResponse};
use anvil_core::{ErrorEnvelope, ErrorKind, PluginError};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

pub struct RpcBridgeServer {
    listener: UnixListener,
    bridge: Arc<DirectBridge>,
}

impl RpcBridgeServer {
    pub async fn bind(socket_path: &std::path::Path, bridge: Arc<DirectBridge>) -> Result<Self, PluginError> {
        if socket_path.exists() {
            let _ = std::fs::remove_file(socket_path);
        }
        let listener = UnixListener::bind(socket_path)
            .map_err(|err| PluginError::new(ErrorKind::WorkspaceError, format!("failed to bind platform socket: {err}")))?;
        Ok(Self { listener, bridge })
    }

    /// Accepts connections until the listener is dropped; each connection is served on
    /// its own task so a slow child does not block others (there is normally exactly one).
    pub async fn serve(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let bridge = self.bridge.clone();
                    tokio::spawn(Self::serve_connection(stream, bridge));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "platform socket accept failed");
                    break;
                }
            }
        }
    }

    async fn serve_connection(stream: UnixStream, bridge: Arc<DirectBridge>) {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                _ => break,
            };
            let call: AdapterCall = match serde_json::from_str(&line) {
                Ok(call) => call,
                Err(err) => {
                    tracing::warn!(error = %err, "malformed adapter:call frame");
                    continue;
                }
            };
            let AdapterCall::Call { request_id, adapter, method, args } = call;
            let response = match dispatch(&bridge, &adapter, &method, args).await {
                Ok(result) => AdapterResponse::ok(request_id, result),
                Err(err) => AdapterResponse::err(request_id, ErrorEnvelope::from_plugin_error(err, None)),
            };
            let Ok(serialized) = serde_json::to_string(&response) else {
                continue;
            };
            if write_half.write_all(serialized.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\n").await.is_err() {
                break;
            }
        }
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Null)
}

async fn dispatch(bridge: &DirectBridge, adapter: &str, method: &str, args: Vec<Value>) -> Result<Value, PluginError> {
    match (adapter, method) {
        ("cache", "get") => {
            let key = arg(&args, 0);
            Ok(serde_json::to_value(bridge.cache().get(key.as_str().unwrap_or_default()).await?).unwrap())
        }
        ("cache", "set") => {
            let key = arg(&args, 0);
            let value = arg(&args, 1);
            let ttl = arg(&args, 2).as_u64();
            bridge.cache().set(key.as_str().unwrap_or_default(), value, ttl).await?;
            Ok(Value::Null)
        }
        ("cache", "delete") => {
            bridge.cache().delete(arg(&args, 0).as_str().unwrap_or_default()).await?;
            Ok(Value::Null)
        }
        ("cache", "clear") => {
            bridge.cache().clear().await?;
            Ok(Value::Null)
        }
        ("vector-store", "search") => {
            let collection = arg(&args, 0);
            let vector: Vec<f32> = serde_json::from_value(arg(&args, 1)).unwrap_or_default();
            let top_k = arg(&args, 2).as_u64().unwrap_or(10) as usize;
            let results = bridge
                .vector_store()
                .search(collection.as_str().unwrap_or_default(), vector, top_k)
                .await?;
            Ok(Value::Array(results))
        }
        ("analytics", "track") => {
            bridge
                .analytics()
                .track(arg(&args, 0).as_str().unwrap_or_default(), arg(&args, 1))
                .await?;
            Ok(Value::Null)
        }
        ("event-bus", "publish") => {
            bridge
                .event_bus()
                .publish(arg(&args, 0).as_str().unwrap_or_default(), arg(&args, 1))
                .await?;
            Ok(Value::Null)
        }
        ("event-bus", "subscribe") => {
            // Cross-process subscriptions are not durable by default.
            tracing::warn!(topic = ?arg(&args, 0), "cross-process event-bus subscription is a no-op");
            Ok(serde_json::json!({"unsubscribed": true}))
        }
        (adapter, method) => Err(PluginError::new(
            ErrorKind::HandlerContractError,
            format!("unknown platform adapter method {adapter}.{method}"),
        )),
    }
}
