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

//! Cross-process [`PlatformBridge`]: every capability call is forwarded over a single
//! shared [`RpcBridgeClient`] to the parent's [`crate::inprocess::DirectBridge`]. The
//! logger is the one exception — it stays local, bound the same way the in-process
//! bridge binds it, since log lines never need a round trip to be useful.

use crate::contract::{Analytics, Cache, Database, Embeddings, EventBus, Llm, Logger, PlatformBridge, Storage, Unsubscribe, VectorStore};
use crate::inprocess::TracingLogger;
use crate::rpc::client::RpcBridgeClient;
use anvil_core::{ErrorKind, PluginError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct RpcClientBridge {
    client: Arc<RpcBridgeClient>,
    logger: TracingLogger,
}

impl RpcClientBridge {
    pub fn new(client: Arc<RpcBridgeClient>, plugin_id: &str, request_id: &str, trace_id: &str) -> Self {
        Self {
            client,
            logger: TracingLogger::bound(plugin_id, request_id, trace_id),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, PluginError> {
    serde_json::from_value(value).map_err(|err| PluginError::new(ErrorKind::ValidationError, err.to_string()))
}

#[async_trait]
impl Llm for RpcClientBridge {
    async fn complete(&self, prompt: Value) -> Result<Value, PluginError> {
        self.client.call("llm", "complete", vec![prompt]).await
    }

    async fn stream(&self, prompt: Value) -> Result<Value, PluginError> {
        self.client.call("llm", "stream", vec![prompt]).await
    }
}

#[async_trait]
impl Embeddings for RpcClientBridge {
    async fn embed(&self, text: String) -> Result<Vec<f32>, PluginError> {
        decode(self.client.call("embeddings", "embed", vec![Value::String(text)]).await?)
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, PluginError> {
        let args = vec![serde_json::to_value(texts).unwrap_or(Value::Null)];
        decode(self.client.call("embeddings", "embed_batch", args).await?)
    }
}

#[async_trait]
impl VectorStore for RpcClientBridge {
    async fn upsert(&self, collection: &str, id: &str, vector: Vec<f32>, metadata: Value) -> Result<(), PluginError> {
        let args = vec![Value::String(collection.to_string()), Value::String(id.to_string()), serde_json::to_value(vector).unwrap_or(Value::Null), metadata];
        self.client.call("vector-store", "upsert", args).await?;
        Ok(())
    }

    async fn search(&self, collection: &str, vector: Vec<f32>, top_k: usize) -> Result<Vec<Value>, PluginError> {
        let args = vec![Value::String(collection.to_string()), serde_json::to_value(vector).unwrap_or(Value::Null), Value::from(top_k as u64)];
        let result = self.client.call("vector-store", "search", args).await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), PluginError> {
        self.client.call("vector-store", "delete", vec![Value::String(collection.to_string()), Value::String(id.to_string())]).await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, PluginError> {
        let result = self.client.call("vector-store", "get", vec![Value::String(collection.to_string()), Value::String(id.to_string())]).await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    async fn count(&self, collection: &str) -> Result<u64, PluginError> {
        let result = self.client.call("vector-store", "count", vec![Value::String(collection.to_string())]).await?;
        Ok(result.as_u64().unwrap_or(0))
    }
}

#[async_trait]
impl Cache for RpcClientBridge {
    async fn get(&self, key: &str) -> Result<Option<Value>, PluginError> {
        let result = self.client.call("cache", "get", vec![Value::String(key.to_string())]).await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    async fn set(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<(), PluginError> {
        let ttl = ttl_ms.map(Value::from).unwrap_or(Value::Null);
        self.client.call("cache", "set", vec![Value::String(key.to_string()), value, ttl]).await?;
        Ok(())
    }

    async fn set_if_not_exists(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<bool, PluginError> {
        let ttl = ttl_ms.map(Value::from).unwrap_or(Value::Null);
        let result = self.client.call("cache", "set_if_not_exists", vec![Value::String(key.to_string()), value, ttl]).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> Result<(), PluginError> {
        self.client.call("cache", "delete", vec![Value::String(key.to_string())]).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), PluginError> {
        self.client.call("cache", "clear", Vec::new()).await?;
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), PluginError> {
        let args = vec![Value::String(key.to_string()), Value::String(member.to_string()), serde_json::json!(score)];
        self.client.call("cache", "zadd", args).await?;
        Ok(())
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, PluginError> {
        let args = vec![Value::String(key.to_string()), Value::from(start), Value::from(stop)];
        decode(self.client.call("cache", "zrange", args).await?)
    }
}

#[async_trait]
impl Database for RpcClientBridge {
    async fn find(&self, collection: &str, query: Value) -> Result<Vec<Value>, PluginError> {
        let result = self.client.call("database", "find", vec![Value::String(collection.to_string()), query]).await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    async fn insert(&self, collection: &str, document: Value) -> Result<Value, PluginError> {
        self.client.call("database", "insert", vec![Value::String(collection.to_string()), document]).await
    }

    async fn update(&self, collection: &str, query: Value, patch: Value) -> Result<u64, PluginError> {
        let result = self.client.call("database", "update", vec![Value::String(collection.to_string()), query, patch]).await?;
        Ok(result.as_u64().unwrap_or(0))
    }

    async fn remove(&self, collection: &str, query: Value) -> Result<u64, PluginError> {
        let result = self.client.call("database", "remove", vec![Value::String(collection.to_string()), query]).await?;
        Ok(result.as_u64().unwrap_or(0))
    }

    async fn query_sql(&self, statement: &str, params: Vec<Value>) -> Result<Vec<Value>, PluginError> {
        let args = vec![Value::String(statement.to_string()), Value::Array(params)];
        let result = self.client.call("database", "query_sql", args).await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }
}

#[async_trait]
impl Storage for RpcClientBridge {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PluginError> {
        self.client.call("storage", "put", vec![Value::String(key.to_string()), serde_json::json!(bytes)]).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PluginError> {
        let result = self.client.call("storage", "get", vec![Value::String(key.to_string())]).await?;
        if result.is_null() {
            Ok(None)
        } else {
            decode(result).map(Some)
        }
    }

    async fn delete(&self, key: &str) -> Result<(), PluginError> {
        self.client.call("storage", "delete", vec![Value::String(key.to_string())]).await?;
        Ok(())
    }
}

#[async_trait]
impl Analytics for RpcClientBridge {
    async fn track(&self, event: &str, properties: Value) -> Result<(), PluginError> {
        self.client.call("analytics", "track", vec![Value::String(event.to_string()), properties]).await?;
        Ok(())
    }

    async fn identify(&self, subject: &str, traits: Value) -> Result<(), PluginError> {
        self.client.call("analytics", "identify", vec![Value::String(subject.to_string()), traits]).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), PluginError> {
        self.client.call("analytics", "flush", Vec::new()).await?;
        Ok(())
    }

    async fn get_source(&self) -> Result<Option<String>, PluginError> {
        let result = self.client.call("analytics", "get_source", Vec::new()).await?;
        Ok(result.as_str().map(str::to_string))
    }

    async fn set_source(&self, source: &str) -> Result<(), PluginError> {
        self.client.call("analytics", "set_source", vec![Value::String(source.to_string())]).await?;
        Ok(())
    }
}

struct RpcUnsubscribe {
    client: Arc<RpcBridgeClient>,
    topic: String,
}

#[async_trait]
impl Unsubscribe for RpcUnsubscribe {
    async fn cancel(&self) {
        let _ = self.client.call("event-bus", "unsubscribe", vec![Value::String(self.topic.clone())]).await;
    }
}

#[async_trait]
impl EventBus for RpcClientBridge {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PluginError> {
        self.client.call("event-bus", "publish", vec![Value::String(topic.to_string()), payload]).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Unsubscribe>, PluginError> {
        self.client.call("event-bus", "subscribe", vec![Value::String(topic.to_string())]).await?;
        Ok(Box::new(RpcUnsubscribe {
            client: self.client.clone(),
            topic: topic.to_string(),
        }))
    }
}

impl PlatformBridge for RpcClientBridge {
    fn logger(&self) -> &dyn Logger {
        &self.logger
    }
    fn llm(&self) -> &dyn Llm {
        self
    }
    fn embeddings(&self) -> &dyn Embeddings {
        self
    }
    fn vector_store(&self) -> &dyn VectorStore {
        self
    }
    fn cache(&self) -> &dyn Cache {
        self
    }
    fn database(&self) -> &dyn Database {
        self
    }
    fn storage(&self) -> &dyn Storage {
        self
    }
    fn analytics(&self) -> &dyn Analytics {
        self
    }
    fn event_bus(&self) -> &dyn EventBus {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inprocess::DirectBridge;
    use crate::rpc::server::RpcBridgeServer;
    use std::time::Duration;

    #[tokio::test]
    async fn cache_round_trips_through_the_client_bridge() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("platform.sock");
        let direct = Arc::new(DirectBridge::bound("demo@1.0.0", "req-1", "trace-1"));
        let server = RpcBridgeServer::bind(&socket_path, direct).await.unwrap();
        tokio::spawn(server.serve());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let client = Arc::new(RpcBridgeClient::connect(&socket_path).await.unwrap());
        let bridge = RpcClientBridge::new(client, "demo@1.0.0", "req-1", "trace-1");

        bridge.cache().set("k", serde_json::json!("v"), None).await.unwrap();
        assert_eq!(bridge.cache().get("k").await.unwrap(), Some(serde_json::json!("v")));
    }
}
