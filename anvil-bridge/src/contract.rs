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

//! The capability set exposed to handlers, independent of whether the handler runs
//! in-process, inside a worker, or in a one-shot subprocess.

use anvil_core::PluginError;
use async_trait::async_trait;
use serde_json::Value;

pub trait Logger: Send + Sync {
    fn child(&self, bindings: Value) -> Box<dyn Logger>;
    fn log(&self, level: &str, message: &str, fields: Value);
}

#[async_trait]
pub trait Llm: Send + Sync {
    async fn complete(&self, prompt: Value) -> Result<Value, PluginError>;
    /// Streaming degrades to a single final chunk unless the concrete implementation
    /// wires up explicit streaming framing.
    async fn stream(&self, prompt: Value) -> Result<Value, PluginError>;
}

#[async_trait]
pub trait Embeddings: Send + Sync {
    async fn embed(&self, text: String) -> Result<Vec<f32>, PluginError>;
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, PluginError>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, collection: &str, id: &str, vector: Vec<f32>, metadata: Value) -> Result<(), PluginError>;
    async fn search(&self, collection: &str, vector: Vec<f32>, top_k: usize) -> Result<Vec<Value>, PluginError>;
    async fn delete(&self, collection: &str, id: &str) -> Result<(), PluginError>;
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, PluginError>;
    async fn count(&self, collection: &str) -> Result<u64, PluginError>;
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, PluginError>;
    async fn set(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<(), PluginError>;
    async fn set_if_not_exists(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<bool, PluginError>;
    async fn delete(&self, key: &str) -> Result<(), PluginError>;
    async fn clear(&self) -> Result<(), PluginError>;
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), PluginError>;
    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, PluginError>;
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn find(&self, collection: &str, query: Value) -> Result<Vec<Value>, PluginError>;
    async fn insert(&self, collection: &str, document: Value) -> Result<Value, PluginError>;
    async fn update(&self, collection: &str, query: Value, patch: Value) -> Result<u64, PluginError>;
    async fn remove(&self, collection: &str, query: Value) -> Result<u64, PluginError>;
    async fn query_sql(&self, statement: &str, params: Vec<Value>) -> Result<Vec<Value>, PluginError>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PluginError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PluginError>;
    async fn delete(&self, key: &str) -> Result<(), PluginError>;
}

#[async_trait]
pub trait Analytics: Send + Sync {
    async fn track(&self, event: &str, properties: Value) -> Result<(), PluginError>;
    async fn identify(&self, subject: &str, traits: Value) -> Result<(), PluginError>;
    async fn flush(&self) -> Result<(), PluginError>;
    async fn get_source(&self) -> Result<Option<String>, PluginError>;
    async fn set_source(&self, source: &str) -> Result<(), PluginError>;
}

/// An unsubscribe handle. Dropping it does not unsubscribe; callers must invoke `cancel`.
#[async_trait]
pub trait Unsubscribe: Send + Sync {
    async fn cancel(&self);
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PluginError>;
    /// Cross-process subscriptions are not durable: see [`crate::rpc::client`].
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Unsubscribe>, PluginError>;
}

/// The full capability set handed to a handler, regardless of execution mode.
pub trait PlatformBridge: Send + Sync {
    fn logger(&self) -> &dyn Logger;
    fn llm(&self) -> &dyn Llm;
    fn embeddings(&self) -> &dyn Embeddings;
    fn vector_store(&self) -> &dyn VectorStore;
    fn cache(&self) -> &dyn Cache;
    fn database(&self) -> &dyn Database;
    fn storage(&self) -> &dyn Storage;
    fn analytics(&self) -> &dyn Analytics;
    fn event_bus(&self) -> &dyn EventBus;
}
