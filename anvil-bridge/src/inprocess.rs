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

//! In-process path: the handler receives these host implementations directly, with a
//! child logger bound to `{plugin, requestId, traceId}` created once per execution. The
//! concrete service bodies here are an in-memory reference implementation — real
//! deployments wire these traits to whatever backs the host's logger/LLM/vector
//! store/etc, but the contract and binding behavior is what the execution substrate
//! actually depends on.

use crate::contract::*;
use anvil_core::{ErrorKind, PluginError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::Span;

#[derive(Clone)]
pub struct TracingLogger {
    span: Span,
}

impl TracingLogger {
    /// Creates the per-execution child logger bound to `{plugin, requestId, traceId}`.
    pub fn bound(plugin_id: &str, request_id: &str, trace_id: &str) -> Self {
        let span = tracing::info_span!("execution", plugin = plugin_id, request_id, trace_id);
        Self { span }
    }
}

impl Logger for TracingLogger {
    fn child(&self, bindings: Value) -> Box<dyn Logger> {
        let _entered = self.span.enter();
        let child_span = tracing::info_span!("child", bindings = %bindings);
        Box::new(TracingLogger { span: child_span })
    }

    fn log(&self, level: &str, message: &str, fields: Value) {
        let _entered = self.span.enter();
        match level {
            "error" => tracing::error!(fields = %fields, "{message}"),
            "warn" => tracing::warn!(fields = %fields, "{message}"),
            "debug" => tracing::debug!(fields = %fields, "{message}"),
            _ => tracing::info!(fields = %fields, "{message}"),
        }
    }
}

pub struct NoopLlm;

#[async_trait]
impl Llm for NoopLlm {
    async fn complete(&self, _prompt: Value) -> Result<Value, PluginError> {
        Err(PluginError::new(ErrorKind::HandlerError, "no LLM backend is configured"))
    }

    async fn stream(&self, prompt: Value) -> Result<Value, PluginError> {
        self.complete(prompt).await
    }
}

pub struct NoopEmbeddings;

#[async_trait]
impl Embeddings for NoopEmbeddings {
    async fn embed(&self, _text: String) -> Result<Vec<f32>, PluginError> {
        Err(PluginError::new(ErrorKind::HandlerError, "no embeddings backend is configured"))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, PluginError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryVectorStore {
    collections: DashMap<String, DashMap<String, (Vec<f32>, Value)>>,
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)) as f64
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, collection: &str, id: &str, vector: Vec<f32>, metadata: Value) -> Result<(), PluginError> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), (vector, metadata));
        Ok(())
    }

    async fn search(&self, collection: &str, vector: Vec<f32>, top_k: usize) -> Result<Vec<Value>, PluginError> {
        let Some(entries) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<(f64, String, Value)> = entries
            .iter()
            .map(|entry| {
                let (id, (stored_vector, metadata)) = entry.pair();
                (cosine(&vector, stored_vector), id.clone(), metadata.clone())
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored
            .into_iter()
            .map(|(score, id, metadata)| serde_json::json!({"id": id, "score": score, "metadata": metadata}))
            .collect())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), PluginError> {
        if let Some(entries) = self.collections.get(collection) {
            entries.remove(id);
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, PluginError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|entries| entries.get(id).map(|e| e.1.clone())))
    }

    async fn count(&self, collection: &str) -> Result<u64, PluginError> {
        Ok(self.collections.get(collection).map(|e| e.len() as u64).unwrap_or(0))
    }
}

struct CacheEntry {
    value: Value,
    expires_at: Option<std::time::Instant>,
}

#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    sorted_sets: DashMap<String, Vec<(String, f64)>>,
}

impl MemoryCache {
    fn is_expired(entry: &CacheEntry) -> bool {
        matches!(entry.expires_at, Some(at) if at <= std::time::Instant::now())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, PluginError> {
        match self.entries.get(key) {
            Some(entry) if !Self::is_expired(&entry) => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<(), PluginError> {
        let expires_at = ttl_ms.map(|ms| std::time::Instant::now() + std::time::Duration::from_millis(ms));
        self.entries.insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn set_if_not_exists(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> Result<bool, PluginError> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }
        self.set(key, value, ttl_ms).await?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), PluginError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PluginError> {
        self.entries.clear();
        self.sorted_sets.clear();
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), PluginError> {
        let mut set = self.sorted_sets.entry(key.to_string()).or_default();
        set.retain(|(m, _)| m != member);
        set.push((member.to_string(), score));
        set.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(())
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, PluginError> {
        let Some(set) = self.sorted_sets.get(key) else {
            return Ok(Vec::new());
        };
        let len = set.len() as i64;
        let normalize = |idx: i64| -> usize {
            let idx = if idx < 0 { (len + idx).max(0) } else { idx };
            idx.min(len) as usize
        };
        let start = normalize(start);
        let stop = (normalize(stop) + 1).min(set.len());
        if start >= stop {
            return Ok(Vec::new());
        }
        Ok(set[start..stop].iter().map(|(m, _)| m.clone()).collect())
    }
}

#[derive(Default)]
pub struct MemoryDatabase {
    collections: DashMap<String, Vec<Value>>,
}

fn matches_query(doc: &Value, query: &Value) -> bool {
    let (Value::Object(doc), Value::Object(query)) = (doc, query) else {
        return query.as_object().map(|q| q.is_empty()).unwrap_or(true);
    };
    query.iter().all(|(key, expected)| doc.get(key) == Some(expected))
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn find(&self, collection: &str, query: Value) -> Result<Vec<Value>, PluginError> {
        Ok(self
            .collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches_query(d, &query)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, document: Value) -> Result<Value, PluginError> {
        self.collections.entry(collection.to_string()).or_default().push(document.clone());
        Ok(document)
    }

    async fn update(&self, collection: &str, query: Value, patch: Value) -> Result<u64, PluginError> {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let patch_obj = patch.as_object().cloned().unwrap_or_default();
        let mut updated = 0u64;
        for doc in docs.iter_mut() {
            if matches_query(doc, &query) {
                if let Some(obj) = doc.as_object_mut() {
                    for (key, value) in &patch_obj {
                        obj.insert(key.clone(), value.clone());
                    }
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn remove(&self, collection: &str, query: Value) -> Result<u64, PluginError> {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !matches_query(doc, &query));
        Ok((before - docs.len()) as u64)
    }

    async fn query_sql(&self, _statement: &str, _params: Vec<Value>) -> Result<Vec<Value>, PluginError> {
        Err(PluginError::new(ErrorKind::HandlerError, "no SQL backend is configured"))
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    blobs: DashMap<String, Vec<u8>>,
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PluginError> {
        self.blobs.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PluginError> {
        Ok(self.blobs.get(key).map(|b| b.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), PluginError> {
        self.blobs.remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAnalytics {
    source: std::sync::RwLock<Option<String>>,
    events: DashMap<String, u64>,
}

#[async_trait]
impl Analytics for MemoryAnalytics {
    async fn track(&self, event: &str, _properties: Value) -> Result<(), PluginError> {
        *self.events.entry(event.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn identify(&self, _subject: &str, _traits: Value) -> Result<(), PluginError> {
        Ok(())
    }

    async fn flush(&self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn get_source(&self) -> Result<Option<String>, PluginError> {
        Ok(self.source.read().unwrap().clone())
    }

    async fn set_source(&self, source: &str) -> Result<(), PluginError> {
        *self.source.write().unwrap() = Some(source.to_string());
        Ok(())
    }
}

struct NoopUnsubscribe;

#[async_trait]
impl Unsubscribe for NoopUnsubscribe {
    async fn cancel(&self) {}
}

#[derive(Default)]
pub struct LocalEventBus {
    subscribers: DashMap<String, Vec<tokio::sync::mpsc::UnboundedSender<Value>>>,
}

#[async_trait]
impl EventBus for LocalEventBus {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PluginError> {
        if let Some(mut subs) = self.subscribers.get_mut(topic) {
            subs.retain(|sender| sender.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Unsubscribe>, PluginError> {
        let (sender, _receiver) = tokio::sync::mpsc::unbounded_channel();
        self.subscribers.entry(topic.to_string()).or_default().push(sender);
        Ok(Box::new(NoopUnsubscribe))
    }
}

/// The in-process bridge: every service is an in-memory reference implementation, with
/// the logger bound per execution by the runner.
pub struct DirectBridge {
    pub logger: TracingLogger,
    pub llm: NoopLlm,
    pub embeddings: NoopEmbeddings,
    pub vector_store: MemoryVectorStore,
    pub cache: MemoryCache,
    pub database: MemoryDatabase,
    pub storage: MemoryStorage,
    pub analytics: MemoryAnalytics,
    pub event_bus: LocalEventBus,
}

impl DirectBridge {
    pub fn bound(plugin_id: &str, request_id: &str, trace_id: &str) -> Self {
        Self {
            logger: TracingLogger::bound(plugin_id, request_id, trace_id),
            llm: NoopLlm,
            embeddings: NoopEmbeddings,
            vector_store: MemoryVectorStore::default(),
            cache: MemoryCache::default(),
            database: MemoryDatabase::default(),
            storage: MemoryStorage::default(),
            analytics: MemoryAnalytics::default(),
            event_bus: LocalEventBus::default(),
        }
    }
}

impl PlatformBridge for DirectBridge {
    fn logger(&self) -> &dyn Logger {
        &self.logger
    }
    fn llm(&self) -> &dyn Llm {
        &self.llm
    }
    fn embeddings(&self) -> &dyn Embeddings {
        &self.embeddings
    }
    fn vector_store(&self) -> &dyn VectorStore {
        &self.vector_store
    }
    fn cache(&self) -> &dyn Cache {
        &self.cache
    }
    fn database(&self) -> &dyn Database {
        &self.database
    }
    fn storage(&self) -> &dyn Storage {
        &self.storage
    }
    fn analytics(&self) -> &dyn Analytics {
        &self.analytics
    }
    fn event_bus(&self) -> &dyn EventBus {
        &self.event_bus
    }
}

/// Shared handle form used by runners that clone the bridge into spawned tasks.
pub type SharedBridge = Arc<DirectBridge>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_set_if_not_exists_only_writes_once() {
        let cache = MemoryCache::default();
        assert!(cache.set_if_not_exists("k", serde_json::json!(1), None).await.unwrap());
        assert!(!cache.set_if_not_exists("k", serde_json::json!(2), None).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(serde_json::json!(1)));
    }

    #[tokio::test]
    async fn cache_ttl_expires_entries() {
        let cache = MemoryCache::default();
        cache.set("k", serde_json::json!("v"), Some(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn vector_store_search_ranks_by_cosine_similarity() {
        let store = MemoryVectorStore::default();
        store.upsert("docs", "a", vec![1.0, 0.0], serde_json::json!({})).await.unwrap();
        store.upsert("docs", "b", vec![0.0, 1.0], serde_json::json!({})).await.unwrap();
        let results = store.search("docs", vec![1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0]["id"], "a");
    }

    #[tokio::test]
    async fn database_update_only_touches_matching_documents() {
        let db = MemoryDatabase::default();
        db.insert("users", serde_json::json!({"id": 1, "active": true})).await.unwrap();
        db.insert("users", serde_json::json!({"id": 2, "active": false})).await.unwrap();
        let updated = db
            .update("users", serde_json::json!({"active": false}), serde_json::json!({"active": true}))
            .await
            .unwrap();
        assert_eq!(updated, 1);
    }
}
