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

//! Per-plugin job quota enforcement: rolling per-minute/hour/day counters backed by
//! the platform cache, a `maxConcurrent` gauge kept in-process, and `minInterval`
//! spacing enforced with a token-bucket rate limiter (one bucket per plugin+operation).

use anvil_bridge::Cache;
use anvil_core::manifest::JobSubmitPermission;
use anvil_core::{ErrorKind, PluginError};
use dashmap::DashMap;
use governor::{Quota, RateLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type IntervalLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn quota_exceeded(message: impl Into<String>) -> PluginError {
    PluginError::new(ErrorKind::ValidationError, message).with_context("code", "JOB_QUOTA_EXCEEDED")
}

fn epoch_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Tracks the active job count per plugin so `maxConcurrent` can be enforced without
/// round-tripping through the cache on every dispatch.
#[derive(Default)]
pub struct ConcurrencyGauges {
    active: DashMap<String, Arc<AtomicU32>>,
}

impl ConcurrencyGauges {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, plugin_id: &str) -> Arc<AtomicU32> {
        self.active.entry(plugin_id.to_string()).or_insert_with(|| Arc::new(AtomicU32::new(0))).clone()
    }

    pub fn try_acquire(&self, plugin_id: &str, max_concurrent: Option<u32>) -> Result<(), PluginError> {
        let Some(max) = max_concurrent else { return Ok(()) };
        let counter = self.counter(plugin_id);
        let current = counter.fetch_add(1, Ordering::SeqCst);
        if current >= max {
            counter.fetch_sub(1, Ordering::SeqCst);
            return Err(quota_exceeded(format!("{plugin_id} already has {current} jobs at its maxConcurrent limit of {max}")));
        }
        Ok(())
    }

    pub fn release(&self, plugin_id: &str) {
        if let Some(counter) = self.active.get(plugin_id) {
            counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(v.saturating_sub(1))).ok();
        }
    }
}

pub struct QuotaTracker {
    cache: Arc<dyn Cache>,
    interval_limiters: DashMap<String, Arc<IntervalLimiter>>,
    pub concurrency: ConcurrencyGauges,
}

impl QuotaTracker {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            interval_limiters: DashMap::new(),
            concurrency: ConcurrencyGauges::new(),
        }
    }

    /// Checks and increments per-minute/hour/day counters. Rejects without mutating
    /// state if any window is already at its limit.
    pub async fn check_rolling_windows(&self, plugin_id: &str, op: &str, permission: &JobSubmitPermission) -> Result<(), PluginError> {
        let windows: [(&str, Option<u32>, u64); 3] = [
            ("minute", permission.per_minute, 60),
            ("hour", permission.per_hour, 3_600),
            ("day", permission.per_day, 86_400),
        ];

        let mut keys_to_increment = Vec::new();
        for (label, limit, period_secs) in windows {
            let Some(limit) = limit else { continue };
            let bucket = epoch_seconds() / period_secs;
            let key = format!("jobs:{plugin_id}:{op}:{label}:{bucket}");
            let current = self.cache.get(&key).await?.and_then(|v| v.as_u64()).unwrap_or(0);
            if current >= limit as u64 {
                return Err(quota_exceeded(format!("{plugin_id} exceeded its {label}ly {op} quota of {limit}")));
            }
            keys_to_increment.push((key, current, period_secs));
        }

        for (key, current, period_secs) in keys_to_increment {
            let ttl_ms = period_secs * 1_000;
            self.cache.set(&key, serde_json::json!(current + 1), Some(ttl_ms)).await?;
        }
        Ok(())
    }

    /// Enforces `minInterval`: the plugin+operation pair may not submit again before
    /// that much time has passed since its last submission.
    pub fn check_min_interval(&self, plugin_id: &str, op: &str, min_interval: Option<Duration>) -> Result<(), PluginError> {
        let Some(min_interval) = min_interval else { return Ok(()) };
        if min_interval.is_zero() {
            return Ok(());
        }
        let key = format!("{plugin_id}:{op}");
        let limiter = self
            .interval_limiters
            .entry(key)
            .or_insert_with(|| Arc::new(RateLimiter::direct(Quota::with_period(min_interval).expect("min_interval already checked non-zero"))))
            .clone();
        limiter
            .check()
            .map_err(|_| quota_exceeded(format!("{plugin_id} submitted again before its minInterval of {min_interval:?} elapsed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_bridge::inprocess::MemoryCache;
    use std::sync::Arc;

    fn permission(per_minute: Option<u32>) -> JobSubmitPermission {
        JobSubmitPermission { per_minute, ..Default::default() }
    }

    #[tokio::test]
    async fn rolling_window_rejects_once_the_minute_quota_is_spent() {
        let tracker = QuotaTracker::new(Arc::new(MemoryCache::default()));
        let permission = permission(Some(1));
        tracker.check_rolling_windows("demo", "submit", &permission).await.unwrap();
        let err = tracker.check_rolling_windows("demo", "submit", &permission).await.unwrap_err();
        assert_eq!(err.context.get("code").map(String::as_str), Some("JOB_QUOTA_EXCEEDED"));
    }

    #[test]
    fn max_concurrent_rejects_once_the_gauge_is_saturated() {
        let gauges = ConcurrencyGauges::new();
        gauges.try_acquire("demo", Some(1)).unwrap();
        let err = gauges.try_acquire("demo", Some(1)).unwrap_err();
        assert_eq!(err.context.get("code").map(String::as_str), Some("JOB_QUOTA_EXCEEDED"));
        gauges.release("demo");
        gauges.try_acquire("demo", Some(1)).unwrap();
    }

    #[test]
    fn min_interval_rejects_a_second_submission_too_soon() {
        let tracker = QuotaTracker::new(Arc::new(MemoryCache::default()));
        tracker.check_min_interval("demo", "submit", Some(Duration::from_secs(60))).unwrap();
        let err = tracker.check_min_interval("demo", "submit", Some(Duration::from_secs(60))).unwrap_err();
        assert_eq!(err.context.get("code").map(String::as_str), Some("JOB_QUOTA_EXCEEDED"));
    }
}
