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

//! Pool statistics, exposed both for `stats()` callers and as process metrics gauges/
//! counters for the ambient observability layer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const MAX_SAMPLES: usize = 1000;

#[derive(Default)]
pub struct PoolStats {
    pub total: AtomicU64,
    pub success: AtomicU64,
    pub error: AtomicU64,
    pub acquire_timeout_count: AtomicU64,
    pub queue_full_count: AtomicU64,
    pub worker_crash_count: AtomicU64,
    pub recycle_count: AtomicU64,
    queue_wait_samples: Mutex<Vec<Duration>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStatsSnapshot {
    pub total: u64,
    pub success: u64,
    pub error: u64,
    pub acquire_timeout_count: u64,
    pub queue_full_count: u64,
    pub worker_crash_count: u64,
    pub recycle_count: u64,
    pub worker_count: usize,
    pub idle_worker_count: usize,
    pub queue_length: usize,
    pub avg_queue_wait_ms: f64,
    pub p99_queue_wait_ms: f64,
}

impl PoolStats {
    pub fn record_wait(&self, wait: Duration) {
        let mut samples = self.queue_wait_samples.lock().unwrap();
        if samples.len() >= MAX_SAMPLES {
            samples.remove(0);
        }
        samples.push(wait);
    }

    fn wait_percentiles(&self) -> (f64, f64) {
        let samples = self.queue_wait_samples.lock().unwrap();
        if samples.is_empty() {
            return (0.0, 0.0);
        }
        let mut millis: Vec<f64> = samples.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        millis.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let avg = millis.iter().sum::<f64>() / millis.len() as f64;
        let p99_idx = ((millis.len() as f64 * 0.99).ceil() as usize).saturating_sub(1).min(millis.len() - 1);
        (avg, millis[p99_idx])
    }

    pub fn snapshot(&self, worker_count: usize, idle_worker_count: usize, queue_length: usize) -> PoolStatsSnapshot {
        let (avg, p99) = self.wait_percentiles();
        PoolStatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
            acquire_timeout_count: self.acquire_timeout_count.load(Ordering::Relaxed),
            queue_full_count: self.queue_full_count.load(Ordering::Relaxed),
            worker_crash_count: self.worker_crash_count.load(Ordering::Relaxed),
            recycle_count: self.recycle_count.load(Ordering::Relaxed),
            worker_count,
            idle_worker_count,
            queue_length,
            avg_queue_wait_ms: avg,
            p99_queue_wait_ms: p99,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p99_is_the_worst_sampled_wait() {
        let stats = PoolStats::default();
        for ms in 1..=100 {
            stats.record_wait(Duration::from_millis(ms));
        }
        let snapshot = stats.snapshot(0, 0, 0);
        assert!(snapshot.p99_queue_wait_ms >= 98.0);
    }

    #[test]
    fn sample_buffer_is_capped_at_one_thousand_entries() {
        let stats = PoolStats::default();
        for _ in 0..1500 {
            stats.record_wait(Duration::from_millis(1));
        }
        assert_eq!(stats.queue_wait_samples.lock().unwrap().len(), MAX_SAMPLES);
    }
}
