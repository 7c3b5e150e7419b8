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

//! Observes queue/latency/error/worker signals and turns them into an admission
//! decision the job broker consults ahead of its own permission and quota checks.

use crate::config::DegradationThresholds;
use anvil_bridge::Analytics;
use serde_json::json;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradationState {
    Healthy,
    Warn,
    Degraded,
    Critical,
}

impl DegradationState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DegradationState::Healthy,
            1 => DegradationState::Warn,
            2 => DegradationState::Degraded,
            _ => DegradationState::Critical,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            DegradationState::Healthy => 0,
            DegradationState::Warn => 1,
            DegradationState::Degraded => 2,
            DegradationState::Critical => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DegradationSignals {
    pub queue_length: usize,
    pub error_rate: f64,
    pub p99_latency_ms: u64,
    pub worker_count: u32,
}

/// What the job broker should do with a submission, derived from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    Delay(Duration),
    Reject,
}

/// `{healthy, warn, degraded, critical}` with hysteresis: a transition to a worse
/// state is accepted immediately (fail fast), but recovery to a better state only
/// after `hysteresis_samples` consecutive observations support it.
pub struct DegradationController {
    thresholds: DegradationThresholds,
    state: AtomicU8,
    analytics: Option<Arc<dyn Analytics>>,
    recovery_streak: std::sync::Mutex<u32>,
}

impl DegradationController {
    pub fn new(thresholds: DegradationThresholds, analytics: Option<Arc<dyn Analytics>>) -> Self {
        Self {
            thresholds,
            state: AtomicU8::new(DegradationState::Healthy.as_u8()),
            analytics,
            recovery_streak: std::sync::Mutex::new(0),
        }
    }

    pub fn state(&self) -> DegradationState {
        DegradationState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// `healthCheck()` exposure for a host process.
    pub fn health_check(&self) -> serde_json::Value {
        json!({ "state": self.state(), "healthy": self.state() == DegradationState::Healthy })
    }

    fn classify(&self, signals: DegradationSignals) -> DegradationState {
        let t = &self.thresholds;
        if signals.queue_length >= t.critical_queue_length
            || signals.error_rate >= t.critical_error_rate
            || signals.p99_latency_ms >= t.critical_p99_latency_ms
            || signals.worker_count < t.min_workers
        {
            return DegradationState::Critical;
        }
        if signals.queue_length >= t.degraded_queue_length
            || signals.error_rate >= t.degraded_error_rate
            || signals.p99_latency_ms >= t.degraded_p99_latency_ms
        {
            return DegradationState::Degraded;
        }
        if signals.queue_length >= t.warn_queue_length || signals.error_rate >= t.warn_error_rate {
            return DegradationState::Warn;
        }
        DegradationState::Healthy
    }

    /// Folds a fresh observation into the state machine, applying hysteresis on
    /// recovery, and returns the (possibly updated) state.
    pub async fn observe(&self, signals: DegradationSignals) -> DegradationState {
        let observed = self.classify(signals);
        let current = self.state();

        let next = if observed >= current {
            *self.recovery_streak.lock().unwrap() = 0;
            observed
        } else {
            let mut streak = self.recovery_streak.lock().unwrap();
            *streak += 1;
            if *streak >= self.thresholds.hysteresis_samples {
                *streak = 0;
                observed
            } else {
                current
            }
        };

        if next != current {
            self.state.store(next.as_u8(), Ordering::SeqCst);
            tracing::warn!(code = "DEGRADATION_TRANSITION", from = ?current, to = ?next, "job broker degradation state changed");
            if let Some(analytics) = &self.analytics {
                let _ = analytics
                    .track("degradation.transition", json!({ "from": current, "to": next }))
                    .await;
            }
        }
        next
    }

    /// Consulted by the job broker before permission/quota checks.
    pub fn admission(&self) -> Admission {
        match self.state() {
            DegradationState::Healthy => Admission::Proceed,
            DegradationState::Warn => Admission::Proceed,
            DegradationState::Degraded => Admission::Delay(Duration::from_millis(250)),
            DegradationState::Critical => Admission::Reject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> DegradationController {
        DegradationController::new(DegradationThresholds::default(), None)
    }

    #[tokio::test]
    async fn healthy_signals_keep_the_controller_healthy() {
        let controller = controller();
        let state = controller.observe(DegradationSignals { worker_count: 4, ..Default::default() }).await;
        assert_eq!(state, DegradationState::Healthy);
        assert_eq!(controller.admission(), Admission::Proceed);
    }

    #[tokio::test]
    async fn a_saturated_queue_trips_straight_to_critical() {
        let controller = controller();
        let state = controller
            .observe(DegradationSignals { queue_length: 1000, worker_count: 4, ..Default::default() })
            .await;
        assert_eq!(state, DegradationState::Critical);
        assert_eq!(controller.admission(), Admission::Reject);
    }

    #[tokio::test]
    async fn recovery_requires_consecutive_healthy_observations() {
        let controller = controller();
        controller
            .observe(DegradationSignals { queue_length: 1000, worker_count: 4, ..Default::default() })
            .await;
        assert_eq!(controller.state(), DegradationState::Critical);

        // A single healthy sample is not enough to recover immediately.
        let state = controller.observe(DegradationSignals { worker_count: 4, ..Default::default() }).await;
        assert_eq!(state, DegradationState::Critical);

        for _ in 0..2 {
            controller.observe(DegradationSignals { worker_count: 4, ..Default::default() }).await;
        }
        assert_eq!(controller.state(), DegradationState::Healthy);
    }

    #[tokio::test]
    async fn degraded_state_produces_a_submit_delay() {
        let controller = controller();
        controller
            .observe(DegradationSignals { queue_length: 250, worker_count: 4, ..Default::default() })
            .await;
        assert_eq!(controller.state(), DegradationState::Degraded);
        assert!(matches!(controller.admission(), Admission::Delay(_)));
    }
}
