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

//! Degradation thresholds. Concrete numbers are implementation-chosen defaults,
//! not validated operational data — tune them per deployment.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DegradationThresholds {
    pub warn_queue_length: usize,
    pub degraded_queue_length: usize,
    pub critical_queue_length: usize,
    pub warn_error_rate: f64,
    pub degraded_error_rate: f64,
    pub critical_error_rate: f64,
    pub degraded_p99_latency_ms: u64,
    pub critical_p99_latency_ms: u64,
    pub min_workers: u32,
    /// Samples a state must hold before a downgrade to a worse state is accepted, and
    /// before an upgrade back to a better one is accepted — hysteresis against flapping.
    pub hysteresis_samples: u32,
}

impl Default for DegradationThresholds {
    fn default() -> Self {
        Self {
            warn_queue_length: 50,
            degraded_queue_length: 200,
            critical_queue_length: 500,
            warn_error_rate: 0.05,
            degraded_error_rate: 0.15,
            critical_error_rate: 0.35,
            degraded_p99_latency_ms: 2_000,
            critical_p99_latency_ms: 8_000,
            min_workers: 1,
            hysteresis_samples: 3,
        }
    }
}
