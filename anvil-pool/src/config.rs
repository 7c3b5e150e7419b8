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

//! Worker pool configuration. Defaults mirror the documented operational defaults for
//! this family of execution backends.

use anvil_core::manifest::WarmupMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfig {
    pub mode: WarmupMode,
    pub top_n: usize,
    pub max_handlers: usize,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            mode: WarmupMode::None,
            top_n: 3,
            max_handlers: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub min: usize,
    pub max: usize,
    pub max_requests_per_worker: u64,
    #[serde(with = "humantime_serde")]
    pub max_uptime_per_worker: Duration,
    pub max_queue_size: usize,
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
    pub max_concurrent_per_plugin: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,
    pub warmup: WarmupConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 2,
            max: 10,
            max_requests_per_worker: 1000,
            max_uptime_per_worker: Duration::from_secs(30 * 60),
            max_queue_size: 100,
            acquire_timeout: Duration::from_secs(5),
            max_concurrent_per_plugin: None,
            health_check_interval: Duration::from_secs(10),
            warmup: WarmupConfig::default(),
        }
    }
}
