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

//! Effective configuration for the executor process: built-in defaults, overridable by
//! `anvil-executor.toml` and `ANVIL_EXECUTOR_*` environment variables, in that order —
//! the same layering every bootable process in this family uses.

use anvil_core::config::{RetryConfig, TracingConfig};
use anvil_jobs::DegradationThresholds;
use anvil_pool::PoolConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub tracing: TracingConfig,
    /// Reused by any component here that performs retryable I/O against the platform
    /// bridge; not consulted by the in-memory demo bridge itself.
    pub retries: RetryConfig,
    pub pool: PoolConfig,
    pub degradation: DegradationThresholds,
    pub socket_dir: PathBuf,
    pub debug_insights: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            tracing: TracingConfig::default(),
            retries: RetryConfig::default(),
            pool: PoolConfig::default(),
            degradation: DegradationThresholds::default(),
            socket_dir: std::env::temp_dir().join("anvil-executor"),
            debug_insights: false,
        }
    }
}
