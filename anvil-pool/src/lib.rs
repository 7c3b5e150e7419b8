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

//! Worker pool execution backend: a bounded population of in-process runner workers
//! dispatched under admission control, recycled on request/uptime limits, and probed
//! by a periodic health check.

pub mod config;
pub mod pool;
pub mod stats;

pub use config::{PoolConfig, WarmupConfig};
pub use pool::WorkerPool;
pub use stats::{PoolStats, PoolStatsSnapshot};
