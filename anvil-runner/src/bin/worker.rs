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

//! Subprocess worker entry point: the binary a [`SubprocessBackend`] spawns as its
//! bootstrap command. Reads `ANVIL_WORKER_ID`/`ANVIL_IPC_SOCKET_PATH`/`ANVIL_SANDBOX_MODE`
//! from the environment the parent set, then hands stdio to [`WorkerBootstrap`].

use anvil_core::manifest::PermissionSpec;
use anvil_runner::fixtures::{register_cleanup_then_fail, register_echo, register_sleep_then_echo};
use anvil_runner::subprocess::worker::WorkerBootstrap;
use anvil_runner::HandlerRegistry;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    anvil_core::tracing_init::init_tracing(&Default::default());

    let worker_id = std::env::var("ANVIL_WORKER_ID").unwrap_or_else(|_| "unknown".to_string());
    let socket_path = std::env::var("ANVIL_IPC_SOCKET_PATH").unwrap_or_default();
    let sandbox_mode = std::env::var("ANVIL_SANDBOX_MODE").unwrap_or_else(|_| "enforce".to_string());
    tracing::info!(worker_id, socket_path, sandbox_mode, "worker starting");

    let registry = HandlerRegistry::new();
    register_echo(&registry);
    register_sleep_then_echo(&registry);
    register_cleanup_then_fail(&registry, Arc::new(AtomicBool::new(false)));

    let bootstrap = WorkerBootstrap::new(registry, PermissionSpec::default());
    bootstrap.run(tokio::io::stdin(), tokio::io::stdout()).await;
}
