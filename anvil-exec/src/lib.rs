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

//! Execution backend façade and the per-invocation orchestrator pipeline built on top
//! of it: capability checks, chain-limit propagation, schema validation, artifact
//! collection, and failure snapshotting around whichever backend is in play.

pub mod artifacts;
pub mod backend;
pub mod orchestrator;
pub mod snapshot;
pub mod validation;

pub use backend::{build_backend, AutoSelectionHint, BackendHealth, BackendMode, BackendRequest, ExecutionBackend, InProcessBackend, PoolBackend, SubprocessBackend};
pub use orchestrator::{Orchestrator, OrchestratorOutcome};
pub use snapshot::SnapshotStore;
