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

//! Handles returned to callers: a one-shot `JobHandle` and a recurring `ScheduleHandle`,
//! both backed by a `tokio::sync::watch` channel so `status()` and `await_result()` share
//! the same source of truth.

use anvil_core::{PluginError, RunResult};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded(RunResult<Value>),
    Failed(Arc<PluginError>),
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded(_) | JobStatus::Failed(_) | JobStatus::Cancelled)
    }
}

pub struct JobHandle {
    pub id: Uuid,
    pub(crate) status: tokio::sync::watch::Receiver<JobStatus>,
    pub(crate) cancellation: CancellationToken,
}

impl JobHandle {
    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Waits until the job reaches a terminal status and returns it.
    pub async fn await_result(&mut self) -> JobStatus {
        loop {
            let current = self.status.borrow().clone();
            if current.is_terminal() {
                return current;
            }
            if self.status.changed().await.is_err() {
                return self.status.borrow().clone();
            }
        }
    }
}

/// A recurring registration: `cancel()` stops future triggers without affecting jobs
/// already dispatched from past ones.
pub struct ScheduleHandle {
    pub id: Uuid,
    pub(crate) cancellation: CancellationToken,
}

impl ScheduleHandle {
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
