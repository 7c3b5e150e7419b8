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

//! Background job broker, cron/interval scheduler, and the degradation controller
//! that gates admission ahead of every submission.

pub mod broker;
pub mod config;
pub mod degradation;
pub mod handle;
pub mod quota;
pub mod scheduler;

pub use broker::{JobBroker, JobScheduleRequest, JobSubmitRequest};
pub use config::DegradationThresholds;
pub use degradation::{Admission, DegradationController, DegradationSignals, DegradationState};
pub use handle::{JobHandle, JobStatus, ScheduleHandle};
pub use quota::QuotaTracker;
