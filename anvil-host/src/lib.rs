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

//! Thin host adapter contracts. Each host module only translates its own
//! transport-specific request into a [`Descriptor`](anvil_core::request::Descriptor)
//! and, on the way back, turns a finished execution into that host's response shape —
//! building the on-the-wire CLI flag parser, HTTP router, or webhook receiver itself is
//! the embedding host's job, not this crate's.

pub mod cli;
pub mod descriptor;
pub mod rest;
pub mod scheduled;
pub mod webhook;
pub mod workflow;

pub use cli::{cli_descriptor, derive_exit_code, CliHostContext, ExitCodePolicy};
pub use descriptor::{build_descriptor, error_envelope, DescriptorArgs, SuccessFields};
pub use rest::{rest_descriptor, rest_response_for_error, rest_response_for_success, RestHostContext, RestResponse};
pub use scheduled::{scheduled_descriptor, ScheduledHostContext};
pub use webhook::{webhook_descriptor, WebhookHostContext};
pub use workflow::{workflow_descriptor, WorkflowHostContext};
