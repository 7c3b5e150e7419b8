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

//! Command-line host: maps parsed flags into a `{argv, flags}` host context and
//! derives a process exit code from the outcome.

use crate::descriptor::{build_descriptor, DescriptorArgs};
use anvil_core::request::{Descriptor, HostKind};
use anvil_core::{ErrorKind, PluginError};
use anvil_exec::OrchestratorOutcome;
use serde_json::Value;

/// `{argv, flags}` — `argv` is the raw argument vector, `flags` the already-parsed
/// flag map; the core treats both as opaque and hands them to the handler unchanged.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CliHostContext {
    pub argv: Vec<String>,
    pub flags: Value,
}

impl CliHostContext {
    pub fn new(argv: Vec<String>, flags: Value) -> Self {
        Self { argv, flags }
    }

    fn into_value(self) -> Value {
        serde_json::json!({ "argv": self.argv, "flags": self.flags })
    }
}

pub fn cli_descriptor(args: DescriptorArgs, context: CliHostContext) -> Descriptor {
    build_descriptor(HostKind::Cli, args, context.into_value())
}

/// How a failed execution should affect the process exit code. `None` always exits
/// `0` (the caller only cares about stdout); `Major` collapses every error to `1`;
/// `Critical` additionally distinguishes infrastructure failures as `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCodePolicy {
    None,
    Major,
    Critical,
}

fn is_critical(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::WorkerCrashed | ErrorKind::WorkerUnhealthy | ErrorKind::AcquireTimeout | ErrorKind::QueueFull | ErrorKind::UnknownError
    )
}

/// Successful handler output may shape itself as `{exitCode, ...}`; otherwise a
/// success always exits `0`.
fn exit_code_from_data(data: &Value) -> i32 {
    data.get("exitCode").and_then(Value::as_i64).map(|code| code as i32).unwrap_or(0)
}

pub fn derive_exit_code(outcome: Result<&OrchestratorOutcome, &PluginError>, policy: ExitCodePolicy) -> i32 {
    match outcome {
        Ok(outcome) => exit_code_from_data(&outcome.result.data),
        Err(error) => match policy {
            ExitCodePolicy::None => 0,
            ExitCodePolicy::Major => 1,
            ExitCodePolicy::Critical => {
                if is_critical(error.kind) {
                    2
                } else {
                    1
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::ids::{PluginId, RequestId, TenantId};
    use anvil_core::{ExecutionMeta, RunResult};
    use chrono::Utc;
    use std::time::Duration;

    fn outcome_with(data: Value) -> OrchestratorOutcome {
        let now = Utc::now();
        OrchestratorOutcome {
            result: RunResult {
                data,
                execution_meta: ExecutionMeta {
                    start_time: now,
                    end_time: now,
                    duration: Duration::from_millis(5),
                    plugin_id: PluginId::from("demo"),
                    plugin_version: "1.0.0".to_string(),
                    handler_id: Some("execute".to_string()),
                    request_id: RequestId::new(),
                    tenant_id: None::<TenantId>,
                },
            },
            metadata: anvil_core::BackendMetadata {
                backend: "in-process".to_string(),
                worker_id: None,
                workspace_id: "ws".to_string(),
            },
            artifacts: Vec::new(),
            insights: Vec::new(),
        }
    }

    #[test]
    fn success_without_exit_code_field_exits_zero() {
        let outcome = outcome_with(serde_json::json!({"hello": "world"}));
        assert_eq!(derive_exit_code(Ok(&outcome), ExitCodePolicy::Major), 0);
    }

    #[test]
    fn success_with_exit_code_field_is_honored() {
        let outcome = outcome_with(serde_json::json!({"exitCode": 7}));
        assert_eq!(derive_exit_code(Ok(&outcome), ExitCodePolicy::None), 7);
    }

    #[test]
    fn none_policy_always_exits_zero_on_error() {
        let err = PluginError::new(ErrorKind::HandlerError, "boom");
        assert_eq!(derive_exit_code(Err(&err), ExitCodePolicy::None), 0);
    }

    #[test]
    fn major_policy_collapses_every_error_to_one() {
        let err = PluginError::new(ErrorKind::WorkerCrashed, "boom");
        assert_eq!(derive_exit_code(Err(&err), ExitCodePolicy::Major), 1);
    }

    #[test]
    fn critical_policy_distinguishes_infra_failures() {
        let infra = PluginError::new(ErrorKind::WorkerCrashed, "boom");
        let handler = PluginError::new(ErrorKind::HandlerError, "boom");
        assert_eq!(derive_exit_code(Err(&infra), ExitCodePolicy::Critical), 2);
        assert_eq!(derive_exit_code(Err(&handler), ExitCodePolicy::Critical), 1);
    }
}
