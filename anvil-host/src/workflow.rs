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

//! Workflow host: the context a step invoked by an external workflow engine runs
//! under, including the originating job when the step was itself a scheduled job.

use crate::descriptor::{build_descriptor, DescriptorArgs};
use anvil_core::request::{Descriptor, HostKind};
use serde_json::Value;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorkflowHostContext {
    pub workflow_id: String,
    pub run_id: String,
    pub step_id: String,
    pub job_id: Option<String>,
    pub attempt: Option<u32>,
}

impl WorkflowHostContext {
    fn into_value(self) -> Value {
        serde_json::json!({
            "workflowId": self.workflow_id,
            "runId": self.run_id,
            "stepId": self.step_id,
            "jobId": self.job_id,
            "attempt": self.attempt,
        })
    }
}

pub fn workflow_descriptor(args: DescriptorArgs, context: WorkflowHostContext) -> Descriptor {
    build_descriptor(HostKind::Workflow, args, context.into_value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_omits_nothing_required_for_correlation() {
        let context = WorkflowHostContext {
            workflow_id: "wf-1".to_string(),
            run_id: "run-1".to_string(),
            step_id: "step-1".to_string(),
            job_id: Some("job-1".to_string()),
            attempt: Some(2),
        };
        let value = context.into_value();
        assert_eq!(value["workflowId"], serde_json::json!("wf-1"));
        assert_eq!(value["attempt"], serde_json::json!(2));
    }
}
