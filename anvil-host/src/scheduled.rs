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

//! Cron/scheduled host: the context a triggered recurring job runs under.

use crate::descriptor::{build_descriptor, DescriptorArgs};
use anvil_core::request::{Descriptor, HostKind};
use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScheduledHostContext {
    pub cron_id: String,
    pub schedule: String,
    pub scheduled_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ScheduledHostContext {
    fn into_value(self) -> Value {
        serde_json::json!({
            "cronId": self.cron_id,
            "schedule": self.schedule,
            "scheduledAt": self.scheduled_at,
            "lastRunAt": self.last_run_at,
        })
    }
}

pub fn scheduled_descriptor(args: DescriptorArgs, context: ScheduledHostContext) -> Descriptor {
    build_descriptor(HostKind::Scheduled, args, context.into_value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_serializes_with_camel_case_fields() {
        let context = ScheduledHostContext {
            cron_id: "nightly-cleanup".to_string(),
            schedule: "0 0 * * *".to_string(),
            scheduled_at: Utc::now(),
            last_run_at: None,
        };
        let value = context.into_value();
        assert_eq!(value["cronId"], serde_json::json!("nightly-cleanup"));
        assert!(value.get("lastRunAt").is_some());
    }
}
