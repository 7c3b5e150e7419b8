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

//! Schema validation for handler input/output, applied only when the manifest
//! declares a schema for the route — untyped handlers skip this step entirely.

use anvil_core::PluginError;
use serde_json::Value;

pub fn validate_against_schema(schema: &Value, instance: &Value) -> Result<(), PluginError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|err| PluginError::new(anvil_core::ErrorKind::ValidationError, format!("invalid schema: {err}")))?;

    let issues: Vec<String> = validator.iter_errors(instance).map(|err| err.to_string()).collect();
    if issues.is_empty() {
        Ok(())
    } else {
        Err(PluginError::validation(issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_field_fails_validation() {
        let schema = serde_json::json!({
            "type": "object",
            "required": ["name"],
            "properties": {"name": {"type": "string"}}
        });
        let err = validate_against_schema(&schema, &serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind, anvil_core::ErrorKind::ValidationError);
    }

    #[test]
    fn matching_instance_passes() {
        let schema = serde_json::json!({
            "type": "object",
            "required": ["name"],
            "properties": {"name": {"type": "string"}}
        });
        assert!(validate_against_schema(&schema, &serde_json::json!({"name": "demo"})).is_ok());
    }
}
