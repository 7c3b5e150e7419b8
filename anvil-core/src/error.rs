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

//! Stable error taxonomy shared by every component and host adapter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The closed set of error kinds that can cross a component boundary.
///
/// This enum is serialized as-is in [`ErrorEnvelope`]; adding a variant is a protocol change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Timeout,
    Aborted,
    PermissionDenied,
    HandlerError,
    HandlerContractError,
    HandlerNotFound,
    WorkspaceError,
    ValidationError,
    QueueFull,
    AcquireTimeout,
    WorkerCrashed,
    WorkerUnhealthy,
    UnknownError,
}

impl ErrorKind {
    /// Canonical HTTP status used by HTTP host adapters.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Timeout => 504,
            ErrorKind::Aborted => 499,
            ErrorKind::PermissionDenied => 403,
            ErrorKind::HandlerError => 500,
            ErrorKind::HandlerContractError => 500,
            ErrorKind::HandlerNotFound => 404,
            ErrorKind::WorkspaceError => 500,
            ErrorKind::ValidationError => 400,
            ErrorKind::QueueFull => 429,
            ErrorKind::AcquireTimeout => 503,
            ErrorKind::WorkerCrashed => 500,
            ErrorKind::WorkerUnhealthy => 503,
            ErrorKind::UnknownError => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| "UNKNOWN_ERROR".to_string());
        write!(f, "{s}")
    }
}

/// An error raised by or on behalf of a handler during execution.
///
/// Carries a [`ErrorKind`] so the orchestrator can normalize it into an [`ErrorEnvelope`]
/// without guessing; anything that does not originate as a `PluginError` is normalized to
/// `HANDLER_ERROR` (or `UNKNOWN_ERROR` for non-error panics/conversions) by [`ErrorEnvelope::from_anyhow`].
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PluginError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub context: HashMap<String, String>,
}

impl PluginError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            context: HashMap::new(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Aborted, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn validation(issues: Vec<String>) -> Self {
        let details = serde_json::json!({ "issues": issues });
        Self::new(ErrorKind::ValidationError, "input failed schema validation").with_details(details)
    }
}

/// `{ code, http, message, details?, trace?, context }` — the serialized, stable shape of
/// an error crossing a component boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: ErrorKind,
    pub http: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorEnvelope {
    pub fn from_plugin_error(err: PluginError, trace: Option<String>) -> Self {
        Self {
            code: err.kind,
            http: err.kind.http_status(),
            message: err.message,
            details: err.details,
            trace,
            context: err.context,
        }
    }

    /// Normalizes an arbitrary `anyhow::Error` produced outside the `PluginError` path
    /// (e.g. a panic caught across a `tokio::task`, or an I/O failure) into `UNKNOWN_ERROR`.
    pub fn from_anyhow(err: anyhow::Error, trace: Option<String>) -> Self {
        Self {
            code: ErrorKind::UnknownError,
            http: ErrorKind::UnknownError.http_status(),
            message: err.to_string(),
            details: None,
            trace,
            context: HashMap::new(),
        }
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorEnvelope {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let err = PluginError::new(ErrorKind::QueueFull, "pool saturated")
            .with_context("pluginId", "demo@1.0.0");
        let envelope = ErrorEnvelope::from_plugin_error(err, Some("trace-1:span-2".to_string()));

        let json = serde_json::to_string(&envelope).unwrap();
        let round_tripped: ErrorEnvelope = serde_json::from_str(&json).unwrap();

        assert_eq!(round_tripped.code, ErrorKind::QueueFull);
        assert_eq!(round_tripped.http, 429);
        assert_eq!(round_tripped.message, "pool saturated");
        assert_eq!(round_tripped.trace.as_deref(), Some("trace-1:span-2"));
        assert_eq!(
            round_tripped.context.get("pluginId").map(String::as_str),
            Some("demo@1.0.0")
        );
    }

    #[test]
    fn http_status_mapping_matches_taxonomy() {
        assert_eq!(ErrorKind::Timeout.http_status(), 504);
        assert_eq!(ErrorKind::Aborted.http_status(), 499);
        assert_eq!(ErrorKind::PermissionDenied.http_status(), 403);
        assert_eq!(ErrorKind::HandlerNotFound.http_status(), 404);
        assert_eq!(ErrorKind::ValidationError.http_status(), 400);
        assert_eq!(ErrorKind::QueueFull.http_status(), 429);
        assert_eq!(ErrorKind::AcquireTimeout.http_status(), 503);
        assert_eq!(ErrorKind::WorkerUnhealthy.http_status(), 503);
    }
}
