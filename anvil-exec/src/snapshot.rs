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

//! Rotating on-disk snapshots of failed executions, for offline replay. Keeps the
//! most recent 30 by file-name order (names are timestamp-prefixed, so lexicographic
//! order is chronological). The target directory is supplied per call rather than at
//! construction: it lives under the leased workspace (`<workspace>/.anvil/snapshots`),
//! which is only known once a request's workspace has been leased.

use anvil_core::{ErrorKind, PluginError};
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAX_SNAPSHOTS: usize = 30;

#[derive(Default)]
pub struct SnapshotStore {
    max: usize,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self { max: MAX_SNAPSHOTS }
    }

    pub fn record(&self, dir: &Path, request_id: &str, snapshot: &Value) -> Result<(), PluginError> {
        std::fs::create_dir_all(dir).map_err(|err| PluginError::new(ErrorKind::WorkspaceError, format!("failed to create snapshot directory: {err}")))?;

        let file_name = format!("{}-{request_id}.json", chrono::Utc::now().format("%Y%m%dT%H%M%S%.6f"));
        let path = dir.join(file_name);
        let serialized = serde_json::to_vec_pretty(snapshot).map_err(|err| PluginError::new(ErrorKind::ValidationError, err.to_string()))?;
        std::fs::write(&path, serialized).map_err(|err| PluginError::new(ErrorKind::WorkspaceError, format!("failed to write snapshot: {err}")))?;

        self.rotate(dir)
    }

    fn rotate(&self, dir: &Path) -> Result<(), PluginError> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|err| PluginError::new(ErrorKind::WorkspaceError, format!("failed to list snapshots: {err}")))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        if entries.len() > self.max {
            for stale in &entries[..entries.len() - self.max] {
                let _ = std::fs::remove_file(stale);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_most_recent_thirty_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore { max: 3 };
        for i in 0..5 {
            store.record(dir.path(), &format!("req-{i}"), &serde_json::json!({"n": i})).unwrap();
        }
        let remaining: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 3);
    }

    #[test]
    fn snapshot_file_name_is_timestamp_dash_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new();
        store.record(dir.path(), "req-abc", &serde_json::json!({})).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name().to_string_lossy().to_string();
        assert!(name.ends_with("-req-abc.json"));
    }
}
