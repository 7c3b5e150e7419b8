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

//! Workspace manager: maps `(workspace config, execution id, plugin root)` to a lease
//! `{workspaceId, cwd, pluginRoot, cleanup?}`.

use anvil_core::ids::{ExecutionId, WorkspaceId};
use anvil_core::request::{WorkspaceKind, WorkspaceSpec};
use anvil_core::{ErrorKind, PluginError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait::async_trait]
pub trait Cleanup: Send + Sync {
    async fn run(&self) -> Result<(), PluginError>;
}

/// A short-lived reservation of a workspace for a single execution.
pub struct Lease {
    pub workspace_id: WorkspaceId,
    pub cwd: PathBuf,
    pub plugin_root: PathBuf,
    cleanup: Option<Box<dyn Cleanup>>,
    released: std::sync::atomic::AtomicBool,
}

impl Lease {
    fn new(workspace_id: WorkspaceId, cwd: PathBuf, plugin_root: PathBuf, cleanup: Option<Box<dyn Cleanup>>) -> Self {
        Self {
            workspace_id,
            cwd,
            plugin_root,
            cleanup,
            released: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Idempotent: double-release is tolerated and never throws.
    pub async fn release(&self) {
        if self
            .released
            .swap(true, std::sync::atomic::Ordering::SeqCst)
        {
            return;
        }
        if let Some(cleanup) = &self.cleanup {
            if let Err(err) = cleanup.run().await {
                tracing::warn!(error = %err, workspace_id = %self.workspace_id, "workspace cleanup failed");
            }
        }
    }
}

#[async_trait]
pub trait WorkspaceManager: Send + Sync {
    async fn lease(&self, execution_id: &ExecutionId, plugin_root: &Path, spec: &WorkspaceSpec) -> Result<Lease, PluginError>;
}

/// Deterministic local workspace manager: `lease(execution_id, plugin_root)` always returns
/// the same `workspaceId` for the same inputs (idempotent, so retries never multiply
/// directories). `cleanup` is a no-op because the `cwd` is caller-owned, not materialized.
pub struct LocalWorkspaceManager;

impl LocalWorkspaceManager {
    pub fn new() -> Self {
        Self
    }

    pub fn workspace_id(execution_id: &ExecutionId, plugin_root: &Path) -> WorkspaceId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(execution_id.to_string().as_bytes());
        hasher.update(plugin_root.to_string_lossy().as_bytes());
        WorkspaceId(hasher.finalize().to_hex().to_string())
    }
}

impl Default for LocalWorkspaceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkspaceManager for LocalWorkspaceManager {
    async fn lease(&self, execution_id: &ExecutionId, plugin_root: &Path, spec: &WorkspaceSpec) -> Result<Lease, PluginError> {
        if spec.kind != WorkspaceKind::Local {
            return Err(PluginError::new(
                ErrorKind::WorkspaceError,
                "LocalWorkspaceManager only supports local workspaces",
            ));
        }
        if !spec.cwd.exists() {
            return Err(PluginError::new(
                ErrorKind::WorkspaceError,
                format!("workspace cwd does not exist: {}", spec.cwd.display()),
            ));
        }
        let workspace_id = Self::workspace_id(execution_id, plugin_root);
        Ok(Lease::new(workspace_id, spec.cwd.clone(), plugin_root.to_path_buf(), None))
    }
}

/// Ephemeral workspace manager: a minimal, explicitly best-effort implementation (not true
/// snapshot/ref materialization) that copies a filtered source tree into a freshly created
/// temporary directory and removes it on release.
pub struct EphemeralWorkspaceManager {
    base_dir: PathBuf,
}

impl EphemeralWorkspaceManager {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn copy_filtered(src: &Path, dst: &Path, include: &[String], exclude: &[String]) -> std::io::Result<()> {
        std::fs::create_dir_all(dst)?;
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if exclude.iter().any(|pattern| crate_glob_matches(pattern, &name_str)) {
                continue;
            }
            if !include.is_empty() && !include.iter().any(|pattern| crate_glob_matches(pattern, &name_str)) {
                continue;
            }
            let src_path = entry.path();
            let dst_path = dst.join(&name);
            if entry.file_type()?.is_dir() {
                Self::copy_filtered(&src_path, &dst_path, include, exclude)?;
            } else {
                std::fs::copy(&src_path, &dst_path)?;
            }
        }
        Ok(())
    }
}

fn crate_glob_matches(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}

struct RemoveDirCleanup(PathBuf);

#[async_trait]
impl Cleanup for RemoveDirCleanup {
    async fn run(&self) -> Result<(), PluginError> {
        let path = self.0.clone();
        tokio::task::spawn_blocking(move || std::fs::remove_dir_all(&path))
            .await
            .map_err(|err| PluginError::new(ErrorKind::WorkspaceError, err.to_string()))?
            .or_else(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(PluginError::new(ErrorKind::WorkspaceError, err.to_string()))
                }
            })
    }
}

#[async_trait]
impl WorkspaceManager for EphemeralWorkspaceManager {
    async fn lease(&self, execution_id: &ExecutionId, plugin_root: &Path, spec: &WorkspaceSpec) -> Result<Lease, PluginError> {
        if spec.kind != WorkspaceKind::Ephemeral {
            return Err(PluginError::new(
                ErrorKind::WorkspaceError,
                "EphemeralWorkspaceManager only supports ephemeral workspaces",
            ));
        }
        let workspace_id = WorkspaceId(format!("eph-{}", execution_id));
        let target = self.base_dir.join(&workspace_id.0);
        Self::copy_filtered(&spec.cwd, &target, &spec.include, &spec.exclude)
            .map_err(|err| PluginError::new(ErrorKind::WorkspaceError, err.to_string()))?;
        Ok(Lease::new(
            workspace_id,
            target.clone(),
            plugin_root.to_path_buf(),
            Some(Box::new(RemoveDirCleanup(target))),
        ))
    }
}

/// Dispatches to the Local or Ephemeral manager by `spec.kind`, so callers hold a single
/// `WorkspaceManager` regardless of which workspace kinds a deployment actually uses.
pub struct CompositeWorkspaceManager {
    local: LocalWorkspaceManager,
    ephemeral: EphemeralWorkspaceManager,
}

impl CompositeWorkspaceManager {
    pub fn new(local: LocalWorkspaceManager, ephemeral: EphemeralWorkspaceManager) -> Self {
        Self { local, ephemeral }
    }
}

#[async_trait]
impl WorkspaceManager for CompositeWorkspaceManager {
    async fn lease(&self, execution_id: &ExecutionId, plugin_root: &Path, spec: &WorkspaceSpec) -> Result<Lease, PluginError> {
        match spec.kind {
            WorkspaceKind::Local => self.local.lease(execution_id, plugin_root, spec).await,
            WorkspaceKind::Ephemeral => self.ephemeral.lease(execution_id, plugin_root, spec).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::request::WorkspaceSpec;

    #[tokio::test]
    async fn local_lease_is_deterministic_for_same_execution_id() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = LocalWorkspaceManager::new();
        let execution_id = ExecutionId::new();
        let plugin_root = PathBuf::from("/plugins/demo");
        let spec = WorkspaceSpec::local(tmp.path().to_path_buf());

        let lease1 = manager.lease(&execution_id, &plugin_root, &spec).await.unwrap();
        let lease2 = manager.lease(&execution_id, &plugin_root, &spec).await.unwrap();

        assert_eq!(lease1.workspace_id, lease2.workspace_id);
    }

    #[tokio::test]
    async fn different_execution_ids_produce_different_workspace_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = LocalWorkspaceManager::new();
        let plugin_root = PathBuf::from("/plugins/demo");
        let spec = WorkspaceSpec::local(tmp.path().to_path_buf());

        let lease1 = manager.lease(&ExecutionId::new(), &plugin_root, &spec).await.unwrap();
        let lease2 = manager.lease(&ExecutionId::new(), &plugin_root, &spec).await.unwrap();

        assert_ne!(lease1.workspace_id, lease2.workspace_id);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = LocalWorkspaceManager::new();
        let spec = WorkspaceSpec::local(tmp.path().to_path_buf());
        let lease = manager
            .lease(&ExecutionId::new(), &PathBuf::from("/plugins/demo"), &spec)
            .await
            .unwrap();

        lease.release().await;
        lease.release().await;
    }

    #[tokio::test]
    async fn ephemeral_lease_copies_included_files_and_cleanup_removes_them() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("keep.txt"), b"hello").unwrap();
        std::fs::write(src.path().join("skip.log"), b"noisy").unwrap();

        let base = tempfile::tempdir().unwrap();
        let manager = EphemeralWorkspaceManager::new(base.path().to_path_buf());
        let mut spec = WorkspaceSpec::local(src.path().to_path_buf());
        spec.kind = WorkspaceKind::Ephemeral;
        spec.exclude = vec!["*.log".to_string()];

        let lease = manager
            .lease(&ExecutionId::new(), &PathBuf::from("/plugins/demo"), &spec)
            .await
            .unwrap();

        assert!(lease.cwd.join("keep.txt").exists());
        assert!(!lease.cwd.join("skip.log").exists());

        lease.release().await;
        assert!(!lease.cwd.exists());
    }
}
