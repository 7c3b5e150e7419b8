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

//! Permission normalization and sandbox enforcement.
//!
//! The source's two sandbox modes (`enforce`/`compat`) collapse to a single mode here:
//! `compat` existed only to support legacy code written against synchronous filesystem
//! APIs, which has no equivalent in a systems-language rewrite. Handlers
//! are written to the sandboxed `Sandbox` surface from the start, so [`SandboxMode`] has
//! exactly one enforcing variant plus the explicitly fully-trusted in-process variant.

pub mod env;
pub mod fs;
pub mod net;
pub mod patterns;
pub mod shell;

use anvil_core::manifest::PermissionSpec;
use anvil_core::PluginError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    /// Every resource access is checked against the permission spec; violations throw
    /// before any side effect occurs. Used for the subprocess and worker-pool runners.
    Enforce,
    /// No interposition beyond the exposed runtime surface; reserved for fully trusted
    /// plugins running in the host address space.
    Trusted,
}

/// Bundles a permission spec with the concrete workspace roots it is evaluated against,
/// giving handlers (via the runner) a single façade for every resource-access check.
pub struct Sandbox {
    pub mode: SandboxMode,
    pub permissions: PermissionSpec,
    pub fs_roots: fs::FsRoots,
}

impl Sandbox {
    pub fn new(mode: SandboxMode, permissions: PermissionSpec, cwd: PathBuf) -> Self {
        Self {
            mode,
            permissions,
            fs_roots: fs::FsRoots::new(cwd),
        }
    }

    pub fn check_fs(
        &self,
        path: &Path,
        requested_mode: anvil_core::manifest::FsMode,
    ) -> Result<PathBuf, PluginError> {
        if self.mode == SandboxMode::Trusted {
            return Ok(path.to_path_buf());
        }
        fs::check(&self.permissions.filesystem, &self.fs_roots, path, requested_mode)
    }

    pub fn check_net(&self, host: &str, port: Option<u16>) -> Result<(), PluginError> {
        if self.mode == SandboxMode::Trusted {
            return Ok(());
        }
        net::check(&self.permissions.network, host, port)
    }

    pub fn pick_env(&self, process_env: &HashMap<String, String>) -> HashMap<String, String> {
        if self.mode == SandboxMode::Trusted {
            return process_env.clone();
        }
        env::pick(&self.permissions.environment, process_env)
    }

    pub fn check_shell(&self, command: &str, args: &[String]) -> Result<(), PluginError> {
        if self.mode == SandboxMode::Trusted {
            return Ok(());
        }
        shell::decide(&self.permissions.shell, command, args)
    }

    pub fn shell_is_dangerous(&self, command: &str, args: &[String]) -> bool {
        shell::is_dangerous(&self.permissions.shell, command, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::manifest::{FsMode, FsPermission};

    #[test]
    fn trusted_mode_bypasses_every_check() {
        let tmp = std::env::temp_dir();
        let sandbox = Sandbox::new(SandboxMode::Trusted, PermissionSpec::default(), tmp);
        assert!(sandbox.check_fs(Path::new("/etc/passwd"), FsMode::Write).is_ok());
        assert!(sandbox.check_net("anything.com", None).is_ok());
    }

    #[test]
    fn enforce_mode_applies_declared_permissions() {
        let tmp = std::env::temp_dir().join("anvil-sandbox-enforce-test");
        std::fs::create_dir_all(&tmp).unwrap();
        let mut perms = PermissionSpec::default();
        perms.filesystem = FsPermission {
            mode: Some(FsMode::Read),
            allow: vec![],
            deny: vec![],
        };
        let sandbox = Sandbox::new(SandboxMode::Enforce, perms, tmp);
        assert!(sandbox.check_fs(Path::new("data.json"), FsMode::Read).is_ok());
        assert!(sandbox.check_fs(Path::new("data.json"), FsMode::Write).is_err());
    }
}
