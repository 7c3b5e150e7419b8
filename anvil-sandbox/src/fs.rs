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

//! `fs.check(path, mode)`: normalizes a path to the workspace, rejects traversal
//! outside the allowed roots (including through symlinks), and consults the declared mode.

use crate::patterns::glob_matches;
use anvil_core::manifest::{FsMode, FsPermission};
use anvil_core::{ErrorKind, PluginError};
use std::path::{Path, PathBuf};

/// The roots a handler execution is allowed to touch absent any further allow/deny pattern:
/// the leased workspace `cwd` and the `outdir` for artifacts.
#[derive(Debug, Clone)]
pub struct FsRoots {
    pub cwd: PathBuf,
    pub outdir: Option<PathBuf>,
    pub extra_allow_roots: Vec<PathBuf>,
}

impl FsRoots {
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            outdir: None,
            extra_allow_roots: Vec::new(),
        }
    }

    fn roots(&self) -> Vec<&Path> {
        let mut roots = vec![self.cwd.as_path()];
        if let Some(outdir) = &self.outdir {
            roots.push(outdir.as_path());
        }
        roots.extend(self.extra_allow_roots.iter().map(PathBuf::as_path));
        roots
    }
}

/// Resolves `path` against `roots.cwd` and canonicalizes it. If the path (or a prefix of it,
/// for paths that do not yet exist — e.g. a file about to be created) resolves outside every
/// allowed root, this is a traversal attempt and always denied regardless of any pattern.
fn resolve_within_roots(path: &Path, roots: &FsRoots) -> Result<PathBuf, PluginError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        roots.cwd.join(path)
    };

    let normalized = normalize_lexically(&absolute);
    let resolved = canonicalize_best_effort(&normalized);

    let roots = roots.roots();
    let within = roots.iter().any(|root| {
        let root_resolved = canonicalize_best_effort(root);
        resolved.starts_with(&root_resolved) || normalized.starts_with(root)
    });

    if within {
        Ok(resolved)
    } else {
        Err(PluginError::new(
            ErrorKind::PermissionDenied,
            format!("path {} escapes the workspace", path.display()),
        ))
    }
}

/// Lexical normalization (`..`/`.` resolution) that does not require the path to exist,
/// so a not-yet-created write target is still checked for traversal.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut stack: Vec<std::ffi::OsString> = Vec::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                stack.pop();
            }
            Component::CurDir => {}
            Component::Normal(part) => stack.push(part.to_os_string()),
            Component::RootDir | Component::Prefix(_) => {
                stack.clear();
                stack.push(component.as_os_str().to_os_string());
            }
        }
    }
    stack.into_iter().collect()
}

fn canonicalize_best_effort(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize_lexically(path))
}

fn mode_allows(declared: FsMode, requested: FsMode) -> bool {
    match (declared, requested) {
        (FsMode::None, _) => false,
        (FsMode::Read, FsMode::Read) => true,
        (FsMode::Read, FsMode::Write) => false,
        (FsMode::Write, _) => true,
        (_, FsMode::None) => true,
    }
}

/// `fs.check(path, mode)` — deny wins over allow at equal specificity; default deny.
pub fn check(
    perm: &FsPermission,
    roots: &FsRoots,
    path: &Path,
    requested_mode: FsMode,
) -> Result<PathBuf, PluginError> {
    let declared = perm.mode.unwrap_or(FsMode::None);
    if !mode_allows(declared, requested_mode) {
        return Err(deny(path, "filesystem mode does not permit this access"));
    }

    let resolved = resolve_within_roots(path, roots)?;
    let candidate = resolved.to_string_lossy();

    if perm.deny.iter().any(|pattern| glob_matches(pattern, &candidate)) {
        return Err(deny(path, "path matches an explicit deny pattern"));
    }

    if perm.allow.is_empty() {
        // No explicit allow patterns: the workspace roots themselves are the allow list.
        return Ok(resolved);
    }

    if perm.allow.iter().any(|pattern| glob_matches(pattern, &candidate)) {
        Ok(resolved)
    } else {
        Err(deny(path, "path does not match any allow pattern"))
    }
}

fn deny(path: &Path, reason: &str) -> PluginError {
    tracing::warn!(code = "PERMISSION_DENIED", path = %path.display(), reason, "filesystem access denied");
    PluginError::permission_denied(format!("{}: {}", path.display(), reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::manifest::FsPermission;

    fn roots(dir: &Path) -> FsRoots {
        FsRoots::new(dir.to_path_buf())
    }

    #[test]
    fn traversal_outside_cwd_is_denied_even_with_allow_all() {
        let tmp = std::env::temp_dir().join("anvil-fs-test-traversal");
        std::fs::create_dir_all(&tmp).unwrap();
        let perm = FsPermission {
            mode: Some(FsMode::Write),
            allow: vec!["*".to_string()],
            deny: vec![],
        };
        let result = check(&perm, &roots(&tmp), Path::new("../../etc/passwd"), FsMode::Read);
        assert!(result.is_err());
    }

    #[test]
    fn read_inside_cwd_is_allowed_by_default() {
        let tmp = std::env::temp_dir().join("anvil-fs-test-ok");
        std::fs::create_dir_all(&tmp).unwrap();
        let perm = FsPermission {
            mode: Some(FsMode::Read),
            allow: vec![],
            deny: vec![],
        };
        let result = check(&perm, &roots(&tmp), Path::new("data.json"), FsMode::Read);
        assert!(result.is_ok());
    }

    #[test]
    fn write_mode_required_for_write_access() {
        let tmp = std::env::temp_dir().join("anvil-fs-test-write");
        std::fs::create_dir_all(&tmp).unwrap();
        let perm = FsPermission {
            mode: Some(FsMode::Read),
            allow: vec![],
            deny: vec![],
        };
        let result = check(&perm, &roots(&tmp), Path::new("data.json"), FsMode::Write);
        assert!(result.is_err());
    }

    #[test]
    fn deny_pattern_wins_over_allow() {
        let tmp = std::env::temp_dir().join("anvil-fs-test-deny-wins");
        std::fs::create_dir_all(&tmp).unwrap();
        let secret = tmp.join("secret.env");
        let perm = FsPermission {
            mode: Some(FsMode::Read),
            allow: vec!["*".to_string()],
            deny: vec![format!("{}", secret.to_string_lossy())],
        };
        let result = check(&perm, &roots(&tmp), Path::new("secret.env"), FsMode::Read);
        assert!(result.is_err());
    }

    #[test]
    fn decision_is_deterministic() {
        let tmp = std::env::temp_dir().join("anvil-fs-test-idempotent");
        std::fs::create_dir_all(&tmp).unwrap();
        let perm = FsPermission {
            mode: Some(FsMode::Read),
            allow: vec![],
            deny: vec![],
        };
        let r1 = check(&perm, &roots(&tmp), Path::new("data.json"), FsMode::Read);
        let r2 = check(&perm, &roots(&tmp), Path::new("data.json"), FsMode::Read);
        assert_eq!(r1.is_ok(), r2.is_ok());
    }
}
