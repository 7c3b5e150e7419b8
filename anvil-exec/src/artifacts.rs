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

//! Copies files matching a handler's declared artifact patterns from the workspace
//! into the execution's `outdir`. Failures here are logged and reported as
//! `artifact.failed` analytics events by the orchestrator; they never fail the run.

use anvil_core::{ErrorKind, PluginError};
use regex::Regex;
use std::path::{Path, PathBuf};

fn glob_to_regex(pattern: &str) -> Regex {
    let mut escaped = String::with_capacity(pattern.len() * 2);
    escaped.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => escaped.push_str(".*"),
            '?' => escaped.push('.'),
            c if "\\.+()|[]{}^$".contains(c) => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped.push('$');
    Regex::new(&escaped).unwrap_or_else(|_| Regex::new("$^").unwrap())
}

fn walk(root: &Path, relative: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let current = root.join(relative);
    if current.is_dir() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            walk(root, &relative.join(entry.file_name()), out)?;
        }
    } else {
        out.push(relative.to_path_buf());
    }
    Ok(())
}

/// Copies every file under `cwd` whose relative path matches one of `patterns` into
/// `outdir`, preserving the relative path. Returns the list of copied relative paths.
pub fn collect_artifacts(cwd: &Path, outdir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, PluginError> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let regexes: Vec<Regex> = patterns.iter().map(|p| glob_to_regex(p)).collect();

    let mut candidates = Vec::new();
    walk(cwd, Path::new(""), &mut candidates).map_err(|err| PluginError::new(ErrorKind::WorkspaceError, format!("failed to scan workspace for artifacts: {err}")))?;

    let mut copied = Vec::new();
    for relative in candidates {
        let relative_str = relative.to_string_lossy();
        if !regexes.iter().any(|re| re.is_match(&relative_str)) {
            continue;
        }
        let source = cwd.join(&relative);
        let destination = outdir.join(&relative);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|err| PluginError::new(ErrorKind::WorkspaceError, format!("failed to create artifact directory: {err}")))?;
        }
        std::fs::copy(&source, &destination).map_err(|err| PluginError::new(ErrorKind::WorkspaceError, format!("failed to copy artifact {relative_str}: {err}")))?;
        copied.push(relative);
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_files_matching_a_wildcard_pattern() {
        let cwd = tempfile::tempdir().unwrap();
        let outdir = tempfile::tempdir().unwrap();
        std::fs::write(cwd.path().join("report.json"), b"{}").unwrap();
        std::fs::write(cwd.path().join("notes.txt"), b"ignore me").unwrap();

        let copied = collect_artifacts(cwd.path(), outdir.path(), &["*.json".to_string()]).unwrap();
        assert_eq!(copied, vec![PathBuf::from("report.json")]);
        assert!(outdir.path().join("report.json").exists());
        assert!(!outdir.path().join("notes.txt").exists());
    }

    #[test]
    fn no_patterns_copies_nothing() {
        let cwd = tempfile::tempdir().unwrap();
        let outdir = tempfile::tempdir().unwrap();
        assert!(collect_artifacts(cwd.path(), outdir.path(), &[]).unwrap().is_empty());
    }
}
