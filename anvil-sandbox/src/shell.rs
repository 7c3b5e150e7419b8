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

//! `shell.decide` and `shell.isDangerous`.

use crate::patterns::glob_matches;
use anvil_core::manifest::ShellPermission;
use anvil_core::PluginError;

/// Built-in list of command shapes considered dangerous regardless of manifest
/// configuration: wildcard deletes, destructive git, raw disk operations, wide package
/// uninstalls. Manifest-declared `requireConfirmation` entries are added on top of this.
const BUILTIN_DANGEROUS: &[&str] = &[
    "rm -rf *",
    "rm -rf /",
    "git reset --hard *",
    "git push --force *",
    "git clean -fdx*",
    "dd if=*",
    "mkfs*",
    "npm uninstall *",
    "yarn remove *",
    "pip uninstall *",
];

fn full_spec(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{command} {}", args.join(" "))
    }
}

fn matches_any(patterns: &[String], command: &str, spec: &str) -> bool {
    patterns.iter().any(|pattern| {
        glob_matches(pattern, spec) || glob_matches(pattern, command)
    })
}

/// `shell.decide(command, args)` — explicit deny wins; no allow list means deny.
pub fn decide(perm: &ShellPermission, command: &str, args: &[String]) -> Result<(), PluginError> {
    let spec = full_spec(command, args);

    if matches_any(&perm.deny, command, &spec) {
        return Err(deny(&spec, "command matches an explicit deny pattern"));
    }

    if perm.allow.is_empty() {
        return Err(deny(&spec, "no shell commands are allow-listed"));
    }

    if matches_any(&perm.allow, command, &spec) {
        Ok(())
    } else {
        Err(deny(&spec, "command does not match any allow pattern"))
    }
}

/// `shell.isDangerous(spec)` — callers must route a positive result to a confirmation
/// channel; a confirmation timeout defaults to deny (enforced by the caller, not here).
pub fn is_dangerous(perm: &ShellPermission, command: &str, args: &[String]) -> bool {
    let spec = full_spec(command, args);
    BUILTIN_DANGEROUS.iter().any(|pattern| glob_matches(pattern, &spec))
        || matches_any(&perm.require_confirmation, command, &spec)
}

fn deny(spec: &str, reason: &str) -> PluginError {
    tracing::warn!(code = "PERMISSION_DENIED", spec, reason, "shell command denied");
    PluginError::permission_denied(format!("{spec}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(allow: &[&str], deny_list: &[&str]) -> ShellPermission {
        ShellPermission {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny_list.iter().map(|s| s.to_string()).collect(),
            require_confirmation: vec![],
            max_concurrent: None,
            timeout: None,
        }
    }

    #[test]
    fn no_allow_list_means_deny() {
        let p = perm(&[], &[]);
        assert!(decide(&p, "ls", &[]).is_err());
    }

    #[test]
    fn explicit_allow_permits_exact_spec() {
        let p = perm(&["git status"], &[]);
        assert!(decide(&p, "git", &["status".to_string()]).is_ok());
    }

    #[test]
    fn prefix_star_form_allows_subcommands() {
        let p = perm(&["npm *"], &[]);
        assert!(decide(&p, "npm", &["install".to_string()]).is_ok());
        assert!(decide(&p, "npm", &["run".to_string(), "build".to_string()]).is_ok());
    }

    #[test]
    fn deny_wins_over_allow() {
        let p = perm(&["git *"], &["git push --force *"]);
        assert!(decide(&p, "git", &["status".to_string()]).is_ok());
        assert!(decide(&p, "git", &["push".to_string(), "--force".to_string()]).is_err());
    }

    #[test]
    fn builtin_dangerous_list_flags_wildcard_delete() {
        let p = perm(&["rm *"], &[]);
        assert!(is_dangerous(&p, "rm", &["-rf".to_string(), "*".to_string()]));
        assert!(!is_dangerous(&p, "rm", &["file.txt".to_string()]));
    }

    #[test]
    fn manifest_confirmation_entries_are_also_dangerous() {
        let mut p = perm(&["deploy *"], &[]);
        p.require_confirmation.push("deploy prod".to_string());
        assert!(is_dangerous(&p, "deploy", &["prod".to_string()]));
        assert!(!is_dangerous(&p, "deploy", &["staging".to_string()]));
    }
}
