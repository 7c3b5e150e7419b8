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

//! Shared glob-ish pattern matching used by filesystem, shell, and (trailing-dot) network
//! rules. Supports `*` as "match anything" and treats the rest of the pattern literally.

use regex::Regex;

/// Compiles a glob pattern (`*` wildcard only) into an anchored regex. Special regex
/// characters other than `*` are escaped so patterns behave like shell globs, not regexes.
pub fn glob_to_regex(pattern: &str) -> Regex {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    const META: &str = r".+?()[]{}|^$\";
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            c if META.contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    Regex::new(&out).unwrap_or_else(|_| Regex::new("^$").unwrap())
}

pub fn glob_matches(pattern: &str, value: &str) -> bool {
    glob_to_regex(pattern).is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_anything() {
        assert!(glob_matches("*.suffix", "api.suffix"));
        assert!(!glob_matches("*.suffix", "api.suffix.evil"));
    }

    #[test]
    fn literal_pattern_matches_exactly() {
        assert!(glob_matches("git status", "git status"));
        assert!(!glob_matches("git status", "git status --all"));
    }

    #[test]
    fn prefix_star_form_matches_prefix() {
        assert!(glob_matches("npm *", "npm install"));
        assert!(!glob_matches("npm *", "yarn install"));
    }
}
