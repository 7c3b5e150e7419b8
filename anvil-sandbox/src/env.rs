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

//! `env.pick(processEnv)`: returns exactly the allow-listed keys, including
//! `PREFIX*` wildcard expansion.

use anvil_core::manifest::EnvPermission;
use std::collections::HashMap;

pub fn pick(perm: &EnvPermission, process_env: &HashMap<String, String>) -> HashMap<String, String> {
    let mut picked = HashMap::new();
    for (key, value) in process_env {
        if perm.allow.iter().any(|pattern| key_matches(pattern, key)) {
            picked.insert(key.clone(), value.clone());
        }
    }
    picked
}

fn key_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn only_allow_listed_keys_survive() {
        let perm = EnvPermission {
            allow: vec!["HOME".to_string()],
        };
        let picked = pick(&perm, &env(&[("HOME", "/root"), ("SECRET", "x")]));
        assert_eq!(picked.len(), 1);
        assert_eq!(picked.get("HOME").unwrap(), "/root");
    }

    #[test]
    fn wildcard_prefix_expands() {
        let perm = EnvPermission {
            allow: vec!["APP_*".to_string()],
        };
        let picked = pick(&perm, &env(&[("APP_NAME", "demo"), ("APP_PORT", "8080"), ("OTHER", "x")]));
        assert_eq!(picked.len(), 2);
        assert!(picked.contains_key("APP_NAME"));
        assert!(picked.contains_key("APP_PORT"));
    }

    #[test]
    fn empty_allow_list_picks_nothing() {
        let perm = EnvPermission { allow: vec![] };
        let picked = pick(&perm, &env(&[("HOME", "/root")]));
        assert!(picked.is_empty());
    }
}
