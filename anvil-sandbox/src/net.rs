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

//! `net.check(host, port?)`: scheme/port/path-independent host normalization, CIDR
//! matching for IPv4 literals, `*.suffix` wildcard matching on a trailing-dot boundary.

use anvil_core::manifest::NetPermission;
use anvil_core::PluginError;
use std::net::Ipv4Addr;

/// Strips a leading scheme (`https://`), any path/query, and a trailing port, then
/// lowercases the remainder — so `net.check` is invariant to how the host was spelled.
pub fn normalize_host(input: &str) -> String {
    let without_scheme = input.split("://").last().unwrap_or(input);
    let host_and_rest = without_scheme.split(['/', '?', '#']).next().unwrap_or(without_scheme);
    let host_only = host_and_rest.rsplit_once(':').map_or(host_and_rest, |(host, port)| {
        if port.chars().all(|c| c.is_ascii_digit()) {
            host
        } else {
            host_and_rest
        }
    });
    host_only.trim().to_lowercase()
}

fn suffix_matches(pattern: &str, host: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.") {
        // trailing-dot boundary: `*.suffix` matches `api.suffix` but not `evilsuffix`
        host == suffix || host.ends_with(&format!(".{suffix}"))
    } else {
        pattern == host
    }
}

fn parse_cidr(cidr: &str) -> Option<(Ipv4Addr, u32)> {
    let (addr, bits) = cidr.split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let bits: u32 = bits.parse().ok()?;
    if bits > 32 {
        return None;
    }
    Some((addr, bits))
}

fn cidr_contains(cidr: &str, host: &Ipv4Addr) -> bool {
    match parse_cidr(cidr) {
        Some((network, bits)) => {
            let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
            u32::from(network) & mask == u32::from(*host) & mask
        }
        None => false,
    }
}

/// `net.check` — deny wins; CIDR allow is only consulted when `host` is an IPv4 literal;
/// default deny unless an allow pattern (exact, `*.suffix`, or CIDR) matches.
pub fn check(perm: &NetPermission, host: &str, _port: Option<u16>) -> Result<(), PluginError> {
    if !perm.enabled {
        return Err(deny(host, "network access is disabled"));
    }

    let normalized = normalize_host(host);

    if perm.deny_hosts.iter().any(|pattern| suffix_matches(pattern, &normalized)) {
        return Err(deny(host, "host matches an explicit deny pattern"));
    }

    if perm.allow_hosts.iter().any(|pattern| suffix_matches(pattern, &normalized)) {
        return Ok(());
    }

    if let Ok(ipv4) = normalized.parse::<Ipv4Addr>() {
        if perm.allow_cidrs.iter().any(|cidr| cidr_contains(cidr, &ipv4)) {
            return Ok(());
        }
    }

    Err(deny(host, "host does not match any allow pattern"))
}

fn deny(host: &str, reason: &str) -> PluginError {
    tracing::warn!(code = "PERMISSION_DENIED", host, reason, "network access denied");
    PluginError::permission_denied(format!("{host}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(allow_hosts: &[&str], allow_cidrs: &[&str]) -> NetPermission {
        NetPermission {
            enabled: true,
            allow_hosts: allow_hosts.iter().map(|s| s.to_string()).collect(),
            deny_hosts: vec![],
            allow_cidrs: allow_cidrs.iter().map(|s| s.to_string()).collect(),
            timeout: None,
        }
    }

    #[test]
    fn normalization_ignores_scheme_port_path_and_case() {
        assert_eq!(normalize_host("HTTPS://API.Example.com:443/v1/foo"), "api.example.com");
        assert_eq!(normalize_host("api.example.com"), "api.example.com");
    }

    #[test]
    fn decision_is_stable_across_equivalent_spellings() {
        let p = perm(&["api.example.com"], &[]);
        assert!(check(&p, "https://API.example.com:443/x", None).is_ok());
        assert!(check(&p, "api.example.com", Some(80)).is_ok());
    }

    #[test]
    fn suffix_wildcard_respects_dot_boundary() {
        let p = perm(&["*.example.com"], &[]);
        assert!(check(&p, "api.example.com", None).is_ok());
        assert!(check(&p, "evilexample.com", None).is_err());
    }

    #[test]
    fn deny_wins_over_allow() {
        let mut p = perm(&["*.example.com"], &[]);
        p.deny_hosts.push("bad.example.com".to_string());
        assert!(check(&p, "bad.example.com", None).is_err());
        assert!(check(&p, "good.example.com", None).is_ok());
    }

    #[test]
    fn cidr_only_applies_to_ipv4_literals() {
        let p = perm(&[], &["10.0.0.0/8"]);
        assert!(check(&p, "10.1.2.3", None).is_ok());
        assert!(check(&p, "11.1.2.3", None).is_err());
        assert!(check(&p, "internal.example.com", None).is_err());
    }

    #[test]
    fn default_is_deny() {
        let p = perm(&[], &[]);
        assert!(check(&p, "anything.com", None).is_err());
    }
}
