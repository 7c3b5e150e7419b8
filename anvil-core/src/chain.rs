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

//! The mutable part of a cross-plugin call chain: remaining time, hop count, depth.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ChainState {
    pub remaining: Duration,
    pub hops: u32,
    pub depth: u32,
}

impl ChainState {
    pub fn root(budget: Duration) -> Self {
        Self {
            remaining: budget,
            hops: 0,
            depth: 0,
        }
    }

    /// Computes the child chain state for a nested invocation, without enforcing the
    /// `maxDepth`/`maxHops` ceilings — that belongs to the invoke broker, which knows
    /// the configured limits and can produce `DEPTH_EXCEEDED`/`HOPS_EXCEEDED` envelopes.
    pub fn child(&self, requested_timeout: Duration, quota_timeout: Duration) -> Self {
        let child_timeout = self.remaining.min(requested_timeout).min(quota_timeout);
        Self {
            remaining: child_timeout,
            hops: self.hops + 1,
            depth: self.depth + 1,
        }
    }

    pub fn effective_timeout(&self, requested: Duration, quota: Duration) -> Duration {
        self.remaining.min(requested).min(quota)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_chain_increments_depth_and_hops() {
        let root = ChainState::root(Duration::from_secs(30));
        let child = root.child(Duration::from_secs(10), Duration::from_secs(20));
        assert_eq!(child.depth, 1);
        assert_eq!(child.hops, 1);
        assert_eq!(child.remaining, Duration::from_secs(10));
    }

    #[test]
    fn effective_timeout_is_the_minimum_of_all_three() {
        let state = ChainState::root(Duration::from_secs(5));
        let timeout = state.effective_timeout(Duration::from_secs(100), Duration::from_secs(8));
        assert_eq!(timeout, Duration::from_secs(5));
    }
}
