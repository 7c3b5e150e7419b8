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

//! Invoke broker limits. Defaults mirror the documented operational defaults for
//! cross-plugin call chains.

#[derive(Debug, Clone, Copy)]
pub struct InvokeConfig {
    pub max_depth: u32,
    pub max_hops: u32,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self { max_depth: 4, max_hops: 8 }
    }
}
