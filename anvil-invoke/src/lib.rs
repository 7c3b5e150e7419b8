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

//! Cross-plugin invocation broker: one handler calling another's handler through the
//! execution façade, with depth/hop/timeout chaining and trace propagation.

pub mod broker;
pub mod config;
pub mod registry;

pub use broker::{CallerContext, InvokeBroker, InvokeRequest, InvokeResult};
pub use config::InvokeConfig;
pub use registry::{InMemoryBackendRegistry, PluginBackendRegistry};
