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

//! Handler runners: in-process (native registry lookup) and subprocess (spawned child
//! speaking a small control protocol over stdio).

pub mod context;
#[cfg(feature = "testing")]
pub mod fixtures;
pub mod inprocess;
pub mod registry;
pub mod subprocess;

pub use context::{ExecutionContext, Finalizer};
pub use inprocess::{InProcessRunInput, InProcessRunner};
pub use registry::{HandlerFn, HandlerRegistry};
