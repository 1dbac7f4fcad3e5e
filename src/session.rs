// Copyright 2022, The Android Open Source Project
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

//! This module owns the ranging sessions and drives their state machines.

pub mod engine_config;
pub(crate) mod ranging_engine;
pub mod session_registry;

pub use engine_config::EngineConfig;
pub use session_registry::{Session, SessionHandle, SessionRegistry, SessionState};
