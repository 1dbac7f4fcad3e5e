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

//! This module defines the boundary to the radio that performs the ranging rounds.

pub mod error;
pub mod radio_capability;
pub mod simulated_radio;

pub(crate) mod timeout_radio;

#[cfg(any(test, feature = "mock-utils"))]
pub mod mock_radio;

// Re-export the public elements.
pub use error::{RadioError, RadioResult};
pub use radio_capability::{ChannelLock, RadioCapability, RawMeasurement, SessionScope};
pub use simulated_radio::SimulatedRadio;
