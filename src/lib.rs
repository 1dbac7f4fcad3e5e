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

//! The peer ranging session manager.
//!
//! Two radios negotiate a complex channel and then exchange ranging rounds. The library owns the
//! lifecycle of those ranging sessions and delivers the measured distances to its subscribers.
//! The radio itself is an external capability injected through the [radio::RadioCapability]
//! trait.

pub mod error;
pub mod event;
pub mod params;
pub mod radio;
pub mod service;
pub mod session;

pub(crate) mod utils;
