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

/// The error reported by the radio capability.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum RadioError {
    #[error("The radio didn't answer in time")]
    Timeout,
    #[error("The radio is used by another session")]
    Busy,
    #[error("The link to the peer failed")]
    LinkFailure,
    #[error("The peer rejected the request")]
    Rejected,
    #[error("Hardware failure: {0}")]
    Hardware(String),
    #[cfg(any(test, feature = "mock-utils"))]
    #[error("The result of the mock method is not assigned.")]
    MockUndefined,
}

pub type RadioResult<T> = Result<T, RadioError>;
