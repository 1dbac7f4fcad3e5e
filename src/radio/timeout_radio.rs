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

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::error;
use tokio::time::timeout;

use crate::params::ranging_params::{ComplexChannel, LocalRole, RangingParameters};
use crate::radio::error::{RadioError, RadioResult};
use crate::radio::radio_capability::{ChannelLock, RadioCapability, RawMeasurement, SessionScope};

// Extra time may be needed for the vendor library to bring up the radio.
const SCOPE_OPEN_TIMEOUT_MS: u64 = 20000;

/// Bound each radio call with a timeout, so a stuck radio can't stall a session worker.
///
/// negotiate() is not bounded here: the negotiation deadline belongs to the ranging engine.
#[derive(Clone)]
pub(crate) struct TimeoutRadio<T: RadioCapability> {
    radio: T,
    call_timeout: Duration,
}

impl<T: RadioCapability> TimeoutRadio<T> {
    pub fn new(radio: T, call_timeout: Duration) -> Self {
        Self { radio, call_timeout }
    }

    async fn call_with_timeout<O>(
        future: impl Future<Output = RadioResult<O>>,
        duration: Duration,
    ) -> RadioResult<O> {
        match timeout(duration, future).await {
            Ok(result) => result,
            Err(_) => Err(RadioError::Timeout),
        }
    }
}

#[async_trait]
impl<T: RadioCapability> RadioCapability for TimeoutRadio<T> {
    async fn open_session_scope(&mut self, role: LocalRole) -> RadioResult<SessionScope> {
        Self::call_with_timeout(
            self.radio.open_session_scope(role),
            Duration::from_millis(SCOPE_OPEN_TIMEOUT_MS),
        )
        .await
    }

    async fn negotiate(
        &mut self,
        channel: &ComplexChannel,
        params: &RangingParameters,
    ) -> RadioResult<ChannelLock> {
        self.radio.negotiate(channel, params).await
    }

    async fn range_once(&mut self, lock: &ChannelLock) -> RadioResult<RawMeasurement> {
        Self::call_with_timeout(self.radio.range_once(lock), self.call_timeout).await
    }

    async fn release(&mut self, lock: ChannelLock) {
        let id = lock.id();
        if timeout(self.call_timeout, self.radio.release(lock)).await.is_err() {
            error!("Timeout releasing the channel lock {}", id);
        }
    }
}
