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

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::error;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

use crate::params::ranging_params::{ComplexChannel, LocalRole, RangingParameters};
use crate::radio::error::{RadioError, RadioResult};
use crate::radio::radio_capability::{ChannelLock, RadioCapability, RawMeasurement, SessionScope};

/// The mock implementation of RadioCapability.
///
/// All the clones share the same queue of the expected calls, so the mock can be cloned into the
/// sessions and still be inspected by the test.
#[derive(Clone, Default)]
pub struct MockRadio {
    expected_calls: Arc<Mutex<VecDeque<ExpectedCall>>>,
    expect_call_consumed: Arc<Notify>,
}

#[allow(dead_code)]
impl MockRadio {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn expect_open_session_scope(
        &mut self,
        expected_role: LocalRole,
        out: RadioResult<SessionScope>,
    ) {
        self.push_expected_call(ExpectedCall::OpenSessionScope { expected_role, delay: None, out });
    }

    pub fn expect_open_session_scope_after(
        &mut self,
        delay: Duration,
        expected_role: LocalRole,
        out: RadioResult<SessionScope>,
    ) {
        self.push_expected_call(ExpectedCall::OpenSessionScope {
            expected_role,
            delay: Some(delay),
            out,
        });
    }

    pub fn expect_negotiate(
        &mut self,
        expected_channel: ComplexChannel,
        out: RadioResult<ChannelLock>,
    ) {
        self.push_expected_call(ExpectedCall::Negotiate { expected_channel, delay: None, out });
    }

    pub fn expect_negotiate_after(
        &mut self,
        delay: Duration,
        expected_channel: ComplexChannel,
        out: RadioResult<ChannelLock>,
    ) {
        self.push_expected_call(ExpectedCall::Negotiate {
            expected_channel,
            delay: Some(delay),
            out,
        });
    }

    pub fn expect_range_once(&mut self, out: RadioResult<RawMeasurement>) {
        self.push_expected_call(ExpectedCall::RangeOnce { delay: None, out });
    }

    pub fn expect_range_once_after(&mut self, delay: Duration, out: RadioResult<RawMeasurement>) {
        self.push_expected_call(ExpectedCall::RangeOnce { delay: Some(delay), out });
    }

    pub fn expect_release(&mut self) {
        self.push_expected_call(ExpectedCall::Release);
    }

    /// Wait until all the expected calls are consumed. Return false if no call is consumed for
    /// one second.
    pub async fn wait_expected_calls_done(&mut self) -> bool {
        while !self.lock_calls().is_empty() {
            if timeout(Duration::from_secs(1), self.expect_call_consumed.notified()).await.is_err()
            {
                return false;
            }
        }
        true
    }

    fn push_expected_call(&mut self, call: ExpectedCall) {
        self.lock_calls().push_back(call);
    }

    // Pop the front call if |matcher| accepts it. Otherwise the call is left in the queue.
    fn pop_expected_call<F>(&mut self, matcher: F) -> Option<ExpectedCall>
    where
        F: FnOnce(&ExpectedCall) -> bool,
    {
        let mut calls = self.lock_calls();
        if !calls.front().map_or(false, matcher) {
            return None;
        }
        let call = calls.pop_front();
        drop(calls);
        self.expect_call_consumed.notify_one();
        call
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, VecDeque<ExpectedCall>> {
        self.expected_calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn delayed<T>(delay: Option<Duration>, out: T) -> T {
    if let Some(delay) = delay {
        sleep(delay).await;
    }
    out
}

#[async_trait]
impl RadioCapability for MockRadio {
    async fn open_session_scope(&mut self, role: LocalRole) -> RadioResult<SessionScope> {
        let call = self.pop_expected_call(|call| match call {
            ExpectedCall::OpenSessionScope { expected_role, .. } => *expected_role == role,
            _ => false,
        });
        match call {
            Some(ExpectedCall::OpenSessionScope { delay, out, .. }) => delayed(delay, out).await,
            _ => Err(RadioError::MockUndefined),
        }
    }

    async fn negotiate(
        &mut self,
        channel: &ComplexChannel,
        _params: &RangingParameters,
    ) -> RadioResult<ChannelLock> {
        let call = self.pop_expected_call(|call| match call {
            ExpectedCall::Negotiate { expected_channel, .. } => expected_channel == channel,
            _ => false,
        });
        match call {
            Some(ExpectedCall::Negotiate { delay, out, .. }) => delayed(delay, out).await,
            _ => Err(RadioError::MockUndefined),
        }
    }

    async fn range_once(&mut self, _lock: &ChannelLock) -> RadioResult<RawMeasurement> {
        let call = self.pop_expected_call(|call| matches!(call, ExpectedCall::RangeOnce { .. }));
        match call {
            Some(ExpectedCall::RangeOnce { delay, out }) => delayed(delay, out).await,
            _ => Err(RadioError::MockUndefined),
        }
    }

    async fn release(&mut self, lock: ChannelLock) {
        if self.pop_expected_call(|call| matches!(call, ExpectedCall::Release)).is_none() {
            error!("Unexpected release of the channel lock {}", lock.id());
        }
    }
}

enum ExpectedCall {
    OpenSessionScope {
        expected_role: LocalRole,
        delay: Option<Duration>,
        out: RadioResult<SessionScope>,
    },
    Negotiate {
        expected_channel: ComplexChannel,
        delay: Option<Duration>,
        out: RadioResult<ChannelLock>,
    },
    RangeOnce {
        delay: Option<Duration>,
        out: RadioResult<RawMeasurement>,
    },
    Release,
}
