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

use std::time::Duration;

use crate::params::ranging_params::UpdateRate;
use crate::utils::consuming_builder_field;

const NEGOTIATION_TIMEOUT_MS: u64 = 5000;
const ROUND_TIMEOUT_MS: u64 = 1000;
const MAX_CONSECUTIVE_FAILURES: u32 = 3;
const LOSS_GRACE_PERIOD_MS: u64 = 10000;

/// The timing and the loss detection policy of the ranging sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub(crate) negotiation_timeout: Duration,
    pub(crate) round_timeout: Duration,
    pub(crate) max_consecutive_failures: u32,
    pub(crate) loss_grace_period: Duration,
    pub(crate) round_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: Duration::from_millis(NEGOTIATION_TIMEOUT_MS),
            round_timeout: Duration::from_millis(ROUND_TIMEOUT_MS),
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
            loss_grace_period: Duration::from_millis(LOSS_GRACE_PERIOD_MS),
            round_interval: None,
        }
    }
}

impl EngineConfig {
    consuming_builder_field!(negotiation_timeout, Duration);
    consuming_builder_field!(round_timeout, Duration);
    consuming_builder_field!(max_consecutive_failures, u32);
    consuming_builder_field!(loss_grace_period, Duration);
    consuming_builder_field!(round_interval, Duration, Some);

    /// The interval between two rounds of a session ranging at |update_rate|.
    pub fn interval_for(&self, update_rate: UpdateRate) -> Duration {
        self.round_interval.unwrap_or_else(|| update_rate.interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let config = EngineConfig::default();
        assert_eq!(config.negotiation_timeout, Duration::from_secs(5));
        assert_eq!(config.round_timeout, Duration::from_secs(1));
        assert_eq!(config.max_consecutive_failures, 3);
        assert_eq!(config.loss_grace_period, Duration::from_secs(10));
        assert_eq!(config.round_interval, None);
        assert_eq!(config.interval_for(UpdateRate::Automatic), Duration::from_millis(200));
    }

    #[test]
    fn test_round_interval_override() {
        let config = EngineConfig::default().round_interval(Duration::from_millis(10));
        assert_eq!(config.interval_for(UpdateRate::Infrequent), Duration::from_millis(10));
    }
}
