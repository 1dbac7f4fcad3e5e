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

//! This module defines the CommunicatorBuilder, the builder of the Communicator.

use tokio::runtime::Runtime;

use crate::event::event_bus::{EventBus, DEFAULT_EVENT_BUS_CAPACITY};
use crate::params::ranging_params::RangingDefaults;
use crate::radio::radio_capability::RadioCapability;
use crate::radio::timeout_radio::TimeoutRadio;
use crate::service::communicator::Communicator;
use crate::session::engine_config::EngineConfig;
use crate::utils::consuming_builder_field;

/// Create the default runtime for Communicator.
pub fn default_runtime() -> Option<Runtime> {
    tokio::runtime::Builder::new_multi_thread().thread_name("UwbRanging").enable_all().build().ok()
}

/// The builder of Communicator, used to keep the backward compatibility when adding new
/// parameters of creating a Communicator instance.
pub struct CommunicatorBuilder<R: RadioCapability> {
    runtime: Option<Runtime>,
    radio: Option<R>,
    engine_config: EngineConfig,
    ranging_defaults: RangingDefaults,
    event_bus_capacity: usize,
}

impl<R: RadioCapability> Default for CommunicatorBuilder<R> {
    fn default() -> Self {
        Self {
            runtime: None,
            radio: None,
            engine_config: EngineConfig::default(),
            ranging_defaults: RangingDefaults::default(),
            event_bus_capacity: DEFAULT_EVENT_BUS_CAPACITY,
        }
    }
}

impl<R: RadioCapability> CommunicatorBuilder<R> {
    /// Create a new builder.
    pub fn new() -> Self {
        Default::default()
    }

    consuming_builder_field!(runtime, Runtime, Some);
    consuming_builder_field!(radio, R, Some);
    consuming_builder_field!(engine_config, EngineConfig);
    consuming_builder_field!(ranging_defaults, RangingDefaults);
    consuming_builder_field!(event_bus_capacity, usize);

    /// Build the Communicator. Return None if the radio is not set, or the default runtime can't
    /// be created.
    pub fn build(mut self) -> Option<Communicator> {
        let runtime = self.runtime.take().or_else(default_runtime)?;
        let radio = TimeoutRadio::new(self.radio.take()?, self.engine_config.round_timeout);
        Some(Communicator::new(
            runtime,
            radio,
            self.engine_config,
            self.ranging_defaults,
            EventBus::new(self.event_bus_capacity),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::params::ranging_params::{ComplexChannel, DeviceAddress, LocalRole};
    use crate::radio::mock_radio::MockRadio;
    use crate::radio::simulated_radio::SimulatedRadio;
    use crate::utils::init_test_logging;

    #[test]
    fn test_build_without_radio() {
        assert!(CommunicatorBuilder::<MockRadio>::new().build().is_none());
    }

    #[test]
    fn test_build_with_simulated_radio() {
        init_test_logging();
        let radio = SimulatedRadio::new(DeviceAddress::new(1001), ComplexChannel::new(9, 10));
        let communicator = CommunicatorBuilder::new()
            .runtime(default_runtime().unwrap())
            .radio(radio)
            .event_bus_capacity(8)
            .build()
            .unwrap();

        let mut local_address = communicator.query_local_address();
        for _ in 0..100 {
            if local_address.is_ok() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
            local_address = communicator.query_local_address();
        }
        assert_eq!(local_address, Ok(DeviceAddress::new(1001)));

        let handle = communicator.start_communication(LocalRole::Controller, "2002").unwrap();
        assert_eq!(communicator.stop_communication(handle), Ok(()));
    }
}
