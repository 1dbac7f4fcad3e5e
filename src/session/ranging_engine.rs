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

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;

use crate::error::{Error, Result};
use crate::event::event_bus::EventBus;
use crate::event::session_event::{RangingResult, SessionEvent, StateReason};
use crate::params::ranging_params::RangingParameters;
use crate::radio::error::RadioResult;
use crate::radio::radio_capability::{ChannelLock, RadioCapability, RawMeasurement};
use crate::session::engine_config::EngineConfig;
use crate::session::session_registry::{SessionHandle, SessionRegistry, SessionState};
use crate::utils::PinSleep;

const MAX_AZIMUTH_DEGREES: f32 = 180.0;
const MAX_ELEVATION_DEGREES: f32 = 90.0;

/// The RangingEngine drives the state machine of one ranging session: the channel negotiation,
/// the ranging rounds, and the loss detection. The work is done by a dedicated worker
/// (RangingSessionActor), and the RangingEngine only sends it the commands.
///
/// The worker starts the negotiation as soon as it's created, and runs until the session reaches
/// the Stopped state. The channel lock is always released before Stopped is published.
pub(crate) struct RangingEngine {
    handle: SessionHandle,
    cmd_sender: mpsc::UnboundedSender<(Command, oneshot::Sender<Result<()>>)>,
}

impl RangingEngine {
    pub fn new<T: RadioCapability>(
        handle: SessionHandle,
        registry: SessionRegistry,
        radio: T,
        event_bus: EventBus,
        config: EngineConfig,
    ) -> Self {
        let (cmd_sender, cmd_receiver) = mpsc::unbounded_channel();
        let mut actor =
            RangingSessionActor::new(cmd_receiver, handle, registry, radio, event_bus, config);
        tokio::spawn(async move { actor.run().await });

        Self { handle, cmd_sender }
    }

    /// The session driven by this engine.
    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Whether the session has reached the Stopped state.
    pub fn is_finished(&self) -> bool {
        self.cmd_sender.is_closed()
    }

    /// Stop the session. The returned receiver resolves once the channel lock is released and the
    /// Stopped state is published. Stopping a finished session resolves immediately.
    pub fn stop(&self) -> oneshot::Receiver<Result<()>> {
        let (result_sender, result_receiver) = oneshot::channel();
        if let Err(mpsc::error::SendError((_, result_sender))) =
            self.cmd_sender.send((Command::Stop, result_sender))
        {
            debug!("Session {} has already stopped", self.handle);
            let _ = result_sender.send(Ok(()));
        }
        result_receiver
    }
}

struct RangingSessionActor<T: RadioCapability> {
    // Receive the commands and the corresponding response senders from RangingEngine.
    cmd_receiver: mpsc::UnboundedReceiver<(Command, oneshot::Sender<Result<()>>)>,
    handle: SessionHandle,
    registry: SessionRegistry,
    radio: T,
    event_bus: EventBus,
    config: EngineConfig,

    // The number of the failed rounds since the last successful one.
    consecutive_failures: u32,
}

impl<T: RadioCapability> RangingSessionActor<T> {
    fn new(
        cmd_receiver: mpsc::UnboundedReceiver<(Command, oneshot::Sender<Result<()>>)>,
        handle: SessionHandle,
        registry: SessionRegistry,
        radio: T,
        event_bus: EventBus,
        config: EngineConfig,
    ) -> Self {
        Self { cmd_receiver, handle, registry, radio, event_bus, config, consecutive_failures: 0 }
    }

    async fn run(&mut self) {
        let mut lock_slot = None;
        let mut stop_sender = None;
        let reason = match self.registry.get(self.handle) {
            Ok(session) => {
                self.drive(&session.parameters, &mut lock_slot, &mut stop_sender).await
            }
            Err(e) => {
                error!("Session {} can't be driven: {:?}", self.handle, e);
                StateReason::RadioFailure
            }
        };

        if let Some(lock) = lock_slot.take() {
            debug!("Session {}: release the channel lock {}", self.handle, lock.id());
            self.radio.release(lock).await;
        }
        self.finish(reason);

        // The session is stopped, so any pending stop request is already satisfied.
        self.cmd_receiver.close();
        while let Ok((_, result_sender)) = self.cmd_receiver.try_recv() {
            let _ = result_sender.send(Ok(()));
        }
        if let Some(result_sender) = stop_sender {
            let _ = result_sender.send(Ok(()));
        }
    }

    // Drive the session until it should stop, and return the reason. The negotiated lock is left
    // in |lock_slot|, and the sender of the stop request in |stop_sender|.
    async fn drive(
        &mut self,
        params: &RangingParameters,
        lock_slot: &mut Option<ChannelLock>,
        stop_sender: &mut Option<oneshot::Sender<Result<()>>>,
    ) -> StateReason {
        if self.transition(SessionState::Negotiating, StateReason::Started).is_err() {
            return StateReason::RadioFailure;
        }

        // The deadline covers the negotiation and the rounds until the first successful one.
        let mut deadline = PinSleep::new(self.config.negotiation_timeout);
        let channel = params.complex_channel;
        let negotiated = tokio::select! {
            cmd = self.cmd_receiver.recv() => {
                return self.on_command(cmd, stop_sender);
            }
            _ = &mut deadline => {
                return self.on_negotiation_timeout();
            }
            result = self.radio.negotiate(&channel, params) => result,
        };
        let lock: &ChannelLock = match negotiated {
            Ok(lock) => lock_slot.insert(lock),
            Err(e) => {
                error!("Session {}: failed to negotiate the channel: {:?}", self.handle, e);
                self.publish_error(Error::Radio(e));
                return StateReason::RadioFailure;
            }
        };
        debug!("Session {}: negotiated the channel lock {}", self.handle, lock.id());

        let interval = self.config.interval_for(params.update_rate);
        let mut grace = PinSleep::new(self.config.loss_grace_period);
        let mut state = SessionState::Negotiating;
        loop {
            let round = tokio::select! {
                cmd = self.cmd_receiver.recv() => {
                    return self.on_command(cmd, stop_sender);
                }
                _ = &mut deadline, if state == SessionState::Negotiating => {
                    return self.on_negotiation_timeout();
                }
                _ = &mut grace, if state == SessionState::Lost => {
                    info!("Session {}: the grace period expired", self.handle);
                    return StateReason::GracePeriodExpired;
                }
                result = range_after(&mut self.radio, lock, interval) => result,
            };

            match round {
                Ok(measurement) => {
                    let result = match validate_measurement(params, measurement) {
                        Ok(result) => result,
                        Err(e) => {
                            warn!("Session {}: {}", self.handle, e);
                            self.registry.record_discarded(self.handle);
                            continue;
                        }
                    };
                    self.consecutive_failures = 0;
                    let reason = match state {
                        SessionState::Negotiating => Some(StateReason::Negotiated),
                        SessionState::Lost => Some(StateReason::Recovered),
                        _ => None,
                    };
                    if let Some(reason) = reason {
                        if self.transition(SessionState::Active, reason).is_err() {
                            return StateReason::RadioFailure;
                        }
                        state = SessionState::Active;
                    }
                    self.event_bus.publish(SessionEvent::Ranging { handle: self.handle, result });
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    debug!(
                        "Session {}: round failed ({} in a row): {:?}",
                        self.handle, self.consecutive_failures, e
                    );
                    if state == SessionState::Active
                        && self.consecutive_failures >= self.config.max_consecutive_failures
                    {
                        warn!("Session {}: lost the peers {:?}", self.handle, params.peers);
                        self.publish_error(Error::Radio(e));
                        if self.transition(SessionState::Lost, StateReason::PeerLost).is_err() {
                            return StateReason::RadioFailure;
                        }
                        for peer in params.peers.iter() {
                            self.event_bus.publish(SessionEvent::Ranging {
                                handle: self.handle,
                                result: RangingResult::PeerLost { peer: *peer },
                            });
                        }
                        grace = PinSleep::new(self.config.loss_grace_period);
                        state = SessionState::Lost;
                    }
                }
            }
        }
    }

    fn on_command(
        &mut self,
        cmd: Option<(Command, oneshot::Sender<Result<()>>)>,
        stop_sender: &mut Option<oneshot::Sender<Result<()>>>,
    ) -> StateReason {
        match cmd {
            Some((Command::Stop, result_sender)) => {
                debug!("Session {}: stop requested", self.handle);
                *stop_sender = Some(result_sender);
            }
            None => {
                debug!("RangingEngine of session {} is about to drop.", self.handle);
            }
        }
        StateReason::StopRequested
    }

    fn on_negotiation_timeout(&mut self) -> StateReason {
        error!("Session {}: the negotiation timed out", self.handle);
        self.publish_error(Error::NegotiationTimeout);
        StateReason::NegotiationTimeout
    }

    fn transition(&mut self, state: SessionState, reason: StateReason) -> Result<()> {
        self.registry.transition(self.handle, state)?;
        self.event_bus.publish(SessionEvent::StateChanged { handle: self.handle, state, reason });
        Ok(())
    }

    // Move the session to Stopped and remove it from the registry. Stopped is published even if
    // the registry entry has gone, so the subscribers of the session always see the end.
    fn finish(&mut self, reason: StateReason) {
        if let Err(e) = self.registry.transition(self.handle, SessionState::Stopped) {
            warn!("Session {}: failed to record the Stopped state: {:?}", self.handle, e);
        }
        self.registry.remove(self.handle);
        info!("Session {} stopped: {:?}", self.handle, reason);
        self.event_bus.publish(SessionEvent::StateChanged {
            handle: self.handle,
            state: SessionState::Stopped,
            reason,
        });
    }

    fn publish_error(&self, error: Error) {
        self.event_bus.publish(SessionEvent::Error { handle: self.handle, error });
    }
}

async fn range_after<T: RadioCapability>(
    radio: &mut T,
    lock: &ChannelLock,
    delay: Duration,
) -> RadioResult<RawMeasurement> {
    sleep(delay).await;
    radio.range_once(lock).await
}

// Turn the measurement into a Position, or fail with MeasurementDiscarded if any value is out of
// range. The angles are ignored when the configuration doesn't report them.
fn validate_measurement(
    params: &RangingParameters,
    measurement: RawMeasurement,
) -> std::result::Result<RangingResult, DiscardReason> {
    let RawMeasurement { peer, distance_meters, mut azimuth, mut elevation } = measurement;
    if !params.peers.contains(&peer) {
        return Err(DiscardReason(format!("unknown peer {}", peer)));
    }
    if !distance_meters.is_finite() || distance_meters < 0.0 {
        return Err(DiscardReason(format!("invalid distance {}", distance_meters)));
    }
    if !params.config_id.reports_angle() {
        azimuth = None;
        elevation = None;
    }
    if let Some(value) = azimuth.filter(|v| !in_range(*v, MAX_AZIMUTH_DEGREES)) {
        return Err(DiscardReason(format!("invalid azimuth {}", value)));
    }
    if let Some(value) = elevation.filter(|v| !in_range(*v, MAX_ELEVATION_DEGREES)) {
        return Err(DiscardReason(format!("invalid elevation {}", value)));
    }
    Ok(RangingResult::Position { peer, distance_meters, azimuth, elevation })
}

fn in_range(value: f32, max: f32) -> bool {
    value.is_finite() && (-max..=max).contains(&value)
}

struct DiscardReason(String);

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", Error::MeasurementDiscarded, self.0)
    }
}

#[derive(Debug)]
enum Command {
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::Instant;

    use crate::event::event_bus::Subscription;
    use crate::params::ranging_params::test_utils::generate_params;
    use crate::params::ranging_params::{ComplexChannel, ConfigId, DeviceAddress, LocalRole};
    use crate::radio::error::RadioError;
    use crate::radio::mock_radio::MockRadio;
    use crate::utils::init_test_logging;

    const PEER: u16 = 2002;
    const HANG: Duration = Duration::from_secs(3600);

    fn channel() -> ComplexChannel {
        ComplexChannel::new(9, 10)
    }

    fn measurement(distance_meters: f32) -> RawMeasurement {
        RawMeasurement {
            peer: DeviceAddress::new(PEER),
            distance_meters,
            azimuth: Some(10.0),
            elevation: Some(5.0),
        }
    }

    fn position(handle: SessionHandle, distance_meters: f32) -> SessionEvent {
        SessionEvent::Ranging {
            handle,
            result: RangingResult::Position {
                peer: DeviceAddress::new(PEER),
                distance_meters,
                azimuth: Some(10.0),
                elevation: Some(5.0),
            },
        }
    }

    fn state(handle: SessionHandle, state: SessionState, reason: StateReason) -> SessionEvent {
        SessionEvent::StateChanged { handle, state, reason }
    }

    fn setup_engine(
        radio: MockRadio,
        params: RangingParameters,
    ) -> (RangingEngine, SessionRegistry, Subscription) {
        init_test_logging();
        let registry = SessionRegistry::new();
        let handle =
            registry.create(LocalRole::Controller, DeviceAddress::new(1001), params).unwrap();
        let event_bus = EventBus::new(64);
        let subscription = event_bus.subscribe_session(handle);
        let engine =
            RangingEngine::new(handle, registry.clone(), radio, event_bus, EngineConfig::default());
        (engine, registry, subscription)
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiate_and_range() {
        let mut radio = MockRadio::new();
        radio.expect_negotiate(channel(), Ok(ChannelLock::new(1, channel())));
        radio.expect_range_once(Ok(measurement(1.0)));
        radio.expect_range_once(Ok(measurement(2.0)));
        radio.expect_range_once_after(HANG, Ok(measurement(3.0)));
        radio.expect_release();

        let (engine, registry, mut subscription) =
            setup_engine(radio.clone(), generate_params(vec![PEER]));
        let handle = engine.handle();

        let start_event = state(handle, SessionState::Negotiating, StateReason::Started);
        assert_eq!(subscription.next().await, Some(start_event));
        let active_event = state(handle, SessionState::Active, StateReason::Negotiated);
        assert_eq!(subscription.next().await, Some(active_event));
        assert_eq!(subscription.next().await, Some(position(handle, 1.0)));
        assert_eq!(subscription.next().await, Some(position(handle, 2.0)));
        assert_eq!(registry.get(handle).unwrap().state, SessionState::Active);

        // The third round is still in flight.
        assert_eq!(engine.stop().await, Ok(Ok(())));
        let stop_event = state(handle, SessionState::Stopped, StateReason::StopRequested);
        assert_eq!(subscription.next().await, Some(stop_event));
        assert_eq!(subscription.next().await, None);
        assert_eq!(registry.get(handle), Err(Error::NotFound(handle)));
        assert!(radio.wait_expected_calls_done().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let mut radio = MockRadio::new();
        radio.expect_negotiate_after(HANG, channel(), Ok(ChannelLock::new(1, channel())));

        let (engine, _registry, mut subscription) =
            setup_engine(radio, generate_params(vec![PEER]));
        let handle = engine.handle();

        assert_eq!(engine.stop().await, Ok(Ok(())));
        assert!(engine.is_finished());
        assert_eq!(engine.stop().await, Ok(Ok(())));

        let start_event = state(handle, SessionState::Negotiating, StateReason::Started);
        assert_eq!(subscription.next().await, Some(start_event));
        let stop_event = state(handle, SessionState::Stopped, StateReason::StopRequested);
        assert_eq!(subscription.next().await, Some(stop_event));
        assert_eq!(subscription.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_and_recovery() {
        let mut radio = MockRadio::new();
        radio.expect_negotiate(channel(), Ok(ChannelLock::new(1, channel())));
        radio.expect_range_once(Ok(measurement(1.0)));
        for _ in 0..3 {
            radio.expect_range_once(Err(RadioError::LinkFailure));
        }
        radio.expect_range_once(Ok(measurement(2.0)));
        radio.expect_range_once_after(HANG, Ok(measurement(3.0)));
        radio.expect_release();

        let (engine, _registry, mut subscription) =
            setup_engine(radio.clone(), generate_params(vec![PEER]));
        let handle = engine.handle();

        let mut events = vec![];
        for _ in 0..8 {
            events.push(subscription.next().await.unwrap());
        }
        assert_eq!(
            events,
            vec![
                state(handle, SessionState::Negotiating, StateReason::Started),
                state(handle, SessionState::Active, StateReason::Negotiated),
                position(handle, 1.0),
                SessionEvent::Error { handle, error: Error::Radio(RadioError::LinkFailure) },
                state(handle, SessionState::Lost, StateReason::PeerLost),
                SessionEvent::Ranging {
                    handle,
                    result: RangingResult::PeerLost { peer: DeviceAddress::new(PEER) }
                },
                state(handle, SessionState::Active, StateReason::Recovered),
                position(handle, 2.0),
            ]
        );

        assert_eq!(engine.stop().await, Ok(Ok(())));
        let stop_event = state(handle, SessionState::Stopped, StateReason::StopRequested);
        assert_eq!(subscription.next().await, Some(stop_event));
        assert!(radio.wait_expected_calls_done().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_below_threshold_keep_active() {
        let mut radio = MockRadio::new();
        radio.expect_negotiate(channel(), Ok(ChannelLock::new(1, channel())));
        radio.expect_range_once(Ok(measurement(1.0)));
        radio.expect_range_once(Err(RadioError::Timeout));
        radio.expect_range_once(Err(RadioError::Timeout));
        radio.expect_range_once(Ok(measurement(2.0)));
        radio.expect_range_once(Err(RadioError::Timeout));
        radio.expect_range_once(Err(RadioError::Timeout));
        radio.expect_range_once(Ok(measurement(3.0)));
        radio.expect_range_once_after(HANG, Ok(measurement(4.0)));
        radio.expect_release();

        let (engine, _registry, mut subscription) =
            setup_engine(radio.clone(), generate_params(vec![PEER]));
        let handle = engine.handle();

        assert!(subscription.next().await.is_some());
        assert!(subscription.next().await.is_some());
        assert_eq!(subscription.next().await, Some(position(handle, 1.0)));
        assert_eq!(subscription.next().await, Some(position(handle, 2.0)));
        assert_eq!(subscription.next().await, Some(position(handle, 3.0)));

        assert_eq!(engine.stop().await, Ok(Ok(())));
        assert!(radio.wait_expected_calls_done().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_lost() {
        let mut radio = MockRadio::new();
        radio.expect_negotiate(channel(), Ok(ChannelLock::new(1, channel())));
        radio.expect_range_once(Ok(measurement(1.0)));
        for _ in 0..3 {
            radio.expect_range_once(Err(RadioError::LinkFailure));
        }
        radio.expect_range_once_after(HANG, Ok(measurement(2.0)));
        radio.expect_release();

        let (engine, registry, mut subscription) =
            setup_engine(radio.clone(), generate_params(vec![PEER]));
        let handle = engine.handle();

        let lost_event = state(handle, SessionState::Lost, StateReason::PeerLost);
        while subscription.next().await.unwrap() != lost_event {}
        let peer_lost = RangingResult::PeerLost { peer: DeviceAddress::new(PEER) };
        let peer_lost_event = SessionEvent::Ranging { handle, result: peer_lost };
        assert_eq!(subscription.next().await, Some(peer_lost_event));
        assert_eq!(registry.get(handle).unwrap().state, SessionState::Lost);

        assert_eq!(engine.stop().await, Ok(Ok(())));
        let stop_event = state(handle, SessionState::Stopped, StateReason::StopRequested);
        assert_eq!(subscription.next().await, Some(stop_event));
        assert_eq!(subscription.next().await, None);
        assert_eq!(registry.get(handle), Err(Error::NotFound(handle)));
        assert!(radio.wait_expected_calls_done().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_while_negotiating_not_lost() {
        let mut radio = MockRadio::new();
        radio.expect_negotiate(channel(), Ok(ChannelLock::new(1, channel())));
        for _ in 0..4 {
            radio.expect_range_once(Err(RadioError::LinkFailure));
        }
        radio.expect_range_once(Ok(measurement(1.0)));
        radio.expect_range_once(Err(RadioError::LinkFailure));
        radio.expect_range_once_after(HANG, Ok(measurement(2.0)));
        radio.expect_release();

        let (engine, registry, mut subscription) =
            setup_engine(radio.clone(), generate_params(vec![PEER]));
        let handle = engine.handle();

        let start_event = state(handle, SessionState::Negotiating, StateReason::Started);
        assert_eq!(subscription.next().await, Some(start_event));
        let active_event = state(handle, SessionState::Active, StateReason::Negotiated);
        assert_eq!(subscription.next().await, Some(active_event));
        assert_eq!(subscription.next().await, Some(position(handle, 1.0)));

        // Let the failed round after the success run, and the next one hang.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(registry.get(handle).unwrap().state, SessionState::Active);

        assert_eq!(engine.stop().await, Ok(Ok(())));
        let stop_event = state(handle, SessionState::Stopped, StateReason::StopRequested);
        assert_eq!(subscription.next().await, Some(stop_event));
        assert_eq!(subscription.next().await, None);
        assert!(radio.wait_expected_calls_done().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_expired() {
        let mut radio = MockRadio::new();
        radio.expect_negotiate(channel(), Ok(ChannelLock::new(1, channel())));
        radio.expect_range_once(Ok(measurement(1.0)));
        for _ in 0..3 {
            radio.expect_range_once(Err(RadioError::LinkFailure));
        }
        radio.expect_range_once_after(HANG, Ok(measurement(2.0)));
        radio.expect_release();

        let (engine, registry, mut subscription) =
            setup_engine(radio.clone(), generate_params(vec![PEER]));
        let handle = engine.handle();

        let lost_event = state(handle, SessionState::Lost, StateReason::PeerLost);
        while subscription.next().await.unwrap() != lost_event {}
        let lost_at = Instant::now();

        let peer_lost = RangingResult::PeerLost { peer: DeviceAddress::new(PEER) };
        let peer_lost_event = SessionEvent::Ranging { handle, result: peer_lost };
        assert_eq!(subscription.next().await, Some(peer_lost_event));
        let stop_event = state(handle, SessionState::Stopped, StateReason::GracePeriodExpired);
        assert_eq!(subscription.next().await, Some(stop_event));
        assert_eq!(subscription.next().await, None);
        assert!(lost_at.elapsed() >= Duration::from_secs(10));
        assert_eq!(registry.get(handle), Err(Error::NotFound(handle)));
        assert!(radio.wait_expected_calls_done().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiation_timeout() {
        let mut radio = MockRadio::new();
        radio.expect_negotiate_after(HANG, channel(), Ok(ChannelLock::new(1, channel())));

        let started_at = Instant::now();
        let (engine, registry, mut subscription) =
            setup_engine(radio.clone(), generate_params(vec![PEER]));
        let handle = engine.handle();

        let start_event = state(handle, SessionState::Negotiating, StateReason::Started);
        assert_eq!(subscription.next().await, Some(start_event));
        let error_event = SessionEvent::Error { handle, error: Error::NegotiationTimeout };
        assert_eq!(subscription.next().await, Some(error_event));
        let stop_event = state(handle, SessionState::Stopped, StateReason::NegotiationTimeout);
        assert_eq!(subscription.next().await, Some(stop_event));
        assert_eq!(subscription.next().await, None);

        assert!(started_at.elapsed() >= Duration::from_secs(5));
        assert_eq!(registry.get(handle), Err(Error::NotFound(handle)));
        assert!(engine.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiation_timeout_without_successful_round() {
        let mut radio = MockRadio::new();
        radio.expect_negotiate(channel(), Ok(ChannelLock::new(1, channel())));
        radio.expect_range_once_after(HANG, Ok(measurement(1.0)));
        radio.expect_release();

        let (engine, _registry, mut subscription) =
            setup_engine(radio.clone(), generate_params(vec![PEER]));
        let handle = engine.handle();

        assert!(subscription.next().await.is_some());
        let error_event = SessionEvent::Error { handle, error: Error::NegotiationTimeout };
        assert_eq!(subscription.next().await, Some(error_event));
        let stop_event = state(handle, SessionState::Stopped, StateReason::NegotiationTimeout);
        assert_eq!(subscription.next().await, Some(stop_event));
        assert!(radio.wait_expected_calls_done().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiation_failed() {
        let mut radio = MockRadio::new();
        radio.expect_negotiate(channel(), Err(RadioError::Rejected));

        let (engine, _registry, mut subscription) =
            setup_engine(radio.clone(), generate_params(vec![PEER]));
        let handle = engine.handle();

        assert!(subscription.next().await.is_some());
        let error_event =
            SessionEvent::Error { handle, error: Error::Radio(RadioError::Rejected) };
        assert_eq!(subscription.next().await, Some(error_event));
        let stop_event = state(handle, SessionState::Stopped, StateReason::RadioFailure);
        assert_eq!(subscription.next().await, Some(stop_event));
        assert_eq!(subscription.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_measurement_discarded() {
        let mut radio = MockRadio::new();
        radio.expect_negotiate(channel(), Ok(ChannelLock::new(1, channel())));
        radio.expect_range_once(Ok(measurement(-1.0)));
        radio.expect_range_once(Ok(measurement(f32::NAN)));
        radio.expect_range_once(Ok(RawMeasurement { azimuth: Some(200.0), ..measurement(1.0) }));
        radio.expect_range_once(Ok(RawMeasurement { elevation: Some(-91.0), ..measurement(1.0) }));
        radio.expect_range_once(Ok(RawMeasurement {
            peer: DeviceAddress::new(PEER + 1),
            ..measurement(1.0)
        }));
        radio.expect_range_once(Ok(measurement(2.0)));
        radio.expect_range_once_after(HANG, Ok(measurement(3.0)));
        radio.expect_release();

        let (engine, registry, mut subscription) =
            setup_engine(radio.clone(), generate_params(vec![PEER]));
        let handle = engine.handle();

        // The discarded samples don't complete the negotiation.
        let start_event = state(handle, SessionState::Negotiating, StateReason::Started);
        assert_eq!(subscription.next().await, Some(start_event));
        let active_event = state(handle, SessionState::Active, StateReason::Negotiated);
        assert_eq!(subscription.next().await, Some(active_event));
        assert_eq!(subscription.next().await, Some(position(handle, 2.0)));
        assert_eq!(registry.get(handle).unwrap().discarded_measurements, 5);

        assert_eq!(engine.stop().await, Ok(Ok(())));
        assert!(radio.wait_expected_calls_done().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_angles_ignored_without_aoa() {
        let mut params = generate_params(vec![PEER]);
        params.config_id = ConfigId::UnicastDsTwrNoAoa;
        let mut radio = MockRadio::new();
        radio.expect_negotiate(channel(), Ok(ChannelLock::new(1, channel())));
        radio.expect_range_once(Ok(RawMeasurement { azimuth: Some(500.0), ..measurement(1.0) }));
        radio.expect_range_once_after(HANG, Ok(measurement(2.0)));
        radio.expect_release();

        let (engine, _registry, mut subscription) = setup_engine(radio.clone(), params);
        let handle = engine.handle();

        assert!(subscription.next().await.is_some());
        assert!(subscription.next().await.is_some());
        let position_event = SessionEvent::Ranging {
            handle,
            result: RangingResult::Position {
                peer: DeviceAddress::new(PEER),
                distance_meters: 1.0,
                azimuth: None,
                elevation: None,
            },
        };
        assert_eq!(subscription.next().await, Some(position_event));

        assert_eq!(engine.stop().await, Ok(Ok(())));
        assert!(radio.wait_expected_calls_done().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_interval() {
        let mut radio = MockRadio::new();
        radio.expect_negotiate(channel(), Ok(ChannelLock::new(1, channel())));
        radio.expect_range_once(Ok(measurement(1.0)));
        radio.expect_range_once(Ok(measurement(2.0)));
        radio.expect_range_once_after(HANG, Ok(measurement(3.0)));
        radio.expect_release();

        let (engine, _registry, mut subscription) =
            setup_engine(radio.clone(), generate_params(vec![PEER]));
        let handle = engine.handle();

        assert!(subscription.next().await.is_some());
        assert!(subscription.next().await.is_some());
        assert_eq!(subscription.next().await, Some(position(handle, 1.0)));
        let first_at = Instant::now();
        assert_eq!(subscription.next().await, Some(position(handle, 2.0)));
        // The parameters range at the automatic rate.
        assert!(first_at.elapsed() >= Duration::from_millis(200));

        assert_eq!(engine.stop().await, Ok(Ok(())));
        assert!(radio.wait_expected_calls_done().await);
    }
}
