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

//! This module defines the Communicator, the public interface of the library.

use std::collections::BTreeMap;

use log::{debug, error, info};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::event::event_bus::{EventBus, Subscription};
use crate::params::address_codec::{format_descriptor, parse_address_text, SessionDescriptor};
use crate::params::ranging_params::{
    ComplexChannel, DeviceAddress, LocalRole, RangingDefaults, RangingParameters,
};
use crate::radio::error::RadioResult;
use crate::radio::radio_capability::{RadioCapability, SessionScope};
use crate::session::engine_config::EngineConfig;
use crate::session::ranging_engine::RangingEngine;
use crate::session::session_registry::{Session, SessionHandle, SessionRegistry};
use crate::utils::clean_mpsc_receiver;

/// The Communicator starts and stops the ranging sessions, and exposes their events.
///
/// The methods don't drive the radio themselves: the work is handed to CommunicatorActor and the
/// per-session workers. The session scope, i.e. the local address and the channel, is set up in the
/// background when the Communicator is created. Until then the queries and the starts fail with
/// NotInitialized.
///
/// Don't call the methods, or drop the Communicator, inside an async context.
pub struct Communicator {
    runtime: Runtime,
    cmd_sender: mpsc::UnboundedSender<(Command, ResponseSender)>,
    registry: SessionRegistry,
    event_bus: EventBus,
}

impl Communicator {
    /// Create a new Communicator instance.
    pub(super) fn new<T: RadioCapability>(
        runtime: Runtime,
        radio: T,
        engine_config: EngineConfig,
        ranging_defaults: RangingDefaults,
        event_bus: EventBus,
    ) -> Self {
        let (cmd_sender, cmd_receiver) = mpsc::unbounded_channel();
        let registry = SessionRegistry::new();
        let mut actor = CommunicatorActor::new(
            cmd_receiver,
            radio,
            registry.clone(),
            event_bus.clone(),
            engine_config,
            ranging_defaults,
        );
        runtime.spawn(async move { actor.run().await });

        Self { runtime, cmd_sender, registry, event_bus }
    }

    /// Start ranging with the peer whose address is |peer_address_text|, in decimal. The other
    /// parameters are filled in from the ranging defaults and the session scope.
    ///
    /// The handle is returned once the session is registered; the negotiation goes on in the
    /// background and its outcome is reported through the events.
    pub fn start_communication(
        &self,
        local_role: LocalRole,
        peer_address_text: &str,
    ) -> Result<SessionHandle> {
        let peer = parse_address_text(peer_address_text)?;
        self.block_on_start(Command::StartWithPeer { local_role, peer })
    }

    /// Start ranging with the caller-provided parameters.
    pub fn start_communication_with_params(
        &self,
        local_role: LocalRole,
        params: RangingParameters,
    ) -> Result<SessionHandle> {
        self.block_on_start(Command::StartWithParams { local_role, params })
    }

    /// Stop the session, and wait until its channel is released. Stopping a session that has
    /// already stopped succeeds.
    pub fn stop_communication(&self, handle: SessionHandle) -> Result<()> {
        self.block_on_cmd(Command::Stop { handle })?;
        Ok(())
    }

    /// The address of the local radio.
    pub fn query_local_address(&self) -> Result<DeviceAddress> {
        Ok(self.query_scope()?.local_address)
    }

    /// The channel the local radio ranges on.
    pub fn query_channel(&self) -> Result<ComplexChannel> {
        Ok(self.query_scope()?.complex_channel)
    }

    /// The text the peers need to join a session with the local radio, e.g. "1001/10".
    pub fn query_descriptor(&self) -> Result<String> {
        let scope = self.query_scope()?;
        Ok(format_descriptor(&SessionDescriptor {
            address: scope.local_address,
            complex_channel: scope.complex_channel,
        }))
    }

    /// The snapshot of the session.
    pub fn session(&self, handle: SessionHandle) -> Result<Session> {
        self.registry.get(handle)
    }

    /// Subscribe to the events of all the sessions. The subscription ends when the Communicator is
    /// dropped.
    pub fn subscribe(&self) -> Subscription {
        self.event_bus.subscribe()
    }

    /// Subscribe to the events of the session. The subscription ends when the session stops.
    pub fn subscribe_session(&self, handle: SessionHandle) -> Result<Subscription> {
        // Subscribe before checking, so the Stopped event can't slip in between.
        let subscription = self.event_bus.subscribe_session(handle);
        self.registry.get(handle)?;
        Ok(subscription)
    }

    fn query_scope(&self) -> Result<SessionScope> {
        match self.block_on_cmd(Command::QueryScope)? {
            Response::Scope(scope) => Ok(scope),
            response => {
                error!("QueryScope should return the scope, got {:?}", response);
                Err(Error::TokioFailure)
            }
        }
    }

    fn block_on_start(&self, cmd: Command) -> Result<SessionHandle> {
        match self.block_on_cmd(cmd)? {
            Response::Handle(handle) => Ok(handle),
            response => {
                error!("Starting should return the handle, got {:?}", response);
                Err(Error::TokioFailure)
            }
        }
    }

    /// Send the |cmd| to CommunicatorActor and wait until receiving the response.
    fn block_on_cmd(&self, cmd: Command) -> Result<Response> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.cmd_sender.send((cmd, result_sender)).map_err(|cmd| {
            error!("Failed to send cmd: {:?}", cmd.0);
            Error::TokioFailure
        })?;

        self.runtime.block_on(async move {
            result_receiver.await.unwrap_or_else(|e| {
                error!("Failed to receive the result for cmd: {:?}", e);
                Err(Error::TokioFailure)
            })
        })
    }

    /// Run an future task on the runtime. This method is only exposed for the testing.
    #[cfg(test)]
    fn block_on_for_testing<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        // Stop all the sessions, so every channel lock is released before the runtime goes away.
        if let Err(e) = self.block_on_cmd(Command::Shutdown) {
            error!("Failed to shut down the Communicator: {:?}", e);
        }
    }
}

struct CommunicatorActor<T: RadioCapability> {
    cmd_receiver: mpsc::UnboundedReceiver<(Command, ResponseSender)>,
    radio: T,
    registry: SessionRegistry,
    event_bus: EventBus,
    engine_config: EngineConfig,
    ranging_defaults: RangingDefaults,
    scope: Option<SessionScope>,
    engines: BTreeMap<SessionHandle, RangingEngine>,
}

impl<T: RadioCapability> CommunicatorActor<T> {
    fn new(
        cmd_receiver: mpsc::UnboundedReceiver<(Command, ResponseSender)>,
        radio: T,
        registry: SessionRegistry,
        event_bus: EventBus,
        engine_config: EngineConfig,
        ranging_defaults: RangingDefaults,
    ) -> Self {
        Self {
            cmd_receiver,
            radio,
            registry,
            event_bus,
            engine_config,
            ranging_defaults,
            scope: None,
            engines: BTreeMap::new(),
        }
    }

    async fn run(&mut self) {
        let mut scope_receiver = self.open_session_scope();
        let mut scope_pending = true;
        loop {
            tokio::select! {
                cmd = self.cmd_receiver.recv() => {
                    match cmd {
                        None => {
                            debug!("Communicator is about to drop.");
                            self.shutdown().await;
                            break;
                        },
                        Some((Command::Shutdown, result_sender)) => {
                            self.shutdown().await;
                            let _ = result_sender.send(Ok(Response::Null));
                            break;
                        }
                        Some((Command::Stop { handle }, result_sender)) => {
                            self.stop_session(handle, result_sender);
                        }
                        Some((cmd, result_sender)) => {
                            let result = self.handle_cmd(cmd);
                            let _ = result_sender.send(result);
                        }
                    }
                }
                result = &mut scope_receiver, if scope_pending => {
                    scope_pending = false;
                    match result {
                        Ok(Ok(scope)) => {
                            info!("The session scope is established: {:?}", scope);
                            self.scope = Some(scope);
                        }
                        Ok(Err(e)) => error!("Failed to open the session scope: {:?}", e),
                        Err(e) => error!("The session scope task is gone: {:?}", e),
                    }
                }
            }
        }
        clean_mpsc_receiver(&mut self.cmd_receiver);
    }

    // Acquire the controller role in the background, and report the result to the receiver.
    fn open_session_scope(&self) -> oneshot::Receiver<RadioResult<SessionScope>> {
        let (scope_sender, scope_receiver) = oneshot::channel();
        let mut radio = self.radio.clone();
        tokio::spawn(async move {
            let result = radio.open_session_scope(LocalRole::Controller).await;
            let _ = scope_sender.send(result);
        });
        scope_receiver
    }

    fn handle_cmd(&mut self, cmd: Command) -> Result<Response> {
        match cmd {
            Command::StartWithPeer { local_role, peer } => {
                let scope = self.require_scope()?;
                let params = self.ranging_defaults.build_params(scope.complex_channel, peer);
                self.start_session(local_role, scope.local_address, params)
            }
            Command::StartWithParams { local_role, params } => {
                let scope = self.require_scope()?;
                self.start_session(local_role, scope.local_address, params)
            }
            Command::QueryScope => Ok(Response::Scope(self.require_scope()?)),
            Command::Stop { .. } | Command::Shutdown => {
                error!("{:?} should be handled by the event loop", cmd);
                Err(Error::TokioFailure)
            }
        }
    }

    fn require_scope(&self) -> Result<SessionScope> {
        self.scope.ok_or_else(|| {
            debug!("The session scope is not established yet");
            Error::NotInitialized
        })
    }

    fn start_session(
        &mut self,
        local_role: LocalRole,
        local_address: DeviceAddress,
        params: RangingParameters,
    ) -> Result<Response> {
        self.prune_finished_engines();

        let handle = self.registry.create(local_role, local_address, params)?;
        let engine = RangingEngine::new(
            handle,
            self.registry.clone(),
            self.radio.clone(),
            self.event_bus.clone(),
            self.engine_config.clone(),
        );
        self.engines.insert(handle, engine);
        Ok(Response::Handle(handle))
    }

    // The engine may take up to one round to let the radio go, so the response is sent from a
    // separate task and the actor keeps serving the other commands.
    fn stop_session(&mut self, handle: SessionHandle, result_sender: ResponseSender) {
        let engine = self.engines.remove(&handle);
        self.prune_finished_engines();
        let engine = match engine {
            Some(engine) => engine,
            None => {
                debug!("Session {} is not running", handle);
                let _ = result_sender.send(Ok(Response::Null));
                return;
            }
        };
        let stop_receiver = engine.stop();
        tokio::spawn(async move {
            let result = stop_receiver.await.unwrap_or(Err(Error::TokioFailure));
            let _ = result_sender.send(result.map(|_| Response::Null));
        });
    }

    // Drop the engines of the sessions that ended on their own.
    fn prune_finished_engines(&mut self) {
        self.engines.retain(|handle, engine| {
            let finished = engine.is_finished();
            if finished {
                debug!("Session {} has finished", handle);
            }
            !finished
        });
    }

    async fn shutdown(&mut self) {
        let stop_receivers: Vec<_> = std::mem::take(&mut self.engines)
            .into_values()
            .map(|engine| {
                debug!("Stop the session {} for shutting down", engine.handle());
                engine.stop()
            })
            .collect();
        for stop_receiver in stop_receivers {
            let _ = stop_receiver.await;
        }
        self.event_bus.close();
    }
}

#[derive(Debug)]
enum Command {
    StartWithPeer { local_role: LocalRole, peer: DeviceAddress },
    StartWithParams { local_role: LocalRole, params: RangingParameters },
    Stop { handle: SessionHandle },
    QueryScope,
    Shutdown,
}

#[derive(Debug)]
enum Response {
    Null,
    Handle(SessionHandle),
    Scope(SessionScope),
}

type ResponseSender = oneshot::Sender<Result<Response>>;
