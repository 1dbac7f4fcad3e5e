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

//! The host surface of the ranging session manager, driven by a simulated radio.
//!
//! Commands are read from stdin, one per line:
//!   start <controller|controlee> <peer address>
//!   stop <handle>
//!   address | channel | descriptor
//!   quit

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use log::{debug, info};

use uwb_ranging::event::{RangingResult, SessionEvent, Subscription};
use uwb_ranging::params::{ComplexChannel, DeviceAddress, LocalRole};
use uwb_ranging::radio::SimulatedRadio;
use uwb_ranging::service::{Communicator, CommunicatorBuilder};
use uwb_ranging::session::{EngineConfig, SessionHandle, SessionState};

#[derive(Parser, Debug)]
#[command(name = "uwb_ranging_cli")]
#[command(about = "Start and stop peer ranging sessions on a simulated radio")]
struct Args {
    /// The short address of the local radio
    #[arg(long, default_value_t = 1001)]
    local_address: u16,

    /// The channel number of the complex channel
    #[arg(long, default_value_t = 9)]
    channel: u8,

    /// The preamble index of the complex channel
    #[arg(long, default_value_t = 10)]
    preamble: u8,

    /// The negotiation timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    negotiation_timeout_ms: u64,

    /// The grace period of a lost session in milliseconds
    #[arg(long, default_value_t = 10000)]
    grace_period_ms: u64,

    /// The capacity of each subscriber queue
    #[arg(long, default_value_t = 64)]
    bus_capacity: usize,

    /// Fail every Nth simulated round. 0 never fails.
    #[arg(long, default_value_t = 0)]
    failure_period: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let radio = SimulatedRadio::new(
        DeviceAddress::new(args.local_address),
        ComplexChannel::new(args.channel, args.preamble),
    )
    .failure_period(args.failure_period);
    let engine_config = EngineConfig::default()
        .negotiation_timeout(Duration::from_millis(args.negotiation_timeout_ms))
        .loss_grace_period(Duration::from_millis(args.grace_period_ms));
    let communicator = CommunicatorBuilder::new()
        .radio(radio)
        .engine_config(engine_config)
        .event_bus_capacity(args.bus_capacity)
        .build()
        .ok_or_else(|| anyhow!("Failed to build the communicator"))?;

    let subscription = communicator.subscribe();
    let printer = thread::Builder::new()
        .name("RangingPrinter".to_owned())
        .spawn(move || print_events(subscription))
        .context("Failed to spawn the printer thread")?;

    info!("Ranging CLI is ready");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => continue,
            ["quit"] | ["exit"] => break,
            _ => {
                if let Err(e) = execute(&communicator, &words) {
                    println!("Error: {:#}", e);
                }
            }
        }
        io::stdout().flush().ok();
    }

    // Dropping the communicator stops the remaining sessions and closes the printer's
    // subscription.
    drop(communicator);
    printer.join().map_err(|_| anyhow!("The printer thread panicked"))?;
    Ok(())
}

fn execute(communicator: &Communicator, words: &[&str]) -> anyhow::Result<()> {
    match words {
        ["start", role, peer] => {
            let handle = communicator.start_communication(parse_role(role)?, peer)?;
            println!("Started session {}", handle);
        }
        ["stop", handle] => {
            let handle: u64 = handle.parse().context("The handle should be a number")?;
            communicator.stop_communication(SessionHandle::from(handle))?;
            println!("Stopped session {}", handle);
        }
        ["address"] => println!("{}", communicator.query_local_address()?),
        ["channel"] => {
            let channel = communicator.query_channel()?;
            println!("channel {} preamble {}", channel.channel_number, channel.preamble_index);
        }
        ["descriptor"] => println!("{}", communicator.query_descriptor()?),
        _ => bail!("Unknown command: {}", words.join(" ")),
    }
    Ok(())
}

fn parse_role(text: &str) -> anyhow::Result<LocalRole> {
    match text {
        "controller" => Ok(LocalRole::Controller),
        "controlee" => Ok(LocalRole::Controlee),
        _ => bail!("The role should be controller or controlee, got {}", text),
    }
}

fn print_events(mut subscription: Subscription) {
    while let Some(event) = subscription.blocking_next() {
        match event {
            SessionEvent::Ranging { result, .. } => match result {
                RangingResult::Position { distance_meters, .. } => {
                    println!("Distance: {}", distance_meters)
                }
                RangingResult::PeerLost { .. } => println!("CONNECTION LOST"),
            },
            SessionEvent::StateChanged { handle, state: SessionState::Stopped, reason } => {
                debug!("Session {} stopped: {:?}", handle, reason);
                println!("Completed the observing of RangingResults");
            }
            SessionEvent::Error { handle, error } => println!("Session {}: {}", handle, error),
            SessionEvent::Overflow { dropped } => debug!("Dropped {} events", dropped),
            _ => {}
        }
    }
}
