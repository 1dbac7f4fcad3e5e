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

//! The EventBus fans the session events out to the subscribers.
//!
//! Each subscriber owns a bounded queue with its own lock. Publishing never waits for a
//! subscriber: when a queue is full, its oldest unread event is dropped and counted, and the
//! subscriber reads one Overflow marker carrying the count before the surviving events.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

use log::{debug, warn};
use tokio::sync::Notify;

use crate::event::session_event::SessionEvent;
use crate::session::session_registry::SessionHandle;

/// The default capacity of each subscriber queue.
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 64;

/// The error returned by Subscription::try_next().
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryNextError {
    /// No event is ready yet.
    #[error("No event is ready")]
    Empty,
    /// The subscription ended, and no event will arrive anymore.
    #[error("The subscription is closed")]
    Closed,
}

/// The publisher side of the session events. Cloning the bus shares the subscribers.
#[derive(Clone)]
pub struct EventBus {
    capacity: usize,
    state: Arc<Mutex<BusState>>,
}

#[derive(Default)]
struct BusState {
    subscribers: Vec<Weak<SubscriberQueue>>,
    closed: bool,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Create an EventBus whose subscribers buffer up to |capacity| events. A zero capacity is
    /// raised to one.
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), state: Arc::new(Mutex::new(BusState::default())) }
    }

    /// The capacity of each subscriber queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe to the events of all the sessions, starting from the next published event. The
    /// subscription ends when the bus is closed.
    pub fn subscribe(&self) -> Subscription {
        self.add_subscriber(None)
    }

    /// Subscribe to the events of the session |handle|, starting from the next published event.
    /// The subscription ends after the Stopped state of the session.
    pub fn subscribe_session(&self, handle: SessionHandle) -> Subscription {
        self.add_subscriber(Some(handle))
    }

    /// Deliver |event| to the matching subscribers.
    pub fn publish(&self, event: SessionEvent) {
        let handle = event.handle();
        let session_end = event.is_session_end();
        let mut state = self.lock_state();
        if state.closed {
            debug!("Drop the event published after closing the bus: {:?}", event);
            return;
        }

        state.subscribers.retain(|subscriber| {
            let subscriber = match subscriber.upgrade() {
                Some(subscriber) => subscriber,
                None => return false,
            };
            if subscriber.filter.is_some() && subscriber.filter != handle {
                return true;
            }
            subscriber.push(event.clone());
            if session_end && subscriber.filter.is_some() {
                subscriber.close();
                return false;
            }
            true
        });
    }

    /// End all the subscriptions. The events published afterwards are dropped.
    pub fn close(&self) {
        let mut state = self.lock_state();
        state.closed = true;
        for subscriber in state.subscribers.drain(..).filter_map(|s| s.upgrade()) {
            subscriber.close();
        }
    }

    fn add_subscriber(&self, filter: Option<SessionHandle>) -> Subscription {
        let queue = Arc::new(SubscriberQueue::new(filter, self.capacity));
        let mut state = self.lock_state();
        if state.closed {
            queue.close();
        } else {
            state.subscribers.push(Arc::downgrade(&queue));
        }
        Subscription { queue }
    }

    fn lock_state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct SubscriberQueue {
    filter: Option<SessionHandle>,
    capacity: usize,
    state: Mutex<QueueState>,
    // Wakes up the async reader.
    notify: Notify,
    // Wakes up the blocking reader.
    condvar: Condvar,
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<SessionEvent>,
    dropped: usize,
    closed: bool,
}

impl QueueState {
    fn pop(&mut self) -> Option<SessionEvent> {
        if self.dropped > 0 {
            let dropped = std::mem::take(&mut self.dropped);
            return Some(SessionEvent::Overflow { dropped });
        }
        self.events.pop_front()
    }

    fn is_finished(&self) -> bool {
        self.closed && self.dropped == 0 && self.events.is_empty()
    }
}

impl SubscriberQueue {
    fn new(filter: Option<SessionHandle>, capacity: usize) -> Self {
        Self {
            filter,
            capacity,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            condvar: Condvar::new(),
        }
    }

    fn push(&self, event: SessionEvent) {
        let mut state = self.lock_state();
        if state.closed {
            return;
        }
        if state.events.len() >= self.capacity {
            state.events.pop_front();
            state.dropped += 1;
            if state.dropped == 1 {
                warn!("The subscriber is too slow, dropping the oldest events");
            }
        }
        state.events.push_back(event);
        drop(state);
        self.wake();
    }

    fn close(&self) {
        self.lock_state().closed = true;
        self.wake();
    }

    fn wake(&self) {
        self.notify.notify_one();
        self.condvar.notify_all();
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The reader side of a subscription. The events are read in the order they were published.
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    /// Wait for the next event. Return None when the subscription has ended and all the buffered
    /// events are read.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        let queue = Arc::clone(&self.queue);
        loop {
            let notified = queue.notify.notified();
            match self.try_next() {
                Ok(event) => return Some(event),
                Err(TryNextError::Closed) => return None,
                Err(TryNextError::Empty) => notified.await,
            }
        }
    }

    /// Read the next event without waiting.
    pub fn try_next(&mut self) -> Result<SessionEvent, TryNextError> {
        let mut state = self.queue.lock_state();
        match state.pop() {
            Some(event) => Ok(event),
            None if state.closed => Err(TryNextError::Closed),
            None => Err(TryNextError::Empty),
        }
    }

    /// Block the current thread until the next event arrives. Return None when the subscription
    /// has ended and all the buffered events are read.
    ///
    /// Don't call it inside the async context.
    pub fn blocking_next(&mut self) -> Option<SessionEvent> {
        let mut state = self.queue.lock_state();
        loop {
            if let Some(event) = state.pop() {
                return Some(event);
            }
            if state.is_finished() {
                return None;
            }
            state = self.queue.condvar.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Whether the subscription has ended and all the buffered events are read.
    pub fn is_finished(&self) -> bool {
        self.queue.lock_state().is_finished()
    }
}
