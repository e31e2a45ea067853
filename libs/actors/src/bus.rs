//! Closeable Batch Queue
//!
//! A [`Bus`] is the mailbox in front of every runner and gateway thread.
//! Many producers append; one logical consumer pulls *everything* queued in
//! a single call, which amortizes lock traffic for bursty senders.
//!
//! After [`Bus::close`] the bus swallows new items (with a debug
//! diagnostic) and every pull returns an empty batch immediately.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

struct BusState<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// Thread-safe, closeable FIFO with batch pulls
pub struct Bus<T> {
    state: Mutex<BusState<T>>,
    ready: Condvar,
}

impl<T> Default for Bus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Bus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Bus")
            .field("queued", &state.queue.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T> Bus<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState {
                queue: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Append one item; dropped if the bus is closed
    pub fn add(&self, item: T) {
        let mut state = self.state.lock();
        if state.closed {
            debug!("Bus closed, dropping 1 item");
            return;
        }
        state.queue.push_back(item);
        self.ready.notify_one();
    }

    /// Append items in order; dropped if the bus is closed
    pub fn add_all<I: IntoIterator<Item = T>>(&self, items: I) {
        let mut state = self.state.lock();
        if state.closed {
            let dropped = items.into_iter().count();
            debug!(dropped, "Bus closed, dropping items");
            return;
        }
        let before = state.queue.len();
        state.queue.extend(items);
        if state.queue.len() > before {
            self.ready.notify_one();
        }
    }

    /// Append items in order while the queue holds fewer than `capacity`.
    /// Returns the queue depth afterwards and the items that did not fit;
    /// everything is rejected if the bus is closed.
    pub fn add_bounded(&self, items: Vec<T>, capacity: usize) -> (usize, Vec<T>) {
        let mut state = self.state.lock();
        if state.closed {
            return (0, items);
        }
        let room = capacity.saturating_sub(state.queue.len());
        let mut items = items;
        let rejected = items.split_off(room.min(items.len()));
        if !items.is_empty() {
            state.queue.extend(items);
            self.ready.notify_one();
        }
        (state.queue.len(), rejected)
    }

    /// Block until at least one item is queued or the bus closes, then drain
    pub fn pull(&self) -> Vec<T> {
        let mut state = self.state.lock();
        while state.queue.is_empty() && !state.closed {
            self.ready.wait(&mut state);
        }
        Self::drain(&mut state, usize::MAX)
    }

    /// Like [`pull`](Self::pull) but gives up after `timeout`
    pub fn pull_timeout(&self, timeout: Duration) -> Vec<T> {
        self.pull_max(usize::MAX, timeout)
    }

    /// Like [`pull`](Self::pull) but gives up at `deadline`
    pub fn pull_until(&self, deadline: Instant) -> Vec<T> {
        self.pull_max_until(usize::MAX, deadline)
    }

    /// Bounded wait, returning at most `max` items; the rest stay queued
    pub fn pull_max(&self, max: usize, timeout: Duration) -> Vec<T> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.pull_max_until(max, deadline),
            // Effectively infinite
            None => {
                let mut state = self.state.lock();
                while state.queue.is_empty() && !state.closed {
                    self.ready.wait(&mut state);
                }
                Self::drain(&mut state, max)
            }
        }
    }

    /// Bounded wait until `deadline`, returning at most `max` items
    pub fn pull_max_until(&self, max: usize, deadline: Instant) -> Vec<T> {
        let mut state = self.state.lock();
        while state.queue.is_empty() && !state.closed {
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        Self::drain(&mut state, max)
    }

    /// Idempotent; wakes every blocked puller with an empty batch
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.queue.clear();
        }
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Items currently queued
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn drain(state: &mut BusState<T>, max: usize) -> Vec<T> {
        if state.closed {
            return Vec::new();
        }
        let count = state.queue.len().min(max);
        state.queue.drain(..count).collect()
    }
}
