use super::{Store, WorkUnit};
use crate::error::StoreError;
use courier_types::Address;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Entry {
    checkpoint: Vec<u8>,
    pending: VecDeque<Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<Address, Entry>,
    /// Addresses with pending work, oldest first
    ready: VecDeque<Address>,
    closed: bool,
}

/// In-process [`Store`]; `take` blocks on a condition variable
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    available: Condvar,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like [`Store::take`] but gives up after `timeout`
    pub fn take_timeout(&self, timeout: Duration) -> Result<Option<WorkUnit>, StoreError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(StoreError::Closed);
            }
            if let Some(unit) = Self::pop_ready(&mut state) {
                return Ok(Some(unit));
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return Ok(Self::pop_ready(&mut state));
            }
        }
    }

    /// Wake blocked takers; every later call fails with [`StoreError::Closed`]
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// Number of stored actors
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of actors with pending work
    pub fn ready_len(&self) -> usize {
        self.state.lock().ready.len()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.state.lock().entries.contains_key(address)
    }

    /// Hand out the next message of the oldest ready entry. An entry with
    /// more pending messages goes to the back of the ready queue; a drained
    /// one is removed.
    fn pop_ready(state: &mut State) -> Option<WorkUnit> {
        while let Some(address) = state.ready.pop_front() {
            // Discarded while queued
            let Some(entry) = state.entries.get_mut(&address) else {
                continue;
            };
            let Some(message) = entry.pending.pop_front() else {
                continue;
            };
            let checkpoint = entry.checkpoint.clone();
            if entry.pending.is_empty() {
                state.entries.remove(&address);
            } else {
                state.ready.push_back(address.clone());
            }
            return Some(WorkUnit {
                address,
                checkpoint,
                message,
            });
        }
        None
    }
}

impl Store for MemoryStore {
    fn store(
        &self,
        address: &Address,
        checkpoint: &[u8],
        pending: &[Vec<u8>],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(StoreError::Closed);
        }

        let entry = state.entries.entry(address.clone()).or_default();
        let was_ready = !entry.pending.is_empty();
        entry.checkpoint = checkpoint.to_vec();
        entry.pending.extend(pending.iter().cloned());
        let is_ready = !entry.pending.is_empty();

        if is_ready && !was_ready {
            state.ready.push_back(address.clone());
            self.available.notify_one();
        }
        Ok(())
    }

    fn discard(&self, address: &Address) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(StoreError::Closed);
        }
        state.entries.remove(address);
        state.ready.retain(|queued| queued != address);
        Ok(())
    }

    fn take(&self) -> Result<WorkUnit, StoreError> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(StoreError::Closed);
            }
            if let Some(unit) = Self::pop_ready(&mut state) {
                return Ok(unit);
            }
            self.available.wait(&mut state);
        }
    }
}
