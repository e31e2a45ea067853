//! Shared helpers for courier-actors integration tests

#![allow(dead_code)]

use courier_actors::{Address, Message, Payload, Shuttle};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub fn addr(s: &str) -> Address {
    s.parse().expect("valid test address")
}

/// Poll `condition` every few milliseconds, failing after five seconds
pub fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

/// Shuttle that keeps everything it is sent
pub struct Recorder<P> {
    prefix: String,
    received: Mutex<Vec<Message<P>>>,
}

impl<P: Payload + Clone> Recorder<P> {
    pub fn new(prefix: &str) -> Arc<Self> {
        Arc::new(Self {
            prefix: prefix.to_string(),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn messages(&self) -> Vec<Message<P>> {
        self.received.lock().clone()
    }

    pub fn payloads(&self) -> Vec<P> {
        self.received
            .lock()
            .iter()
            .map(|m| m.payload().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.received.lock().len()
    }
}

impl<P: Payload> Shuttle<P> for Recorder<P> {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn send(&self, messages: Vec<Message<P>>) {
        self.received.lock().extend(messages);
    }
}
