//! Shuttles and Routing Tables
//!
//! A [`Shuttle`] is the sending half of a component: whoever holds it can
//! push messages toward the runner, gateway, or transport it fronts. Each
//! shuttle is identified by the address prefix it serves.
//!
//! A [`ShuttleTable`] maps prefixes to shuttles. Runners keep one owned by
//! their pump thread; gateways keep one behind a lock.

use crate::actor::Payload;
use crate::error::{Result, RuntimeError};
use courier_types::Message;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Fire-and-forget delivery toward the component serving [`prefix`](Shuttle::prefix).
///
/// `send` must not block for an unbounded time. Components whose downstream
/// can stall are fronted by a [`PumpShuttle`](crate::PumpShuttle).
pub trait Shuttle<P: Payload>: Send + Sync {
    fn prefix(&self) -> &str;

    fn send(&self, messages: Vec<Message<P>>);
}

/// Prefix to shuttle routing table
pub struct ShuttleTable<P: Payload> {
    routes: HashMap<String, Arc<dyn Shuttle<P>>>,
}

impl<P: Payload> Default for ShuttleTable<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> fmt::Debug for ShuttleTable<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut prefixes: Vec<&String> = self.routes.keys().collect();
        prefixes.sort();
        f.debug_struct("ShuttleTable")
            .field("prefixes", &prefixes)
            .finish()
    }
}

impl<P: Payload> ShuttleTable<P> {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Register `shuttle` under its prefix. A second shuttle for the same
    /// prefix is a configuration error.
    pub fn add(&mut self, shuttle: Arc<dyn Shuttle<P>>) -> Result<()> {
        let prefix = shuttle.prefix().to_string();
        if self.routes.contains_key(&prefix) {
            return Err(RuntimeError::configuration(
                format!("Shuttle already registered for prefix '{}'", prefix),
                Some("prefix"),
            ));
        }
        debug!(prefix = %prefix, "Registered outgoing shuttle");
        self.routes.insert(prefix, shuttle);
        Ok(())
    }

    pub fn remove(&mut self, prefix: &str) -> Result<Arc<dyn Shuttle<P>>> {
        self.routes.remove(prefix).ok_or_else(|| {
            RuntimeError::configuration(
                format!("No shuttle registered for prefix '{}'", prefix),
                Some("prefix"),
            )
        })
    }

    pub fn get(&self, prefix: &str) -> Option<&Arc<dyn Shuttle<P>>> {
        self.routes.get(prefix)
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.routes.contains_key(prefix)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Send each message to the shuttle owning its destination prefix.
    ///
    /// Messages are grouped into one batch per shuttle, keeping their
    /// relative order. Messages with no matching shuttle are returned.
    pub fn route(&self, messages: Vec<Message<P>>) -> Vec<Message<P>> {
        let mut batches: Vec<(&str, Vec<Message<P>>)> = Vec::new();
        let mut unroutable = Vec::new();

        for message in messages {
            let prefix = message.destination().first();
            match self.routes.get_key_value(prefix) {
                Some((key, _)) => match batches.iter_mut().find(|(p, _)| *p == key.as_str()) {
                    Some((_, batch)) => batch.push(message),
                    None => batches.push((key.as_str(), vec![message])),
                },
                None => unroutable.push(message),
            }
        }

        for (prefix, batch) in batches {
            if let Some(shuttle) = self.routes.get(prefix) {
                trace!(prefix = %prefix, count = batch.len(), "Forwarding batch");
                shuttle.send(batch);
            }
        }

        unroutable
    }
}
