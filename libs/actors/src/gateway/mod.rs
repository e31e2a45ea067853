//! Gateways
//!
//! Gateways adapt non-actor resources (timers, test code, diagnostic sinks)
//! to the same shuttle contract a [`Runner`](crate::Runner) exposes, so
//! actors address them exactly like other actors:
//!
//! - [`TimerGateway`]: `<prefix>:<delay ms>:<target...>` is delivered to
//!   `<target...>` after the delay
//! - [`DirectGateway`]: blocking write/read bridge for ordinary code
//! - [`LogGateway`]: consume-only diagnostic sink
//!
//! Wiring is symmetric: a component's [`InputGateway::incoming_shuttle`] is
//! registered on every component that should be able to send to it.

mod direct;
mod logging;
mod timer;

pub use direct::DirectGateway;
pub use logging::LogGateway;
pub use timer::{schedule_address, TimerGateway};

use crate::actor::Payload;
use crate::error::Result;
use crate::shuttle::{Shuttle, ShuttleTable};
use courier_types::Message;
use parking_lot::RwLock;
use std::sync::Arc;

/// A component that can be sent to
pub trait InputGateway<P: Payload> {
    /// Shuttle that delivers into this component, keyed by its prefix
    fn incoming_shuttle(&self) -> Arc<dyn Shuttle<P>>;
}

/// A component that sends to others
pub trait OutputGateway<P: Payload> {
    /// Allow this component to send to `shuttle.prefix()`. Registering a
    /// prefix twice is a configuration error.
    fn add_outgoing_shuttle(&self, shuttle: Arc<dyn Shuttle<P>>) -> Result<()>;

    fn remove_outgoing_shuttle(&self, prefix: &str) -> Result<()>;
}

/// Let `from` send to `to`
pub fn connect<P: Payload>(from: &dyn OutputGateway<P>, to: &dyn InputGateway<P>) -> Result<()> {
    from.add_outgoing_shuttle(to.incoming_shuttle())
}

/// Routing table shared between a gateway handle and its worker threads
pub(crate) struct SharedRoutes<P: Payload> {
    table: RwLock<ShuttleTable<P>>,
}

impl<P: Payload> SharedRoutes<P> {
    pub(crate) fn new() -> Self {
        Self {
            table: RwLock::new(ShuttleTable::new()),
        }
    }

    pub(crate) fn add(&self, shuttle: Arc<dyn Shuttle<P>>) -> Result<()> {
        self.table.write().add(shuttle)
    }

    pub(crate) fn remove(&self, prefix: &str) -> Result<()> {
        self.table.write().remove(prefix).map(|_| ())
    }

    /// Route and return whatever had no shuttle
    pub(crate) fn route(&self, messages: Vec<Message<P>>) -> Vec<Message<P>> {
        self.table.read().route(messages)
    }
}
