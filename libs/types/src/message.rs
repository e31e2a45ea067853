//! Addressed Messages
//!
//! The unit of traffic between actors, runners, and gateways. The payload is
//! opaque to the runtime; applications pick a payload type (usually an enum
//! per protocol) and the runtime moves it around untouched.

use crate::address::Address;
use serde::{Deserialize, Serialize};

/// A payload travelling from `source` to `destination`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message<P> {
    source: Address,
    destination: Address,
    payload: P,
}

impl<P> Message<P> {
    pub fn new(source: Address, destination: Address, payload: P) -> Self {
        Self {
            source,
            destination,
            payload,
        }
    }

    pub fn source(&self) -> &Address {
        &self.source
    }

    pub fn destination(&self) -> &Address {
        &self.destination
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Split into `(source, destination, payload)`
    pub fn into_parts(self) -> (Address, Address, P) {
        (self.source, self.destination, self.payload)
    }

    /// Same message with its destination replaced
    pub fn redirect(self, destination: Address) -> Self {
        Self {
            destination,
            ..self
        }
    }

    pub fn map_payload<Q, F: FnOnce(P) -> Q>(self, f: F) -> Message<Q> {
        Message {
            source: self.source,
            destination: self.destination,
            payload: f(self.payload),
        }
    }
}
