use super::{InputGateway, OutputGateway, SharedRoutes};
use crate::actor::Payload;
use crate::bus::Bus;
use crate::error::{Result, RuntimeError};
use crate::shuttle::Shuttle;
use courier_config::DirectConfig;
use courier_types::{Address, Message};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Synchronous bridge between ordinary code and actors.
///
/// Callers write messages whose source lies under the gateway's prefix and
/// read back whatever arrives at addresses they [`listen`](Self::listen) on.
/// Messages for addresses nobody listens on are dropped.
pub struct DirectGateway<P: Payload> {
    prefix: String,
    listening: Arc<RwLock<HashSet<Address>>>,
    inbox: Arc<Bus<Message<P>>>,
    routes: SharedRoutes<P>,
    read_timeout: Duration,
}

impl<P: Payload> DirectGateway<P> {
    pub fn new(prefix: &str, config: &DirectConfig) -> Result<Self> {
        if prefix.is_empty() {
            return Err(RuntimeError::configuration(
                "Direct gateway prefix must not be empty",
                Some("prefix"),
            ));
        }
        info!(prefix = %prefix, "Direct gateway started");
        Ok(Self {
            prefix: prefix.to_string(),
            listening: Arc::new(RwLock::new(HashSet::new())),
            inbox: Arc::new(Bus::new()),
            routes: SharedRoutes::new(),
            read_timeout: config.read_timeout(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Start keeping messages addressed to `address`
    pub fn listen(&self, address: &Address) -> Result<()> {
        self.check_owned(address)?;
        self.listening.write().insert(address.clone());
        debug!(prefix = %self.prefix, address = %address, "Listening");
        Ok(())
    }

    /// Listen on a fresh `<prefix>:<uuid>` address, e.g. as a reply-to source
    pub fn open_inbox(&self) -> Result<Address> {
        let address = Address::from_segment(self.prefix.as_str())
            .append_segment(Uuid::new_v4().to_string());
        self.listen(&address)?;
        Ok(address)
    }

    pub fn unlisten(&self, address: &Address) -> Result<()> {
        self.check_owned(address)?;
        self.listening.write().remove(address);
        Ok(())
    }

    /// Send `message` toward its destination.
    ///
    /// The source must lie under this gateway's prefix; a destination with no
    /// registered shuttle is reported as [`RuntimeError::Unroutable`].
    pub fn write(&self, message: Message<P>) -> Result<()> {
        if self.inbox.is_closed() {
            return Err(RuntimeError::closed(format!("direct gateway {}", self.prefix)));
        }
        self.check_owned(message.source())?;

        let unroutable = self.routes.route(vec![message]);
        match unroutable.into_iter().next() {
            Some(message) => Err(RuntimeError::Unroutable {
                destination: message.destination().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Block up to the configured read timeout; returns everything received
    pub fn read_messages(&self) -> Vec<Message<P>> {
        self.read_messages_timeout(self.read_timeout)
    }

    /// Block up to `timeout`; an empty result means nothing arrived
    pub fn read_messages_timeout(&self, timeout: Duration) -> Vec<Message<P>> {
        self.inbox.pull_timeout(timeout)
    }

    /// Collect up to `count` payloads, waiting at most `timeout` in total
    pub fn read_payloads(&self, count: usize, timeout: Duration) -> Vec<P> {
        let deadline = Instant::now() + timeout;
        let mut payloads = Vec::with_capacity(count);
        while payloads.len() < count {
            let batch = self.inbox.pull_max_until(count - payloads.len(), deadline);
            if batch.is_empty() {
                break;
            }
            payloads.extend(batch.into_iter().map(Message::into_payload));
        }
        payloads
    }

    /// Write `message` and wait up to the read timeout for the next reply
    pub fn write_and_read(&self, message: Message<P>) -> Result<Option<Message<P>>> {
        self.write(message)?;
        let deadline = Instant::now() + self.read_timeout;
        Ok(self.inbox.pull_max_until(1, deadline).into_iter().next())
    }

    /// Wake blocked readers and refuse further writes
    pub fn close(&self) {
        self.inbox.close();
        self.listening.write().clear();
        info!(prefix = %self.prefix, "Direct gateway closed");
    }

    fn check_owned(&self, address: &Address) -> Result<()> {
        if address.first() != self.prefix {
            return Err(RuntimeError::configuration(
                format!(
                    "Address '{}' is outside direct gateway prefix '{}'",
                    address, self.prefix
                ),
                Some("address"),
            ));
        }
        Ok(())
    }
}

impl<P: Payload> InputGateway<P> for DirectGateway<P> {
    fn incoming_shuttle(&self) -> Arc<dyn Shuttle<P>> {
        Arc::new(DirectShuttle {
            prefix: self.prefix.clone(),
            listening: Arc::clone(&self.listening),
            inbox: Arc::clone(&self.inbox),
        })
    }
}

impl<P: Payload> OutputGateway<P> for DirectGateway<P> {
    fn add_outgoing_shuttle(&self, shuttle: Arc<dyn Shuttle<P>>) -> Result<()> {
        self.routes.add(shuttle)
    }

    fn remove_outgoing_shuttle(&self, prefix: &str) -> Result<()> {
        self.routes.remove(prefix)
    }
}

struct DirectShuttle<P: Payload> {
    prefix: String,
    listening: Arc<RwLock<HashSet<Address>>>,
    inbox: Arc<Bus<Message<P>>>,
}

impl<P: Payload> Shuttle<P> for DirectShuttle<P> {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn send(&self, messages: Vec<Message<P>>) {
        let listening = self.listening.read();
        let (kept, ignored): (Vec<_>, Vec<_>) = messages
            .into_iter()
            .partition(|message| listening.contains(message.destination()));
        drop(listening);

        for message in &ignored {
            debug!(
                prefix = %self.prefix,
                destination = %message.destination(),
                "Nobody listening, dropping"
            );
        }
        self.inbox.add_all(kept);
    }
}
