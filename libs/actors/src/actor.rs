//! Actor Execution Contract
//!
//! An actor is an `async` body driven by its runner. The body's only
//! suspension point is [`Context::recv`]: awaiting it hands the pump thread
//! back to the runner and parks the actor until the next message addressed
//! to it arrives. The suspended future *is* the actor's continuation, so
//! local variables survive between messages without any explicit state
//! object.
//!
//! ```rust
//! use courier_actors::Context;
//!
//! async fn echo(ctx: Context<u64>) -> anyhow::Result<()> {
//!     while let Some(msg) = ctx.recv().await {
//!         let (source, _, payload) = msg.into_parts();
//!         ctx.out(source, payload);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! One call to the runner's poll is one *turn*: it consumes at most one
//! message and runs until the body awaits `recv()` again (suspend) or
//! returns (terminate). `recv()` yields `None` once the runner is shutting
//! down or the actor is being removed; the body should clean up and return.

use courier_types::{Address, Message};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{self, Poll};
use std::time::Instant;

use crate::error::Result;

/// Anything the runtime can carry as a message payload
pub trait Payload: Send + fmt::Debug + 'static {}

impl<T: Send + fmt::Debug + 'static> Payload for T {}

/// The continuation of a started actor
pub type ActorFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Something a runner can start
pub trait Actor<P: Payload>: Send + 'static {
    fn run(self: Box<Self>, ctx: Context<P>) -> ActorFuture;
}

impl<P, F, Fut> Actor<P> for F
where
    P: Payload,
    F: FnOnce(Context<P>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn run(self: Box<Self>, ctx: Context<P>) -> ActorFuture {
        Box::pin((*self)(ctx))
    }
}

/// Per-actor exchange area between the runner and the actor's body
pub(crate) struct TurnSlot<P> {
    pub(crate) incoming: Option<Message<P>>,
    pub(crate) outgoing: Vec<Message<P>>,
    pub(crate) checkpoint: Option<Vec<u8>>,
    pub(crate) stopping: bool,
    pub(crate) now: Instant,
}

impl<P> TurnSlot<P> {
    pub(crate) fn new() -> Self {
        Self {
            incoming: None,
            outgoing: Vec::new(),
            checkpoint: None,
            stopping: false,
            now: Instant::now(),
        }
    }
}

/// Handle an actor body uses to receive, send, and checkpoint
pub struct Context<P> {
    address: Address,
    slot: Arc<Mutex<TurnSlot<P>>>,
}

impl<P> Clone for Context<P> {
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<P> fmt::Debug for Context<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("address", &self.address)
            .finish()
    }
}

impl<P: Payload> Context<P> {
    pub(crate) fn new(address: Address, slot: Arc<Mutex<TurnSlot<P>>>) -> Self {
        Self { address, slot }
    }

    /// This actor's full address (`<runner prefix>:<suffix>`)
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Suspend until the next message. `None` means shut down.
    pub fn recv(&self) -> Recv<'_, P> {
        Recv { ctx: self }
    }

    /// Queue a message from this actor's address. Delivered after the turn.
    pub fn out(&self, destination: Address, payload: P) {
        let message = Message::new(self.address.clone(), destination, payload);
        self.slot.lock().outgoing.push(message);
    }

    /// Queue a message whose source is a sub-address below this actor,
    /// e.g. to tag replies with a request id
    pub fn out_from(&self, source_suffix: &Address, destination: Address, payload: P) {
        let source = self.address.append(source_suffix);
        let message = Message::new(source, destination, payload);
        self.slot.lock().outgoing.push(message);
    }

    /// Time at which the current turn started
    pub fn now(&self) -> Instant {
        self.slot.lock().now
    }

    /// Record a serialized snapshot of actor state. Runners with a persister
    /// use the latest snapshot when evicting an idle actor.
    pub fn checkpoint<S: Serialize>(&self, state: &S) -> Result<()> {
        let bytes = bincode::serialize(state)?;
        self.slot.lock().checkpoint = Some(bytes);
        Ok(())
    }

    /// True once the runner has asked this actor to stop
    pub fn is_stopping(&self) -> bool {
        self.slot.lock().stopping
    }
}

/// Future returned by [`Context::recv`]
pub struct Recv<'a, P> {
    ctx: &'a Context<P>,
}

impl<P> Future for Recv<'_, P> {
    type Output = Option<Message<P>>;

    fn poll(self: Pin<&mut Self>, _cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.ctx.slot.lock();
        if let Some(message) = slot.incoming.take() {
            return Poll::Ready(Some(message));
        }
        if slot.stopping {
            return Poll::Ready(None);
        }
        // The runner re-polls when the next message is placed in the slot
        Poll::Pending
    }
}
