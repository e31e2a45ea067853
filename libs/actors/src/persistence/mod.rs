//! Checkpoint Persistence
//!
//! The runner only depends on the [`Store`] contract. A store keeps, per
//! actor address, the latest checkpoint and the messages that arrived while
//! the actor was not resident. [`Store::take`] hands out one unit of work
//! (an actor plus its next message) so a worker can resume it with
//! [`Runner::resume_actor`](crate::Runner::resume_actor).
//!
//! Implementations must absorb transient backend failures themselves
//! (see [`RetryingStore`]); only [`StoreError::Fatal`] and
//! [`StoreError::Closed`] should reach the runner.

mod memory;
mod retrying;

pub use memory::MemoryStore;
pub use retrying::RetryingStore;

use crate::actor::Payload;
use crate::error::{Result, StoreError};
use courier_types::{Address, Message};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// An evicted actor that has work waiting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub address: Address,
    pub checkpoint: Vec<u8>,
    pub message: Vec<u8>,
}

/// Checkpoint backend used by runners to evict and migrate idle actors
pub trait Store: Send + Sync {
    /// Replace the checkpoint for `address` and append `pending` messages.
    /// An entry with pending messages becomes available to [`take`](Store::take).
    fn store(
        &self,
        address: &Address,
        checkpoint: &[u8],
        pending: &[Vec<u8>],
    ) -> std::result::Result<(), StoreError>;

    /// Forget everything stored for `address`. Unknown addresses are not an error.
    fn discard(&self, address: &Address) -> std::result::Result<(), StoreError>;

    /// Block until a unit of work is available
    fn take(&self) -> std::result::Result<WorkUnit, StoreError>;
}

type Encoder<P> = fn(&Message<P>) -> bincode::Result<Vec<u8>>;
type Decoder<P> = fn(&[u8]) -> bincode::Result<Message<P>>;

/// A [`Store`] bound to one payload type
pub struct Persister<P> {
    store: Arc<dyn Store>,
    encode: Encoder<P>,
    decode: Decoder<P>,
}

impl<P> Clone for Persister<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            encode: self.encode,
            decode: self.decode,
        }
    }
}

impl<P> fmt::Debug for Persister<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persister").finish_non_exhaustive()
    }
}

impl<P> Persister<P>
where
    P: Payload + Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            encode: |message| bincode::serialize(message),
            decode: |bytes| bincode::deserialize(bytes),
        }
    }
}

impl<P: Payload> Persister<P> {
    /// Store an idle actor's checkpoint with no pending work
    pub fn evict(&self, address: &Address, checkpoint: &[u8]) -> Result<()> {
        self.store.store(address, checkpoint, &[])?;
        Ok(())
    }

    /// Queue `message` for an evicted actor
    pub fn enqueue(&self, address: &Address, checkpoint: &[u8], message: &Message<P>) -> Result<()> {
        let bytes = (self.encode)(message)?;
        self.store.store(address, checkpoint, &[bytes])?;
        Ok(())
    }

    pub fn discard(&self, address: &Address) -> Result<()> {
        self.store.discard(address)?;
        Ok(())
    }

    /// Block until an evicted actor has work, then decode it
    pub fn take(&self) -> Result<ResumedWork<P>> {
        let unit = self.store.take()?;
        let message = (self.decode)(&unit.message)?;
        Ok(ResumedWork {
            address: unit.address,
            checkpoint: unit.checkpoint,
            message,
        })
    }
}

/// Decoded [`WorkUnit`]
#[derive(Debug)]
pub struct ResumedWork<P> {
    pub address: Address,
    pub checkpoint: Vec<u8>,
    pub message: Message<P>,
}

impl<P> ResumedWork<P> {
    /// Decode the checkpoint written by [`Context::checkpoint`](crate::Context::checkpoint)
    pub fn restore<S: DeserializeOwned>(&self) -> Result<S> {
        Ok(bincode::deserialize(&self.checkpoint)?)
    }
}
