//! Actor Runner
//!
//! A [`Runner`] owns one pump thread and a set of actors addressed as
//! `<prefix>:<suffix>`. Everything that touches the actor table or the
//! outgoing routing table happens on that thread; the public handle only
//! validates arguments and posts control events onto the runner's [`Bus`].
//!
//! ## Pump loop
//!
//! Each iteration:
//!
//! 1. blocks on the bus until the earliest idle timeout (or forever)
//! 2. applies control events and runs one turn per delivered message
//! 3. routes everything the turns produced, looping own-prefix traffic back
//! 4. sweeps expired idle timeouts, evicting checkpointed actors
//!
//! A turn is a single poll of the actor's future with a no-op waker, so an
//! actor is never re-entered while one of its turns is in flight.
//!
//! ## Failure isolation
//!
//! A turn that returns `Err` or panics removes that actor and nothing else.
//! Unroutable output is logged and dropped. Neither stops the pump.

use crate::actor::{Actor, ActorFuture, Context, Payload, TurnSlot};
use crate::bus::Bus;
use crate::error::{Result, RuntimeError};
use crate::gateway::{InputGateway, OutputGateway};
use crate::metrics::{RunnerMetrics, RunnerStats};
use crate::persistence::Persister;
use crate::shuttle::{Shuttle, ShuttleTable};
use courier_config::RunnerConfig;
use courier_types::{Address, Message, TimeoutManager};
use futures::task::noop_waker;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{self, Poll};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Work posted to a runner's pump thread
enum Event<P: Payload> {
    Deliver(Message<P>),
    Start {
        suffix: String,
        actor: Box<dyn Actor<P>>,
        first: Option<Message<P>>,
    },
    Remove(String),
    AddShuttle(Arc<dyn Shuttle<P>>),
    RemoveShuttle(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Residency {
    Resident,
    Evicted,
}

/// Names claimed on this runner, checked synchronously by the handle
#[derive(Debug, Default)]
struct Registry {
    actors: HashMap<String, Residency>,
    shuttles: HashSet<String>,
}

impl Registry {
    fn resident_count(&self) -> usize {
        self.actors
            .values()
            .filter(|r| **r == Residency::Resident)
            .count()
    }
}

/// Scheduler hosting actors under one address prefix
pub struct Runner<P: Payload> {
    prefix: String,
    address: Address,
    bus: Arc<Bus<Event<P>>>,
    registry: Arc<Mutex<Registry>>,
    metrics: Arc<RunnerMetrics>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Payload> Runner<P> {
    /// Start a runner without persistence
    pub fn new(prefix: &str, config: RunnerConfig) -> Result<Self> {
        Self::start(prefix, config, None)
    }

    /// Start a runner that evicts idle, checkpointed actors into `persister`
    pub fn with_persister(prefix: &str, config: RunnerConfig, persister: Persister<P>) -> Result<Self> {
        Self::start(prefix, config, Some(persister))
    }

    fn start(prefix: &str, config: RunnerConfig, persister: Option<Persister<P>>) -> Result<Self> {
        if prefix.is_empty() {
            return Err(RuntimeError::configuration(
                "Runner prefix must not be empty",
                Some("prefix"),
            ));
        }
        if config.max_batch == 0 {
            return Err(RuntimeError::configuration(
                "max_batch must be at least 1",
                Some("runner.max_batch"),
            ));
        }
        if config.held_timeout_ms == 0 {
            return Err(RuntimeError::configuration(
                "held_timeout_ms must be at least 1",
                Some("runner.held_timeout_ms"),
            ));
        }
        if persister.is_none() && config.idle_timeout_ms.is_some() {
            warn!(runner = %prefix, "idle_timeout_ms has no effect without a persister");
        }

        let address = Address::from_segment(prefix);
        let bus = Arc::new(Bus::new());
        let registry = Arc::new(Mutex::new(Registry::default()));
        let metrics = Arc::new(RunnerMetrics::default());

        let pump = Pump {
            prefix: prefix.to_string(),
            address: address.clone(),
            bus: Arc::clone(&bus),
            registry: Arc::clone(&registry),
            metrics: Arc::clone(&metrics),
            actors: HashMap::new(),
            evicted: HashMap::new(),
            shuttles: ShuttleTable::new(),
            timeouts: TimeoutManager::new(),
            idle_timeout: persister.as_ref().and(config.idle_timeout()),
            persister,
            max_batch: config.max_batch,
            max_held: config.max_held,
            held_timeout: config.held_timeout(),
            outgoing: Vec::new(),
        };

        let thread_name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("runner-{}", prefix));
        let worker = thread::Builder::new()
            .name(thread_name)
            .spawn(move || pump.run())?;

        info!(runner = %prefix, "Runner started");

        Ok(Self {
            prefix: prefix.to_string(),
            address,
            bus,
            registry,
            metrics,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Single-segment address of this runner
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Full address of the actor that `suffix` names on this runner
    pub fn actor_address(&self, suffix: &str) -> Address {
        self.address.append_segment(suffix)
    }

    /// Register and start an actor. When `priming` is given the actor's
    /// first message carries it, with the actor's own address as source.
    pub fn add_actor<A: Actor<P>>(&self, suffix: &str, actor: A, priming: Option<P>) -> Result<()> {
        self.ensure_open()?;
        Self::check_suffix(suffix)?;
        {
            let mut registry = self.registry.lock();
            if registry.actors.contains_key(suffix) {
                return Err(RuntimeError::configuration(
                    format!("Actor '{}' already exists on runner '{}'", suffix, self.prefix),
                    Some("suffix"),
                ));
            }
            registry.actors.insert(suffix.to_string(), Residency::Resident);
        }

        let address = self.actor_address(suffix);
        let first = priming.map(|payload| Message::new(address.clone(), address, payload));
        self.bus.add(Event::Start {
            suffix: suffix.to_string(),
            actor: Box::new(actor),
            first,
        });
        Ok(())
    }

    /// Restart an actor taken from the store, delivering `message` first.
    /// Messages held back while it was evicted follow in arrival order.
    pub fn resume_actor<A: Actor<P>>(&self, suffix: &str, actor: A, message: Message<P>) -> Result<()> {
        self.ensure_open()?;
        Self::check_suffix(suffix)?;
        {
            let mut registry = self.registry.lock();
            if registry.actors.get(suffix) == Some(&Residency::Resident) {
                return Err(RuntimeError::configuration(
                    format!("Actor '{}' is already resident on runner '{}'", suffix, self.prefix),
                    Some("suffix"),
                ));
            }
            registry.actors.insert(suffix.to_string(), Residency::Resident);
        }

        self.bus.add(Event::Start {
            suffix: suffix.to_string(),
            actor: Box::new(actor),
            first: Some(message),
        });
        Ok(())
    }

    /// Give the actor a final turn (its `recv()` yields `None`), then drop it
    /// and discard any stored state
    pub fn remove_actor(&self, suffix: &str) -> Result<()> {
        self.ensure_open()?;
        if !self.registry.lock().actors.contains_key(suffix) {
            return Err(RuntimeError::configuration(
                format!("No actor '{}' on runner '{}'", suffix, self.prefix),
                Some("suffix"),
            ));
        }
        self.bus.add(Event::Remove(suffix.to_string()));
        Ok(())
    }

    pub fn stats(&self) -> RunnerStats {
        let live = self.registry.lock().resident_count();
        self.metrics.snapshot(live)
    }

    pub fn is_closed(&self) -> bool {
        self.bus.is_closed()
    }

    /// Stop accepting messages, notify resident actors, and join the pump thread
    pub fn close(&self) {
        self.bus.close();
        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!(runner = %self.prefix, "Runner thread terminated abnormally");
            }
            info!(runner = %self.prefix, "Runner closed");
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.bus.is_closed() {
            return Err(RuntimeError::closed(format!("runner {}", self.prefix)));
        }
        Ok(())
    }

    fn check_suffix(suffix: &str) -> Result<()> {
        if suffix.is_empty() {
            return Err(RuntimeError::configuration(
                "Actor suffix must not be empty",
                Some("suffix"),
            ));
        }
        Ok(())
    }
}

impl<P: Payload> InputGateway<P> for Runner<P> {
    fn incoming_shuttle(&self) -> Arc<dyn Shuttle<P>> {
        Arc::new(RunnerShuttle {
            prefix: self.prefix.clone(),
            bus: Arc::clone(&self.bus),
        })
    }
}

impl<P: Payload> OutputGateway<P> for Runner<P> {
    fn add_outgoing_shuttle(&self, shuttle: Arc<dyn Shuttle<P>>) -> Result<()> {
        self.ensure_open()?;
        let prefix = shuttle.prefix().to_string();
        if !self.registry.lock().shuttles.insert(prefix.clone()) {
            return Err(RuntimeError::configuration(
                format!("Runner '{}' already routes prefix '{}'", self.prefix, prefix),
                Some("prefix"),
            ));
        }
        self.bus.add(Event::AddShuttle(shuttle));
        Ok(())
    }

    fn remove_outgoing_shuttle(&self, prefix: &str) -> Result<()> {
        self.ensure_open()?;
        if !self.registry.lock().shuttles.remove(prefix) {
            return Err(RuntimeError::configuration(
                format!("Runner '{}' has no route for prefix '{}'", self.prefix, prefix),
                Some("prefix"),
            ));
        }
        self.bus.add(Event::RemoveShuttle(prefix.to_string()));
        Ok(())
    }
}

impl<P: Payload> Drop for Runner<P> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Incoming shuttle handed to other components
struct RunnerShuttle<P: Payload> {
    prefix: String,
    bus: Arc<Bus<Event<P>>>,
}

impl<P: Payload> Shuttle<P> for RunnerShuttle<P> {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn send(&self, messages: Vec<Message<P>>) {
        let prefix = self.prefix.as_str();
        let events = messages.into_iter().filter_map(|message| {
            if message.destination().first() == prefix {
                Some(Event::Deliver(message))
            } else {
                warn!(
                    runner = %prefix,
                    destination = %message.destination(),
                    "Message for another prefix reached this runner, dropping"
                );
                None
            }
        });
        self.bus.add_all(events);
    }
}

struct Resident<P> {
    address: Address,
    slot: Arc<Mutex<TurnSlot<P>>>,
    future: ActorFuture,
}

/// Actor whose state lives in the store
struct Evicted<P> {
    address: Address,
    checkpoint: Vec<u8>,
    /// The store holds one message for this actor already
    handed_off: bool,
    /// Arrivals after the hand-off, replayed on resumption
    held: Vec<Message<P>>,
}

enum TurnOutcome {
    Suspended,
    Finished,
    Failed(String),
}

/// State owned by the pump thread
struct Pump<P: Payload> {
    prefix: String,
    address: Address,
    bus: Arc<Bus<Event<P>>>,
    registry: Arc<Mutex<Registry>>,
    metrics: Arc<RunnerMetrics>,
    actors: HashMap<String, Resident<P>>,
    evicted: HashMap<String, Evicted<P>>,
    shuttles: ShuttleTable<P>,
    timeouts: TimeoutManager<String>,
    persister: Option<Persister<P>>,
    idle_timeout: Option<Duration>,
    max_batch: usize,
    max_held: usize,
    held_timeout: Duration,
    outgoing: Vec<Message<P>>,
}

impl<P: Payload> Pump<P> {
    fn run(mut self) {
        debug!(runner = %self.prefix, "Pump thread running");
        loop {
            let events = match self.timeouts.next_timeout() {
                Some(deadline) => self.bus.pull_max_until(self.max_batch, deadline),
                None => self.bus.pull_max(self.max_batch, Duration::MAX),
            };
            if events.is_empty() && self.bus.is_closed() {
                break;
            }

            for event in events {
                self.handle(event);
            }
            self.flush();

            let expired = self.timeouts.process(Instant::now()).expired;
            for suffix in expired {
                self.expire(&suffix);
            }
        }
        self.shutdown();
    }

    fn handle(&mut self, event: Event<P>) {
        match event {
            Event::Deliver(message) => self.deliver(message),
            Event::Start {
                suffix,
                actor,
                first,
            } => self.start(suffix, actor, first),
            Event::Remove(suffix) => self.remove(&suffix),
            Event::AddShuttle(shuttle) => {
                if let Err(e) = self.shuttles.add(shuttle) {
                    warn!(runner = %self.prefix, error = %e, "Ignoring shuttle registration");
                }
            }
            Event::RemoveShuttle(prefix) => {
                if self.shuttles.remove(&prefix).is_ok() {
                    debug!(runner = %self.prefix, prefix = %prefix, "Removed outgoing shuttle");
                }
            }
        }
    }

    fn deliver(&mut self, message: Message<P>) {
        let Some(suffix) = message.destination().segment(1).map(str::to_string) else {
            warn!(
                runner = %self.prefix,
                destination = %message.destination(),
                "Destination names no actor, dropping"
            );
            self.metrics.record_dropped(1);
            return;
        };

        if self.actors.contains_key(&suffix) {
            self.metrics.record_delivered();
            let outcome = self.turn(&suffix, Some(message));
            self.settle(&suffix, outcome);
        } else if self.evicted.contains_key(&suffix) {
            self.hand_off(&suffix, message);
        } else {
            debug!(
                runner = %self.prefix,
                destination = %message.destination(),
                "No such actor, dropping message"
            );
            self.metrics.record_dropped(1);
        }
    }

    fn start(&mut self, suffix: String, actor: Box<dyn Actor<P>>, first: Option<Message<P>>) {
        if self.actors.contains_key(&suffix) {
            error!(runner = %self.prefix, actor = %suffix, "Actor already resident, start ignored");
            return;
        }
        let held = match self.evicted.remove(&suffix) {
            Some(evicted) => {
                self.timeouts.cancel(&suffix);
                self.metrics.release_held(evicted.held.len());
                evicted.held
            }
            None => Vec::new(),
        };

        let address = self.address.append_segment(suffix.clone());
        let slot = Arc::new(Mutex::new(TurnSlot::new()));
        let future = actor.run(Context::new(address.clone(), Arc::clone(&slot)));
        self.actors.insert(
            suffix.clone(),
            Resident {
                address,
                slot,
                future,
            },
        );
        self.metrics.actors_started.fetch_add(1, Ordering::Relaxed);
        debug!(runner = %self.prefix, actor = %suffix, "Actor started");

        // Runs the body up to its first recv()
        let outcome = self.turn(&suffix, None);
        self.settle(&suffix, outcome);

        for message in first.into_iter().chain(held) {
            self.deliver(message);
        }
    }

    /// Poll the actor once with `incoming` in its slot
    fn turn(&mut self, suffix: &str, incoming: Option<Message<P>>) -> TurnOutcome {
        let Some(resident) = self.actors.get_mut(suffix) else {
            return TurnOutcome::Finished;
        };

        let started = Instant::now();
        {
            let mut slot = resident.slot.lock();
            slot.incoming = incoming;
            slot.now = started;
        }

        let outcome = poll_once(&mut resident.future);
        self.metrics.record_turn(started.elapsed());

        let (produced, unconsumed) = {
            let mut slot = resident.slot.lock();
            (mem::take(&mut slot.outgoing), slot.incoming.take())
        };
        if let Some(message) = unconsumed {
            warn!(
                runner = %self.prefix,
                actor = %suffix,
                source = %message.source(),
                "Actor yielded without receiving its message, dropping"
            );
            self.metrics.record_dropped(1);
        }
        self.outgoing.extend(produced);
        outcome
    }

    fn settle(&mut self, suffix: &str, outcome: TurnOutcome) {
        match outcome {
            TurnOutcome::Suspended => self.arm_idle_timeout(suffix),
            TurnOutcome::Finished => {
                if self.actors.contains_key(suffix) {
                    debug!(runner = %self.prefix, actor = %suffix, "Actor terminated");
                    self.metrics.actors_terminated.fetch_add(1, Ordering::Relaxed);
                    self.retire(suffix);
                }
            }
            TurnOutcome::Failed(reason) => {
                error!(runner = %self.prefix, actor = %suffix, error = %reason, "Actor failed, removing it");
                self.metrics.actors_failed.fetch_add(1, Ordering::Relaxed);
                self.retire(suffix);
            }
        }
    }

    fn arm_idle_timeout(&mut self, suffix: &str) {
        let Some(idle) = self.idle_timeout else {
            return;
        };
        let checkpointed = self
            .actors
            .get(suffix)
            .is_some_and(|resident| resident.slot.lock().checkpoint.is_some());
        if checkpointed {
            self.timeouts.add(suffix.to_string(), Instant::now() + idle);
        }
    }

    /// Drop a terminated actor and its stored state
    fn retire(&mut self, suffix: &str) {
        let Some(resident) = self.actors.remove(suffix) else {
            return;
        };
        self.timeouts.cancel(&suffix.to_string());
        self.registry.lock().actors.remove(suffix);
        if let Some(persister) = &self.persister {
            if let Err(e) = persister.discard(&resident.address) {
                error!(runner = %self.prefix, actor = %suffix, error = %e, "Failed to discard stored state");
            }
        }
    }

    fn remove(&mut self, suffix: &str) {
        if self.actors.contains_key(suffix) {
            if let Some(resident) = self.actors.get(suffix) {
                resident.slot.lock().stopping = true;
            }
            match self.turn(suffix, None) {
                TurnOutcome::Failed(reason) => {
                    error!(runner = %self.prefix, actor = %suffix, error = %reason, "Actor failed while stopping");
                }
                TurnOutcome::Suspended => {
                    warn!(runner = %self.prefix, actor = %suffix, "Actor kept running after stop, dropping it");
                }
                TurnOutcome::Finished => {}
            }
            self.metrics.actors_terminated.fetch_add(1, Ordering::Relaxed);
            self.retire(suffix);
            info!(runner = %self.prefix, actor = %suffix, "Actor removed");
        } else if let Some(evicted) = self.evicted.remove(suffix) {
            self.timeouts.cancel(&suffix.to_string());
            self.registry.lock().actors.remove(suffix);
            self.metrics.release_held(evicted.held.len());
            self.metrics.record_dropped(evicted.held.len());
            if let Some(persister) = &self.persister {
                if let Err(e) = persister.discard(&evicted.address) {
                    error!(runner = %self.prefix, actor = %suffix, error = %e, "Failed to discard stored state");
                }
            }
            info!(runner = %self.prefix, actor = %suffix, "Evicted actor removed");
        }
    }

    /// Idle deadline for a resident actor, resume deadline for an evicted one
    fn expire(&mut self, suffix: &str) {
        if self.actors.contains_key(suffix) {
            self.evict(suffix);
            return;
        }
        let Some(evicted) = self.evicted.get_mut(suffix) else {
            return;
        };
        let dropped = mem::take(&mut evicted.held).len();
        if dropped > 0 {
            self.metrics.release_held(dropped);
            self.metrics.record_dropped(dropped);
            warn!(
                runner = %self.prefix,
                actor = %suffix,
                dropped,
                "Evicted actor was not resumed in time, dropping held messages"
            );
        }
    }

    fn evict(&mut self, suffix: &str) {
        let Some(persister) = &self.persister else {
            return;
        };
        let Some(resident) = self.actors.get(suffix) else {
            return;
        };
        let Some(checkpoint) = resident.slot.lock().checkpoint.clone() else {
            return;
        };

        if let Err(e) = persister.evict(&resident.address, &checkpoint) {
            error!(runner = %self.prefix, actor = %suffix, error = %e, "Eviction failed, actor stays resident");
            return;
        }

        if let Some(resident) = self.actors.remove(suffix) {
            self.evicted.insert(
                suffix.to_string(),
                Evicted {
                    address: resident.address,
                    checkpoint,
                    handed_off: false,
                    held: Vec::new(),
                },
            );
        }
        if let Some(residency) = self.registry.lock().actors.get_mut(suffix) {
            *residency = Residency::Evicted;
        }
        self.metrics.actors_evicted.fetch_add(1, Ordering::Relaxed);
        info!(runner = %self.prefix, actor = %suffix, "Evicted idle actor");
    }

    /// Route a message for an evicted actor into the store
    fn hand_off(&mut self, suffix: &str, message: Message<P>) {
        let (Some(persister), Some(evicted)) = (&self.persister, self.evicted.get_mut(suffix)) else {
            self.metrics.record_dropped(1);
            return;
        };

        if evicted.handed_off {
            if evicted.held.len() >= self.max_held {
                warn!(
                    runner = %self.prefix,
                    actor = %suffix,
                    max_held = self.max_held,
                    "Too many messages held for evicted actor, dropping"
                );
                self.metrics.record_dropped(1);
                return;
            }
            trace!(runner = %self.prefix, actor = %suffix, "Holding message until actor is resumed");
            evicted.held.push(message);
            self.metrics.record_held(1);
            let key = suffix.to_string();
            if !self.timeouts.contains(&key) {
                self.timeouts.add(key, Instant::now() + self.held_timeout);
            }
            return;
        }

        match persister.enqueue(&evicted.address, &evicted.checkpoint, &message) {
            Ok(()) => {
                evicted.handed_off = true;
                self.timeouts
                    .add(suffix.to_string(), Instant::now() + self.held_timeout);
                debug!(runner = %self.prefix, actor = %suffix, "Queued message for evicted actor");
            }
            Err(e) => {
                error!(runner = %self.prefix, actor = %suffix, error = %e, "Failed to store message, dropping");
                self.metrics.record_dropped(1);
            }
        }
    }

    /// Route everything produced since the last flush
    fn flush(&mut self) {
        if self.outgoing.is_empty() {
            return;
        }
        let outgoing = mem::take(&mut self.outgoing);
        self.metrics.record_sent(outgoing.len());

        let (local, remote): (Vec<_>, Vec<_>) = outgoing
            .into_iter()
            .partition(|message| message.destination().first() == self.prefix);
        if !local.is_empty() {
            self.bus.add_all(local.into_iter().map(Event::Deliver));
        }
        if remote.is_empty() {
            return;
        }

        let count = remote.len();
        let shuttles = &self.shuttles;
        match panic::catch_unwind(AssertUnwindSafe(|| shuttles.route(remote))) {
            Ok(unroutable) => {
                for message in &unroutable {
                    warn!(
                        runner = %self.prefix,
                        destination = %message.destination(),
                        "No shuttle for destination prefix, dropping message"
                    );
                }
                self.metrics.record_dropped(unroutable.len());
            }
            Err(panic) => {
                error!(
                    runner = %self.prefix,
                    count,
                    error = %panic_message(&*panic),
                    "Outgoing shuttle panicked"
                );
            }
        }
    }

    fn shutdown(&mut self) {
        let mut suffixes: Vec<String> = self.actors.keys().cloned().collect();
        suffixes.sort();
        info!(runner = %self.prefix, actors = suffixes.len(), "Runner stopping");

        for suffix in &suffixes {
            if let Some(resident) = self.actors.get(suffix) {
                resident.slot.lock().stopping = true;
            }
            if let TurnOutcome::Failed(reason) = self.turn(suffix, None) {
                error!(runner = %self.prefix, actor = %suffix, error = %reason, "Actor failed while stopping");
            }
            // Stored state survives shutdown
            self.actors.remove(suffix);
        }
        self.flush();

        self.registry.lock().actors.clear();
        let held: usize = self.evicted.drain().map(|(_, evicted)| evicted.held.len()).sum();
        self.metrics.release_held(held);
        self.metrics.record_dropped(held);
        debug!(runner = %self.prefix, "Pump thread exiting");
    }
}

fn poll_once(future: &mut ActorFuture) -> TurnOutcome {
    let waker = noop_waker();
    let mut cx = task::Context::from_waker(&waker);
    match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
        Ok(Poll::Pending) => TurnOutcome::Suspended,
        Ok(Poll::Ready(Ok(()))) => TurnOutcome::Finished,
        Ok(Poll::Ready(Err(e))) => TurnOutcome::Failed(format!("{:#}", e)),
        Err(panic) => TurnOutcome::Failed(panic_message(&*panic)),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::shuttle::test_support::RecordingShuttle;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn payloads(sink: &RecordingShuttle<u32>) -> Vec<u32> {
        sink.received.lock().iter().map(|m| *m.payload()).collect()
    }

    /// Forwards every payload to `sink:out`
    async fn forwarder(ctx: Context<u32>) -> anyhow::Result<()> {
        while let Some(msg) = ctx.recv().await {
            ctx.out(addr("sink:out"), msg.into_payload());
        }
        Ok(())
    }

    fn runner_with_sink() -> (Runner<u32>, Arc<RecordingShuttle<u32>>) {
        let runner = Runner::new("r", RunnerConfig::default()).unwrap();
        let sink = RecordingShuttle::<u32>::new("sink");
        runner.add_outgoing_shuttle(sink.clone()).unwrap();
        (runner, sink)
    }

    /// Running total, checkpointed and forwarded after every message
    fn counter(start: u32) -> impl Actor<u32> {
        move |ctx: Context<u32>| async move {
            let mut total = start;
            while let Some(msg) = ctx.recv().await {
                total += msg.into_payload();
                ctx.checkpoint(&total)?;
                ctx.out(addr("sink:out"), total);
            }
            anyhow::Ok(())
        }
    }

    fn evicting_runner(config: RunnerConfig) -> (Runner<u32>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let persister: Persister<u32> = Persister::new(store.clone());
        let config = RunnerConfig {
            idle_timeout_ms: Some(20),
            ..config
        };
        let runner = Runner::with_persister("r", config, persister).unwrap();
        runner
            .add_outgoing_shuttle(RecordingShuttle::<u32>::new("sink"))
            .unwrap();
        runner.add_actor("sum", counter(0), Some(5)).unwrap();
        wait_for(|| runner.stats().actors_evicted == 1);
        (runner, store)
    }

    fn to(runner: &Runner<u32>, suffix: &str, payload: u32) -> Message<u32> {
        Message::new(addr("test"), runner.actor_address(suffix), payload)
    }

    #[test]
    fn test_priming_message_is_first() {
        let (runner, sink) = runner_with_sink();
        runner.add_actor("fwd", forwarder, Some(7)).unwrap();
        runner.incoming_shuttle().send(vec![to(&runner, "fwd", 8)]);

        wait_for(|| sink.received.lock().len() == 2);
        assert_eq!(payloads(&sink), vec![7, 8]);
        let first = sink.received.lock()[0].clone();
        assert_eq!(first.source(), &addr("r:fwd"));
    }

    #[test]
    fn test_batched_messages_are_delivered_one_per_turn() {
        let (runner, sink) = runner_with_sink();
        runner
            .add_actor(
                "count",
                |ctx: Context<u32>| async move {
                    let mut turns = 0;
                    while let Some(_msg) = ctx.recv().await {
                        turns += 1;
                        ctx.out(addr("sink:out"), turns);
                    }
                    anyhow::Ok(())
                },
                None,
            )
            .unwrap();

        runner
            .incoming_shuttle()
            .send((0..5).map(|i| to(&runner, "count", i)).collect());

        wait_for(|| sink.received.lock().len() == 5);
        assert_eq!(payloads(&sink), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_termination_drops_queued_messages() {
        let (runner, sink) = runner_with_sink();
        runner
            .add_actor(
                "once",
                |ctx: Context<u32>| async move {
                    if let Some(msg) = ctx.recv().await {
                        ctx.out(addr("sink:out"), msg.into_payload());
                    }
                    anyhow::Ok(())
                },
                None,
            )
            .unwrap();

        runner
            .incoming_shuttle()
            .send(vec![to(&runner, "once", 1), to(&runner, "once", 2), to(&runner, "once", 3)]);

        wait_for(|| runner.stats().messages_dropped == 2);
        assert_eq!(payloads(&sink), vec![1]);
        let stats = runner.stats();
        assert_eq!(stats.actors_terminated, 1);
        assert_eq!(stats.live_actors, 0);

        // The suffix is free again
        runner.add_actor("once", forwarder, Some(9)).unwrap();
        wait_for(|| sink.received.lock().len() == 2);
    }

    #[test]
    fn test_failing_actor_does_not_affect_others() {
        let (runner, sink) = runner_with_sink();
        runner
            .add_actor(
                "bad",
                |ctx: Context<u32>| async move {
                    while let Some(msg) = ctx.recv().await {
                        if *msg.payload() == 0 {
                            panic!("cannot handle zero");
                        }
                    }
                    anyhow::Ok(())
                },
                None,
            )
            .unwrap();
        runner
            .add_actor(
                "err",
                |ctx: Context<u32>| async move {
                    if ctx.recv().await.is_some() {
                        anyhow::bail!("refusing work");
                    }
                    anyhow::Ok(())
                },
                None,
            )
            .unwrap();
        runner.add_actor("good", forwarder, None).unwrap();

        runner.incoming_shuttle().send(vec![
            to(&runner, "bad", 0),
            to(&runner, "err", 0),
            to(&runner, "good", 5),
        ]);

        wait_for(|| sink.received.lock().len() == 1);
        wait_for(|| runner.stats().actors_failed == 2);
        assert_eq!(runner.stats().live_actors, 1);
    }

    #[test]
    fn test_unroutable_output_is_dropped() {
        let (runner, sink) = runner_with_sink();
        runner
            .add_actor(
                "mixed",
                |ctx: Context<u32>| async move {
                    while let Some(msg) = ctx.recv().await {
                        ctx.out(addr("nowhere:x"), 0);
                        ctx.out(addr("sink:out"), msg.into_payload());
                    }
                    anyhow::Ok(())
                },
                None,
            )
            .unwrap();

        runner.incoming_shuttle().send(vec![to(&runner, "mixed", 3)]);
        wait_for(|| sink.received.lock().len() == 1);
        assert_eq!(runner.stats().messages_dropped, 1);
    }

    #[test]
    fn test_own_prefix_traffic_loops_back() {
        let (runner, sink) = runner_with_sink();
        runner.add_actor("fwd", forwarder, None).unwrap();
        runner
            .add_actor(
                "relay",
                |ctx: Context<u32>| async move {
                    while let Some(msg) = ctx.recv().await {
                        ctx.out(addr("r:fwd"), msg.into_payload() * 10);
                    }
                    anyhow::Ok(())
                },
                None,
            )
            .unwrap();

        runner.incoming_shuttle().send(vec![to(&runner, "relay", 4)]);
        wait_for(|| sink.received.lock().len() == 1);
        assert_eq!(payloads(&sink), vec![40]);
    }

    #[test]
    fn test_registration_errors_are_synchronous() {
        let (runner, _sink) = runner_with_sink();
        runner.add_actor("a", forwarder, None).unwrap();

        assert!(runner.add_actor("a", forwarder, None).unwrap_err().is_configuration());
        assert!(runner.add_actor("", forwarder, None).unwrap_err().is_configuration());
        assert!(runner.remove_actor("ghost").unwrap_err().is_configuration());
        assert!(runner
            .add_outgoing_shuttle(RecordingShuttle::<u32>::new("sink"))
            .unwrap_err()
            .is_configuration());
        assert!(runner.remove_outgoing_shuttle("ghost").unwrap_err().is_configuration());
        runner.remove_outgoing_shuttle("sink").unwrap();
        runner.add_outgoing_shuttle(RecordingShuttle::<u32>::new("sink")).unwrap();
        assert!(Runner::<u32>::new("", RunnerConfig::default()).is_err());
    }

    #[test]
    fn test_remove_actor_runs_final_turn() {
        let (runner, sink) = runner_with_sink();
        runner
            .add_actor(
                "polite",
                |ctx: Context<u32>| async move {
                    while ctx.recv().await.is_some() {}
                    ctx.out(addr("sink:out"), 99);
                    anyhow::Ok(())
                },
                None,
            )
            .unwrap();

        runner.remove_actor("polite").unwrap();
        wait_for(|| sink.received.lock().len() == 1);
        assert_eq!(payloads(&sink), vec![99]);
        wait_for(|| runner.stats().live_actors == 0);
    }

    #[test]
    fn test_close_notifies_resident_actors() {
        let (runner, sink) = runner_with_sink();
        for suffix in ["a", "b"] {
            runner
                .add_actor(
                    suffix,
                    |ctx: Context<u32>| async move {
                        while ctx.recv().await.is_some() {}
                        assert!(ctx.is_stopping());
                        ctx.out(addr("sink:out"), 0);
                        anyhow::Ok(())
                    },
                    None,
                )
                .unwrap();
        }
        wait_for(|| runner.stats().actors_started == 2);

        runner.close();
        assert_eq!(sink.received.lock().len(), 2);
        assert!(runner.is_closed());
        assert!(runner.add_actor("c", forwarder, None).is_err());
    }

    #[test]
    fn test_idle_actor_is_evicted_and_resumed() {
        let store = Arc::new(MemoryStore::new());
        let persister: Persister<u32> = Persister::new(store.clone());
        let config = RunnerConfig {
            idle_timeout_ms: Some(20),
            ..RunnerConfig::default()
        };
        let runner = Runner::with_persister("r", config, persister.clone()).unwrap();
        let sink = RecordingShuttle::<u32>::new("sink");
        runner.add_outgoing_shuttle(sink.clone()).unwrap();

        runner.add_actor("sum", counter(0), Some(5)).unwrap();
        wait_for(|| runner.stats().actors_evicted == 1);
        assert!(store.contains(&addr("r:sum")));
        assert_eq!(runner.stats().live_actors, 0);

        // Two messages: one handed to the store, one held by the runner
        runner
            .incoming_shuttle()
            .send(vec![to(&runner, "sum", 1), to(&runner, "sum", 2)]);

        let work = persister.take().unwrap();
        assert_eq!(work.address, addr("r:sum"));
        assert_eq!(*work.message.payload(), 1);
        let restored: u32 = work.restore().unwrap();
        assert_eq!(restored, 5);

        runner
            .resume_actor("sum", counter(restored), work.message)
            .unwrap();
        wait_for(|| sink.received.lock().len() == 3);
        assert_eq!(payloads(&sink), vec![5, 6, 8]);
    }

    #[test]
    fn test_held_backlog_is_capped() {
        let config = RunnerConfig {
            max_held: 8,
            ..RunnerConfig::default()
        };
        let (runner, store) = evicting_runner(config);

        // Nobody resumes the actor: one message goes to the store, eight are held
        let messages = (0..100).map(|i| to(&runner, "sum", i)).collect();
        runner.incoming_shuttle().send(messages);

        wait_for(|| runner.stats().messages_dropped == 91);
        let stats = runner.stats();
        assert_eq!(stats.messages_held, 8);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_held_backlog_expires_without_resume() {
        let config = RunnerConfig {
            held_timeout_ms: 50,
            ..RunnerConfig::default()
        };
        let (runner, store) = evicting_runner(config);

        runner.incoming_shuttle().send(vec![
            to(&runner, "sum", 1),
            to(&runner, "sum", 2),
            to(&runner, "sum", 3),
        ]);
        wait_for(|| runner.stats().messages_held == 2);

        wait_for(|| runner.stats().messages_held == 0);
        assert_eq!(runner.stats().messages_dropped, 2);
        // The stored work unit is untouched
        assert!(store.contains(&addr("r:sum")));

        // Later traffic is held again under a fresh deadline
        runner.incoming_shuttle().send(vec![to(&runner, "sum", 4)]);
        wait_for(|| runner.stats().messages_held == 1);
    }

    #[test]
    fn test_resume_releases_held_backlog() {
        let store = Arc::new(MemoryStore::new());
        let persister: Persister<u32> = Persister::new(store.clone());
        let config = RunnerConfig {
            idle_timeout_ms: Some(20),
            ..RunnerConfig::default()
        };
        let runner = Runner::with_persister("r", config, persister.clone()).unwrap();
        let sink = RecordingShuttle::<u32>::new("sink");
        runner.add_outgoing_shuttle(sink.clone()).unwrap();
        runner.add_actor("sum", counter(0), Some(0)).unwrap();
        wait_for(|| runner.stats().actors_evicted == 1);

        runner
            .incoming_shuttle()
            .send(vec![to(&runner, "sum", 1), to(&runner, "sum", 2)]);
        wait_for(|| runner.stats().messages_held == 1);

        let work = persister.take().unwrap();
        let restored: u32 = work.restore().unwrap();
        runner
            .resume_actor("sum", counter(restored), work.message)
            .unwrap();
        wait_for(|| sink.received.lock().len() == 3);
        assert_eq!(payloads(&sink), vec![0, 1, 3]);

        let stats = runner.stats();
        assert_eq!(stats.messages_held, 0);
        assert_eq!(stats.messages_dropped, 0);
    }

    #[test]
    fn test_zero_held_timeout_is_rejected() {
        let config = RunnerConfig {
            held_timeout_ms: 0,
            ..RunnerConfig::default()
        };
        assert!(Runner::<u32>::new("r", config).is_err());
    }
}
