//! Buffered Forwarding Shuttle
//!
//! Wraps a shuttle whose `send` may be slow (log sinks, encoders, network
//! writers) so that callers never wait on it. Messages are queued on an
//! internal [`Bus`] and forwarded in batches by a dedicated thread.
//!
//! The buffer is bounded by `capacity`; overflow is dropped and counted.
//! Crossing `high_water_mark` logs a warning once per excursion (the flag
//! re-arms after the queue drains below half the mark).

use crate::actor::Payload;
use crate::bus::Bus;
use crate::error::{Result, RuntimeError};
use crate::shuttle::Shuttle;
use courier_config::PumpConfig;
use courier_types::Message;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Counters exposed by [`PumpShuttle::stats`]
#[derive(Debug, Default)]
struct PumpMetrics {
    accepted: AtomicU64,
    forwarded: AtomicU64,
    dropped: AtomicU64,
    high_water_events: AtomicU64,
}

/// Snapshot of pump activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub queued: usize,
    pub accepted: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub high_water_events: u64,
}

/// Bounded, monitored buffer in front of a slow shuttle
pub struct PumpShuttle<P: Payload> {
    prefix: String,
    bus: Arc<Bus<Message<P>>>,
    config: PumpConfig,
    metrics: Arc<PumpMetrics>,
    above_high_water: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Payload> PumpShuttle<P> {
    /// Start the forwarding thread for `inner`
    pub fn new(inner: Arc<dyn Shuttle<P>>, config: PumpConfig) -> Result<Self> {
        if config.capacity == 0
            || config.high_water_mark == 0
            || config.high_water_mark > config.capacity
        {
            return Err(RuntimeError::configuration(
                format!(
                    "Invalid pump bounds: capacity {} high_water_mark {}",
                    config.capacity, config.high_water_mark
                ),
                Some("pump"),
            ));
        }

        let prefix = inner.prefix().to_string();
        let bus = Arc::new(Bus::new());
        let metrics = Arc::new(PumpMetrics::default());

        let worker = {
            let bus = Arc::clone(&bus);
            let metrics = Arc::clone(&metrics);
            thread::Builder::new()
                .name(format!("pump-{}", prefix))
                .spawn(move || forward_loop(inner, bus, metrics))?
        };

        info!(prefix = %prefix, capacity = config.capacity, "Pump shuttle started");

        Ok(Self {
            prefix,
            bus,
            config,
            metrics,
            above_high_water: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn stats(&self) -> PumpStats {
        PumpStats {
            queued: self.bus.len(),
            accepted: self.metrics.accepted.load(Ordering::Relaxed),
            forwarded: self.metrics.forwarded.load(Ordering::Relaxed),
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
            high_water_events: self.metrics.high_water_events.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting messages and join the forwarding thread.
    /// Anything still buffered is discarded.
    pub fn close(&self) {
        self.bus.close();
        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!(prefix = %self.prefix, "Pump thread terminated abnormally");
            }
            debug!(prefix = %self.prefix, "Pump shuttle closed");
        }
    }

    fn check_high_water(&self, depth: usize) {
        if depth >= self.config.high_water_mark {
            if !self.above_high_water.swap(true, Ordering::Relaxed) {
                self.metrics.high_water_events.fetch_add(1, Ordering::Relaxed);
                warn!(
                    prefix = %self.prefix,
                    depth,
                    high_water_mark = self.config.high_water_mark,
                    "Pump shuttle above high-water mark, downstream is slow"
                );
            }
        } else if depth < self.config.high_water_mark / 2 {
            self.above_high_water.store(false, Ordering::Relaxed);
        }
    }
}

impl<P: Payload> Shuttle<P> for PumpShuttle<P> {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn send(&self, messages: Vec<Message<P>>) {
        let offered = messages.len();
        let (depth, rejected) = self.bus.add_bounded(messages, self.config.capacity);

        let dropped = rejected.len();
        if dropped > 0 {
            self.metrics.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
            warn!(
                prefix = %self.prefix,
                dropped,
                capacity = self.config.capacity,
                "Pump shuttle full, dropping messages"
            );
        }

        let count = offered - dropped;
        if count > 0 {
            self.metrics.accepted.fetch_add(count as u64, Ordering::Relaxed);
        }
        self.check_high_water(depth);
    }
}

impl<P: Payload> Drop for PumpShuttle<P> {
    fn drop(&mut self) {
        self.close();
    }
}

fn forward_loop<P: Payload>(
    inner: Arc<dyn Shuttle<P>>,
    bus: Arc<Bus<Message<P>>>,
    metrics: Arc<PumpMetrics>,
) {
    loop {
        let batch = bus.pull();
        if batch.is_empty() {
            if bus.is_closed() {
                break;
            }
            continue;
        }

        let count = batch.len() as u64;
        match panic::catch_unwind(AssertUnwindSafe(|| inner.send(batch))) {
            Ok(()) => {
                metrics.forwarded.fetch_add(count, Ordering::Relaxed);
            }
            Err(_) => {
                metrics.dropped.fetch_add(count, Ordering::Relaxed);
                error!(prefix = %inner.prefix(), count, "Downstream shuttle panicked, batch dropped");
            }
        }
    }
}
