use super::{InputGateway, OutputGateway, SharedRoutes};
use crate::actor::Payload;
use crate::error::{Result, RuntimeError};
use crate::runner::panic_message;
use crate::shuttle::Shuttle;
use courier_config::TimerConfig;
use courier_types::{Address, Message};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, error, info, warn};

/// Address that makes a timer gateway deliver to `target` after `delay`
pub fn schedule_address(timer_prefix: &str, delay: Duration, target: &Address) -> Address {
    Address::from_segment(timer_prefix)
        .append_segment(delay.as_millis().to_string())
        .append(target)
}

/// Delays messages addressed `<prefix>:<delay ms>:<target...>`.
///
/// The forwarded message keeps the payload, is addressed to `<target...>`,
/// and carries the full timer address as its source. Scheduled deliveries
/// run on a private tokio runtime that is shut down by [`close`](Self::close);
/// anything still pending at that point is never delivered.
pub struct TimerGateway<P: Payload> {
    prefix: String,
    routes: Arc<SharedRoutes<P>>,
    closed: Arc<AtomicBool>,
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
}

impl<P: Payload> TimerGateway<P> {
    pub fn new(prefix: &str, config: &TimerConfig) -> Result<Self> {
        if prefix.is_empty() {
            return Err(RuntimeError::configuration(
                "Timer prefix must not be empty",
                Some("prefix"),
            ));
        }
        if config.worker_threads == 0 {
            return Err(RuntimeError::configuration(
                "Timer gateway needs at least one worker thread",
                Some("timer.worker_threads"),
            ));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name(format!("{}-timer", prefix))
            .enable_time()
            .build()?;

        info!(prefix = %prefix, workers = config.worker_threads, "Timer gateway started");

        Ok(Self {
            prefix: prefix.to_string(),
            routes: Arc::new(SharedRoutes::new()),
            closed: Arc::new(AtomicBool::new(false)),
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// See [`schedule_address`]
    pub fn address_for(&self, delay: Duration, target: &Address) -> Address {
        schedule_address(&self.prefix, delay, target)
    }

    /// Drop every pending delivery and stop the worker threads
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
            info!(prefix = %self.prefix, "Timer gateway closed");
        }
    }
}

impl<P: Payload> InputGateway<P> for TimerGateway<P> {
    fn incoming_shuttle(&self) -> Arc<dyn Shuttle<P>> {
        Arc::new(TimerShuttle {
            prefix: self.prefix.clone(),
            routes: Arc::clone(&self.routes),
            closed: Arc::clone(&self.closed),
            handle: self.handle.clone(),
        })
    }
}

impl<P: Payload> OutputGateway<P> for TimerGateway<P> {
    fn add_outgoing_shuttle(&self, shuttle: Arc<dyn Shuttle<P>>) -> Result<()> {
        self.routes.add(shuttle)
    }

    fn remove_outgoing_shuttle(&self, prefix: &str) -> Result<()> {
        self.routes.remove(prefix)
    }
}

impl<P: Payload> Drop for TimerGateway<P> {
    fn drop(&mut self) {
        self.close();
    }
}

struct TimerShuttle<P: Payload> {
    prefix: String,
    routes: Arc<SharedRoutes<P>>,
    closed: Arc<AtomicBool>,
    handle: Handle,
}

impl<P: Payload> Shuttle<P> for TimerShuttle<P> {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn send(&self, messages: Vec<Message<P>>) {
        if self.closed.load(Ordering::Acquire) {
            debug!(prefix = %self.prefix, count = messages.len(), "Timer gateway closed, dropping");
            return;
        }

        for message in messages {
            let (delay, target) = match parse_schedule(message.destination()) {
                Ok(parsed) => parsed,
                Err(reason) => {
                    warn!(
                        prefix = %self.prefix,
                        destination = %message.destination(),
                        reason = %reason,
                        "Malformed timer destination, dropping"
                    );
                    continue;
                }
            };

            let (_, timer_address, payload) = message.into_parts();
            let forwarded = Message::new(timer_address, target, payload);
            let routes = Arc::clone(&self.routes);
            let prefix = self.prefix.clone();
            self.handle.spawn(async move {
                tokio::time::sleep(delay).await;
                fire(&prefix, &routes, forwarded);
            });
        }
    }
}

fn fire<P: Payload>(prefix: &str, routes: &SharedRoutes<P>, message: Message<P>) {
    let destination = message.destination().clone();
    match panic::catch_unwind(AssertUnwindSafe(|| routes.route(vec![message]))) {
        Ok(unroutable) if unroutable.is_empty() => {
            debug!(prefix = %prefix, destination = %destination, "Timer fired");
        }
        Ok(_) => {
            warn!(prefix = %prefix, destination = %destination, "No shuttle for timer target, dropping");
        }
        Err(panic) => {
            error!(
                prefix = %prefix,
                destination = %destination,
                error = %panic_message(&*panic),
                "Shuttle panicked while delivering timer"
            );
        }
    }
}

/// Split `<prefix>:<delay ms>:<target...>`
fn parse_schedule(destination: &Address) -> std::result::Result<(Duration, Address), String> {
    let delay = destination
        .segment(1)
        .ok_or_else(|| "missing delay segment".to_string())?;
    let millis: u64 = delay
        .parse()
        .map_err(|_| format!("delay '{}' is not a whole number of milliseconds", delay))?;
    let target = Address::of(destination.segments()[2..].iter().cloned())
        .map_err(|_| "missing target address".to_string())?;
    Ok((Duration::from_millis(millis), target))
}
