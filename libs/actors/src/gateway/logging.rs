use super::InputGateway;
use crate::actor::Payload;
use crate::error::{Result, RuntimeError};
use crate::pump::{PumpShuttle, PumpStats};
use crate::shuttle::Shuttle;
use courier_config::logging::parse_level;
use courier_config::{LogGatewayConfig, PumpConfig};
use courier_types::Message;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn, Level};

/// Consume-only sink that writes every message it receives to the log.
///
/// Logging runs on a pump thread so senders never wait on the subscriber.
pub struct LogGateway<P: Payload> {
    prefix: String,
    pump: Arc<PumpShuttle<P>>,
}

impl<P: Payload> LogGateway<P> {
    pub fn new(prefix: &str, config: &LogGatewayConfig, pump: PumpConfig) -> Result<Self> {
        let level = parse_level(&config.level)
            .map_err(|e| RuntimeError::configuration(e.to_string(), Some("log_gateway.level")))?;
        let sink = Arc::new(LogSink::<P> {
            prefix: prefix.to_string(),
            level,
            payload: PhantomData,
        });
        let pump = Arc::new(PumpShuttle::new(sink, pump)?);
        info!(prefix = %prefix, level = %level, "Log gateway started");
        Ok(Self {
            prefix: prefix.to_string(),
            pump,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn stats(&self) -> PumpStats {
        self.pump.stats()
    }

    pub fn close(&self) {
        self.pump.close();
    }
}

impl<P: Payload> InputGateway<P> for LogGateway<P> {
    fn incoming_shuttle(&self) -> Arc<dyn Shuttle<P>> {
        self.pump.clone()
    }
}

struct LogSink<P> {
    prefix: String,
    level: Level,
    payload: PhantomData<fn(P)>,
}

impl<P: Payload> Shuttle<P> for LogSink<P> {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn send(&self, messages: Vec<Message<P>>) {
        for message in &messages {
            let source = message.source();
            let destination = message.destination();
            let payload = message.payload();
            if self.level == Level::ERROR {
                error!(%source, %destination, ?payload, "message");
            } else if self.level == Level::WARN {
                warn!(%source, %destination, ?payload, "message");
            } else if self.level == Level::INFO {
                info!(%source, %destination, ?payload, "message");
            } else if self.level == Level::DEBUG {
                debug!(%source, %destination, ?payload, "message");
            } else {
                trace!(%source, %destination, ?payload, "message");
            }
        }
    }
}
