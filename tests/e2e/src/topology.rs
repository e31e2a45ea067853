//! Fully wired multi-runner topology

use anyhow::{bail, Context, Result};
use courier_actors::{
    connect, DirectGateway, LogGateway, Payload, Runner, RunnerStats, TimerGateway,
};
use courier_config::RuntimeConfig;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

pub const TIMER: &str = "timer";
pub const DIRECT: &str = "direct";
pub const LOG: &str = "log";

/// Runners connected to each other and to one instance of every gateway.
///
/// Routes:
/// - runner -> every other runner, timer, direct, log
/// - timer -> every runner, direct
/// - direct -> every runner, timer
pub struct Topology<P: Payload> {
    runners: Vec<Runner<P>>,
    timer: TimerGateway<P>,
    direct: DirectGateway<P>,
    log: LogGateway<P>,
}

impl<P: Payload> Topology<P> {
    pub fn build(prefixes: &[&str], config: &RuntimeConfig) -> Result<Self> {
        for prefix in prefixes {
            if [TIMER, DIRECT, LOG].contains(prefix) {
                bail!("Runner prefix '{}' is reserved for a gateway", prefix);
            }
        }

        let runners = prefixes
            .iter()
            .map(|prefix| {
                let mut runner_config = config.runner.clone();
                runner_config.name = Some(format!("e2e-{}", prefix));
                Runner::new(prefix, runner_config)
                    .with_context(|| format!("Failed to start runner '{}'", prefix))
            })
            .collect::<Result<Vec<_>>>()?;
        let timer = TimerGateway::new(TIMER, &config.timer)?;
        let direct = DirectGateway::new(DIRECT, &config.direct)?;
        let log = LogGateway::new(LOG, &config.log_gateway, config.pump.clone())?;

        for runner in &runners {
            for other in runners.iter().filter(|o| o.prefix() != runner.prefix()) {
                connect(runner, other)?;
            }
            connect(runner, &timer)?;
            connect(runner, &direct)?;
            connect(runner, &log)?;
            connect(&timer, runner)?;
            connect(&direct, runner)?;
        }
        connect(&timer, &direct)?;
        connect(&direct, &timer)?;

        info!(runners = runners.len(), "Topology wired");
        Ok(Self {
            runners,
            timer,
            direct,
            log,
        })
    }

    pub fn runner(&self, prefix: &str) -> Result<&Runner<P>> {
        self.runners
            .iter()
            .find(|r| r.prefix() == prefix)
            .with_context(|| format!("No runner '{}' in topology", prefix))
    }

    pub fn runners(&self) -> &[Runner<P>] {
        &self.runners
    }

    pub fn timer(&self) -> &TimerGateway<P> {
        &self.timer
    }

    pub fn direct(&self) -> &DirectGateway<P> {
        &self.direct
    }

    pub fn log(&self) -> &LogGateway<P> {
        &self.log
    }

    /// Wait until no runner has resident actors, or `timeout` passes
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.runners.iter().all(|r| r.stats().live_actors == 0) {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    pub fn report(&self) -> TopologyReport {
        let log = self.log.stats();
        TopologyReport {
            runners: self
                .runners
                .iter()
                .map(|r| RunnerReport::new(r.prefix(), r.stats()))
                .collect(),
            log_forwarded: log.forwarded,
            log_dropped: log.dropped,
        }
    }

    /// Close gateways first so nothing new arrives, then the runners
    pub fn close(&self) {
        self.timer.close();
        self.direct.close();
        for runner in &self.runners {
            runner.close();
        }
        self.log.close();
    }
}

/// Per-runner counters in a form that serializes for test output
#[derive(Debug, Clone, Serialize)]
pub struct RunnerReport {
    pub prefix: String,
    pub live_actors: usize,
    pub started: u64,
    pub terminated: u64,
    pub failed: u64,
    pub evicted: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub sent: u64,
    pub held: u64,
    pub turns: u64,
    pub avg_turn_time_ns: f64,
}

impl RunnerReport {
    fn new(prefix: &str, stats: RunnerStats) -> Self {
        Self {
            prefix: prefix.to_string(),
            live_actors: stats.live_actors,
            started: stats.actors_started,
            terminated: stats.actors_terminated,
            failed: stats.actors_failed,
            evicted: stats.actors_evicted,
            delivered: stats.messages_delivered,
            dropped: stats.messages_dropped,
            sent: stats.messages_sent,
            held: stats.messages_held,
            turns: stats.turns_executed,
            avg_turn_time_ns: stats.avg_turn_time_ns,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TopologyReport {
    pub runners: Vec<RunnerReport>,
    pub log_forwarded: u64,
    pub log_dropped: u64,
}

impl TopologyReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn total_delivered(&self) -> u64 {
        self.runners.iter().map(|r| r.delivered).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.runners.iter().map(|r| r.failed).sum()
    }
}
