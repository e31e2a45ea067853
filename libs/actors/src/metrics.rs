//! Runner Metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters updated by a runner's pump thread
#[derive(Debug, Default)]
pub struct RunnerMetrics {
    pub actors_started: AtomicU64,
    pub actors_terminated: AtomicU64,
    pub actors_failed: AtomicU64,
    pub actors_evicted: AtomicU64,
    pub messages_delivered: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub messages_sent: AtomicU64,
    /// Gauge: messages waiting for an evicted actor to be resumed
    pub messages_held: AtomicU64,
    pub turns_executed: AtomicU64,
    pub total_turn_time_ns: AtomicU64,
}

impl RunnerMetrics {
    pub fn record_turn(&self, duration: Duration) {
        self.turns_executed.fetch_add(1, Ordering::Relaxed);
        self.total_turn_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: usize) {
        self.messages_dropped
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_held(&self, count: usize) {
        self.messages_held.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn release_held(&self, count: usize) {
        self.messages_held.fetch_sub(count as u64, Ordering::Relaxed);
    }

    pub fn record_sent(&self, count: usize) {
        self.messages_sent.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, live_actors: usize) -> RunnerStats {
        let turns = self.turns_executed.load(Ordering::Relaxed);
        let total_ns = self.total_turn_time_ns.load(Ordering::Relaxed);
        let avg_turn_time_ns = if turns > 0 {
            total_ns as f64 / turns as f64
        } else {
            0.0
        };

        RunnerStats {
            live_actors,
            actors_started: self.actors_started.load(Ordering::Relaxed),
            actors_terminated: self.actors_terminated.load(Ordering::Relaxed),
            actors_failed: self.actors_failed.load(Ordering::Relaxed),
            actors_evicted: self.actors_evicted.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_held: self.messages_held.load(Ordering::Relaxed),
            turns_executed: turns,
            avg_turn_time_ns,
        }
    }
}

/// Point-in-time view of a runner
#[derive(Debug, Clone)]
pub struct RunnerStats {
    pub live_actors: usize,
    pub actors_started: u64,
    pub actors_terminated: u64,
    pub actors_failed: u64,
    pub actors_evicted: u64,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub messages_sent: u64,
    pub messages_held: u64,
    pub turns_executed: u64,
    pub avg_turn_time_ns: f64,
}
