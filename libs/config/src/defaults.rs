//! Default values shared by runners and gateways
//!
//! Every configurable section falls back to these when a field is omitted.

/// Runner defaults
pub mod runner {
    /// Maximum messages pulled from a runner's bus per pump iteration
    pub const MAX_BATCH: usize = 1_024;

    /// Messages a runner keeps for an evicted actor awaiting resumption
    pub const MAX_HELD: usize = 1_024;

    /// How long a handed-off actor may wait for resumption before its held
    /// messages are dropped
    pub const HELD_TIMEOUT_MS: u64 = 30_000;
}

/// Pump shuttle defaults
pub mod pump {
    /// Messages buffered before new ones are dropped
    pub const CAPACITY: usize = 100_000;

    /// Queue depth at which a warning is logged
    pub const HIGH_WATER_MARK: usize = 10_000;
}

/// Timer gateway defaults
pub mod timer {
    /// Worker threads driving scheduled deliveries
    pub const WORKER_THREADS: usize = 1;
}

/// Direct gateway defaults
pub mod direct {
    /// Blocking read timeout used by convenience readers (milliseconds)
    pub const READ_TIMEOUT_MS: u64 = 5_000;
}

/// Persistence defaults
pub mod persistence {
    /// Attempts made for a store operation before giving up
    pub const MAX_ATTEMPTS: u32 = 5;

    /// Linear backoff step between attempts (milliseconds)
    pub const RETRY_BACKOFF_MS: u64 = 50;
}

/// Logging defaults
pub mod logging {
    pub const LEVEL: &str = "info";
}
