//! Courier Actor Runtime
//!
//! Message-passing runtime where actors exchange [`Message`]s addressed by
//! hierarchical [`Address`]es. Components are wired together through
//! [`Shuttle`]s keyed by the first address segment.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   shuttle "b"   ┌──────────────────────┐
//! │ Runner "a"           │ ──────────────▶ │ Runner "b"           │
//! │  Bus ─▶ pump thread  │                 │  Bus ─▶ pump thread  │
//! │   a:echo  a:client   │ ◀────────────── │   b:worker           │
//! └──────────┬───────────┘   shuttle "a"   └──────────────────────┘
//!            │ shuttle "timer"
//!            ▼
//! ┌──────────────────────┐
//! │ TimerGateway "timer" │  timer:<ms>:a:client ─▶ a:client after <ms>
//! └──────────────────────┘
//! ```
//!
//! - [`Runner`]: one pump thread, many actors, one turn at a time
//! - [`Context`]: what an actor body uses to `recv`, `out` and `checkpoint`
//! - [`gateway`]: timer, direct (blocking test bridge) and log components
//! - [`persistence`]: checkpoint store contract used for idle eviction
//!
//! # Examples
//!
//! ```rust,no_run
//! use courier_actors::{connect, Context, DirectGateway, Runner};
//! use courier_config::{DirectConfig, RunnerConfig};
//! use courier_types::Message;
//!
//! async fn echo(ctx: Context<String>) -> anyhow::Result<()> {
//!     while let Some(msg) = ctx.recv().await {
//!         let (source, _, payload) = msg.into_parts();
//!         ctx.out(source, payload);
//!     }
//!     Ok(())
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! let runner = Runner::new("svc", RunnerConfig::default())?;
//! let direct = DirectGateway::new("direct", &DirectConfig::default())?;
//! connect(&runner, &direct)?;
//! connect(&direct, &runner)?;
//!
//! runner.add_actor("echo", echo, None)?;
//! let inbox = direct.open_inbox()?;
//! let reply = direct.write_and_read(Message::new(
//!     inbox,
//!     runner.actor_address("echo"),
//!     "ping".to_string(),
//! ))?;
//! assert_eq!(reply.map(|m| m.into_payload()).as_deref(), Some("ping"));
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod bus;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod persistence;
pub mod pump;
pub mod runner;
pub mod shuttle;

pub use actor::{Actor, ActorFuture, Context, Payload, Recv};
pub use bus::Bus;
pub use error::{Result, RuntimeError, StoreError};
pub use gateway::{
    connect, schedule_address, DirectGateway, InputGateway, LogGateway, OutputGateway,
    TimerGateway,
};
pub use metrics::{RunnerMetrics, RunnerStats};
pub use persistence::{MemoryStore, Persister, ResumedWork, RetryingStore, Store, WorkUnit};
pub use pump::{PumpShuttle, PumpStats};
pub use runner::Runner;
pub use shuttle::{Shuttle, ShuttleTable};

// Re-exported so actor code needs a single import
pub use courier_types::{Address, Message};
