//! End-to-End Test Fixtures for Courier
//!
//! Builds complete topologies (several runners plus the timer, direct and
//! log gateways, fully wired) and provides the actor bodies the scenarios
//! in `tests/` run on them.

pub mod scenarios;
pub mod topology;

pub use scenarios::{echo, ring_node, Wire};
pub use topology::{RunnerReport, Topology, TopologyReport, DIRECT, LOG, TIMER};
