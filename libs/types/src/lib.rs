//! # Courier Core Types
//!
//! Value types shared by every courier component:
//!
//! - [`Address`]: hierarchical, escaped, prefix-routable identifiers
//! - [`Message`]: a payload travelling between two addresses
//! - [`TimeoutManager`]: ordered expiry tracking with O(log n) arming
//!
//! These types carry no threads, locks, or I/O. The runtime that moves
//! messages around lives in `courier-actors`.

pub mod address;
pub mod error;
pub mod message;
pub mod timeout;

pub use address::Address;
pub use error::AddressError;
pub use message::Message;
pub use timeout::{ProcessResult, TimeoutManager};
