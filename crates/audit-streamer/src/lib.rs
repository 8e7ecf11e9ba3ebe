#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **audit-streamer** – Real-time subscriber fan-out, per spec §4.7.
//!
//! Accepts long-lived subscriber connections, filters sealed events
//! against each connection's predicate set, rate-limits per connection
//! with a lazily-refilled token bucket, and fans events out without ever
//! letting one slow consumer block another. Reads exclusively from the
//! publisher bus (`audit-store::BroadcastPublisher`); never touches the
//! store.

/// Per-connection token bucket rate limiting.
pub mod bucket;
/// Connection record and the concurrent connection registry.
pub mod connection;
/// Dispatch loop: drains the publisher and fans events out to matches.
pub mod dispatcher;
/// Wire frame types for the subscribe transport (spec §6).
pub mod frame;
/// Top-level streamer: accept/disconnect, client-frame handling, shutdown.
pub mod streamer;

pub use bucket::TokenBucket;
pub use connection::{Connection, ConnectionRegistry};
pub use dispatcher::Dispatcher;
pub use frame::{ClientFrame, FilterPredicates, ServerFrame};
pub use streamer::{AcceptOutcome, Streamer};
