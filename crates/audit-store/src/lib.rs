#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **audit-store** – External collaborator contracts (store, cache,
//! publisher) plus in-memory reference implementations, per spec §6.
//!
//! Production deployments substitute a real transactional store/cache; the
//! core pipeline (`audit-batch`, `audit-integrity`) only ever depends on
//! these trait objects.

/// Filtered-query criteria shared by `Store::query`/`Store::count`.
pub mod query;
/// The durable store contract + in-memory reference implementation.
pub mod store;
/// The best-effort cache contract + in-memory reference implementation.
pub mod cache;
/// The fire-and-forget publisher contract + broadcast-backed implementation.
pub mod publisher;

pub use cache::{Cache, InMemoryCache};
pub use publisher::{BroadcastPublisher, Publisher};
pub use query::{QueryCriteria, SortOrder};
pub use store::{InMemoryStore, Store};
