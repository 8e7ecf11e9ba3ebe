use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use audit_types::Filter;

use crate::bucket::TokenBucket;
use crate::frame::ServerFrame;

/// A long-lived subscriber connection record, per spec §3: identity,
/// owning user, filter set, rate limiter, timestamps, and counters.
pub struct Connection {
    /// Unique connection id, assigned on accept.
    pub id: Uuid,
    /// The authenticated user owning this connection, if any.
    pub user: Option<String>,
    /// Named filters, keyed by name so `add_filter`/`remove_filter` can
    /// replace or drop one without disturbing the others.
    filters: Mutex<std::collections::HashMap<String, Filter>>,
    /// Per-connection token bucket (spec §4.7).
    pub rate_limiter: TokenBucket,
    /// Outgoing mailbox the dispatcher enqueues onto; the transport shim
    /// drains this and writes frames to the wire.
    outgoing: mpsc::Sender<ServerFrame>,
    created_at: chrono::DateTime<Utc>,
    last_active_millis: AtomicI64,
    events_delivered: std::sync::atomic::AtomicU64,
    events_rate_limited: std::sync::atomic::AtomicU64,
    events_mailbox_dropped: std::sync::atomic::AtomicU64,
}

impl Connection {
    /// Construct a new connection record with an empty filter set and a
    /// full token bucket. Returns the record plus the receiving half of
    /// its outgoing mailbox, which the transport shim owns.
    pub fn new(
        user: Option<String>,
        mailbox_capacity: usize,
        rate_limit_capacity: u64,
        rate_limit_refill_per_second: f64,
    ) -> (Arc<Self>, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
        let connection = Arc::new(Self {
            id: Uuid::new_v4(),
            user,
            filters: Mutex::new(std::collections::HashMap::new()),
            rate_limiter: TokenBucket::new(rate_limit_capacity, rate_limit_refill_per_second),
            outgoing: tx,
            created_at: Utc::now(),
            last_active_millis: AtomicI64::new(Utc::now().timestamp_millis()),
            events_delivered: Default::default(),
            events_rate_limited: Default::default(),
            events_mailbox_dropped: Default::default(),
        });
        (connection, rx)
    }

    /// Register or replace a named filter.
    pub async fn add_filter(&self, filter: Filter) {
        self.touch();
        self.filters.lock().await.insert(filter.name.clone(), filter);
    }

    /// Remove a named filter. A no-op if the name is unknown.
    pub async fn remove_filter(&self, name: &str) {
        self.touch();
        self.filters.lock().await.remove(name);
    }

    /// Snapshot the current filter set for matching.
    pub async fn filters_snapshot(&self) -> Vec<Filter> {
        self.filters.lock().await.values().cloned().collect()
    }

    /// Attempt to enqueue a frame without blocking. `true` if the mailbox
    /// accepted it; `false` if the mailbox was full (slow consumer).
    pub fn try_send(&self, frame: ServerFrame) -> bool {
        match self.outgoing.try_send(frame) {
            Ok(()) => {
                self.events_delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.events_mailbox_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Record that a matching event was dropped for this connection due to
    /// an empty rate-limit bucket.
    pub fn record_rate_limited(&self) {
        self.events_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark the connection active now (any client message or accepted
    /// event delivery counts).
    pub fn touch(&self) {
        self.last_active_millis.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Milliseconds since the connection was last active.
    pub fn idle_for(&self) -> std::time::Duration {
        let last = self.last_active_millis.load(Ordering::Relaxed);
        let now = Utc::now().timestamp_millis();
        std::time::Duration::from_millis(now.saturating_sub(last).max(0) as u64)
    }

    /// When the connection was created.
    pub fn created_at(&self) -> chrono::DateTime<Utc> {
        self.created_at
    }
}

/// The concurrent connection registry, per spec §5: a concurrent map
/// where iteration for dispatch takes a read view and insert/remove take
/// exclusive locks. `DashMap` gives per-shard locking so dispatch
/// iteration never blocks behind an unrelated connection's insert/remove,
/// grounded on the same sharded-map idiom `toka-rate-limiter::storage`
/// uses for its in-memory backend.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Arc<Connection>>,
}

impl ConnectionRegistry {
    /// An empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry has no connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Register a connection, rejecting it if the registry is already at
    /// `max_connections`.
    pub fn insert(&self, connection: Arc<Connection>, max_connections: usize) -> bool {
        if self.connections.len() >= max_connections {
            return false;
        }
        self.connections.insert(connection.id, connection);
        true
    }

    /// Remove a connection by id, returning it if present.
    pub fn remove(&self, id: Uuid) -> Option<Arc<Connection>> {
        self.connections.remove(&id).map(|(_, c)| c)
    }

    /// Fetch a connection by id.
    pub fn get(&self, id: Uuid) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// A snapshot of every currently-registered connection, for dispatch
    /// iteration and the idle sweeper.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Remove and return every connection idle longer than `idle_ttl`.
    pub fn prune_idle(&self, idle_ttl: std::time::Duration) -> Vec<Arc<Connection>> {
        let stale: Vec<Uuid> = self
            .connections
            .iter()
            .filter(|entry| entry.value().idle_for() > idle_ttl)
            .map(|entry| *entry.key())
            .collect();

        stale.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}
