use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use audit_store::BroadcastPublisher;
use audit_types::{EventMetrics, StreamerConfig};

use crate::connection::{Connection, ConnectionRegistry};
use crate::dispatcher::Dispatcher;
use crate::frame::{ClientFrame, ServerFrame};

/// Outcome of `Streamer::accept`.
pub enum AcceptOutcome {
    /// The connection was registered; carries its id and mailbox receiver.
    Accepted {
        /// The newly-registered connection.
        connection: Arc<Connection>,
        /// The receiving half of its outgoing mailbox.
        outgoing: tokio::sync::mpsc::Receiver<ServerFrame>,
        /// The `welcome` frame the caller must send first.
        welcome: ServerFrame,
    },
    /// The registry is already at `max_connections`.
    Rejected {
        /// The `error{code:max_connections_reached}` frame to send before
        /// closing the transport.
        error: ServerFrame,
    },
}

/// Accepts subscriber connections, filters/rate-limits/fan-outs sealed
/// events, and sweeps idle connections, per spec §4.7. Owns no transport
/// of its own — the actual WebSocket/TCP upgrade is a shim outside this
/// crate's scope (spec §1); this type implements everything a transport
/// shim would sit behind: registration, frame handling, dispatch, and the
/// idle sweeper.
pub struct Streamer {
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<Dispatcher>,
    config: StreamerConfig,
    shutdown: CancellationToken,
}

impl Streamer {
    /// Construct a streamer wired to the given publisher.
    pub fn new(publisher: Arc<BroadcastPublisher>, metrics: Arc<EventMetrics>, config: StreamerConfig) -> Arc<Self> {
        let registry = ConnectionRegistry::new();
        let dispatcher = Dispatcher::new(Arc::clone(&registry), publisher, metrics, config.clone());
        Arc::new(Self { registry, dispatcher, config, shutdown: CancellationToken::new() })
    }

    /// Current number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Spawn the dispatch loop and the idle sweeper.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let dispatch_handle = self.dispatcher.spawn();
        let sweep_handle = self.spawn_sweeper();
        vec![dispatch_handle, sweep_handle]
    }

    fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let streamer = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(streamer.config.idle_ttl.max(std::time::Duration::from_secs(1)) / 4);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let pruned = streamer.registry.prune_idle(streamer.config.idle_ttl);
                        if !pruned.is_empty() {
                            info!(count = pruned.len(), "idle sweeper pruned connections");
                            for connection in pruned {
                                let _ = connection.try_send(ServerFrame::Shutdown);
                            }
                        }
                    }
                    _ = streamer.shutdown.cancelled() => {
                        info!("idle sweeper shutting down");
                        return;
                    }
                }
            }
        })
    }

    /// Perform the transport handshake's server-side bookkeeping: create a
    /// connection record and register it, or reject if at capacity. Per
    /// spec §4.7, greeting the client with `welcome` happens right after
    /// registration.
    pub fn accept(&self, user: Option<String>) -> AcceptOutcome {
        let (connection, outgoing) = Connection::new(
            user,
            self.config.event_buffer_size,
            self.config.rate_limit_burst,
            self.config.rate_limit_per_second,
        );

        if !self.registry.insert(Arc::clone(&connection), self.config.max_connections) {
            return AcceptOutcome::Rejected {
                error: ServerFrame::Error {
                    code: "max_connections_reached".into(),
                    message: format!("streamer is at its configured limit of {} connections", self.config.max_connections),
                },
            };
        }

        let welcome = ServerFrame::Welcome { connection_id: connection.id };
        info!(connection_id = %connection.id, "subscriber connection registered");
        AcceptOutcome::Accepted { connection, outgoing, welcome }
    }

    /// Handle one parsed client frame, per spec §4.7/§6: `add_filter`,
    /// `remove_filter`, `ping` are honored; anything else a transport shim
    /// failed to parse is simply never passed here. Returns the server
    /// frame to send back in response, if any.
    pub async fn handle_client_frame(&self, connection_id: Uuid, frame: ClientFrame) -> Option<ServerFrame> {
        let connection = self.registry.get(connection_id)?;
        connection.touch();

        match frame {
            ClientFrame::AddFilter { name, predicates } => {
                connection.add_filter(predicates.into_filter(name)).await;
                None
            }
            ClientFrame::RemoveFilter { name } => {
                connection.remove_filter(&name).await;
                None
            }
            ClientFrame::Ping => Some(ServerFrame::Pong),
        }
    }

    /// Remove a connection when its transport closes (peer disconnect).
    pub fn disconnect(&self, connection_id: Uuid) {
        if self.registry.remove(connection_id).is_some() {
            info!(%connection_id, "subscriber connection closed");
        }
    }

    /// Graceful shutdown, per spec §4.8: stop the dispatch loop and idle
    /// sweeper, then send every remaining connection a `shutdown` frame.
    pub async fn begin_shutdown(&self) {
        self.dispatcher.begin_shutdown();
        self.shutdown.cancel();
        for connection in self.registry.snapshot() {
            let _ = connection.try_send(ServerFrame::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accept_then_reject_past_max_connections() {
        let publisher = Arc::new(BroadcastPublisher::new(16));
        let mut config = StreamerConfig::default();
        config.max_connections = 1;
        let streamer = Streamer::new(publisher, Arc::new(EventMetrics::new()), config);

        match streamer.accept(None) {
            AcceptOutcome::Accepted { .. } => {}
            AcceptOutcome::Rejected { .. } => panic!("first connection should be accepted"),
        }

        match streamer.accept(None) {
            AcceptOutcome::Rejected { error: ServerFrame::Error { code, .. } } => {
                assert_eq!(code, "max_connections_reached");
            }
            _ => panic!("second connection should be rejected"),
        }
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let publisher = Arc::new(BroadcastPublisher::new(16));
        let streamer = Streamer::new(publisher, Arc::new(EventMetrics::new()), StreamerConfig::default());

        let AcceptOutcome::Accepted { connection, .. } = streamer.accept(None) else { panic!("expected accept") };
        let reply = streamer.handle_client_frame(connection.id, ClientFrame::Ping).await;
        assert!(matches!(reply, Some(ServerFrame::Pong)));
    }

    #[tokio::test]
    async fn disconnect_removes_from_registry() {
        let publisher = Arc::new(BroadcastPublisher::new(16));
        let streamer = Streamer::new(publisher, Arc::new(EventMetrics::new()), StreamerConfig::default());

        let AcceptOutcome::Accepted { connection, .. } = streamer.accept(None) else { panic!("expected accept") };
        assert_eq!(streamer.connection_count(), 1);
        streamer.disconnect(connection.id);
        assert_eq!(streamer.connection_count(), 0);
    }
}
