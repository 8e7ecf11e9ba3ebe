use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use audit_store::BroadcastPublisher;
use audit_types::filter::any_matches;
use audit_types::{EventMetrics, StreamerConfig};

use crate::connection::ConnectionRegistry;
use crate::frame::ServerFrame;

/// Drains the publisher's broadcast output and fans each event out to
/// every matching, non-saturated connection, per spec §4.7. One slow
/// consumer never blocks another: `Connection::try_send` is always
/// non-blocking, and a full mailbox only ever affects its own connection.
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    publisher: Arc<BroadcastPublisher>,
    metrics: Arc<EventMetrics>,
    config: StreamerConfig,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Construct a dispatcher over the given registry and publisher.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        publisher: Arc<BroadcastPublisher>,
        metrics: Arc<EventMetrics>,
        config: StreamerConfig,
    ) -> Arc<Self> {
        Arc::new(Self { registry, publisher, metrics, config, shutdown: CancellationToken::new() })
    }

    /// Request the dispatch loop to stop after its current batch.
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Spawn the dispatch loop.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.run().await })
    }

    async fn run(self: Arc<Self>) {
        let mut rx = self.publisher.subscribe();
        info!("streamer dispatch loop started");

        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Ok(event) => self.dispatch_one(&event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "streamer dispatcher lagged behind publisher, events were skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("publisher channel closed, dispatch loop exiting");
                            return;
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("streamer dispatch loop shutting down");
                    return;
                }
            }
        }
    }

    async fn dispatch_one(&self, event: &audit_types::SealedEvent) {
        for connection in self.registry.snapshot() {
            if self.config.enable_event_filtering {
                let filters = connection.filters_snapshot().await;
                if !any_matches(filters.iter(), event) {
                    continue;
                }
            }

            if !connection.rate_limiter.try_acquire().await {
                connection.record_rate_limited();
                self.metrics.record_rate_limit_drop();
                connection.try_send(ServerFrame::Error {
                    code: "rate_limited".into(),
                    message: "token bucket exhausted, event dropped".into(),
                });
                continue;
            }

            let frame = ServerFrame::AuditEvent { event: Box::new(event.clone()) };
            if !connection.try_send(frame) {
                self.metrics.record_mailbox_drop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::frame::ServerFrame;
    use audit_chain::Sealer;
    use audit_types::config::HashSecretKey;
    use audit_types::event::{Actor, EventTimestamp, TargetRef, UnsealedEvent};
    use audit_types::{ChainTip, Filter, Severity};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn sealed(event_type: &str, actor: &str) -> audit_types::SealedEvent {
        let sealer = Sealer::new(HashSecretKey::from_bytes(vec![8u8; 32]), 0).unwrap();
        let mut tip = ChainTip::genesis(0);
        sealer
            .seal(
                UnsealedEvent {
                    id: Uuid::new_v4(),
                    event_type: event_type.into(),
                    severity: Severity::Low,
                    actor: Actor::new(actor),
                    target: TargetRef::new("t"),
                    action: "create".into(),
                    result: "success".into(),
                    timestamp: EventTimestamp { wall: chrono::Utc::now(), monotonic_nanos: 0 },
                    data_classes: Default::default(),
                    legal_basis: None,
                    compliance_attributes: BTreeMap::new(),
                    attributes: BTreeMap::new(),
                },
                &mut tip,
            )
            .unwrap()
    }

    #[tokio::test]
    async fn subscriber_receives_only_matching_events() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = Connection::new(None, 8, 100, 50.0);
        let mut filter = Filter::match_all("created-by-admin");
        filter.event_types = Some(["user.created".to_string()].into_iter().collect());
        filter.actors = Some(["admin".to_string()].into_iter().collect());
        conn.add_filter(filter).await;
        registry.insert(conn, 10);

        let publisher = Arc::new(BroadcastPublisher::new(16));
        let dispatcher = Dispatcher::new(registry, Arc::clone(&publisher), Arc::new(EventMetrics::new()), StreamerConfig::default());
        dispatcher.spawn();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        publisher.publish(sealed("user.created", "admin")).await;
        publisher.publish(sealed("user.created", "bob")).await;
        publisher.publish(sealed("call.completed", "admin")).await;

        let frame = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("dispatch did not deliver in time")
            .expect("mailbox closed");

        match frame {
            ServerFrame::AuditEvent { event } => {
                assert_eq!(event.event.actor.id, "admin");
                assert_eq!(event.event.event_type, "user.created");
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        let second = tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv()).await;
        assert!(second.is_err(), "subscriber should only receive the one matching event");
    }

    #[tokio::test]
    async fn rate_limited_events_are_dropped_and_counted() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = Connection::new(None, 16, 1, 0.0);
        conn.add_filter(Filter::match_all("all")).await;
        registry.insert(conn, 10);

        let publisher = Arc::new(BroadcastPublisher::new(16));
        let metrics = Arc::new(EventMetrics::new());
        let dispatcher = Dispatcher::new(registry, Arc::clone(&publisher), Arc::clone(&metrics), StreamerConfig::default());
        dispatcher.spawn();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        for i in 0..3 {
            publisher.publish(sealed("auth.login", &format!("user-{i}"))).await;
        }

        let first = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(first.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(metrics.snapshot().rate_limit_drops >= 1);
    }
}
