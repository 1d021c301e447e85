//! Top-level queue engine that ties together all subsystems.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use viewgate_core::config::QueueConfig;
use viewgate_core::error::AppError;
use viewgate_core::types::{ParticipantId, ResourceId};

use crate::connection::handle::ConnectionHandle;
use crate::connection::pool::ConnectionPool;
use crate::message::builder;
use crate::message::types::{InboundMessage, OutboundMessage};
use crate::message::validator::parse_inbound;
use crate::metrics::{MetricsSnapshot, QueueMetrics};
use crate::notification::dispatcher::NotificationDispatcher;
use crate::queue::admission::JoinOutcome;
use crate::queue::monitor::LivenessMonitor;
use crate::queue::participant::RemovalReason;
use crate::queue::registry::QueueRegistry;
use crate::queue::status::{QueueStatus, QueueSummary};

/// A freshly opened session.
#[derive(Debug)]
pub struct OpenedSession {
    /// Handle registered in the pool.
    pub handle: Arc<ConnectionHandle>,
    /// Serialized frames for the session's writer.
    pub outbound: mpsc::Receiver<String>,
    /// Result of the opening join.
    pub outcome: JoinOutcome,
}

/// Central queue engine shared by every session and the HTTP handlers.
#[derive(Clone)]
pub struct QueueEngine {
    /// Queue configuration.
    config: Arc<QueueConfig>,
    /// Resource id → admission queue.
    pub registry: Arc<QueueRegistry>,
    /// Live sessions.
    pub connections: Arc<ConnectionPool>,
    /// Delivers queue events to sessions.
    pub dispatcher: Arc<NotificationDispatcher>,
    /// Counters.
    pub metrics: Arc<QueueMetrics>,
    /// Shutdown signal sender.
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for QueueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEngine").finish()
    }
}

impl QueueEngine {
    /// Creates a new engine with all subsystems.
    pub fn new(config: QueueConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        let metrics = Arc::new(QueueMetrics::new());
        let connections = Arc::new(ConnectionPool::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            connections.clone(),
            metrics.clone(),
            config.broadcast_queue_list,
        ));
        let registry = Arc::new(QueueRegistry::new(config.capacity, dispatcher.clone()));

        info!(capacity = config.capacity, "Queue engine initialized");

        Self {
            config: Arc::new(config),
            registry,
            connections,
            dispatcher,
            metrics,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Queue configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Validate the ids a session was opened with.
    ///
    /// Fails with `ErrorKind::ConnectionRejected` before any queue is touched.
    pub fn parse_ids(
        &self,
        resource_id: &str,
        participant_id: Option<&str>,
    ) -> Result<(ResourceId, ParticipantId), AppError> {
        let resource_id = ResourceId::parse(resource_id, self.config.max_resource_id_length)?;
        let participant_id = ParticipantId::parse(
            participant_id.unwrap_or_default(),
            self.config.max_participant_id_length,
        )?;
        Ok((resource_id, participant_id))
    }

    /// Register a session and join its queue.
    ///
    /// The `init` frame is already waiting in `outbound` when this returns.
    pub async fn open_session(
        &self,
        resource_id: ResourceId,
        participant_id: ParticipantId,
    ) -> Result<OpenedSession, AppError> {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
        let handle = Arc::new(ConnectionHandle::new(
            resource_id.clone(),
            participant_id.clone(),
            tx,
        ));

        if let Some(previous) = self.connections.register(handle.clone()) {
            info!(
                resource_id = %resource_id,
                participant_id = %participant_id,
                previous_conn_id = %previous.id,
                "Session superseded by a new connection"
            );
            previous.terminate();
        }
        self.metrics.session_opened();

        let outcome = match self
            .registry
            .join(&resource_id, participant_id.clone(), Utc::now())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.connections
                    .unregister_if_current(&resource_id, &participant_id, &handle.id);
                self.metrics.session_closed();
                return Err(e);
            }
        };

        info!(
            conn_id = %handle.id,
            resource_id = %resource_id,
            participant_id = %participant_id,
            admitted = outcome.admitted,
            position = outcome.position,
            "Queue session opened"
        );

        Ok(OpenedSession {
            handle,
            outbound: rx,
            outcome,
        })
    }

    /// Process one text frame from a session.
    ///
    /// Malformed frames are logged and dropped; the session stays open.
    pub async fn handle_frame(&self, handle: &ConnectionHandle, raw: &str) {
        let command = match parse_inbound(raw) {
            Ok(command) => command,
            Err(e) => {
                self.metrics.malformed_frame();
                warn!(
                    conn_id = %handle.id,
                    participant_id = %handle.participant_id,
                    error = %e,
                    "Dropping malformed frame"
                );
                return;
            }
        };
        self.metrics.message_received();

        let result = match command {
            InboundMessage::Heartbeat => self.on_heartbeat(handle).await,
            InboundMessage::Leave => self.on_leave(handle).await,
            InboundMessage::GetQueueList => self.on_queue_list(handle).await,
        };

        if let Err(e) = result {
            error!(
                conn_id = %handle.id,
                resource_id = %handle.resource_id,
                error = %e,
                "Failed to process command"
            );
        }
    }

    /// Tear down a session. Counts as `leave` unless a newer session took over.
    ///
    /// Whether this session is still current is decided inside the queue's
    /// turn, so a reconnect racing this close either lands before it (and
    /// the old session's close is ignored) or after it (and re-joins fresh).
    pub async fn close_session(&self, handle: &ConnectionHandle) {
        handle.mark_dead();
        self.metrics.session_closed();

        let released = self
            .registry
            .leave_if(
                &handle.resource_id,
                &handle.participant_id,
                RemovalReason::Disconnected,
                || {
                    self.connections.unregister_if_current(
                        &handle.resource_id,
                        &handle.participant_id,
                        &handle.id,
                    )
                },
            )
            .await;

        match released {
            Ok(Some(_)) => info!(
                conn_id = %handle.id,
                resource_id = %handle.resource_id,
                participant_id = %handle.participant_id,
                "Queue session closed"
            ),
            Ok(None) => debug!(conn_id = %handle.id, "Closed session was no longer current"),
            Err(e) => {
                error!(conn_id = %handle.id, error = %e, "Failed to release queue on disconnect")
            }
        }
    }

    /// Last published status of a resource.
    pub fn status(&self, resource_id: &ResourceId) -> QueueStatus {
        self.registry.status(resource_id)
    }

    /// Summaries of every live queue.
    pub fn all_statuses(&self) -> Vec<QueueSummary> {
        self.registry.all_statuses()
    }

    /// Counter snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Build a liveness monitor over this engine's registry.
    pub fn monitor(&self) -> LivenessMonitor {
        LivenessMonitor::new(self.registry.clone(), &self.config)
    }

    /// Spawn the liveness monitor; it stops on [`shutdown`](Self::shutdown).
    pub fn spawn_monitor(&self) -> JoinHandle<()> {
        let monitor = self.monitor();
        let cancel = self.shutdown_tx.subscribe();
        tokio::spawn(async move { monitor.run(cancel).await })
    }

    /// Stop background tasks and end every session.
    pub fn shutdown(&self) {
        info!("Shutting down queue engine");
        self.shutdown_tx.send_replace(true);
        let closed = self.connections.close_all();
        info!(sessions = closed, "Queue engine shut down");
    }

    async fn on_heartbeat(&self, handle: &ConnectionHandle) -> Result<(), AppError> {
        let present = self
            .registry
            .heartbeat(&handle.resource_id, &handle.participant_id, Utc::now())
            .await?;
        if present {
            self.reply(handle, &builder::heartbeat_ack())?;
        } else {
            debug!(
                conn_id = %handle.id,
                participant_id = %handle.participant_id,
                "Heartbeat from participant not in queue"
            );
        }
        Ok(())
    }

    async fn on_leave(&self, handle: &ConnectionHandle) -> Result<(), AppError> {
        self.registry
            .leave(&handle.resource_id, &handle.participant_id, RemovalReason::Left)
            .await?;
        self.reply(handle, &builder::left())
    }

    async fn on_queue_list(&self, handle: &ConnectionHandle) -> Result<(), AppError> {
        let viewers = self.registry.queue_list(&handle.resource_id).await;
        self.reply(handle, &builder::queue_list(&handle.resource_id, viewers))
    }

    /// Send directly to this session; delivery failure is logged, never fatal.
    fn reply(&self, handle: &ConnectionHandle, message: &OutboundMessage) -> Result<(), AppError> {
        let frame = serde_json::to_string(message)?;
        if handle.send(frame) {
            self.metrics.message_sent();
        } else {
            self.metrics.send_failed();
            warn!(conn_id = %handle.id, "Reply could not be queued");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use viewgate_core::error::ErrorKind;

    fn engine() -> QueueEngine {
        QueueEngine::new(QueueConfig::default())
    }

    async fn open(engine: &QueueEngine, resource: &str, participant: &str) -> OpenedSession {
        let (r, p) = engine.parse_ids(resource, Some(participant)).unwrap();
        engine.open_session(r, p).await.unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    fn of_type<'a>(frames: &'a [Value], kind: &str) -> Vec<&'a Value> {
        frames.iter().filter(|f| f["type"] == kind).collect()
    }

    #[test]
    fn test_missing_participant_rejected() {
        let err = engine().parse_ids("lot-1", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConnectionRejected);
    }

    #[tokio::test]
    async fn test_join_wait_leave_promote() {
        let engine = engine();
        let mut a = open(&engine, "lot-1", "A").await;
        let mut b = open(&engine, "lot-1", "B").await;

        let a_frames = drain(&mut a.outbound);
        let init = of_type(&a_frames, "init");
        assert_eq!(init[0]["success"], true);
        assert_eq!(init[0]["position"], 0);

        let b_frames = drain(&mut b.outbound);
        let init = of_type(&b_frames, "init");
        assert_eq!(init[0]["success"], false);
        assert_eq!(init[0]["position"], 1);

        engine.handle_frame(&a.handle, r#"{"type":"leave"}"#).await;

        let a_frames = drain(&mut a.outbound);
        assert_eq!(of_type(&a_frames, "left").len(), 1);

        let b_frames = drain(&mut b.outbound);
        assert_eq!(b_frames[0]["type"], "enter_allowed");
        assert_eq!(b_frames[0]["resource_id"], "lot-1");

        let status = engine.status(&ResourceId::parse("lot-1", 64).unwrap());
        assert_eq!(status.current_occupant_id.unwrap().as_str(), "B");
        assert_eq!(status.queue_length, 0);
    }

    #[tokio::test]
    async fn test_disconnect_counts_as_leave() {
        let engine = engine();
        let a = open(&engine, "lot-1", "A").await;
        let mut b = open(&engine, "lot-1", "B").await;
        drain(&mut b.outbound);

        engine.close_session(&a.handle).await;

        let frames = drain(&mut b.outbound);
        assert_eq!(frames[0]["type"], "enter_allowed");
        assert_eq!(engine.connections.len(), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_is_acknowledged() {
        let engine = engine();
        let mut a = open(&engine, "lot-1", "A").await;
        drain(&mut a.outbound);
        engine.handle_frame(&a.handle, r#"{"type":"heartbeat"}"#).await;
        let frames = drain(&mut a.outbound);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "heartbeat");
        assert_eq!(frames[0]["status"], "ok");
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_session() {
        let engine = engine();
        let mut a = open(&engine, "lot-1", "A").await;
        drain(&mut a.outbound);
        engine.handle_frame(&a.handle, "{{{").await;
        engine.handle_frame(&a.handle, r#"{"type":"bid","amount":5}"#).await;
        assert!(drain(&mut a.outbound).is_empty());
        assert!(a.handle.is_alive());
        assert_eq!(engine.metrics_snapshot().malformed_frames, 2);

        engine.handle_frame(&a.handle, r#"{"type":"get_queue_list"}"#).await;
        let frames = drain(&mut a.outbound);
        assert_eq!(frames[0]["type"], "queue_list");
        assert_eq!(frames[0]["data"]["total_count"], 1);
        assert_eq!(frames[0]["data"]["viewers"][0]["status"], "viewing");
    }

    #[tokio::test]
    async fn test_rejoin_keeps_position_and_old_close_is_ignored() {
        let engine = engine();
        let _a = open(&engine, "lot-1", "A").await;
        let b1 = open(&engine, "lot-1", "B").await;
        let _c = open(&engine, "lot-1", "C").await;

        let mut b2 = open(&engine, "lot-1", "B").await;
        assert_eq!(b2.outcome.position, 1);
        assert!(b2.outcome.rejoined);
        assert!(b1.handle.cancelled().is_cancelled());

        engine.close_session(&b1.handle).await;
        let status = engine.status(&ResourceId::parse("lot-1", 64).unwrap());
        assert_eq!(status.queue_length, 2);

        let frames = drain(&mut b2.outbound);
        let init = of_type(&frames, "init");
        assert_eq!(init[0]["position"], 1);
    }

    #[tokio::test]
    async fn test_close_then_reconnect_rejoins_at_tail() {
        let engine = engine();
        let _a = open(&engine, "lot-1", "A").await;
        let b1 = open(&engine, "lot-1", "B").await;
        let _c = open(&engine, "lot-1", "C").await;

        engine.close_session(&b1.handle).await;
        let b2 = open(&engine, "lot-1", "B").await;

        assert!(!b2.outcome.rejoined);
        assert_eq!(b2.outcome.position, 2);
        let status = engine.status(&ResourceId::parse("lot-1", 64).unwrap());
        let waiting: Vec<_> = status.waiting_participants.iter().map(|p| p.as_str()).collect();
        assert_eq!(waiting, vec!["C", "B"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_close_racing_reconnect_keeps_new_session_queued() {
        for round in 0..64 {
            let engine = engine();
            let resource = format!("lot-{round}");
            let _a = open(&engine, &resource, "A").await;
            let old = open(&engine, &resource, "B").await;

            let closing = {
                let engine = engine.clone();
                let handle = old.handle.clone();
                tokio::spawn(async move { engine.close_session(&handle).await })
            };
            let reopening = {
                let engine = engine.clone();
                let resource = resource.clone();
                tokio::spawn(async move { open(&engine, &resource, "B").await })
            };
            closing.await.unwrap();
            let fresh = reopening.await.unwrap();

            let (r, p) = engine.parse_ids(&resource, Some("B")).unwrap();
            let status = engine.status(&r);
            assert_eq!(status.waiting_participants, vec![p.clone()], "round {round}");
            assert_eq!(fresh.outcome.position, 1, "round {round}");
            let current = engine.connections.get(&r, &p).expect("session registered");
            assert_eq!(current.id, fresh.handle.id, "round {round}");
        }
    }

    #[tokio::test]
    async fn test_small_buffer_still_delivers_promotion() {
        let engine = QueueEngine::new(QueueConfig {
            channel_buffer_size: 4,
            ..QueueConfig::default()
        });
        let a = open(&engine, "lot-1", "A").await;
        let mut b = open(&engine, "lot-1", "B").await;
        let mut others = Vec::new();
        for n in 0..10 {
            others.push(open(&engine, "lot-1", &format!("P{n}")).await);
        }

        engine.handle_frame(&a.handle, r#"{"type":"leave"}"#).await;

        let frames = drain(&mut b.outbound);
        assert_eq!(of_type(&frames, "enter_allowed").len(), 1);
        assert!(b.handle.is_alive());
        for other in &mut others {
            let frames = drain(&mut other.outbound);
            assert_eq!(of_type(&frames, "queue_update").len(), 1);
        }
    }

    #[tokio::test]
    async fn test_unreachable_promotee_is_released() {
        let engine = engine();
        let a = open(&engine, "lot-1", "A").await;
        let b = open(&engine, "lot-1", "B").await;
        let mut c = open(&engine, "lot-1", "C").await;
        while b.handle.send("{}".into()) {}

        engine.handle_frame(&a.handle, r#"{"type":"leave"}"#).await;
        assert!(b.handle.cancelled().is_cancelled());

        // The session loop ends on cancellation and closes the session.
        engine.close_session(&b.handle).await;
        let status = engine.status(&ResourceId::parse("lot-1", 64).unwrap());
        assert_eq!(status.current_occupant_id.unwrap().as_str(), "C");
        assert_eq!(of_type(&drain(&mut c.outbound), "enter_allowed").len(), 1);
    }

    #[tokio::test]
    async fn test_status_after_waiter_disconnects() {
        let engine = engine();
        let _a = open(&engine, "lot-5", "A").await;
        let b = open(&engine, "lot-5", "B").await;
        let _c = open(&engine, "lot-5", "C").await;
        engine.close_session(&b.handle).await;

        let status = engine.status(&ResourceId::parse("lot-5", 64).unwrap());
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["is_occupied"], true);
        assert_eq!(json["queue_length"], 1);
        assert_eq!(json["current_occupant_id"], "A");
    }

    #[tokio::test]
    async fn test_shutdown_terminates_sessions() {
        let engine = engine();
        let a = open(&engine, "lot-1", "A").await;
        engine.shutdown();
        assert!(a.handle.cancelled().is_cancelled());
        assert!(engine.connections.is_empty());
    }
}
