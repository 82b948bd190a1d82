//! `Session` binds one room to its own instance of every component
//! (A-E plus the Lane-3 state) and owns their lifecycle; `SessionRegistry`
//! is the process-wide `room_id -> Session` map driven by signaling events
//!.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info, warn};

use veilstream_config::ModerationConfig;
use veilstream_contracts::{
    BroadcastSource, InferenceService, Observability, SanitizedSink, SessionLifecycleEvent,
};
use veilstream_model::RoomId;

use crate::batch_collector::BatchCollector;
use crate::error::{ModerationError, Result};
use crate::inference_client::InferenceClient;
use crate::orchestrator::{LaneOrchestrator, OrchestratorHandle};
use crate::overload::OverloadPolicy;
use crate::state::ModerationState;

/// One room's worth of the pipeline: its own Lane 3 state, Batch Collector,
/// Inference Client worker pool, and Lane Orchestrator. Constructed once per
/// room and torn down when the room finishes.
pub struct Session {
    room_id: RoomId,
    state: Arc<Mutex<ModerationState>>,
    collector: Arc<BatchCollector>,
    inference: Mutex<Option<InferenceClient>>,
    orchestrator: LaneOrchestrator,
    handle: Mutex<Option<OrchestratorHandle>>,
    shutdown_grace: Duration,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        room_id: RoomId,
        config: Arc<ModerationConfig>,
        service: Arc<dyn InferenceService>,
        observability: Arc<dyn Observability>,
        overload_policy: Arc<dyn OverloadPolicy>,
        now_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
    ) -> Arc<Self> {
        let state = Arc::new(Mutex::new(ModerationState::new()));
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let collector = BatchCollector::new(config.batch, batch_tx, observability.clone());

        let inference = InferenceClient::spawn(
            config.clone(),
            config.inference.worker_count,
            service,
            batch_rx,
            collector.clone(),
            state.clone(),
            observability.clone(),
            now_ms.clone(),
        );

        let orchestrator = LaneOrchestrator::new(
            config.clone(),
            collector.clone(),
            state.clone(),
            overload_policy,
            observability,
            now_ms,
        );

        Arc::new(Self {
            room_id,
            state,
            collector,
            inference: Mutex::new(Some(inference)),
            orchestrator,
            handle: Mutex::new(None),
            shutdown_grace: Duration::from_millis(config.publish.idle_timeout_ms.max(1_000) * 2),
        })
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub async fn active_tracks(&self) -> usize {
        self.state.lock().await.active_tracks()
    }

    pub async fn active_regions(&self) -> usize {
        self.state.lock().await.active_regions()
    }

    /// Starts the Lane-1 loop against a concrete broadcaster/sink pair.
    /// Fails if a broadcast is already attached; the caller must `detach`
    /// first.
    pub async fn attach<Src, Sink>(&self, source: Src, sink: Sink) -> Result<()>
    where
        Src: BroadcastSource + 'static,
        Sink: SanitizedSink<Frame = Src::Frame> + 'static,
    {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return Err(ModerationError::AlreadyAttached(self.room_id.to_string()));
        }
        *handle = Some(self.orchestrator.attach(source, sink));
        info!(room_id = %self.room_id, "session: broadcaster attached");
        Ok(())
    }

    /// Stops the Lane-1 loop, if one is running. Safe to call when nothing
    /// is attached.
    pub async fn detach(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            handle.detach().await;
            info!(room_id = %self.room_id, "session: broadcaster detached");
        }
    }

    /// Tears the whole session down: detaches Lane 1, then stops the
    /// Inference Client workers and the Batch Collector's timer task.
    /// Consumes nothing — the `Arc<Session>` is simply dropped by the
    /// registry afterward.
    pub async fn shutdown(&self) {
        self.detach().await;
        self.collector.shutdown().await;
        if let Some(inference) = self.inference.lock().await.take() {
            inference.shutdown(self.shutdown_grace).await;
        } else {
            warn!(room_id = %self.room_id, "session: shutdown called twice");
        }
    }
}

/// Process-wide `room_id -> Session` map. Sessions are created
/// lazily the first time a room needs one and removed once its room
/// finishes.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<RoomId, Arc<Session>>>,
    config: Arc<ModerationConfig>,
    service: Arc<dyn InferenceService>,
    observability: Arc<dyn Observability>,
    overload_policy: Arc<dyn OverloadPolicy>,
    now_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl SessionRegistry {
    pub fn new(
        config: Arc<ModerationConfig>,
        service: Arc<dyn InferenceService>,
        observability: Arc<dyn Observability>,
        overload_policy: Arc<dyn OverloadPolicy>,
        now_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            service,
            observability,
            overload_policy,
            now_ms,
        }
    }

    /// Returns the room's `Session`, creating one if this is the first time
    /// the room has been seen.
    pub async fn get_or_create(&self, room_id: RoomId) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(&room_id) {
            return session.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(room_id)
            .or_insert_with(|| {
                Session::new(
                    room_id,
                    self.config.clone(),
                    self.service.clone(),
                    self.observability.clone(),
                    self.overload_policy.clone(),
                    self.now_ms.clone(),
                )
            })
            .clone()
    }

    pub async fn get(&self, room_id: RoomId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&room_id).cloned()
    }

    /// Reacts to one classified lifecycle event. `BroadcasterTrackPublished`
    /// only ensures the `Session` exists; the caller still has to call
    /// `attach` with the concrete source/sink it obtained from the SFU
    /// layer. `BroadcasterLeft` detaches Lane 1 but keeps the session (and
    /// its decayed state) around in case the broadcaster reconnects.
    /// `RoomFinished` tears the session down and removes it.
    pub async fn handle_lifecycle_event(&self, event: SessionLifecycleEvent) {
        match event {
            SessionLifecycleEvent::BroadcasterTrackPublished { room_id, .. } => {
                self.get_or_create(room_id).await;
            }
            SessionLifecycleEvent::BroadcasterLeft { room_id, .. } => {
                if let Some(session) = self.get(room_id).await {
                    session.detach().await;
                }
            }
            SessionLifecycleEvent::RoomFinished { room_id } => {
                let removed = self.sessions.write().await.remove(&room_id);
                if let Some(session) = removed {
                    session.shutdown().await;
                }
            }
        }
    }
}
