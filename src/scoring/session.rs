//! Scoreboard sessions: one task owns each board and serializes its mutations

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::board::{ScoreEvent, Scoreboard, StateDelta};
use super::snapshot::{ScoreboardSnapshot, SnapshotBuilder};
use super::{ApplyOutcome, SessionInput};

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session limit of {0} reached")]
    LimitReached(usize),

    #[error("Session is no longer running")]
    Closed,
}

/// Default time a session survives with no connections and no input
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Translate a client message into scoreboard events.
/// Every gesture is stamped with server receipt time so the debouncer sees one clock.
fn score_events(msg: ClientMsg, received_at: u64) -> Vec<ScoreEvent> {
    match msg {
        ClientMsg::Increment { side } => vec![ScoreEvent::Increment { side }],
        ClientMsg::Decrement { side } => vec![ScoreEvent::Decrement { side }],
        ClientMsg::ToggleSwap => vec![ScoreEvent::ToggleSwap],
        ClientMsg::Gesture { side } => vec![ScoreEvent::RecordGesture {
            side,
            at_ms: received_at,
        }],
        ClientMsg::PoseFrame(frame) => frame
            .detected_sides()
            .into_iter()
            .map(|side| ScoreEvent::RecordGesture {
                side,
                at_ms: received_at,
            })
            .collect(),
        ClientMsg::Rename { slot, name } => vec![ScoreEvent::RenameSlot { slot, name }],
        ClientMsg::Ping { .. } => Vec::new(),
    }
}

/// Handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<SessionInput>,
    pub state_tx: broadcast::Sender<ServerMsg>,
    latest: Arc<RwLock<ScoreboardSnapshot>>,
    connections: Arc<AtomicUsize>,
}

impl SessionHandle {
    /// Latest published scoreboard
    pub fn snapshot(&self) -> ScoreboardSnapshot {
        self.latest.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.state_tx.subscribe()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Count a live connection until the guard is dropped
    pub fn connect(&self) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            connections: self.connections.clone(),
        }
    }

    /// Queue a message without waiting for it to be applied
    pub async fn send(&self, input: SessionInput) -> Result<(), SessionError> {
        self.input_tx.send(input).await.map_err(|_| SessionError::Closed)
    }

    /// Apply a message and wait for the resulting state
    pub async fn apply(
        &self,
        connection_id: Uuid,
        msg: ClientMsg,
        received_at: u64,
    ) -> Result<ApplyOutcome, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionInput {
            connection_id,
            msg,
            received_at,
            reply: Some(reply_tx),
        })
        .await?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }
}

/// Decrements the session's connection count on drop
pub struct ConnectionGuard {
    connections: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// The authoritative scoreboard of one session
pub struct ScoreSession {
    id: Uuid,
    board: Scoreboard,
    snapshot_builder: SnapshotBuilder,
    input_rx: mpsc::Receiver<SessionInput>,
    state_tx: broadcast::Sender<ServerMsg>,
    latest: Arc<RwLock<ScoreboardSnapshot>>,
    connections: Arc<AtomicUsize>,
    idle_timeout: Duration,
}

impl ScoreSession {
    /// Create a new session
    pub fn new(id: Uuid, gesture_cooldown_ms: u64, idle_timeout: Duration) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (state_tx, _) = broadcast::channel(64);

        let board = Scoreboard::new(gesture_cooldown_ms);
        let snapshot_builder = SnapshotBuilder::new();
        let latest = Arc::new(RwLock::new(snapshot_builder.current(board.state())));
        let connections = Arc::new(AtomicUsize::new(0));

        let handle = SessionHandle {
            id,
            input_tx,
            state_tx: state_tx.clone(),
            latest: latest.clone(),
            connections: connections.clone(),
        };

        let session = Self {
            id,
            board,
            snapshot_builder,
            input_rx,
            state_tx,
            latest,
            connections,
            idle_timeout,
        };

        (session, handle)
    }

    /// Apply inputs one at a time until the session has sat idle with no
    /// connections for `idle_timeout`, or every handle is gone
    pub async fn run(mut self) {
        info!(session_id = %self.id, "Session started");

        let mut idle_check = interval((self.idle_timeout / 2).max(Duration::from_millis(10)));
        idle_check.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_active = Instant::now();

        loop {
            tokio::select! {
                input = self.input_rx.recv() => match input {
                    Some(input) => {
                        last_active = Instant::now();
                        self.process_input(input);
                    }
                    None => break,
                },
                _ = idle_check.tick() => {
                    if self.connections.load(Ordering::Relaxed) > 0 {
                        last_active = Instant::now();
                    } else if last_active.elapsed() >= self.idle_timeout {
                        info!(
                            session_id = %self.id,
                            idle_secs = self.idle_timeout.as_secs(),
                            "Session idle with no connections"
                        );
                        break;
                    }
                }
            }
        }

        info!(session_id = %self.id, "Session closed");
    }

    fn process_input(&mut self, input: SessionInput) {
        let SessionInput {
            connection_id,
            msg,
            received_at,
            reply,
        } = input;

        let mut delta = StateDelta::default();
        for event in score_events(msg, received_at) {
            delta.merge(self.board.apply(event));
        }

        let snapshot = self.snapshot_builder.build(self.board.state(), &delta);

        if !delta.is_empty() {
            debug!(
                session_id = %self.id,
                connection_id = %connection_id,
                version = snapshot.version,
                "State changed"
            );
            *self.latest.write() = snapshot.clone();

            // No subscribers is fine; HTTP callers still get the reply
            let _ = self.state_tx.send(ServerMsg::State {
                snapshot: snapshot.clone(),
                delta: Some(delta.clone()),
            });
        }

        if let Some(reply) = reply {
            if reply.send(ApplyOutcome { delta, snapshot }).is_err() {
                warn!(session_id = %self.id, "Caller dropped before reply");
            }
        }
    }
}

/// Registry of all live sessions
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, SessionHandle>>,
    /// Slots taken, reserved before the session is inserted
    reserved: Arc<AtomicUsize>,
    gesture_cooldown_ms: u64,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(gesture_cooldown_ms: u64, max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            reserved: Arc::new(AtomicUsize::new(0)),
            gesture_cooldown_ms,
            max_sessions,
            idle_timeout,
        }
    }

    /// Start a fresh scoreboard on its own task
    pub fn create(&self) -> Result<SessionHandle, SessionError> {
        let max_sessions = self.max_sessions;
        if self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| {
                (taken < max_sessions).then_some(taken + 1)
            })
            .is_err()
        {
            warn!(max_sessions, "Session limit reached");
            return Err(SessionError::LimitReached(max_sessions));
        }

        let (session, handle) =
            ScoreSession::new(Uuid::new_v4(), self.gesture_cooldown_ms, self.idle_timeout);
        let session_id = handle.id;
        self.sessions.insert(session_id, handle.clone());

        let registry = self.clone();
        tokio::spawn(async move {
            session.run().await;

            // Cleanup after the session ends
            registry.remove(&session_id);
            info!(session_id = %session_id, "Session removed from registry");
        });

        Ok(handle)
    }

    /// Drop a session and release its slot
    pub fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        let removed = self.sessions.remove(id).map(|(_, h)| h);
        if removed.is_some() {
            self.reserved.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    pub fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_connections(&self) -> usize {
        self.sessions
            .iter()
            .map(|s| s.value().connection_count())
            .sum()
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::gesture::{make_hand, thumbs_up_hand, PoseFrame};
    use crate::scoring::{ServeSlot, Side};
    use tokio_test::{assert_err, assert_ok};

    fn registry() -> SessionRegistry {
        SessionRegistry::new(1200, 4, SESSION_IDLE_TIMEOUT)
    }

    #[tokio::test]
    async fn test_apply_returns_outcome() {
        let registry = registry();
        let handle = assert_ok!(registry.create());

        let outcome = assert_ok!(
            handle
                .apply(Uuid::new_v4(), ClientMsg::Increment { side: Side::Left }, 0)
                .await
        );
        assert_eq!(outcome.snapshot.left_score, 1);
        assert_eq!(outcome.snapshot.serving, Some(ServeSlot::LeftTop));
        assert_eq!(outcome.delta.credited, Some(Side::Left));
        assert_eq!(handle.snapshot().version, 1);
    }

    #[tokio::test]
    async fn test_change_is_broadcast() {
        let registry = registry();
        let handle = assert_ok!(registry.create());
        let mut rx = handle.subscribe();

        assert_ok!(
            handle
                .apply(Uuid::new_v4(), ClientMsg::Increment { side: Side::Right }, 0)
                .await
        );

        match assert_ok!(rx.recv().await) {
            ServerMsg::State { snapshot, delta } => {
                assert_eq!(snapshot.right_score, 1);
                assert!(delta.is_some());
            }
            other => panic!("expected state, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_debounced_gesture_not_broadcast() {
        let registry = registry();
        let handle = assert_ok!(registry.create());
        let mut rx = handle.subscribe();
        let conn = Uuid::new_v4();

        let gesture = || ClientMsg::Gesture { side: Side::Left };
        assert_ok!(handle.apply(conn, gesture(), 5_000).await);
        let rejected = assert_ok!(handle.apply(conn, gesture(), 5_500).await);
        assert!(rejected.delta.is_empty());
        assert_eq!(rejected.snapshot.left_score, 1);

        // Only the accepted gesture produced a message
        assert_ok!(rx.recv().await);
        assert_err!(rx.try_recv());
    }

    #[tokio::test]
    async fn test_pose_frame_scores_each_hand() {
        let registry = registry();
        let handle = assert_ok!(registry.create());

        let frame = PoseFrame {
            frame_width: 640.0,
            hands: vec![thumbs_up_hand(0.2), thumbs_up_hand(0.8), make_hand(0.4)],
        };
        let outcome = assert_ok!(
            handle
                .apply(Uuid::new_v4(), ClientMsg::PoseFrame(frame), 10_000)
                .await
        );
        assert_eq!(outcome.snapshot.left_score, 1);
        assert_eq!(outcome.snapshot.right_score, 1);
        assert_eq!(outcome.snapshot.version, 1);
    }

    #[tokio::test]
    async fn test_ping_changes_nothing() {
        let registry = registry();
        let handle = assert_ok!(registry.create());
        let outcome = assert_ok!(
            handle
                .apply(Uuid::new_v4(), ClientMsg::Ping { t: 1 }, 0)
                .await
        );
        assert!(outcome.delta.is_empty());
        assert_eq!(outcome.snapshot.version, 0);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let registry = registry();
        let a = assert_ok!(registry.create());
        let b = assert_ok!(registry.create());

        assert_ok!(a.apply(Uuid::new_v4(), ClientMsg::ToggleSwap, 0).await);
        assert!(a.snapshot().is_swapped);
        assert!(!b.snapshot().is_swapped);
        assert_eq!(registry.active_sessions(), 2);
    }

    #[tokio::test]
    async fn test_session_limit() {
        let registry = SessionRegistry::new(1200, 1, SESSION_IDLE_TIMEOUT);
        assert_ok!(registry.create());
        assert!(matches!(registry.create(), Err(SessionError::LimitReached(1))));
    }

    #[tokio::test]
    async fn test_idle_session_frees_its_slot() {
        let registry = SessionRegistry::new(1200, 1, Duration::from_millis(20));
        let handle = assert_ok!(registry.create());
        let guard = handle.connect();
        drop(guard);
        drop(handle);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(registry.active_sessions(), 0);
        assert_ok!(registry.create());
    }

    #[tokio::test]
    async fn test_connected_session_stays_alive() {
        let registry = SessionRegistry::new(1200, 1, Duration::from_millis(20));
        let handle = assert_ok!(registry.create());
        let _guard = handle.connect();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(registry.active_sessions(), 1);
        let outcome = assert_ok!(
            handle
                .apply(Uuid::new_v4(), ClientMsg::Increment { side: Side::Left }, 0)
                .await
        );
        assert_eq!(outcome.snapshot.left_score, 1);
    }

    #[tokio::test]
    async fn test_remove_releases_slot() {
        let registry = SessionRegistry::new(1200, 1, SESSION_IDLE_TIMEOUT);
        let handle = assert_ok!(registry.create());

        assert!(registry.remove(&handle.id).is_some());
        assert!(registry.remove(&handle.id).is_none());
        assert!(registry.get(&handle.id).is_none());
        assert_ok!(registry.create());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_respect_limit() {
        let registry = SessionRegistry::new(1200, 4, SESSION_IDLE_TIMEOUT);

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.create().is_ok() })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            if assert_ok!(task.await) {
                created += 1;
            }
        }

        assert_eq!(created, 4);
        assert_eq!(registry.active_sessions(), 4);
    }

    #[tokio::test]
    async fn test_connection_guard_counts() {
        let registry = registry();
        let handle = assert_ok!(registry.create());
        let first = handle.connect();
        let _second = handle.connect();
        assert_eq!(registry.total_connections(), 2);
        drop(first);
        assert_eq!(registry.total_connections(), 1);
    }

    #[test]
    fn test_gesture_stamped_with_receipt_time() {
        let events = score_events(ClientMsg::Gesture { side: Side::Left }, 42);
        assert_eq!(events, vec![ScoreEvent::RecordGesture { side: Side::Left, at_ms: 42 }]);
    }

    #[tokio::test]
    async fn test_client_clock_does_not_stall_gestures() {
        let registry = registry();
        let handle = assert_ok!(registry.create());
        let conn = Uuid::new_v4();
        let now = 1_700_000_000_000;

        let frame = PoseFrame {
            frame_width: 640.0,
            hands: vec![thumbs_up_hand(0.8)],
        };
        assert_ok!(handle.apply(conn, ClientMsg::PoseFrame(frame), now).await);

        // A page-relative timestamp from the client is ignored
        let gesture: ClientMsg =
            assert_ok!(serde_json::from_str(r#"{"type":"gesture","side":"left","t":5}"#));
        let outcome = assert_ok!(handle.apply(conn, gesture, now + 1_500).await);

        assert_eq!(outcome.delta.credited, Some(Side::Left));
        assert_eq!(outcome.snapshot.left_score, 2);
    }
}
