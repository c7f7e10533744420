use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use questline_core::events::ServerEvent;
use questline_core::ids::{SessionId, TaskId};

use crate::error::EngineError;

struct Connection {
    tx: mpsc::Sender<String>,
    /// In-flight background scorer tasks for this session. Each handle is
    /// removed exactly once: either the task untracks itself on completion,
    /// or the aggregation barrier drains it for a join.
    pending: Mutex<HashMap<TaskId, JoinHandle<()>>>,
}

/// Live duplex channels plus per-session background task bookkeeping.
///
/// Constructed once at startup and shared by reference; there is no global
/// instance.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<SessionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel for a session. A session id with a live channel is
    /// refused outright rather than silently replaced.
    pub fn connect(
        &self,
        session_id: SessionId,
        tx: mpsc::Sender<String>,
    ) -> Result<(), EngineError> {
        match self.connections.entry(session_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(EngineError::DuplicateConnection(session_id))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Connection {
                    tx,
                    pending: Mutex::new(HashMap::new()),
                });
                info!(session_id = %session_id, "channel connected");
                Ok(())
            }
        }
    }

    /// Drop the channel and the task bookkeeping. In-flight scorer tasks are
    /// NOT cancelled; they finish on their own and keep writing into the
    /// session object. The abandoned count is logged so they are never lost
    /// silently.
    pub fn disconnect(&self, session_id: &SessionId) {
        if let Some((_, conn)) = self.connections.remove(session_id) {
            let abandoned = conn.pending.lock().len();
            if abandoned > 0 {
                warn!(
                    session_id = %session_id,
                    abandoned = abandoned,
                    "disconnected with scorer tasks still running"
                );
            }
            info!(session_id = %session_id, "channel disconnected");
        }
    }

    /// Fire-and-forget send. When the channel is missing, closed, or full the
    /// event is dropped with a log line; failures never propagate into the
    /// caller's control flow.
    pub fn send(&self, session_id: &SessionId, event: &ServerEvent) -> bool {
        let Some(conn) = self.connections.get(session_id) else {
            warn!(session_id = %session_id, event = event.event_name(), "no live channel, dropping event");
            return false;
        };
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "failed to serialize event");
                return false;
            }
        };
        match conn.tx.try_send(payload) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    session_id = %session_id,
                    event = event.event_name(),
                    "send queue full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(session_id = %session_id, event = event.event_name(), "channel closed, dropping event");
                false
            }
        }
    }

    /// Track a spawned background task for later joining.
    pub fn track_task(&self, session_id: &SessionId, task_id: TaskId, handle: JoinHandle<()>) {
        match self.connections.get(session_id) {
            Some(conn) => {
                conn.pending.lock().insert(task_id, handle);
            }
            None => {
                // Session disconnected between spawn and track; the task
                // finishes detached.
                warn!(session_id = %session_id, task_id = %task_id, "tracking after disconnect, task detached");
            }
        }
    }

    /// Remove a finished task from the set. A no-op when the barrier already
    /// drained the handle or the session disconnected.
    pub fn untrack_task(&self, session_id: &SessionId, task_id: &TaskId) {
        if let Some(conn) = self.connections.get(session_id) {
            conn.pending.lock().remove(task_id);
        }
    }

    /// Aggregation barrier: wait for every currently tracked task to finish.
    /// A join, not a cancellation. Proceeds immediately when nothing is
    /// pending.
    pub async fn join_pending(&self, session_id: &SessionId) {
        let handles: Vec<(TaskId, JoinHandle<()>)> = match self.connections.get(session_id) {
            Some(conn) => conn.pending.lock().drain().collect(),
            None => return,
        };
        if handles.is_empty() {
            return;
        }
        info!(session_id = %session_id, pending = handles.len(), "waiting for background analysis");
        for (task_id, handle) in handles {
            if let Err(e) = handle.await {
                warn!(session_id = %session_id, task_id = %task_id, error = %e, "scorer task failed to join");
            }
        }
    }

    pub fn pending_count(&self, session_id: &SessionId) -> usize {
        self.connections
            .get(session_id)
            .map(|conn| conn.pending.lock().len())
            .unwrap_or(0)
    }

    pub fn is_connected(&self, session_id: &SessionId) -> bool {
        self.connections.contains_key(session_id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }
}
