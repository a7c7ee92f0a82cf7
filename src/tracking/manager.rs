use crate::tracking::session::{Session, SessionHandle};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Running sessions keyed by the primary chat id.
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<i64, SessionHandle>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<i64, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the session. One already running for the same chat is stopped first.
    pub async fn start(&self, session: Session) {
        let chat_id = session.primary_chat_id();
        let previous = self.sessions().remove(&chat_id);
        if let Some(previous) = previous {
            info!("Replacing running session for chat {}", chat_id);
            previous.stop().await;
        }
        let handle = session.spawn();
        self.sessions().insert(chat_id, handle);
    }

    /// Stops the session for `chat_id`. Returns false if none was running.
    pub async fn stop(&self, chat_id: i64) -> bool {
        let handle = self.sessions().remove(&chat_id);
        match handle {
            Some(handle) => {
                handle.stop().await;
                true
            }
            None => false,
        }
    }

    pub async fn stop_all(&self) {
        let handles: Vec<SessionHandle> = self.sessions().drain().map(|(_, handle)| handle).collect();
        for handle in handles {
            handle.stop().await;
        }
    }

    pub fn is_running(&self, chat_id: i64) -> bool {
        self.sessions().get(&chat_id).map_or(false, |handle| !handle.is_finished())
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}
