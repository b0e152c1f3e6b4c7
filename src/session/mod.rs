
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// One user question and the answer it received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// In-memory conversation history, capped per session
///
/// The number of sessions is not capped; callers end sessions with [`SessionManager::remove`].
pub struct SessionManager {
    max_history: usize,
    sessions: Mutex<HashMap<String, VecDeque<Exchange>>>,
}

impl SessionManager {
    #[inline]
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Start a new, empty session
    #[inline]
    pub fn create_session(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), VecDeque::new());
        debug!("Created session {}", id);
        id
    }

    /// Snapshot of a session's exchanges, oldest first; unknown ids have none
    #[inline]
    pub fn history(&self, session_id: &str) -> Vec<Exchange> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .map(|exchanges| exchanges.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append an exchange and evict the oldest beyond `max_history`
    #[inline]
    pub fn add_exchange(&self, session_id: &str, user: &str, assistant: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let exchanges = sessions.entry(session_id.to_string()).or_default();

        exchanges.push_back(Exchange {
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
        while exchanges.len() > self.max_history {
            exchanges.pop_front();
        }
    }

    #[inline]
    pub fn clear(&self, session_id: &str) {
        if let Some(exchanges) = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(session_id)
        {
            exchanges.clear();
        }
    }

    /// Forget a session entirely; returns whether it existed
    #[inline]
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some();
        if removed {
            debug!("Removed session {}", session_id);
        }
        removed
    }

    #[inline]
    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
