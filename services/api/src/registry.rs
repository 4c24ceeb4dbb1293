//! In-Memory Session Registry
//!
//! The bootstrap endpoint issues short-lived session ids; the WebSocket
//! upgrade claims them. Entries live only in this process and are swept by
//! a periodic background task. A multi-instance deployment would need a
//! shared store behind the same interface.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// One issued-but-unclaimed connection credential.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Table of issued session ids, keyed by id, with expiry timestamps.
pub struct SessionRegistry {
    ttl: Duration,
    entries: Mutex<HashMap<Uuid, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs as i64),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Issues a fresh session id for the given caller.
    pub async fn issue(&self, user_id: &str) -> Uuid {
        let id = Uuid::new_v4();
        let entry = SessionEntry {
            user_id: user_id.to_string(),
            expires_at: Utc::now() + self.ttl,
        };
        self.entries.lock().await.insert(id, entry);
        id
    }

    /// Claims a session id, consuming it. Returns `None` for unknown or
    /// expired ids; credentials are single-use.
    pub async fn claim(&self, id: Uuid) -> Option<SessionEntry> {
        let entry = self.entries.lock().await.remove(&id)?;
        if entry.expires_at <= Utc::now() {
            return None;
        }
        Some(entry)
    }

    /// Removes expired entries; returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Spawns the periodic sweep task.
    pub fn spawn_sweeper(self: &Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let dropped = registry.sweep().await;
                if dropped > 0 {
                    debug!(dropped, "Swept expired session credentials");
                }
            }
        })
    }
}
