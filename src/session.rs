use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::balance::Ledger;
use crate::store::ExpenseStore;

/// Everything a signed-in or demo visitor works with until they sign out.
pub struct Session {
    pub store: ExpenseStore,
    pub ledger: Ledger,
}

impl Session {
    pub fn new(store: ExpenseStore) -> Self {
        Self {
            store,
            ledger: Ledger::new(),
        }
    }
}

struct OpenSession {
    session: Arc<Mutex<Session>>,
    last_seen: DateTime<Utc>,
    expires_at: Option<i64>,
}

impl OpenSession {
    fn is_live(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        self.last_seen + idle_timeout > now
            && self.expires_at.map_or(true, |expires_at| expires_at > now.timestamp())
    }
}

/// Open sessions by key. Idle or expired sessions are dropped whenever
/// another one is opened, and the registry never holds more than `capacity`.
pub struct Sessions {
    open: Mutex<HashMap<String, OpenSession>>,
    idle_timeout: Duration,
    capacity: usize,
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new(Duration::minutes(30), 10_000)
    }
}

impl Sessions {
    pub fn new(idle_timeout: Duration, capacity: usize) -> Self {
        Self {
            open: Mutex::new(HashMap::new()),
            idle_timeout,
            capacity,
        }
    }

    /// Returns the session under `key`, starting it with `start` if needed.
    /// `expires_at` is the Unix timestamp after which the session must not
    /// outlive its credentials.
    pub async fn open(
        &self,
        key: String,
        expires_at: Option<i64>,
        start: impl FnOnce() -> Session,
    ) -> Arc<Mutex<Session>> {
        self.open_at(key, expires_at, Utc::now(), start).await
    }

    async fn open_at(
        &self,
        key: String,
        expires_at: Option<i64>,
        now: DateTime<Utc>,
        start: impl FnOnce() -> Session,
    ) -> Arc<Mutex<Session>> {
        let mut open = self.open.lock().await;
        open.retain(|key, entry| {
            let live = entry.is_live(now, self.idle_timeout);
            if !live {
                tracing::info!(session = %key, "session expired");
            }
            live
        });
        if !open.contains_key(&key) && open.len() >= self.capacity {
            let oldest = open
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                open.remove(&oldest);
                tracing::warn!(session = %oldest, "session evicted");
            }
        }

        let entry = open.entry(key).or_insert_with_key(|key| {
            tracing::info!(session = %key, "session started");
            OpenSession {
                session: Arc::new(Mutex::new(start())),
                last_seen: now,
                expires_at,
            }
        });
        entry.last_seen = now;
        entry.session.clone()
    }

    pub async fn close(&self, key: &str) -> bool {
        let closed = self.open.lock().await.remove(key).is_some();
        if closed {
            tracing::info!(session = %key, "session closed");
        }
        closed
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.open.lock().await.len()
    }
}
