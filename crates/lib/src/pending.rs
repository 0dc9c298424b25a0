//! Pending reply store: buffers asynchronous webhook replies until the client polls for them.
//!
//! At most one entry per session id. `put` overwrites, `take` reads and removes, and an entry
//! nobody reads is evicted after the TTL. The in-memory store only works when the callback
//! and the poll reach the same process; multi-instance deployments need a shared store
//! behind the same trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Quick-reply button shown under a bot message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub action: String,
}

/// A buffered reply waiting for its poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReply {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<Button>>,
}

/// Storage for pending replies keyed by session id.
#[async_trait]
pub trait PendingReplyStore: Send + Sync {
    /// Store the reply for the session, replacing any previous one.
    async fn put(&self, session_id: &str, reply: PendingReply);

    /// Remove and return the reply for the session. `None` while the reply is still in flight.
    async fn take(&self, session_id: &str) -> Option<PendingReply>;
}

struct Slot {
    reply: PendingReply,
    generation: u64,
    expires_at: Instant,
}

/// Process-local store with timed eviction.
pub struct InMemoryPendingStore {
    inner: Arc<RwLock<HashMap<String, Slot>>>,
    ttl: Duration,
    next_generation: AtomicU64,
}

impl InMemoryPendingStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Number of entries currently held (expired ones included until evicted).
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PendingReplyStore for InMemoryPendingStore {
    async fn put(&self, session_id: &str, reply: PendingReply) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let expires_at = Instant::now() + self.ttl;
        self.inner.write().await.insert(
            session_id.to_string(),
            Slot {
                reply,
                generation,
                expires_at,
            },
        );

        // Only evict the entry this put created; a later put has its own timer.
        let inner = self.inner.clone();
        let key = session_id.to_string();
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut g = inner.write().await;
            if g.get(&key).is_some_and(|s| s.generation == generation) {
                g.remove(&key);
                log::debug!("pending reply for session {} evicted unread", key);
            }
        });
    }

    async fn take(&self, session_id: &str) -> Option<PendingReply> {
        let slot = self.inner.write().await.remove(session_id)?;
        if Instant::now() >= slot.expires_at {
            return None;
        }
        Some(slot.reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(text: &str) -> PendingReply {
        PendingReply {
            message: text.to_string(),
            buttons: None,
        }
    }

    #[tokio::test]
    async fn take_is_read_once() {
        let store = InMemoryPendingStore::new(Duration::from_secs(300));
        store.put("s1", reply("hello")).await;
        assert_eq!(store.take("s1").await, Some(reply("hello")));
        assert_eq!(store.take("s1").await, None);
    }

    #[tokio::test]
    async fn absent_session_is_none() {
        let store = InMemoryPendingStore::new(Duration::from_secs(300));
        assert_eq!(store.take("nobody").await, None);
    }

    #[tokio::test]
    async fn put_overwrites() {
        let store = InMemoryPendingStore::new(Duration::from_secs(300));
        store.put("s1", reply("first")).await;
        store.put("s1", reply("second")).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.take("s1").await, Some(reply("second")));
    }

    #[tokio::test(start_paused = true)]
    async fn unread_entry_expires_after_ttl() {
        let store = InMemoryPendingStore::new(Duration::from_secs(300));
        store.put("s1", reply("late")).await;
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(store.is_empty().await);
        assert_eq!(store.take("s1").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_keeps_newer_entry() {
        let store = InMemoryPendingStore::new(Duration::from_secs(300));
        store.put("s1", reply("old")).await;
        tokio::time::sleep(Duration::from_secs(200)).await;
        store.put("s1", reply("new")).await;
        // First timer fires at 300 s; the second entry lives until 500 s.
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(store.take("s1").await, Some(reply("new")));
    }

    #[tokio::test]
    async fn buttons_round_trip_through_store() {
        let store = InMemoryPendingStore::new(Duration::from_secs(300));
        let r = PendingReply {
            message: "pick one".to_string(),
            buttons: Some(vec![Button {
                label: "Book a call".to_string(),
                action: "diagnosis".to_string(),
            }]),
        };
        store.put("s1", r.clone()).await;
        assert_eq!(store.take("s1").await, Some(r));
    }
}
