//! Per-sender NLU session tokens.
//!
//! Each (channel, sender) pair gets one generated token on its first message; the token
//! is passed to the NLU provider so it can keep conversation context. Tokens live for the
//! lifetime of the process (no persistence, no eviction).

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Opaque session token sent to the NLU provider.
pub type SessionId = String;

/// Key for the sender side of a session (channel id + platform sender id).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct SenderKey {
    pub channel_id: String,
    pub sender_id: String,
}

impl SenderKey {
    pub fn new(channel_id: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            sender_id: sender_id.into(),
        }
    }
}

/// In-memory store: (channel_id, sender_id) -> session token.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SenderKey, SessionId>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Return the sender's token, creating one on first use.
    pub async fn ensure(&self, channel_id: &str, sender_id: &str) -> SessionId {
        let key = SenderKey::new(channel_id, sender_id);
        if let Some(id) = self.inner.read().await.get(&key) {
            return id.clone();
        }
        let mut g = self.inner.write().await;
        g.entry(key)
            .or_insert_with(|| {
                let id = uuid::Uuid::new_v4().to_string();
                log::debug!("session: new token {} for {}/{}", id, channel_id, sender_id);
                id
            })
            .clone()
    }

    /// Token for a sender, if one was created.
    pub async fn get(&self, channel_id: &str, sender_id: &str) -> Option<SessionId> {
        let key = SenderKey::new(channel_id, sender_id);
        self.inner.read().await.get(&key).cloned()
    }

    /// Number of known senders.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
