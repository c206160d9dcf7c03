//! Channel registry: register and lookup channels by id.

use crate::channels::outbound::OutboundMessage;
use crate::nlu::Platform;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
    #[error("channel not configured: {0}")]
    NotConfigured(&'static str),
}

/// Handle to a running channel (stop, send messages).
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "telegram").
    fn id(&self) -> &str;
    /// Platform tag used for NLU queries and payload selection.
    fn platform(&self) -> Platform;
    /// Stop the channel connector.
    fn stop(&self);
    /// Render and send one outbound message to a recipient.
    async fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), ChannelError>;
    /// Show a typing indicator. Default does nothing.
    async fn send_typing(&self, _recipient: &str) -> Result<(), ChannelError> {
        Ok(())
    }
    /// Acknowledge a platform event (e.g. a tapped inline button). Default does nothing.
    async fn acknowledge(&self, _token: &str) -> Result<(), ChannelError> {
        Ok(())
    }
    /// Send plain text.
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        self.send(recipient, &OutboundMessage::Text(text.to_string()))
            .await
    }
}

/// Registry of channel ids to handles. Shared across gateway.
pub struct ChannelRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<dyn ChannelHandle>>>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, id: String, handle: Arc<dyn ChannelHandle>) {
        let mut g = self.inner.write().await;
        if let Some(old) = g.insert(id, handle) {
            old.stop();
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn ChannelHandle>> {
        let g = self.inner.read().await;
        g.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        let g = self.inner.read().await;
        let mut ids: Vec<String> = g.keys().cloned().collect();
        ids.sort();
        ids
    }
}
