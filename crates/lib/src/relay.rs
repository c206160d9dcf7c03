//! Relay turn: ensure the sender's session, ask the NLU provider, render its reply.
//!
//! Messages of a multi-message reply are sent one after another with a fixed pause after
//! each, so platforms keep them in order.

use crate::channels::{ChannelError, ChannelHandle, InboundMessage, OutboundMessage};
use crate::dispatch;
use crate::nlu::{NluClient, NluError};
use crate::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;

/// Reply to messages that carry only attachments.
pub const UNSUPPORTED_MESSAGE_TEXT: &str = "I don't understand that kind of message yet";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Nlu(#[from] NluError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Relays inbound channel messages to the NLU provider and sends back its reply.
#[derive(Clone)]
pub struct Relay {
    sessions: SessionStore,
    nlu: Arc<dyn NluClient>,
    message_delay: Duration,
}

impl Relay {
    pub fn new(nlu: Arc<dyn NluClient>, sessions: SessionStore, message_delay: Duration) -> Self {
        Self {
            sessions,
            nlu,
            message_delay,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one inbound message end to end. Errors are logged, never returned.
    pub async fn handle_inbound(&self, channel: &dyn ChannelHandle, msg: InboundMessage) {
        if let Err(e) = self.try_handle_inbound(channel, &msg).await {
            log::warn!(
                "relay: {} message from {} failed: {}",
                msg.channel_id,
                msg.sender_id,
                e
            );
        }
    }

    async fn try_handle_inbound(
        &self,
        channel: &dyn ChannelHandle,
        msg: &InboundMessage,
    ) -> Result<(), RelayError> {
        if let Some(ref token) = msg.ack {
            if let Err(e) = channel.acknowledge(token).await {
                log::debug!("relay: acknowledge failed: {}", e);
            }
        }
        let Some(text) = msg.query_text() else {
            log::info!(
                "relay: {} sent attachments only ({:?})",
                msg.sender_id,
                msg.attachments
            );
            channel
                .send_text(&msg.sender_id, UNSUPPORTED_MESSAGE_TEXT)
                .await?;
            return Ok(());
        };
        log::info!("relay: received from {}/{}: {}", msg.channel_id, msg.sender_id, text);

        if let Some(ref label) = msg.selection {
            channel
                .send_text(&msg.sender_id, &format!("<b>Selected:</b> {}", label))
                .await?;
        }

        let session = self.sessions.ensure(&msg.channel_id, &msg.sender_id).await;
        if let Err(e) = channel.send_typing(&msg.sender_id).await {
            log::debug!("relay: typing indicator failed: {}", e);
        }
        let response = self
            .nlu
            .detect_intent(text, &session, channel.platform())
            .await?;
        let planned = dispatch::plan(&response, channel.platform());
        self.send_all(channel, &msg.sender_id, &planned).await;
        Ok(())
    }

    /// Send messages in order, pausing after each. A failed send is logged and the rest are still sent.
    pub async fn send_all(
        &self,
        channel: &dyn ChannelHandle,
        recipient: &str,
        messages: &[OutboundMessage],
    ) {
        for message in messages {
            if let Err(e) = channel.send(recipient, message).await {
                log::warn!("relay: send to {} failed: {}", recipient, e);
            }
            if !self.message_delay.is_zero() {
                tokio::time::sleep(self.message_delay).await;
            }
        }
    }
}
