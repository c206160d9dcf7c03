//! Inbound message from a channel: delivered to the gateway, which hands it to the relay.

/// A user event reduced to what the relay needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundMessage {
    pub channel_id: String,
    /// Platform user/chat id; replies go back to it.
    pub sender_id: String,
    /// Text typed by the user, or the data of a tapped button. None for attachment-only messages.
    pub text: Option<String>,
    /// Kinds of attachments carried by the message (e.g. "photo", "image", "sticker").
    pub attachments: Vec<String>,
    /// Label of the tapped button, echoed back before the reply.
    pub selection: Option<String>,
    /// Platform token to acknowledge the event with (Telegram callback query id).
    pub ack: Option<String>,
}

impl InboundMessage {
    pub fn text(
        channel_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            sender_id: sender_id.into(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Trimmed text when present and non-empty.
    pub fn query_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
