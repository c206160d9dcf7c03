//! Facebook Messenger channel: webhook events in, Graph API Send API out.

use crate::channels::inbound::InboundMessage;
use crate::channels::outbound::{Button, ButtonAction, Card, OutboundMessage};
use crate::channels::registry::{ChannelError, ChannelHandle};
use crate::nlu::Platform;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const GRAPH_API_BASE: &str = "https://graph.facebook.com";
pub const MESSENGER_CHANNEL_ID: &str = "messenger";
/// Send API limits.
const MAX_QUICK_REPLIES: usize = 13;
const MAX_TEMPLATE_BUTTONS: usize = 3;
const MAX_GENERIC_ELEMENTS: usize = 10;

/// Webhook POST body: `{ "object": "page", "entry": [{ "messaging": [...] }] }`.
#[derive(Debug, Deserialize)]
pub struct MessengerWebhook {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<MessengerEntry>,
}

#[derive(Debug, Deserialize)]
pub struct MessengerEntry {
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

#[derive(Debug, Deserialize)]
pub struct MessagingEvent {
    pub sender: MessengerParty,
    #[serde(default)]
    pub message: Option<MessengerMessage>,
    #[serde(default)]
    pub postback: Option<MessengerPostback>,
}

#[derive(Debug, Deserialize)]
pub struct MessengerParty {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessengerMessage {
    #[serde(default)]
    pub is_echo: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub quick_reply: Option<MessengerQuickReply>,
    #[serde(default)]
    pub attachments: Vec<MessengerAttachment>,
}

#[derive(Debug, Deserialize)]
pub struct MessengerQuickReply {
    pub payload: String,
}

#[derive(Debug, Deserialize)]
pub struct MessengerAttachment {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct MessengerPostback {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
}

impl MessengerWebhook {
    /// Inbound messages for user text, quick-reply taps, postbacks and attachments.
    /// Echoes of the page's own messages and delivery/read receipts are skipped.
    pub fn into_inbound(self) -> Vec<InboundMessage> {
        if self.object != "page" {
            log::debug!("messenger: ignoring webhook object {}", self.object);
            return Vec::new();
        }
        self.entry
            .into_iter()
            .flat_map(|e| e.messaging)
            .filter_map(event_to_inbound)
            .collect()
    }
}

fn event_to_inbound(event: MessagingEvent) -> Option<InboundMessage> {
    let base = InboundMessage {
        channel_id: MESSENGER_CHANNEL_ID.to_string(),
        sender_id: event.sender.id,
        ..InboundMessage::default()
    };
    if let Some(msg) = event.message {
        if msg.is_echo {
            return None;
        }
        let text = msg
            .quick_reply
            .map(|q| q.payload)
            .or(msg.text)
            .filter(|t| !t.is_empty());
        let attachments: Vec<String> = msg.attachments.into_iter().map(|a| a.kind).collect();
        if text.is_none() && attachments.is_empty() {
            return None;
        }
        return Some(InboundMessage {
            text,
            attachments,
            ..base
        });
    }
    let postback = event.postback?;
    let text = postback
        .payload
        .filter(|p| !p.is_empty())
        .or(postback.title)?;
    Some(InboundMessage {
        text: Some(text),
        ..base
    })
}

/// Webhook subscription check: returns the challenge to echo when mode is "subscribe"
/// and the token matches the configured verify token.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: Option<&str>,
) -> Option<String> {
    let expected = expected_token.filter(|t| !t.is_empty())?;
    if mode == Some("subscribe") && token == Some(expected) {
        challenge.map(str::to_string)
    } else {
        None
    }
}

/// Check `X-Hub-Signature-256: sha256=<hex>` against HMAC-SHA256 of the raw body.
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let signature = signature
        .trim()
        .strip_prefix("sha256=")
        .unwrap_or(signature)
        .trim();
    let expected = match hex::decode(signature) {
        Ok(value) => value,
        Err(_) => return false,
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(value) => value,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn template_button(button: &Button) -> Value {
    match &button.action {
        ButtonAction::Url(url) => json!({ "type": "web_url", "url": url, "title": button.title }),
        ButtonAction::Postback(_) => json!({
            "type": "postback",
            "title": button.title,
            "payload": button.callback_data().unwrap_or_default(),
        }),
    }
}

fn template_buttons(buttons: &[Button]) -> Vec<Value> {
    buttons
        .iter()
        .take(MAX_TEMPLATE_BUTTONS)
        .map(template_button)
        .collect()
}

fn generic_element(card: &Card) -> Value {
    let mut element = json!({ "title": card.title, "subtitle": card.subtitle });
    if let Some(ref url) = card.image_url {
        element["image_url"] = Value::String(url.clone());
    }
    if !card.buttons.is_empty() {
        element["buttons"] = Value::Array(template_buttons(&card.buttons));
    }
    element
}

/// Send API `message` objects for one outbound message. Card sequences longer than the
/// generic template allows are split into several carousels.
pub fn messenger_message_payloads(message: &OutboundMessage) -> Vec<Value> {
    match message {
        OutboundMessage::Text(text) => vec![json!({ "text": text })],
        OutboundMessage::QuickReplies { title, options } => {
            let replies: Vec<Value> = options
                .iter()
                .filter(|o| !o.is_empty())
                .take(MAX_QUICK_REPLIES)
                .map(|o| json!({ "content_type": "text", "title": o, "payload": o }))
                .collect();
            vec![json!({ "text": title, "quick_replies": replies })]
        }
        OutboundMessage::Image { url } => vec![json!({
            "attachment": { "type": "image", "payload": { "url": url, "is_reusable": true } }
        })],
        OutboundMessage::Cards(cards) => cards
            .chunks(MAX_GENERIC_ELEMENTS)
            .map(|chunk| {
                let elements: Vec<Value> = chunk.iter().map(generic_element).collect();
                json!({
                    "attachment": {
                        "type": "template",
                        "payload": { "template_type": "generic", "elements": elements }
                    }
                })
            })
            .collect(),
        OutboundMessage::Buttons { text, buttons } => vec![json!({
            "attachment": {
                "type": "template",
                "payload": {
                    "template_type": "button",
                    "text": text,
                    "buttons": template_buttons(buttons),
                }
            }
        })],
    }
}

/// Messenger connector. Inbound events arrive through the gateway webhook; this handle sends replies.
pub struct MessengerChannel {
    id: String,
    page_access_token: Option<String>,
    api_base: String,
    api_version: String,
    client: reqwest::Client,
}

impl MessengerChannel {
    pub fn new(page_access_token: Option<String>, api_version: impl Into<String>) -> Self {
        Self::with_api_base(page_access_token, api_version, GRAPH_API_BASE)
    }

    /// Channel talking to a custom Graph API endpoint (tests).
    pub fn with_api_base(
        page_access_token: Option<String>,
        api_version: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            id: MESSENGER_CHANNEL_ID.to_string(),
            page_access_token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_version: api_version.into(),
            client: reqwest::Client::new(),
        }
    }

    /// POST /{version}/me/messages with the page access token.
    async fn call_send_api(&self, body: &Value) -> Result<(), ChannelError> {
        let token = self
            .page_access_token
            .as_deref()
            .ok_or(ChannelError::NotConfigured("messenger page access token"))?;
        let url = format!("{}/{}/me/messages", self.api_base, self.api_version);
        let res = self
            .client
            .post(&url)
            .query(&[("access_token", token)])
            .json(body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("send api failed: {} {}", status, body)));
        }
        Ok(())
    }

    /// Send a `message` object to a page-scoped user id.
    pub async fn send_payload(&self, recipient: &str, message: Value) -> Result<(), ChannelError> {
        let body = json!({
            "recipient": { "id": recipient },
            "messaging_type": "RESPONSE",
            "message": message,
        });
        self.call_send_api(&body).await
    }

    /// Send a sender action ("typing_on", "typing_off", "mark_seen").
    pub async fn send_action(&self, recipient: &str, action: &str) -> Result<(), ChannelError> {
        let body = json!({ "recipient": { "id": recipient }, "sender_action": action });
        self.call_send_api(&body).await
    }
}

#[async_trait]
impl ChannelHandle for MessengerChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn stop(&self) {}

    async fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        for payload in messenger_message_payloads(message) {
            self.send_payload(recipient, payload).await?;
        }
        Ok(())
    }

    async fn send_typing(&self, recipient: &str) -> Result<(), ChannelError> {
        self.send_action(recipient, "typing_on").await
    }
}
