//! Telegram channel: long-poll getUpdates and render replies via the Bot API.

use crate::channels::inbound::InboundMessage;
use crate::channels::outbound::{Button, ButtonAction, Card, OutboundMessage};
use crate::channels::registry::{ChannelError, ChannelHandle};
use crate::nlu::Platform;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
pub const TELEGRAM_CHANNEL_ID: &str = "telegram";

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_markup: Option<TelegramReplyMarkup>,
    #[serde(default)]
    pub photo: Option<Value>,
    #[serde(default)]
    pub document: Option<Value>,
    #[serde(default)]
    pub sticker: Option<Value>,
    #[serde(default)]
    pub voice: Option<Value>,
    #[serde(default)]
    pub audio: Option<Value>,
    #[serde(default)]
    pub video: Option<Value>,
    #[serde(default)]
    pub animation: Option<Value>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub contact: Option<Value>,
}

impl TelegramMessage {
    /// Kinds of media/attachments present on the message.
    pub fn attachment_kinds(&self) -> Vec<String> {
        [
            ("photo", &self.photo),
            ("document", &self.document),
            ("sticker", &self.sticker),
            ("voice", &self.voice),
            ("audio", &self.audio),
            ("video", &self.video),
            ("animation", &self.animation),
            ("location", &self.location),
            ("contact", &self.contact),
        ]
        .iter()
        .filter(|(_, v)| v.is_some())
        .map(|(k, _)| k.to_string())
        .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramCallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramReplyMarkup {
    #[serde(default)]
    pub inline_keyboard: Vec<Vec<TelegramInlineButton>>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramInlineButton {
    pub text: String,
    #[serde(default)]
    pub callback_data: Option<String>,
}

/// Reduce an update to an inbound message. Messages with neither text nor attachments
/// (service messages) and callback queries without data are dropped.
pub fn update_to_inbound(update: &TelegramUpdate) -> Option<InboundMessage> {
    if let Some(ref msg) = update.message {
        let text = msg.text.clone().filter(|t| !t.is_empty());
        let attachments = msg.attachment_kinds();
        if text.is_none() && attachments.is_empty() {
            return None;
        }
        return Some(InboundMessage {
            channel_id: TELEGRAM_CHANNEL_ID.to_string(),
            sender_id: msg.chat.id.to_string(),
            text,
            attachments,
            ..InboundMessage::default()
        });
    }
    let query = update.callback_query.as_ref()?;
    let data = query.data.clone()?;
    let msg = query.message.as_ref()?;
    Some(InboundMessage {
        channel_id: TELEGRAM_CHANNEL_ID.to_string(),
        sender_id: msg.chat.id.to_string(),
        selection: Some(selected_label(msg, &data).unwrap_or_else(|| data.clone())),
        text: Some(data),
        ack: Some(query.id.clone()),
        ..InboundMessage::default()
    })
}

/// Label of the inline button whose callback data matches `data`. Callers echo the
/// raw data when the keyboard no longer carries it.
fn selected_label(msg: &TelegramMessage, data: &str) -> Option<String> {
    msg.reply_markup
        .as_ref()?
        .inline_keyboard
        .iter()
        .flatten()
        .find(|b| b.callback_data.as_deref() == Some(data))
        .map(|b| b.text.clone())
}

fn inline_button(button: &Button) -> Value {
    match &button.action {
        ButtonAction::Url(url) => json!({ "text": button.title, "url": url }),
        ButtonAction::Postback(_) => json!({
            "text": button.title,
            "callback_data": button.callback_data().unwrap_or_default(),
        }),
    }
}

/// Inline keyboard with one button per row.
pub fn button_keyboard(buttons: &[Button]) -> Value {
    let rows: Vec<Value> = buttons
        .iter()
        .map(|b| Value::Array(vec![inline_button(b)]))
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Inline keyboard with all options on a single row; each label is its own callback data.
pub fn quick_reply_keyboard(options: &[String]) -> Value {
    let row: Vec<Value> = options
        .iter()
        .filter(|o| !o.is_empty())
        .map(|o| json!({ "text": o, "callback_data": o }))
        .collect();
    json!({ "inline_keyboard": [row] })
}

/// Caption of a card's button message.
pub fn card_caption(card: &Card) -> String {
    format!("<b>{}</b>\n{}", card.title, card.subtitle)
}

/// Telegram channel connector: long-polls for updates and sends replies via the Bot API.
pub struct TelegramChannel {
    id: String,
    token: Option<String>,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self::with_api_base(token, telegram_api_base())
    }

    /// Channel talking to a custom Bot API endpoint (local Bot API server or tests).
    pub fn with_api_base(token: Option<String>, api_base: impl Into<String>) -> Self {
        Self {
            id: TELEGRAM_CHANNEL_ID.to_string(),
            token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn method_url(&self, method: &str) -> Result<String, ChannelError> {
        let token = self
            .token
            .as_ref()
            .ok_or(ChannelError::NotConfigured("telegram bot token"))?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// Start the getUpdates long-poll loop and forward messages to the gateway. Returns a handle to await on shutdown.
    pub fn start_inbound(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), ChannelError> {
        let url = format!(
            "{}?timeout={}",
            self.method_url("getUpdates")?,
            LONG_POLL_TIMEOUT
        );
        let url = if let Some(off) = offset {
            format!("{}&offset={}", url, off)
        } else {
            url
        };
        let res = self.client.get(&url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("getUpdates failed: {} {}", status, body)));
        }
        let data: GetUpdatesResponse = res.json().await?;
        if !data.ok {
            return Err(ChannelError::Api("getUpdates returned ok: false".to_string()));
        }
        let next_offset = data
            .result
            .iter()
            .map(|u| u.update_id)
            .max()
            .map(|id| id + 1);
        Ok((data.result, next_offset))
    }

    /// POST a Bot API method with a JSON body; fails on HTTP errors and `ok: false`.
    async fn call(&self, method: &str, body: &Value) -> Result<(), ChannelError> {
        let url = self.method_url(method)?;
        let res = self.client.post(&url).json(body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("{} failed: {} {}", method, status, body)));
        }
        let data: ApiResponse = res.json().await?;
        if !data.ok {
            return Err(ChannelError::Api(format!(
                "{} returned ok: false: {}",
                method,
                data.description.unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// Set webhook URL (and optional secret). When set, Telegram POSTs updates to the URL instead of getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), ChannelError> {
        let mut body = json!({ "url": url });
        if let Some(s) = secret {
            body["secret_token"] = Value::String(s.to_string());
        }
        self.call("setWebhook", &body).await
    }

    /// Remove webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), ChannelError> {
        self.call("deleteWebhook", &json!({})).await
    }

    /// sendMessage with HTML parse mode and an optional inline keyboard.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        self.call("sendMessage", &body).await
    }

    /// sendChatAction (e.g. "typing", "upload_photo").
    pub async fn send_chat_action(&self, chat_id: &str, action: &str) -> Result<(), ChannelError> {
        self.call(
            "sendChatAction",
            &json!({ "chat_id": chat_id, "action": action }),
        )
        .await
    }

    /// sendPhoto by URL, preceded by the upload_photo chat action.
    pub async fn send_photo(&self, chat_id: &str, url: &str) -> Result<(), ChannelError> {
        self.send_chat_action(chat_id, "upload_photo").await?;
        self.call("sendPhoto", &json!({ "chat_id": chat_id, "photo": url }))
            .await
    }

    /// answerCallbackQuery so the client stops showing a progress indicator on the button.
    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), ChannelError> {
        self.call(
            "answerCallbackQuery",
            &json!({ "callback_query_id": callback_query_id }),
        )
        .await
    }

    /// A card is its image (when present) followed by the caption with one button per row.
    async fn send_card(&self, chat_id: &str, card: &Card) -> Result<(), ChannelError> {
        if let Some(ref url) = card.image_url {
            self.send_photo(chat_id, url).await?;
        }
        self.send_message(chat_id, &card_caption(card), Some(button_keyboard(&card.buttons)))
            .await
    }
}

async fn run_get_updates_loop(channel: Arc<TelegramChannel>, inbound_tx: mpsc::Sender<InboundMessage>) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                if next.is_some() {
                    offset = next;
                }
                for u in updates {
                    let Some(inbound) = update_to_inbound(&u) else {
                        log::debug!("telegram: ignoring update {}", u.update_id);
                        continue;
                    };
                    if inbound_tx.send(inbound).await.is_err() {
                        log::debug!("telegram: inbound channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::warn!("telegram getUpdates error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send(&self, recipient: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        match message {
            OutboundMessage::Text(text) => self.send_message(recipient, text, None).await,
            OutboundMessage::QuickReplies { title, options } => {
                self.send_message(recipient, title, Some(quick_reply_keyboard(options)))
                    .await
            }
            OutboundMessage::Image { url } => self.send_photo(recipient, url).await,
            OutboundMessage::Cards(cards) => {
                for card in cards {
                    self.send_card(recipient, card).await?;
                }
                Ok(())
            }
            OutboundMessage::Buttons { text, buttons } => {
                self.send_message(recipient, text, Some(button_keyboard(buttons)))
                    .await
            }
        }
    }

    async fn send_typing(&self, recipient: &str) -> Result<(), ChannelError> {
        self.send_chat_action(recipient, "typing").await
    }

    async fn acknowledge(&self, token: &str) -> Result<(), ChannelError> {
        self.answer_callback_query(token).await
    }
}

/// Resolve Telegram bot API base URL (TELEGRAM_API_BASE env for a local Bot API server).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| TELEGRAM_API_BASE.to_string())
}
