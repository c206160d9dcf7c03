//! Outbound message: platform-neutral reply constructs each channel knows how to render.

use serde::Serialize;

/// One message to send to a user, rendered by the channel into its own API calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "camelCase")]
pub enum OutboundMessage {
    Text(String),
    /// Prompt with tappable options; an option's label is also its callback data.
    QuickReplies { title: String, options: Vec<String> },
    Image { url: String },
    /// Sequence of cards (a carousel where the platform supports one).
    Cards(Vec<Card>),
    /// Button template from a custom payload.
    Buttons { text: String, buttons: Vec<Button> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub title: String,
    pub subtitle: String,
    pub image_url: Option<String>,
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    pub title: String,
    pub action: ButtonAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ButtonAction {
    /// Opens a link.
    Url(String),
    /// Sends data back to the bot when tapped.
    Postback(String),
}

impl Button {
    pub fn url(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            action: ButtonAction::Url(url.into()),
        }
    }

    pub fn postback(title: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            action: ButtonAction::Postback(data.into()),
        }
    }

    /// A postback that looks like a link ("http…") opens it instead of calling back.
    pub fn from_postback(title: impl Into<String>, postback: impl Into<String>) -> Self {
        let postback = postback.into();
        if postback.starts_with("http") {
            Self::url(title, postback)
        } else {
            Self::postback(title, postback)
        }
    }

    /// Callback data to send for a postback button; empty data falls back to the title.
    pub fn callback_data(&self) -> Option<&str> {
        match &self.action {
            ButtonAction::Url(_) => None,
            ButtonAction::Postback(data) if data.trim().is_empty() => Some(&self.title),
            ButtonAction::Postback(data) => Some(data),
        }
    }
}

/// Normalized http(s) URL for a media link. A link without a scheme
/// (`example.com/a.png`) is taken as https when its host has a dot.
pub fn http_url(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(u) = reqwest::Url::parse(value) {
        if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() {
            return Some(value.to_string());
        }
        if value.contains("://") {
            return None;
        }
    }
    let candidate = format!("https://{}", value);
    let u = reqwest::Url::parse(&candidate).ok()?;
    let host = u.host_str()?;
    if host.contains('.') && !host.starts_with('.') && !host.ends_with('.') {
        Some(candidate)
    } else {
        None
    }
}
