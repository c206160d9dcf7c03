//! Provider-neutral NLU response types.

use serde::{Deserialize, Serialize};

/// Platform a message came from. Sent to the NLU provider as the query source and used to
/// pick platform-specific messages and custom payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Telegram,
    Facebook,
}

impl Platform {
    /// Source tag sent with the query and matched against a message's `platform` field.
    pub fn tag(self) -> &'static str {
        match self {
            Platform::Telegram => "TELEGRAM",
            Platform::Facebook => "FACEBOOK",
        }
    }

    /// Top-level key of a custom payload addressed to this platform.
    pub fn payload_key(self) -> &'static str {
        match self {
            Platform::Telegram => "telegram",
            Platform::Facebook => "facebook",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.payload_key())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "telegram" => Ok(Platform::Telegram),
            "facebook" | "messenger" => Ok(Platform::Facebook),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Structured result of one NLU query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NluResponse {
    pub fulfillment_text: String,
    pub action: Option<String>,
    pub output_contexts: Vec<serde_json::Value>,
    pub parameters: serde_json::Value,
    /// Ordered messages to render.
    pub messages: Vec<NluMessage>,
}

impl NluResponse {
    /// Action name when present and non-empty.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref().filter(|a| !a.trim().is_empty())
    }
}

/// One typed message of an NLU response.
#[derive(Debug, Clone, PartialEq)]
pub enum NluMessage {
    /// One or more text lines; each non-empty line is sent separately.
    Text(Vec<String>),
    QuickReplies { title: String, replies: Vec<String> },
    Image { image_uri: String },
    Card(NluCard),
    /// Custom JSON payload, keyed by platform.
    Payload(serde_json::Value),
    /// Any kind the relay does not render; carries the kind name for logging.
    Unsupported(String),
}

impl NluMessage {
    pub fn kind(&self) -> &str {
        match self {
            NluMessage::Text(_) => "text",
            NluMessage::QuickReplies { .. } => "quickReplies",
            NluMessage::Image { .. } => "image",
            NluMessage::Card(_) => "card",
            NluMessage::Payload(_) => "payload",
            NluMessage::Unsupported(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NluCard {
    pub title: String,
    pub subtitle: Option<String>,
    pub image_uri: Option<String>,
    pub buttons: Vec<NluCardButton>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NluCardButton {
    pub text: String,
    pub postback: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parses_aliases() {
        assert_eq!("Telegram".parse::<Platform>().unwrap(), Platform::Telegram);
        assert_eq!("messenger".parse::<Platform>().unwrap(), Platform::Facebook);
        assert!("slack".parse::<Platform>().is_err());
        assert_eq!(Platform::Facebook.tag(), "FACEBOOK");
    }

    #[test]
    fn blank_action_is_none() {
        let mut r = NluResponse::default();
        assert_eq!(r.action(), None);
        r.action = Some("  ".to_string());
        assert_eq!(r.action(), None);
        r.action = Some("input.welcome".to_string());
        assert_eq!(r.action(), Some("input.welcome"));
    }
}
