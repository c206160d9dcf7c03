//! Map an NLU response to the outbound messages for one platform.

use crate::channels::{http_url, Button, Card, OutboundMessage};
use crate::nlu::{NluCard, NluMessage, NluResponse, Platform};
use serde_json::Value;

/// Reply when the NLU provider returned nothing usable.
pub const FALLBACK_TEXT: &str = "I'm not sure what you want...";

/// Outbound messages for a response, in order.
///
/// A response with an action or any typed messages is rendered from its messages only,
/// even when that yields nothing. Otherwise the fulfillment text is sent, and when that
/// is empty too the user gets [`FALLBACK_TEXT`].
pub fn plan(response: &NluResponse, platform: Platform) -> Vec<OutboundMessage> {
    if let Some(action) = response.action() {
        log::debug!("dispatch: action {}", action);
    }
    if response.action().is_some() || !response.messages.is_empty() {
        return plan_messages(&response.messages, platform);
    }
    if response.fulfillment_text.trim().is_empty() {
        vec![OutboundMessage::Text(FALLBACK_TEXT.to_string())]
    } else {
        vec![OutboundMessage::Text(response.fulfillment_text.clone())]
    }
}

fn plan_messages(messages: &[NluMessage], platform: Platform) -> Vec<OutboundMessage> {
    let mut out = Vec::new();
    for message in messages {
        match message {
            NluMessage::Text(lines) => {
                out.extend(
                    lines
                        .iter()
                        .filter(|l| !l.is_empty())
                        .map(|l| OutboundMessage::Text(l.clone())),
                );
            }
            NluMessage::QuickReplies { title, replies } => {
                out.push(OutboundMessage::QuickReplies {
                    title: title.clone(),
                    options: replies.clone(),
                });
            }
            NluMessage::Image { image_uri } => {
                if let Some(url) = http_url(image_uri) {
                    out.push(OutboundMessage::Image { url });
                } else {
                    log::info!("dispatch: skipping image with invalid url {:?}", image_uri);
                }
            }
            NluMessage::Card(card) => {
                let card = card_from_nlu(card);
                // Telegram has no carousel; each card is its own paced send.
                match (platform, out.last_mut()) {
                    (Platform::Facebook, Some(OutboundMessage::Cards(cards))) => cards.push(card),
                    _ => out.push(OutboundMessage::Cards(vec![card])),
                }
            }
            NluMessage::Payload(payload) => {
                if let Some(m) = payload_message(payload, platform) {
                    out.push(m);
                }
            }
            NluMessage::Unsupported(kind) => {
                log::debug!("dispatch: skipping unsupported message kind {}", kind);
            }
        }
    }
    out
}

fn card_from_nlu(card: &NluCard) -> Card {
    let subtitle = card
        .subtitle
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(" ")
        .to_string();
    Card {
        title: card.title.clone(),
        subtitle,
        image_url: card.image_uri.as_deref().and_then(http_url),
        buttons: card
            .buttons
            .iter()
            .map(|b| Button::from_postback(b.text.clone(), b.postback.clone()))
            .collect(),
    }
}

/// Custom payload `{ "<platform>": { "attachment": { "payload": { "template_type": … } } } }`.
/// Only the button template is rendered.
fn payload_message(payload: &Value, platform: Platform) -> Option<OutboundMessage> {
    let Some(template) = payload
        .get(platform.payload_key())
        .and_then(|p| p.get("attachment"))
        .and_then(|a| a.get("payload"))
    else {
        log::info!("dispatch: payload has no {} attachment, skipping", platform);
        return None;
    };
    match template.get("template_type").and_then(Value::as_str) {
        Some("button") => {
            let text = template
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let buttons: Vec<Button> = template
                .get("buttons")
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(payload_button).collect())
                .unwrap_or_default();
            Some(OutboundMessage::Buttons { text, buttons })
        }
        other => {
            log::info!("dispatch: payload template type not recognized: {:?}", other);
            None
        }
    }
}

fn payload_button(value: &Value) -> Option<Button> {
    let str_field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    let title = str_field("title").or_else(|| str_field("text"))?;
    if let Some(url) = str_field("url") {
        return Some(Button::url(title, url));
    }
    let data = str_field("payload")
        .or_else(|| str_field("callback_data"))
        .unwrap_or_default();
    Some(Button::postback(title, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ButtonAction;
    use crate::nlu::NluCardButton;
    use serde_json::json;

    fn response(messages: Vec<NluMessage>) -> NluResponse {
        NluResponse {
            messages,
            ..NluResponse::default()
        }
    }

    #[test]
    fn single_text_line() {
        let r = response(vec![NluMessage::Text(vec!["hi".to_string()])]);
        assert_eq!(
            plan(&r, Platform::Telegram),
            vec![OutboundMessage::Text("hi".to_string())]
        );
    }

    #[test]
    fn empty_lines_are_skipped() {
        let r = response(vec![NluMessage::Text(vec![
            "one".to_string(),
            String::new(),
            "two".to_string(),
        ])]);
        assert_eq!(
            plan(&r, Platform::Facebook),
            vec![
                OutboundMessage::Text("one".to_string()),
                OutboundMessage::Text("two".to_string()),
            ]
        );
    }

    #[test]
    fn empty_response_yields_fallback() {
        let r = NluResponse::default();
        assert_eq!(
            plan(&r, Platform::Telegram),
            vec![OutboundMessage::Text(FALLBACK_TEXT.to_string())]
        );
        assert!(FALLBACK_TEXT.contains("not sure"));
    }

    #[test]
    fn fulfillment_text_when_no_messages() {
        let r = NluResponse {
            fulfillment_text: "Hello there".to_string(),
            ..NluResponse::default()
        };
        assert_eq!(
            plan(&r, Platform::Telegram),
            vec![OutboundMessage::Text("Hello there".to_string())]
        );
    }

    #[test]
    fn card_http_postback_is_link() {
        let r = response(vec![NluMessage::Card(NluCard {
            title: "Shop".to_string(),
            subtitle: None,
            image_uri: Some("https://example.com/shop.png".to_string()),
            buttons: vec![
                NluCardButton {
                    text: "Open".to_string(),
                    postback: "https://example.com".to_string(),
                },
                NluCardButton {
                    text: "Prices".to_string(),
                    postback: "PRICES".to_string(),
                },
            ],
        })]);
        let out = plan(&r, Platform::Telegram);
        let [OutboundMessage::Cards(cards)] = out.as_slice() else {
            panic!("expected one card sequence, got {:?}", out);
        };
        let card = &cards[0];
        assert_eq!(card.subtitle, " ");
        assert_eq!(card.image_url.as_deref(), Some("https://example.com/shop.png"));
        assert_eq!(
            card.buttons[0].action,
            ButtonAction::Url("https://example.com".to_string())
        );
        assert_eq!(
            card.buttons[1].action,
            ButtonAction::Postback("PRICES".to_string())
        );
    }

    #[test]
    fn consecutive_cards_are_grouped() {
        let card = |title: &str| {
            NluMessage::Card(NluCard {
                title: title.to_string(),
                ..NluCard::default()
            })
        };
        let r = response(vec![
            card("a"),
            card("b"),
            NluMessage::Text(vec!["between".to_string()]),
            card("c"),
        ]);
        let out = plan(&r, Platform::Facebook);
        assert_eq!(out.len(), 3);
        let OutboundMessage::Cards(first) = &out[0] else {
            panic!("expected cards");
        };
        assert_eq!(first.len(), 2);
        let OutboundMessage::Cards(last) = &out[2] else {
            panic!("expected cards");
        };
        assert_eq!(last[0].title, "c");
    }

    #[test]
    fn invalid_image_is_dropped() {
        let r = response(vec![
            NluMessage::Image {
                image_uri: "nope".to_string(),
            },
            NluMessage::Image {
                image_uri: "https://example.com/a.jpg".to_string(),
            },
        ]);
        assert_eq!(
            plan(&r, Platform::Telegram),
            vec![OutboundMessage::Image {
                url: "https://example.com/a.jpg".to_string()
            }]
        );
    }

    #[test]
    fn schemeless_image_is_sent_over_https() {
        let r = response(vec![NluMessage::Image {
            image_uri: "example.com/a.jpg".to_string(),
        }]);
        assert_eq!(
            plan(&r, Platform::Facebook),
            vec![OutboundMessage::Image {
                url: "https://example.com/a.jpg".to_string()
            }]
        );
    }

    #[test]
    fn quick_replies_keep_title_and_options() {
        let r = response(vec![NluMessage::QuickReplies {
            title: "Choose".to_string(),
            replies: vec!["Yes".to_string(), "No".to_string()],
        }]);
        assert_eq!(
            plan(&r, Platform::Telegram),
            vec![OutboundMessage::QuickReplies {
                title: "Choose".to_string(),
                options: vec!["Yes".to_string(), "No".to_string()],
            }]
        );
    }

    #[test]
    fn button_payload_for_platform() {
        let payload = json!({
            "telegram": {
                "attachment": {
                    "payload": {
                        "template_type": "button",
                        "text": "Links",
                        "buttons": [
                            { "title": "Web", "url": "https://example.com" },
                            { "title": "Call me" }
                        ]
                    }
                }
            }
        });
        let r = response(vec![NluMessage::Payload(payload.clone())]);
        assert_eq!(
            plan(&r, Platform::Telegram),
            vec![OutboundMessage::Buttons {
                text: "Links".to_string(),
                buttons: vec![
                    Button::url("Web", "https://example.com"),
                    Button::postback("Call me", ""),
                ],
            }]
        );
        // No facebook key: nothing is rendered and no fallback is added.
        assert!(plan(&r, Platform::Facebook).is_empty());
    }

    #[test]
    fn unknown_template_type_is_skipped() {
        let payload = json!({
            "facebook": { "attachment": { "payload": { "template_type": "receipt" } } }
        });
        let r = NluResponse {
            fulfillment_text: "Here is your receipt".to_string(),
            messages: vec![NluMessage::Payload(payload)],
            ..NluResponse::default()
        };
        assert!(plan(&r, Platform::Facebook).is_empty());
    }

    #[test]
    fn action_without_messages_sends_nothing() {
        let r = NluResponse {
            action: Some("input.welcome".to_string()),
            ..NluResponse::default()
        };
        assert!(plan(&r, Platform::Telegram).is_empty());

        let blank = NluResponse {
            action: Some("  ".to_string()),
            ..NluResponse::default()
        };
        assert_eq!(
            plan(&blank, Platform::Telegram),
            vec![OutboundMessage::Text(FALLBACK_TEXT.to_string())]
        );
    }

    #[test]
    fn telegram_cards_stay_separate() {
        let card = |title: &str| {
            NluMessage::Card(NluCard {
                title: title.to_string(),
                ..NluCard::default()
            })
        };
        let r = response(vec![card("a"), card("b"), card("c")]);
        let out = plan(&r, Platform::Telegram);
        assert_eq!(out.len(), 3);
        let titles: Vec<&str> = out
            .iter()
            .map(|m| match m {
                OutboundMessage::Cards(cards) if cards.len() == 1 => cards[0].title.as_str(),
                other => panic!("expected a single card, got {:?}", other),
            })
            .collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn unsupported_kind_is_ignored() {
        let r = response(vec![
            NluMessage::Unsupported("simpleResponses".to_string()),
            NluMessage::Text(vec!["ok".to_string()]),
        ]);
        assert_eq!(
            plan(&r, Platform::Telegram),
            vec![OutboundMessage::Text("ok".to_string())]
        );
    }
}
