//! Platform clients against a local HTTP server that records every request it receives.

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, Uri},
    Json, Router,
};
use relay::channels::{
    Button, Card, ChannelHandle, MessengerChannel, OutboundMessage, TelegramChannel,
};
use relay::config::NluConfig;
use relay::nlu::{DialogflowClient, NluError, NluMessage, Platform};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: String,
    body: Value,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

async fn record(State(log): State<Log>, method: Method, uri: Uri, body: Bytes) -> Json<Value> {
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let path = uri.path().to_string();
    log.lock().unwrap().push(Recorded {
        method,
        path: path.clone(),
        query: uri.query().unwrap_or_default().to_string(),
        body,
    });
    if path.ends_with(":detectIntent") {
        Json(json!({
            "responseId": "r-1",
            "queryResult": {
                "queryText": "hello",
                "action": "input.welcome",
                "fulfillmentText": "Hi!",
                "fulfillmentMessages": [
                    { "platform": "TELEGRAM", "text": { "text": ["Hi from Telegram"] } },
                    { "text": { "text": ["Hi!"] } }
                ]
            }
        }))
    } else {
        Json(json!({ "ok": true, "result": true }))
    }
}

/// Start the recorder on a random local port; returns its base URL and request log.
async fn start_recorder() -> (String, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(record).with_state(log.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind recorder");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}", addr), log)
}

fn requests(log: &Log) -> Vec<Recorded> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn telegram_sends_quick_replies_as_inline_keyboard() {
    let (base, log) = start_recorder().await;
    let channel = TelegramChannel::with_api_base(Some("123:abc".to_string()), &base);

    channel
        .send(
            "42",
            &OutboundMessage::QuickReplies {
                title: "Pick one".to_string(),
                options: vec!["Yes".to_string(), "No".to_string()],
            },
        )
        .await
        .expect("send quick replies");

    let reqs = requests(&log);
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].method, Method::POST);
    assert_eq!(reqs[0].path, "/bot123:abc/sendMessage");
    assert_eq!(reqs[0].body["chat_id"], "42");
    assert_eq!(reqs[0].body["text"], "Pick one");
    assert_eq!(reqs[0].body["parse_mode"], "HTML");
    assert_eq!(
        reqs[0].body["reply_markup"],
        json!({ "inline_keyboard": [[
            { "text": "Yes", "callback_data": "Yes" },
            { "text": "No", "callback_data": "No" }
        ]] })
    );
}

#[tokio::test]
async fn telegram_card_sends_photo_then_caption() {
    let (base, log) = start_recorder().await;
    let channel = TelegramChannel::with_api_base(Some("t".to_string()), &base);
    let card = Card {
        title: "Shop".to_string(),
        subtitle: "Open daily".to_string(),
        image_url: Some("https://example.com/shop.png".to_string()),
        buttons: vec![Button::postback("Hours", "HOURS")],
    };

    channel
        .send("42", &OutboundMessage::Cards(vec![card]))
        .await
        .expect("send card");

    let paths: Vec<String> = requests(&log).into_iter().map(|r| r.path).collect();
    assert_eq!(
        paths,
        vec!["/bott/sendChatAction", "/bott/sendPhoto", "/bott/sendMessage"]
    );
    let last = requests(&log).pop().expect("caption request");
    assert_eq!(last.body["text"], "<b>Shop</b>\nOpen daily");
}

#[tokio::test]
async fn telegram_typing_and_acknowledge() {
    let (base, log) = start_recorder().await;
    let channel = TelegramChannel::with_api_base(Some("t".to_string()), &base);

    channel.send_typing("42").await.expect("typing");
    channel.acknowledge("cbq-9").await.expect("ack");

    let reqs = requests(&log);
    assert_eq!(reqs[0].path, "/bott/sendChatAction");
    assert_eq!(reqs[0].body, json!({ "chat_id": "42", "action": "typing" }));
    assert_eq!(reqs[1].path, "/bott/answerCallbackQuery");
    assert_eq!(reqs[1].body["callback_query_id"], "cbq-9");
}

#[tokio::test]
async fn telegram_without_token_is_not_configured() {
    let (base, log) = start_recorder().await;
    let channel = TelegramChannel::with_api_base(None, &base);

    let err = channel.send_text("42", "hi").await.unwrap_err();
    assert!(err.to_string().contains("not configured"));
    assert!(requests(&log).is_empty());
}

#[tokio::test]
async fn messenger_posts_to_send_api_with_page_token() {
    let (base, log) = start_recorder().await;
    let channel = MessengerChannel::with_api_base(Some("page-token".to_string()), "v17.0", &base);

    channel.send_typing("psid-1").await.expect("typing");
    channel
        .send("psid-1", &OutboundMessage::Text("hello".to_string()))
        .await
        .expect("send text");

    let reqs = requests(&log);
    assert_eq!(reqs.len(), 2);
    for r in &reqs {
        assert_eq!(r.method, Method::POST);
        assert_eq!(r.path, "/v17.0/me/messages");
        assert_eq!(r.query, "access_token=page-token");
    }
    assert_eq!(
        reqs[0].body,
        json!({ "recipient": { "id": "psid-1" }, "sender_action": "typing_on" })
    );
    assert_eq!(reqs[1].body["recipient"]["id"], "psid-1");
    assert_eq!(reqs[1].body["message"], json!({ "text": "hello" }));
}

#[tokio::test]
async fn dialogflow_detect_intent_round_trip() {
    let (base, log) = start_recorder().await;
    let client = DialogflowClient::new(&NluConfig {
        project_id: Some("demo-agent".to_string()),
        access_token: Some("ya29.token".to_string()),
        language_code: "es".to_string(),
        base_url: base,
    });

    let response = client
        .detect_intent("hola", "session-1", Platform::Telegram)
        .await
        .expect("detect intent");

    assert_eq!(response.action(), Some("input.welcome"));
    assert_eq!(
        response.messages,
        vec![NluMessage::Text(vec!["Hi from Telegram".to_string()])]
    );

    let reqs = requests(&log);
    assert_eq!(reqs.len(), 1);
    assert_eq!(
        reqs[0].path,
        "/v2/projects/demo-agent/agent/sessions/session-1:detectIntent"
    );
    assert_eq!(
        reqs[0].body,
        json!({
            "queryInput": { "text": { "text": "hola", "languageCode": "es" } },
            "queryParams": { "payload": { "source": "TELEGRAM" } }
        })
    );
}

#[tokio::test]
async fn dialogflow_falls_back_to_generic_messages() {
    let (base, _log) = start_recorder().await;
    let client = DialogflowClient::new(&NluConfig {
        project_id: Some("demo-agent".to_string()),
        access_token: Some("ya29.token".to_string()),
        language_code: "en".to_string(),
        base_url: base,
    });

    let response = client
        .detect_intent("hello", "session-2", Platform::Facebook)
        .await
        .expect("detect intent");

    assert_eq!(response.fulfillment_text, "Hi!");
    assert_eq!(response.messages, vec![NluMessage::Text(vec!["Hi!".to_string()])]);
}

#[tokio::test]
async fn dialogflow_requires_project_id() {
    let client = DialogflowClient::new(&NluConfig {
        access_token: Some("ya29.token".to_string()),
        ..NluConfig::default()
    });

    let err = client
        .detect_intent("hello", "s", Platform::Telegram)
        .await
        .unwrap_err();
    assert!(matches!(err, NluError::NotConfigured(_)));
}
