//! Gateway HTTP server: Messenger webhook, optional Telegram webhook, health probe.

use crate::channels::{
    telegram_update_to_inbound, verify_signature, verify_subscription, ChannelHandle,
    ChannelRegistry, InboundMessage, MessengerChannel, MessengerWebhook, TelegramChannel,
    TelegramUpdate,
};
use crate::config::Config;
use crate::nlu::{DialogflowClient, NluClient};
use crate::relay::Relay;
use crate::session::SessionStore;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Webhook payloads may carry attachments metadata; match the platform's generous limit.
const BODY_LIMIT_BYTES: usize = 20 * 1024 * 1024;
const INBOUND_QUEUE: usize = 256;
const HEALTH_MESSAGE: &str = "Chatbot running 🤖";

/// Shared state for the gateway (config, channels, inbound queue).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Sender for inbound channel messages (webhook POSTs, long-poll loop). Processor task receives.
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    pub channel_registry: Arc<ChannelRegistry>,
    /// In-process channel connector tasks; awaited during graceful shutdown.
    pub channel_tasks: Arc<RwLock<Vec<JoinHandle<()>>>>,
}

/// Query of the Messenger webhook verification request.
#[derive(Debug, Deserialize)]
pub struct WebhookVerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Run the gateway with the Dialogflow client built from `config.nlu`.
/// Blocks until shutdown (Ctrl+C / SIGTERM).
pub async fn run_gateway(config: Config) -> Result<()> {
    if config.nlu.project_id.is_none() || config.nlu.access_token.is_none() {
        log::warn!("dialogflow project id or access token not configured; NLU calls will fail");
    }
    let nlu: Arc<dyn NluClient> = Arc::new(DialogflowClient::new(&config.nlu));
    run_gateway_with(config, nlu).await
}

/// Run the gateway with the given NLU client; binds to config.gateway.bind:config.gateway.port.
pub async fn run_gateway_with(config: Config, nlu: Arc<dyn NluClient>) -> Result<()> {
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_QUEUE);
    let channel_tasks = Arc::new(RwLock::new(Vec::new()));
    let state = GatewayState {
        config: Arc::new(config.clone()),
        inbound_tx: inbound_tx.clone(),
        channel_registry: Arc::new(ChannelRegistry::new()),
        channel_tasks: channel_tasks.clone(),
    };

    let relay = Relay::new(
        nlu,
        SessionStore::new(),
        Duration::from_millis(config.relay.message_delay_ms),
    );

    // Events are handled one at a time, in arrival order.
    {
        let registry = state.channel_registry.clone();
        tokio::spawn(async move {
            while let Some(msg) = inbound_rx.recv().await {
                match registry.get(&msg.channel_id).await {
                    Some(handle) => relay.handle_inbound(handle.as_ref(), msg).await,
                    None => log::warn!("inbound: no channel registered for {}", msg.channel_id),
                }
            }
        });
    }

    let messenger = Arc::new(MessengerChannel::new(
        config.channels.messenger.page_access_token.clone(),
        config.channels.messenger.api_version.clone(),
    ));
    if config.channels.messenger.page_access_token.is_none() {
        log::info!("messenger: no page access token configured, replies will fail");
    }
    state
        .channel_registry
        .register(messenger.id().to_string(), messenger)
        .await;

    let telegram_token = config.channels.telegram.bot_token.clone();
    let webhook_url = config.channels.telegram.webhook_url.clone();
    let telegram_webhook_for_shutdown: Option<Arc<TelegramChannel>> =
        if let Some(token) = telegram_token {
            let telegram = Arc::new(TelegramChannel::new(Some(token)));
            if let Some(ref url) = webhook_url {
                let secret = config.channels.telegram.webhook_secret.as_deref();
                if let Err(e) = telegram.set_webhook(url, secret).await {
                    log::warn!("telegram set_webhook failed: {}", e);
                } else {
                    log::info!("telegram channel registered (webhook mode): {}", url);
                }
                state
                    .channel_registry
                    .register(telegram.id().to_string(), telegram.clone())
                    .await;
                Some(telegram)
            } else {
                // A leftover webhook makes getUpdates fail with 409.
                if let Err(e) = telegram.delete_webhook().await {
                    log::debug!("telegram delete_webhook before polling: {}", e);
                }
                let handle = telegram.clone().start_inbound(inbound_tx);
                state.channel_tasks.write().await.push(handle);
                state
                    .channel_registry
                    .register(telegram.id().to_string(), telegram)
                    .await;
                log::info!("telegram channel registered and getUpdates loop started");
                None
            }
        } else {
            log::info!("telegram: no bot token configured, channel disabled");
            None
        };

    let channel_registry = state.channel_registry.clone();
    let bind = config.gateway.bind.trim().to_string();
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            channel_registry,
            channel_tasks,
            telegram_webhook_for_shutdown,
        ))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// HTTP routes served by the gateway. `/telegram/webhook` exists only in Telegram webhook mode.
pub fn router(state: GatewayState) -> Router {
    let telegram = &state.config.channels.telegram;
    let mut app = Router::new()
        .route("/", get(health_http))
        .route("/messenger", get(messenger_verify).post(messenger_webhook));
    if telegram.bot_token.is_some() && telegram.webhook_url.is_some() {
        app = app.route("/telegram/webhook", post(telegram_webhook));
    }
    app.layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state)
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops channel connectors, removes the Telegram webhook if used, then awaits in-process channel tasks.
async fn shutdown_signal(
    channel_registry: Arc<ChannelRegistry>,
    channel_tasks: Arc<RwLock<Vec<JoinHandle<()>>>>,
    telegram_webhook: Option<Arc<TelegramChannel>>,
) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping channels");

    for id in channel_registry.ids().await {
        if let Some(handle) = channel_registry.get(&id).await {
            handle.stop();
        }
    }

    if let Some(t) = telegram_webhook {
        if let Err(e) = t.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }

    // The long-poll loop only notices the stop flag after its current request returns.
    let handles = {
        let mut g = channel_tasks.write().await;
        std::mem::take(&mut *g)
    };
    for h in handles {
        h.abort();
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}

/// GET /messenger: webhook subscription handshake; echoes hub.challenge when the token matches.
async fn messenger_verify(
    State(state): State<GatewayState>,
    Query(query): Query<WebhookVerifyQuery>,
) -> (StatusCode, String) {
    let expected = state.config.channels.messenger.verify_token.as_deref();
    match verify_subscription(
        query.mode.as_deref(),
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
        expected,
    ) {
        Some(challenge) => {
            log::info!("messenger: webhook verified");
            (StatusCode::OK, challenge)
        }
        None => {
            log::warn!("messenger: webhook verification failed");
            (StatusCode::FORBIDDEN, String::new())
        }
    }
}

/// POST /messenger: receives page events; verifies the app signature when configured, queues InboundMessages.
async fn messenger_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if let Some(ref secret) = state.config.channels.messenger.app_secret {
        let provided = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !verify_signature(&body, provided, secret) {
            log::warn!("messenger: rejected webhook with bad signature");
            return (StatusCode::FORBIDDEN, "");
        }
    }
    let hook: MessengerWebhook = match serde_json::from_slice(&body) {
        Ok(h) => h,
        Err(e) => {
            log::info!("messenger: malformed webhook body: {}", e);
            return (StatusCode::BAD_REQUEST, "");
        }
    };
    for inbound in hook.into_inbound() {
        if state.inbound_tx.send(inbound).await.is_err() {
            return (StatusCode::SERVICE_UNAVAILABLE, "");
        }
    }
    (StatusCode::OK, "EVENT_RECEIVED")
}

/// POST /telegram/webhook: receives Telegram update JSON; verifies optional secret, queues InboundMessage.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.config.channels.telegram.webhook_secret {
        let provided = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let Some(inbound) = telegram_update_to_inbound(&update) else {
        return StatusCode::OK;
    };
    if state.inbound_tx.send(inbound).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "message": HEALTH_MESSAGE,
        "port": state.config.gateway.port,
        "channels": state.channel_registry.ids().await,
    }))
}
