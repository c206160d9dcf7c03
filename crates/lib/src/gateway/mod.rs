//! Gateway: HTTP entry point.
//!
//! Single port serves the Messenger webhook (verification + events), the optional Telegram
//! webhook and a health probe. Channel connectors push inbound messages onto one queue that
//! a processor task drains through the relay.

mod server;

pub use server::{router, run_gateway, run_gateway_with, GatewayState, WebhookVerifyQuery};
