//! Communication channels (Telegram, Messenger).
//!
//! Channel trait and registry so the gateway can start/stop channel connectors and route
//! replies. Inbound messages are sent to the gateway, which runs them through the relay.

mod inbound;
mod messenger;
mod outbound;
mod registry;
mod telegram;

pub use inbound::InboundMessage;
pub use messenger::{
    messenger_message_payloads, verify_signature, verify_subscription, MessengerChannel,
    MessengerWebhook,
};
pub use outbound::{http_url, Button, ButtonAction, Card, OutboundMessage};
pub use registry::{ChannelError, ChannelHandle, ChannelRegistry};
pub use telegram::{
    update_to_inbound as telegram_update_to_inbound, TelegramChannel, TelegramUpdate,
};
