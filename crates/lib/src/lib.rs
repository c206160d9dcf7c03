//! Chat relay library: Messenger and Telegram channels, Dialogflow NLU client, and the
//! dispatcher that turns NLU responses into platform messages.

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod nlu;
pub mod relay;
pub mod session;
