//! NLU abstraction and Dialogflow client.
//!
//! The relay sends user text plus a per-sender session token and gets back a structured
//! response: fulfillment text, action, contexts, parameters and an ordered list of typed
//! messages to render on the originating platform.

mod dialogflow;
mod response;

pub use dialogflow::DialogflowClient;
pub use response::{NluCard, NluCardButton, NluMessage, NluResponse, Platform};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum NluError {
    #[error("nlu request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("nlu api error: {0}")]
    Api(String),
    #[error("nlu not configured: {0}")]
    NotConfigured(&'static str),
    #[error("nlu response could not be decoded: {0}")]
    Decode(String),
}

/// Request/response call to an NLU provider.
#[async_trait]
pub trait NluClient: Send + Sync {
    /// Send `text` within `session`; `source` tags the originating platform.
    async fn detect_intent(
        &self,
        text: &str,
        session: &str,
        source: Platform,
    ) -> Result<NluResponse, NluError>;
}
