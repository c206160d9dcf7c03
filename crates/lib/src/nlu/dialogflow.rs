//! Dialogflow ES v2 client (`projects.agent.sessions.detectIntent` over REST).

use super::response::{NluCard, NluCardButton, NluMessage, NluResponse, Platform};
use super::{NluClient, NluError};
use crate::config::NluConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client for the Dialogflow REST API.
#[derive(Clone)]
pub struct DialogflowClient {
    base_url: String,
    project_id: Option<String>,
    access_token: Option<String>,
    language_code: String,
    client: reqwest::Client,
}

impl DialogflowClient {
    pub fn new(config: &NluConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            access_token: config.access_token.clone(),
            language_code: config.language_code.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn detect_intent_url(&self, session: &str) -> Result<String, NluError> {
        let project = self
            .project_id
            .as_deref()
            .ok_or(NluError::NotConfigured("dialogflow project id"))?;
        Ok(format!(
            "{}/v2/projects/{}/agent/sessions/{}:detectIntent",
            self.base_url, project, session
        ))
    }

    /// POST …/sessions/{session}:detectIntent: text query with the platform as payload source.
    pub async fn detect_intent(
        &self,
        text: &str,
        session: &str,
        source: Platform,
    ) -> Result<NluResponse, NluError> {
        let url = self.detect_intent_url(session)?;
        let token = self
            .access_token
            .as_deref()
            .ok_or(NluError::NotConfigured("dialogflow access token"))?;
        let body = DetectIntentRequest {
            query_input: QueryInput {
                text: TextInput {
                    text: text.to_string(),
                    language_code: self.language_code.clone(),
                },
            },
            query_params: QueryParams {
                payload: serde_json::json!({ "source": source.tag() }),
            },
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(NluError::Api(format!("{} {}", status, body)));
        }
        let data: DetectIntentResponse = res
            .json()
            .await
            .map_err(|e| NluError::Decode(e.to_string()))?;
        let result = data
            .query_result
            .ok_or_else(|| NluError::Decode("missing queryResult".to_string()))?;
        Ok(result.into_response(source))
    }
}

#[async_trait]
impl NluClient for DialogflowClient {
    async fn detect_intent(
        &self,
        text: &str,
        session: &str,
        source: Platform,
    ) -> Result<NluResponse, NluError> {
        DialogflowClient::detect_intent(self, text, session, source).await
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectIntentRequest {
    query_input: QueryInput,
    query_params: QueryParams,
}

#[derive(Debug, Serialize)]
struct QueryInput {
    text: TextInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextInput {
    text: String,
    language_code: String,
}

#[derive(Debug, Serialize)]
struct QueryParams {
    payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectIntentResponse {
    #[serde(default)]
    query_result: Option<QueryResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    #[serde(default)]
    fulfillment_text: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    output_contexts: Vec<Value>,
    #[serde(default)]
    fulfillment_messages: Vec<WireMessage>,
}

/// REST form of `Intent.Message`: exactly one of the kind fields is set (a JSON "oneof").
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default)]
    platform: Option<String>,
    text: Option<WireText>,
    quick_replies: Option<WireQuickReplies>,
    image: Option<WireImage>,
    card: Option<WireCard>,
    payload: Option<Value>,
    #[serde(flatten)]
    other: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct WireText {
    #[serde(default)]
    text: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireQuickReplies {
    #[serde(default)]
    title: String,
    #[serde(default)]
    quick_replies: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireImage {
    #[serde(default)]
    image_uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCard {
    #[serde(default)]
    title: String,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    image_uri: Option<String>,
    #[serde(default)]
    buttons: Vec<WireCardButton>,
}

#[derive(Debug, Deserialize)]
struct WireCardButton {
    #[serde(default)]
    text: String,
    #[serde(default)]
    postback: String,
}

impl WireMessage {
    /// True when the message targets no platform in particular.
    fn is_generic(&self) -> bool {
        match self.platform.as_deref() {
            None => true,
            Some(p) => p.is_empty() || p == "PLATFORM_UNSPECIFIED",
        }
    }

    fn targets(&self, platform: Platform) -> bool {
        self.platform.as_deref() == Some(platform.tag())
    }

    fn into_message(self) -> NluMessage {
        if let Some(t) = self.text {
            NluMessage::Text(t.text)
        } else if let Some(q) = self.quick_replies {
            NluMessage::QuickReplies {
                title: q.title,
                replies: q.quick_replies,
            }
        } else if let Some(i) = self.image {
            NluMessage::Image {
                image_uri: i.image_uri,
            }
        } else if let Some(c) = self.card {
            NluMessage::Card(NluCard {
                title: c.title,
                subtitle: c.subtitle,
                image_uri: c.image_uri,
                buttons: c
                    .buttons
                    .into_iter()
                    .map(|b| NluCardButton {
                        text: b.text,
                        postback: b.postback,
                    })
                    .collect(),
            })
        } else if let Some(p) = self.payload {
            NluMessage::Payload(p)
        } else {
            let kind = self
                .other
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            NluMessage::Unsupported(kind)
        }
    }
}

impl QueryResult {
    /// Messages for `platform` when the agent defines any, otherwise the generic ones.
    fn into_response(self, platform: Platform) -> NluResponse {
        let has_platform_specific = self.fulfillment_messages.iter().any(|m| m.targets(platform));
        let messages = self
            .fulfillment_messages
            .into_iter()
            .filter(|m| {
                if has_platform_specific {
                    m.targets(platform)
                } else {
                    m.is_generic()
                }
            })
            .map(WireMessage::into_message)
            .collect();
        NluResponse {
            fulfillment_text: self.fulfillment_text,
            action: self.action,
            output_contexts: self.output_contexts,
            parameters: self.parameters,
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> QueryResult {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn converts_each_message_kind() {
        let result = parse(json!({
            "fulfillmentText": "hola",
            "action": "input.welcome",
            "parameters": { "color": "rojo" },
            "outputContexts": [{ "name": "ctx", "lifespanCount": 2 }],
            "fulfillmentMessages": [
                { "text": { "text": ["hola", ""] } },
                { "quickReplies": { "title": "Pick", "quickReplies": ["a", "b"] } },
                { "image": { "imageUri": "https://example.com/a.png" } },
                { "card": {
                    "title": "Card",
                    "imageUri": "https://example.com/c.png",
                    "buttons": [{ "text": "Site", "postback": "https://example.com" }]
                } },
                { "payload": { "telegram": { "attachment": {} } } },
                { "simpleResponses": { "simpleResponses": [] } }
            ]
        }));
        let response = result.into_response(Platform::Telegram);
        assert_eq!(response.fulfillment_text, "hola");
        assert_eq!(response.action(), Some("input.welcome"));
        assert_eq!(response.parameters["color"], "rojo");
        assert_eq!(response.output_contexts.len(), 1);
        assert_eq!(response.messages.len(), 6);
        assert_eq!(
            response.messages[0],
            NluMessage::Text(vec!["hola".to_string(), String::new()])
        );
        assert_eq!(
            response.messages[1],
            NluMessage::QuickReplies {
                title: "Pick".to_string(),
                replies: vec!["a".to_string(), "b".to_string()],
            }
        );
        assert_eq!(response.messages[2].kind(), "image");
        let NluMessage::Card(card) = &response.messages[3] else {
            panic!("expected card");
        };
        assert_eq!(card.subtitle, None);
        assert_eq!(card.buttons[0].postback, "https://example.com");
        assert_eq!(response.messages[4].kind(), "payload");
        assert_eq!(
            response.messages[5],
            NluMessage::Unsupported("simpleResponses".to_string())
        );
    }

    #[test]
    fn prefers_platform_specific_messages() {
        let result = parse(json!({
            "fulfillmentMessages": [
                { "platform": "TELEGRAM", "text": { "text": ["tg"] } },
                { "platform": "FACEBOOK", "text": { "text": ["fb"] } },
                { "text": { "text": ["generic"] } }
            ]
        }));
        let response = result.into_response(Platform::Telegram);
        assert_eq!(response.messages, vec![NluMessage::Text(vec!["tg".to_string()])]);
    }

    #[test]
    fn falls_back_to_generic_messages() {
        let result = parse(json!({
            "fulfillmentMessages": [
                { "platform": "FACEBOOK", "text": { "text": ["fb"] } },
                { "platform": "PLATFORM_UNSPECIFIED", "text": { "text": ["generic"] } }
            ]
        }));
        let response = result.into_response(Platform::Telegram);
        assert_eq!(
            response.messages,
            vec![NluMessage::Text(vec!["generic".to_string()])]
        );
    }

    #[test]
    fn missing_fields_default() {
        let response = parse(json!({})).into_response(Platform::Facebook);
        assert_eq!(response.fulfillment_text, "");
        assert_eq!(response.action(), None);
        assert!(response.messages.is_empty());
    }

    #[test]
    fn request_body_shape() {
        let body = DetectIntentRequest {
            query_input: QueryInput {
                text: TextInput {
                    text: "hi".to_string(),
                    language_code: "es".to_string(),
                },
            },
            query_params: QueryParams {
                payload: json!({ "source": Platform::Telegram.tag() }),
            },
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["queryInput"]["text"]["text"], "hi");
        assert_eq!(v["queryInput"]["text"]["languageCode"], "es");
        assert_eq!(v["queryParams"]["payload"]["source"], "TELEGRAM");
    }

    #[test]
    fn unconfigured_project_is_an_error() {
        let client = DialogflowClient::new(&NluConfig::default());
        let err = client.detect_intent_url("abc").unwrap_err();
        assert!(matches!(err, NluError::NotConfigured(_)));

        let config = NluConfig {
            project_id: Some("agent-1".to_string()),
            base_url: "http://127.0.0.1:9/".to_string(),
            ..NluConfig::default()
        };
        let client = DialogflowClient::new(&config);
        assert_eq!(
            client.detect_intent_url("abc").unwrap(),
            "http://127.0.0.1:9/v2/projects/agent-1/agent/sessions/abc:detectIntent"
        );
    }
}
