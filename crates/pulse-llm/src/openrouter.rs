use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use pulse_core::errors::GatewayError;
use pulse_core::provider::{Completion, CompletionProvider, CompletionRequest, ResponseFormat};
use pulse_core::security::ApiKey;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone, Debug)]
pub struct OpenRouterConfig {
    pub api_key: Option<ApiKey>,
    pub base_url: String,
    pub model: String,
    pub connect_timeout: Duration,
    /// Covers the whole exchange, from connect to the last body byte.
    pub request_timeout: Duration,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Client for an OpenAI-compatible chat completions endpoint.
///
/// Built once at startup; the underlying connection pool is reused across
/// requests.
pub struct OpenRouterProvider {
    client: Client,
    api_key: Option<ApiKey>,
    endpoint: String,
    model: String,
    request_timeout: Duration,
}

impl OpenRouterProvider {
    pub fn new(config: OpenRouterConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("http client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model,
            request_timeout: config.request_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout(self.request_timeout)
        } else {
            GatewayError::NetworkError(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatBody>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormatBody {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl CompletionProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GatewayError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| GatewayError::Configuration("OPENROUTER_API_KEY is not set".into()))?;

        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            response_format: match request.response_format {
                ResponseFormat::JsonObject => Some(ResponseFormatBody {
                    kind: "json_object",
                }),
                ResponseFormat::Text => None,
            },
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(key.0.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(GatewayError::RateLimited {
                    retry_after: retry_after(resp.headers()),
                });
            }
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(self.request_timeout)
            } else {
                GatewayError::MalformedResponse(e.to_string())
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty());

        debug!(has_content = content.is_some(), "completion received");
        Ok(Completion { content })
    }
}
