use async_trait::async_trait;

use crate::errors::GatewayError;

/// Output format requested from the generation service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// Ask the service to return a single JSON object.
    JsonObject,
}

/// A single-turn completion request.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: Option<f64>,
    pub response_format: ResponseFormat,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: None,
            response_format: ResponseFormat::Text,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json_object(mut self) -> Self {
        self.response_format = ResponseFormat::JsonObject;
        self
    }
}

/// What the service sent back. `content` is `None` when the response carried
/// no choices or an empty message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: Option<String>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }
}

/// Trait implemented by each text-generation backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    /// Whether the credential needed to call the service is present.
    fn is_configured(&self) -> bool;

    /// Issue exactly one request. Implementations must not retry.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GatewayError>;
}
