use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use pulse_core::errors::GatewayError;
use pulse_core::provider::{Completion, CompletionProvider, CompletionRequest};

/// Pre-programmed responses for deterministic testing without API calls.
pub enum MockResponse {
    /// Return this completion.
    Content(Completion),
    /// Return an error from the complete() call.
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// Convenience: a completion carrying `text`.
    pub fn text(text: &str) -> Self {
        Self::Content(Completion::text(text))
    }

    /// Convenience: a completion with no choices.
    pub fn empty() -> Self {
        Self::Content(Completion::default())
    }

    /// Convenience: wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence.
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
    call_count: AtomicUsize,
    configured: bool,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            configured: true,
        }
    }

    /// A provider with no credential: every call fails with a
    /// configuration error and nothing is counted.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GatewayError> {
        if !self.configured {
            return Err(GatewayError::Configuration(
                "MockProvider: no credential".into(),
            ));
        }

        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());

        let next = self.responses.lock().pop_front();
        let Some(mut response) = next else {
            return Err(GatewayError::InvalidRequest(format!(
                "MockProvider: no response configured for call {idx}"
            )));
        };

        loop {
            match response {
                MockResponse::Content(completion) => return Ok(completion),
                MockResponse::Error(err) => return Err(err),
                MockResponse::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_responses_in_order() {
        let provider = MockProvider::new(vec![MockResponse::text("first"), MockResponse::empty()]);
        let req = CompletionRequest::new("p");

        assert_eq!(provider.complete(&req).await.unwrap().content.as_deref(), Some("first"));
        assert!(provider.complete(&req).await.unwrap().content.is_none());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_script_is_error() {
        let provider = MockProvider::new(vec![]);
        let err = provider.complete(&CompletionRequest::new("p")).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn scripted_error() {
        let provider = MockProvider::new(vec![MockResponse::Error(GatewayError::NetworkError(
            "connection refused".into(),
        ))]);
        let err = provider.complete(&CompletionRequest::new("p")).await.unwrap_err();
        assert_eq!(err.error_kind(), "network_error");
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_response() {
        let provider = MockProvider::new(vec![MockResponse::delayed(
            Duration::from_secs(5),
            MockResponse::text("late"),
        )]);
        let start = tokio::time::Instant::now();
        let completion = provider.complete(&CompletionRequest::new("p")).await.unwrap();
        assert_eq!(completion.content.as_deref(), Some("late"));
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unconfigured_never_counts_calls() {
        let provider = MockProvider::unconfigured();
        assert!(!provider.is_configured());
        let err = provider.complete(&CompletionRequest::new("p")).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn records_requests() {
        let provider = MockProvider::new(vec![MockResponse::text("{}")]);
        provider
            .complete(&CompletionRequest::new("hello").with_temperature(0.4))
            .await
            .unwrap();
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, "hello");
        assert_eq!(requests[0].temperature, Some(0.4));
    }
}
