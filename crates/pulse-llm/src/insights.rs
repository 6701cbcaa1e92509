//! Derives a customer reply, a one-line summary and a next step from a
//! review by asking the generation service for a JSON object.
//!
//! Two failure levels are kept apart: a call that fails or returns text that
//! is not JSON fails the whole derivation, while a parsed object with missing
//! or unusable fields only has those fields replaced by fixed fallbacks.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{instrument, warn};

use pulse_core::errors::GatewayError;
use pulse_core::provider::{CompletionProvider, CompletionRequest};
use pulse_core::{Insights, Rating};
use pulse_telemetry::MetricsRecorder;

pub const FALLBACK_USER_REPLY: &str = "Thanks for your feedback!";
pub const FALLBACK_SUMMARY: &str = "Feedback received.";
pub const FALLBACK_RECOMMENDED_NEXT: &str = "Review this case.";

pub const DEFAULT_TEMPERATURE: f64 = 0.4;

/// Stand-in for a completion with no content.
const EMPTY_OBJECT: &str = "{}";

pub fn build_prompt(rating: Rating, review: &str) -> String {
    format!(
        r#"You are a customer support assistant for a retail marketplace.
Given a user rating (1-5) and free-text review, return JSON strictly matching:
{{
  "userReply": "string",
  "summary": "string",
  "recommendedNext": "string"
}}
Constraints:
- userReply: 2-3 sentences, empathetic, concise.
- summary: one sentence.
- recommendedNext: one actionable step for ops/support.
- If review is empty, apologize and request details. If long, stay concise.
Input:
Rating: {rating}
Review: {review}
Return only JSON."#
    )
}

/// Parse completion text into insights, substituting fallbacks field by
/// field. Text that is not JSON, or is the JSON `null`, is an error.
pub fn parse_insights(text: &str) -> Result<Insights, GatewayError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| GatewayError::MalformedResponse(format!("completion is not JSON: {e}")))?;
    if value.is_null() {
        return Err(GatewayError::MalformedResponse("completion is JSON null".into()));
    }

    Ok(Insights {
        user_reply: field_or(&value, "userReply", FALLBACK_USER_REPLY),
        summary: field_or(&value, "summary", FALLBACK_SUMMARY),
        recommended_next: field_or(&value, "recommendedNext", FALLBACK_RECOMMENDED_NEXT),
    })
}

fn field_or(value: &Value, key: &str, fallback: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

pub struct InsightGenerator {
    provider: Arc<dyn CompletionProvider>,
    temperature: f64,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl InsightGenerator {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            temperature: DEFAULT_TEMPERATURE,
            metrics: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<MetricsRecorder>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Whether the backing provider holds a credential.
    pub fn is_configured(&self) -> bool {
        self.provider.is_configured()
    }

    /// Issue exactly one completion call and derive insights from it.
    #[instrument(
        skip(self, review),
        fields(rating = %rating, provider = self.provider.name(), model = self.provider.model())
    )]
    pub async fn generate(&self, rating: Rating, review: &str) -> Result<Insights, GatewayError> {
        let request = CompletionRequest::new(build_prompt(rating, review))
            .with_temperature(self.temperature)
            .json_object();

        let started = Instant::now();
        let result = self.provider.complete(&request).await;

        let outcome = result.and_then(|completion| {
            if let Some(metrics) = &self.metrics {
                metrics.histogram_observe(
                    "generation_duration_ms",
                    &[],
                    started.elapsed().as_secs_f64() * 1000.0,
                );
            }
            parse_insights(completion.content.as_deref().unwrap_or(EMPTY_OBJECT))
        });

        if let Err(e) = &outcome {
            warn!(kind = e.error_kind(), error = %e, "insight generation failed");
            if let Some(metrics) = &self.metrics {
                metrics.counter_inc("generation_failures_total", &[("kind", e.error_kind())], 1);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockProvider, MockResponse};
    use pulse_core::provider::ResponseFormat;

    fn rating(v: i64) -> Rating {
        Rating::new(v).unwrap()
    }

    fn generator(responses: Vec<MockResponse>) -> (InsightGenerator, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::new(responses));
        (InsightGenerator::new(provider.clone()), provider)
    }

    #[test]
    fn prompt_embeds_rating_and_review() {
        let prompt = build_prompt(rating(4), "Fast delivery");
        assert!(prompt.starts_with("You are a customer support assistant for a retail marketplace."));
        assert!(prompt.contains("Rating: 4\nReview: Fast delivery\n"));
        assert!(prompt.contains("\"recommendedNext\": \"string\""));
        assert!(prompt.ends_with("Return only JSON."));
    }

    #[test]
    fn parse_full_object() {
        let insights = parse_insights(
            r#"{"userReply":"Glad you loved it!","summary":"Happy customer.","recommendedNext":"No action needed."}"#,
        )
        .unwrap();
        assert_eq!(insights.user_reply, "Glad you loved it!");
        assert_eq!(insights.summary, "Happy customer.");
        assert_eq!(insights.recommended_next, "No action needed.");
    }

    #[test]
    fn parse_missing_fields_use_fallbacks() {
        let insights = parse_insights(r#"{"summary":"Late parcel."}"#).unwrap();
        assert_eq!(insights.user_reply, FALLBACK_USER_REPLY);
        assert_eq!(insights.summary, "Late parcel.");
        assert_eq!(insights.recommended_next, FALLBACK_RECOMMENDED_NEXT);
    }

    #[test]
    fn parse_unusable_fields_use_fallbacks() {
        let insights =
            parse_insights(r#"{"userReply": 42, "summary": "", "recommendedNext": null}"#).unwrap();
        assert_eq!(insights.user_reply, FALLBACK_USER_REPLY);
        assert_eq!(insights.summary, FALLBACK_SUMMARY);
        assert_eq!(insights.recommended_next, FALLBACK_RECOMMENDED_NEXT);
    }

    #[test]
    fn parse_keeps_whitespace_only_fields() {
        let insights = parse_insights(r#"{"userReply": "  ", "summary": "Late parcel."}"#).unwrap();
        assert_eq!(insights.user_reply, "  ");
        assert_eq!(insights.summary, "Late parcel.");
        assert_eq!(insights.recommended_next, FALLBACK_RECOMMENDED_NEXT);
    }

    #[test]
    fn parse_null_is_error() {
        let err = parse_insights("null").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }

    #[test]
    fn parse_non_object_json_uses_all_fallbacks() {
        for text in ["[]", "\"hello\"", "3", "false"] {
            let insights = parse_insights(text).unwrap();
            assert_eq!(insights.user_reply, FALLBACK_USER_REPLY, "{text}");
            assert_eq!(insights.summary, FALLBACK_SUMMARY, "{text}");
            assert_eq!(insights.recommended_next, FALLBACK_RECOMMENDED_NEXT, "{text}");
        }
    }

    #[test]
    fn parse_non_json_is_error() {
        let err = parse_insights("Sure! Here is your JSON").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn generate_issues_one_json_request() {
        let (generator, provider) = generator(vec![MockResponse::text(
            r#"{"userReply":"Sorry!","summary":"Broken item.","recommendedNext":"Send replacement."}"#,
        )]);

        let insights = generator.generate(rating(1), "Arrived broken").await.unwrap();
        assert_eq!(insights.user_reply, "Sorry!");
        assert_eq!(provider.call_count(), 1);

        let requests = provider.requests();
        assert_eq!(requests[0].temperature, Some(0.4));
        assert_eq!(requests[0].response_format, ResponseFormat::JsonObject);
        assert!(requests[0].prompt.contains("Review: Arrived broken"));
    }

    #[tokio::test]
    async fn generate_empty_completion_uses_fallbacks() {
        let (generator, _) = generator(vec![MockResponse::empty()]);
        let insights = generator.generate(rating(3), "ok").await.unwrap();
        assert_eq!(insights.user_reply, FALLBACK_USER_REPLY);
        assert_eq!(insights.summary, FALLBACK_SUMMARY);
        assert_eq!(insights.recommended_next, FALLBACK_RECOMMENDED_NEXT);
    }

    #[tokio::test]
    async fn generate_propagates_provider_error_without_retry() {
        let (generator, provider) = generator(vec![
            MockResponse::Error(GatewayError::ServerError {
                status: 502,
                body: "bad gateway".into(),
            }),
            MockResponse::text("{}"),
        ]);
        let err = generator.generate(rating(2), "meh").await.unwrap_err();
        assert!(matches!(err, GatewayError::ServerError { status: 502, .. }));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn generate_unconfigured_fails_before_call() {
        let provider = Arc::new(MockProvider::unconfigured());
        let generator = InsightGenerator::new(provider.clone());
        assert!(!generator.is_configured());
        let err = generator.generate(rating(5), "great").await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn generate_records_metrics() {
        let metrics = Arc::new(MetricsRecorder::new());
        let provider = Arc::new(MockProvider::new(vec![
            MockResponse::text("{}"),
            MockResponse::text("not json"),
        ]));
        let generator = InsightGenerator::new(provider).with_metrics(Some(metrics.clone()));

        generator.generate(rating(4), "fine").await.unwrap();
        assert!(generator.generate(rating(4), "fine").await.is_err());

        assert_eq!(metrics.histogram_summary("generation_duration_ms", &[]).count, 2);
        assert_eq!(
            metrics.counter_get("generation_failures_total", &[("kind", "malformed_response")]),
            1
        );
    }

    #[tokio::test]
    async fn custom_temperature_is_sent() {
        let provider = Arc::new(MockProvider::new(vec![MockResponse::text("{}")]));
        let generator = InsightGenerator::new(provider.clone()).with_temperature(0.1);
        generator.generate(rating(4), "fine").await.unwrap();
        assert_eq!(provider.requests()[0].temperature, Some(0.1));
    }
}
