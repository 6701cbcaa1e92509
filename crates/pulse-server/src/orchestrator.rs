//! Review orchestrator: runs admission, validation, enrichment and
//! persistence for submissions, and admission, authorization and listing
//! for retrieval.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, instrument, warn};

use pulse_core::security::AdminToken;
use pulse_core::{FeedbackRecord, ReviewSubmission};
use pulse_llm::InsightGenerator;
use pulse_store::{NewReview, ReviewRepo};
use pulse_telemetry::MetricsRecorder;

use crate::auth;
use crate::error::ApiError;
use crate::limiter::{AdmissionControl, LIST_ROUTE, SUBMIT_ROUTE};

pub struct ReviewOrchestrator {
    limiter: Arc<dyn AdmissionControl>,
    generator: InsightGenerator,
    reviews: ReviewRepo,
    admin_token: Option<AdminToken>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl ReviewOrchestrator {
    pub fn new(
        limiter: Arc<dyn AdmissionControl>,
        generator: InsightGenerator,
        reviews: ReviewRepo,
        admin_token: Option<AdminToken>,
    ) -> Self {
        Self {
            limiter,
            generator,
            reviews,
            admin_token,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<MetricsRecorder>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn limiter(&self) -> &Arc<dyn AdmissionControl> {
        &self.limiter
    }

    pub fn generator_configured(&self) -> bool {
        self.generator.is_configured()
    }

    pub fn admin_auth_enabled(&self) -> bool {
        self.admin_token.is_some()
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRecorder>> {
        self.metrics.as_ref()
    }

    fn admit(&self, client: &str, route: &'static str) -> Result<(), ApiError> {
        let decision = self.limiter.evaluate(client, route);
        if decision.allowed {
            return Ok(());
        }
        warn!(
            client,
            route,
            retry_after_secs = decision.retry_after_secs,
            "rate limit exceeded"
        );
        if let Some(metrics) = &self.metrics {
            metrics.counter_inc("rate_limit_rejections_total", &[("route", route)], 1);
        }
        Err(ApiError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        })
    }

    /// Validate, enrich and persist one review from a raw request body.
    #[instrument(skip(self, body))]
    pub async fn submit(&self, client: &str, body: &[u8]) -> Result<FeedbackRecord, ApiError> {
        self.admit(client, SUBMIT_ROUTE)?;

        let value: Value = serde_json::from_slice(body).map_err(|e| {
            error!(error = %e, "request body is not valid JSON");
            ApiError::ProcessingFailed
        })?;
        let submission = ReviewSubmission::from_json(&value)?;

        let insights = self
            .generator
            .generate(submission.rating, &submission.review_text)
            .await
            .map_err(|e| {
                error!(kind = e.error_kind(), error = %e, "failed to generate insights");
                ApiError::ProcessingFailed
            })?;

        let record = self
            .reviews
            .create(NewReview::new(submission, insights))
            .map_err(|e| {
                error!(error = %e, "failed to persist review");
                ApiError::ProcessingFailed
            })?;

        if let Some(metrics) = &self.metrics {
            metrics.counter_inc("reviews_created_total", &[], 1);
        }
        info!(review_id = %record.id, rating = %record.rating, "review created");
        Ok(record)
    }

    /// All reviews, newest first, if the caller is admitted and authorized.
    #[instrument(skip(self, authorization))]
    pub fn list(
        &self,
        client: &str,
        authorization: Option<&str>,
    ) -> Result<Vec<FeedbackRecord>, ApiError> {
        self.admit(client, LIST_ROUTE)?;

        if !auth::is_authorized(self.admin_token.as_ref(), authorization) {
            warn!("unauthorized review listing attempt");
            return Err(ApiError::Unauthorized);
        }

        self.reviews.list().map_err(|e| {
            error!(error = %e, "failed to load reviews");
            ApiError::LoadFailed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pulse_core::{GatewayError, ReviewStatus, ValidationError};
    use pulse_llm::insights::{FALLBACK_RECOMMENDED_NEXT, FALLBACK_USER_REPLY};
    use pulse_llm::{MockProvider, MockResponse};
    use pulse_store::Database;

    use crate::limiter::{LimiterConfig, SlidingWindowLimiter};

    const HAPPY: &str = r#"{"userReply":"Glad you loved it!","summary":"Happy customer.","recommendedNext":"No action needed."}"#;

    struct Fixture {
        orchestrator: ReviewOrchestrator,
        provider: Arc<MockProvider>,
        db: Database,
        metrics: Arc<MetricsRecorder>,
    }

    fn fixture_with(
        provider: MockProvider,
        admin_token: Option<AdminToken>,
        max_requests: u32,
    ) -> Fixture {
        let provider = Arc::new(provider);
        let db = Database::in_memory().unwrap();
        let metrics = Arc::new(MetricsRecorder::new());
        let limiter = Arc::new(SlidingWindowLimiter::new(LimiterConfig {
            window: Duration::from_secs(60),
            max_requests,
        }));
        let orchestrator = ReviewOrchestrator::new(
            limiter,
            InsightGenerator::new(provider.clone()),
            ReviewRepo::new(db.clone()),
            admin_token,
        )
        .with_metrics(Some(metrics.clone()));
        Fixture {
            orchestrator,
            provider,
            db,
            metrics,
        }
    }

    fn fixture(responses: Vec<MockResponse>) -> Fixture {
        fixture_with(MockProvider::new(responses), None, 20)
    }

    fn count(db: &Database) -> u64 {
        ReviewRepo::new(db.clone()).count().unwrap()
    }

    #[tokio::test]
    async fn submit_persists_generated_fields_verbatim() {
        let f = fixture(vec![MockResponse::text(HAPPY)]);
        let record = f
            .orchestrator
            .submit("1.1.1.1", br#"{"rating": 5, "reviewText": "Great service!"}"#)
            .await
            .unwrap();

        assert_eq!(record.rating.get(), 5);
        assert_eq!(record.review_text, "Great service!");
        assert_eq!(record.user_reply, "Glad you loved it!");
        assert_eq!(record.summary, "Happy customer.");
        assert_eq!(record.recommended_next, "No action needed.");
        assert_eq!(record.status, ReviewStatus::Completed);
        assert_eq!(count(&f.db), 1);
        assert_eq!(f.metrics.counter_get("reviews_created_total", &[]), 1);
    }

    #[tokio::test]
    async fn submit_fills_fallbacks_for_missing_fields() {
        let f = fixture(vec![MockResponse::text(r#"{"summary":"Late parcel."}"#)]);
        let record = f
            .orchestrator
            .submit("c", br#"{"rating": 2, "reviewText": "Late"}"#)
            .await
            .unwrap();
        assert_eq!(record.user_reply, FALLBACK_USER_REPLY);
        assert_eq!(record.summary, "Late parcel.");
        assert_eq!(record.recommended_next, FALLBACK_RECOMMENDED_NEXT);
    }

    #[tokio::test]
    async fn invalid_rating_skips_generation() {
        let f = fixture(vec![MockResponse::text(HAPPY)]);
        for body in [
            &br#"{"rating": 0, "reviewText": "x"}"#[..],
            br#"{"rating": 6, "reviewText": "x"}"#,
            br#"{"rating": 4.5, "reviewText": "x"}"#,
            br#"{"rating": true, "reviewText": "x"}"#,
            br#"{"reviewText": "x"}"#,
        ] {
            let err = f.orchestrator.submit("c", body).await.unwrap_err();
            assert!(
                matches!(err, ApiError::Validation(ValidationError::InvalidRating)),
                "body {}",
                String::from_utf8_lossy(body)
            );
        }
        assert_eq!(f.provider.call_count(), 0);
        assert_eq!(count(&f.db), 0);
    }

    #[tokio::test]
    async fn empty_text_skips_generation() {
        let f = fixture(vec![MockResponse::text(HAPPY)]);
        let err = f
            .orchestrator
            .submit("c", br#"{"rating": 1, "reviewText": "   "}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::EmptyReviewText)));
        assert_eq!(f.provider.call_count(), 0);
        assert_eq!(count(&f.db), 0);
    }

    #[tokio::test]
    async fn malformed_body_is_processing_failure() {
        let f = fixture(vec![]);
        let err = f.orchestrator.submit("c", b"{not json").await.unwrap_err();
        assert!(matches!(err, ApiError::ProcessingFailed));
        assert_eq!(f.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn generation_failure_writes_nothing() {
        let f = fixture(vec![MockResponse::Error(GatewayError::Timeout(
            Duration::from_secs(30),
        ))]);
        let err = f
            .orchestrator
            .submit("c", br#"{"rating": 3, "reviewText": "ok"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ProcessingFailed));
        assert_eq!(count(&f.db), 0);
        assert_eq!(f.metrics.counter_get("reviews_created_total", &[]), 0);
    }

    #[tokio::test]
    async fn null_completion_writes_nothing() {
        let f = fixture(vec![MockResponse::text("null")]);
        let err = f
            .orchestrator
            .submit("c", br#"{"rating": 4, "reviewText": "Fine"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ProcessingFailed));
        assert_eq!(f.provider.call_count(), 1);
        assert_eq!(count(&f.db), 0);
    }

    #[tokio::test]
    async fn missing_credential_writes_nothing() {
        let f = fixture_with(MockProvider::unconfigured(), None, 20);
        assert!(!f.orchestrator.generator_configured());
        let err = f
            .orchestrator
            .submit("c", br#"{"rating": 5, "reviewText": "Great"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ProcessingFailed));
        assert_eq!(f.provider.call_count(), 0);
        assert_eq!(count(&f.db), 0);
    }

    #[tokio::test]
    async fn storage_failure_is_processing_failure() {
        let f = fixture(vec![MockResponse::text(HAPPY)]);
        f.db.with_conn(|conn| Ok(conn.execute_batch("DROP TABLE reviews")?))
            .unwrap();
        let err = f
            .orchestrator
            .submit("c", br#"{"rating": 5, "reviewText": "Great"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ProcessingFailed));
    }

    #[tokio::test]
    async fn submit_rate_limited_before_validation() {
        let f = fixture_with(MockProvider::new(vec![MockResponse::text(HAPPY)]), None, 1);
        f.orchestrator
            .submit("c", br#"{"rating": 5, "reviewText": "Great"}"#)
            .await
            .unwrap();
        let err = f.orchestrator.submit("c", b"garbage").await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { retry_after_secs } if retry_after_secs > 0));
        assert_eq!(
            f.metrics.counter_get("rate_limit_rejections_total", &[("route", SUBMIT_ROUTE)]),
            1
        );
    }

    #[tokio::test]
    async fn list_newest_first() {
        let f = fixture(vec![MockResponse::text(HAPPY), MockResponse::text(HAPPY)]);
        let first = f
            .orchestrator
            .submit("c", br#"{"rating": 4, "reviewText": "first"}"#)
            .await
            .unwrap();
        let second = f
            .orchestrator
            .submit("c", br#"{"rating": 2, "reviewText": "second"}"#)
            .await
            .unwrap();
        let listed = f.orchestrator.list("c", None).unwrap();
        assert_eq!(listed, vec![second, first]);
    }

    #[test]
    fn list_requires_matching_token_when_configured() {
        let f = fixture_with(MockProvider::new(vec![]), Some(AdminToken::new("s3cret")), 20);
        assert!(f.orchestrator.admin_auth_enabled());
        assert!(matches!(f.orchestrator.list("c", None), Err(ApiError::Unauthorized)));
        assert!(matches!(
            f.orchestrator.list("c", Some("Bearer wrong")),
            Err(ApiError::Unauthorized)
        ));
        assert!(f.orchestrator.list("c", Some("Bearer s3cret")).unwrap().is_empty());
    }

    #[test]
    fn list_open_without_token() {
        let f = fixture(vec![]);
        assert!(!f.orchestrator.admin_auth_enabled());
        assert!(f.orchestrator.list("c", None).unwrap().is_empty());
    }

    #[test]
    fn list_storage_failure() {
        let f = fixture(vec![]);
        f.db.with_conn(|conn| Ok(conn.execute_batch("DROP TABLE reviews")?))
            .unwrap();
        assert!(matches!(f.orchestrator.list("c", None), Err(ApiError::LoadFailed)));
    }

    #[test]
    fn list_rate_limit_counts_unauthorized_attempts() {
        let f = fixture_with(MockProvider::new(vec![]), Some(AdminToken::new("s3cret")), 1);
        assert!(matches!(f.orchestrator.list("c", None), Err(ApiError::Unauthorized)));
        assert!(matches!(
            f.orchestrator.list("c", Some("Bearer s3cret")),
            Err(ApiError::RateLimited { .. })
        ));
    }
}
