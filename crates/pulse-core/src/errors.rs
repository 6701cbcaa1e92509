use std::time::Duration;

/// Typed error hierarchy for calls to the external generation service.
///
/// None of these are retried: a single failure ends the request that
/// triggered the call.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    // Raised before any network I/O
    #[error("generation service not configured: {0}")]
    Configuration(String),

    // Upstream rejected the call
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited by upstream")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },

    // Transport / payload
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// True when the failure comes from local configuration rather than
    /// the upstream service.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 404 | 422 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            GatewayError::from_status(401, "unauthorized".into()),
            GatewayError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            GatewayError::from_status(403, "forbidden".into()),
            GatewayError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            GatewayError::from_status(400, "bad".into()),
            GatewayError::InvalidRequest(_)
        ));
        assert!(matches!(
            GatewayError::from_status(429, "slow down".into()),
            GatewayError::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            GatewayError::from_status(502, "bad gateway".into()),
            GatewayError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn unexpected_status_is_invalid_request() {
        let err = GatewayError::from_status(302, "moved".into());
        assert!(err.to_string().contains("unexpected status 302"));
    }

    #[test]
    fn configuration_classification() {
        assert!(GatewayError::Configuration("OPENROUTER_API_KEY is not set".into()).is_configuration());
        assert!(!GatewayError::NetworkError("tcp".into()).is_configuration());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(GatewayError::Configuration(String::new()).error_kind(), "configuration");
        assert_eq!(GatewayError::MalformedResponse(String::new()).error_kind(), "malformed_response");
        assert_eq!(
            GatewayError::Timeout(Duration::from_secs(30)).error_kind(),
            "timeout"
        );
    }
}
