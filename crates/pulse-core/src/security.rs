use secrecy::{ExposeSecret, SecretString};

/// Wraps the generation-service API key with secrecy protection
/// (zeroized on drop, redacted in Debug).
#[derive(Clone)]
pub struct ApiKey(pub SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Static admin bearer token guarding the review listing.
#[derive(Clone)]
pub struct AdminToken(SecretString);

impl AdminToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Check an `Authorization` header value against the token.
    ///
    /// Accepts `Bearer <token>` or the bare token.
    pub fn matches_header(&self, header: &str) -> bool {
        let presented = header.strip_prefix("Bearer ").unwrap_or(header);
        constant_time_eq(presented.as_bytes(), self.0.expose_secret().as_bytes())
    }
}

impl From<SecretString> for AdminToken {
    fn from(secret: SecretString) -> Self {
        Self(secret)
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminToken([REDACTED])")
    }
}

/// Constant-time comparison for auth validation.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
