use pulse_core::security::AdminToken;

/// Decide whether a listing request is authorized.
///
/// With no token configured every caller is allowed. Otherwise the
/// `Authorization` header must be present and match.
pub fn is_authorized(token: Option<&AdminToken>, authorization: Option<&str>) -> bool {
    match token {
        None => true,
        Some(token) => authorization.is_some_and(|header| token.matches_header(header)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_without_token() {
        assert!(is_authorized(None, None));
        assert!(is_authorized(None, Some("Bearer anything")));
    }

    #[test]
    fn token_requires_header() {
        let token = AdminToken::new("s3cret");
        assert!(!is_authorized(Some(&token), None));
        assert!(!is_authorized(Some(&token), Some("Bearer nope")));
        assert!(is_authorized(Some(&token), Some("Bearer s3cret")));
        assert!(is_authorized(Some(&token), Some("s3cret")));
    }
}
