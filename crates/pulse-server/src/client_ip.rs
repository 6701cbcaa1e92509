use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::limiter::UNKNOWN_CLIENT;

pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Best-effort identity of the caller, used only to key rate-limit buckets.
///
/// Resolution order: first `X-Forwarded-For` entry, then the transport peer
/// address, then `"unknown"`. The forwarded header is trusted as sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    pub fn resolve(headers: &HeaderMap, peer: Option<IpAddr>) -> Self {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let identity = match (forwarded, peer) {
            (Some(ip), _) => ip.to_string(),
            (None, Some(ip)) => ip.to_string(),
            (None, None) => UNKNOWN_CLIENT.to_string(),
        };
        Self(identity)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(Self::resolve(&parts.headers, peer))
    }
}
