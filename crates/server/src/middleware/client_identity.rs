use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use marketgate_core::middleware::extract_client_ip;
use std::{convert::Infallible, net::SocketAddr};

/// Rate-limit identity of the caller: proxy headers first, then the socket peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    #[must_use]
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

        let headers = parts
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)));

        Ok(Self(extract_client_ip(headers, peer)))
    }
}
