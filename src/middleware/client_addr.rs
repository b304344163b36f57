//! Client address resolution
//!
//! Order: first `X-Forwarded-For` entry, `X-Real-IP`, then the socket peer.
//! Proxy headers are skipped unless `trust_proxy_headers` is set.

use crate::server::AppState;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

/// Resolve the caller's address from headers and the socket peer.
pub fn resolve_client_addr(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> IpAddr {
    if trust_proxy {
        let forwarded = header_str(headers, "x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse().ok());
        if let Some(addr) = forwarded {
            return addr;
        }

        if let Some(addr) = header_str(headers, "x-real-ip").and_then(|v| v.trim().parse().ok()) {
            return addr;
        }
    }

    peer.map(|p| p.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Peer from `ConnectInfo`, when the server was started with it.
pub fn peer_addr(parts: &Parts) -> Option<SocketAddr> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Axum extractor for the resolved client address.
pub struct ClientAddr(pub IpAddr);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let trust_proxy = parts
            .extensions
            .get::<Arc<AppState>>()
            .map(|state| state.trust_proxy_headers)
            .unwrap_or(false);

        Ok(ClientAddr(resolve_client_addr(
            &parts.headers,
            peer_addr(parts),
            trust_proxy,
        )))
    }
}
