//! Rate limiting middleware for Axum
//!
//! Fixed windows per client address over `RateWindows`, used in front of the
//! `/auth/*` routes. Over-limit requests get 429 with `Retry-After`.

use super::client_addr::resolve_client_addr;
use axum::{
    extract::ConnectInfo,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shellgate_core::{RateWindows, WindowPolicy};
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::{debug, warn};

const CLEANUP_PERIOD: Duration = Duration::from_secs(300);

// ============================================================================
// Rate Limit Error Response
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitResponse {
    error: String,
    retry_after_secs: u64,
}

// ============================================================================
// Axum Layer
// ============================================================================

/// Rate limiting layer for Axum
#[derive(Clone)]
pub struct RateLimitLayer {
    windows: Arc<RateWindows>,
    trust_proxy: bool,
}

impl RateLimitLayer {
    /// Create a layer enforcing `policy` per client address
    pub fn new(policy: WindowPolicy, trust_proxy: bool) -> Self {
        Self {
            windows: Arc::new(RateWindows::new(policy)),
            trust_proxy,
        }
    }

    /// Periodically drop windows that have fully elapsed
    pub fn spawn_cleanup(&self, shutdown: CancellationToken) {
        let windows = Arc::clone(&self.windows);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_PERIOD);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let purged = windows.purge_at(Instant::now());
                        if purged > 0 {
                            debug!(purged, "Purged endpoint rate windows");
                        }
                    }
                }
            }
        });
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            windows: Arc::clone(&self.windows),
            trust_proxy: self.trust_proxy,
        }
    }
}

// ============================================================================
// Axum Service
// ============================================================================

/// Rate limiting service wrapper
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    windows: Arc<RateWindows>,
    trust_proxy: bool,
}

type BoxFuture<T, E> =
    std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<T, E>> + Send>>;

impl<S, B> Service<Request<B>> for RateLimitService<S>
where
    S: Service<Request<B>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<Response, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> BoxFuture<Response, S::Error> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let addr = resolve_client_addr(req.headers(), peer, self.trust_proxy);
        let decision = self.windows.hit(addr);

        // Swap in a fresh clone so the ready service is the one called
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if decision.allowed {
                return inner.call(req).await;
            }

            // Round up so clients never retry early
            let retry_after = decision.retry_after.as_secs()
                + u64::from(decision.retry_after.subsec_nanos() > 0);
            warn!(ip = %addr, retry_after_secs = retry_after, "Auth endpoint rate limit exceeded");

            let body = RateLimitResponse {
                error: "Too many authentication attempts, please try again later.".to_string(),
                retry_after_secs: retry_after,
            };
            Ok((
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.to_string())],
                Json(body),
            )
                .into_response())
        })
    }
}
