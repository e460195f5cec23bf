//! Request middleware for body limits and rate limiting

use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::Response,
};
use redress_common::config::RateLimitConfig;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Sliding-window limiter keyed by client address
#[derive(Clone)]
pub struct RateLimiter {
    peer_requests: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            peer_requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a request from `peer_addr`; false when it is over the limit
    pub async fn check_peer_rate_limit(&self, peer_addr: &str) -> bool {
        let mut requests = self.peer_requests.write().await;
        let peer_reqs = requests.entry(peer_addr.to_string()).or_default();

        let now = Instant::now();
        peer_reqs.retain(|&timestamp| now.duration_since(timestamp) < self.window);

        if peer_reqs.len() >= self.max_requests {
            warn!(
                "Rate limit exceeded for: {} ({}/{})",
                peer_addr,
                peer_reqs.len(),
                self.max_requests
            );
            return false;
        }

        peer_reqs.push(now);
        true
    }

    pub async fn get_peer_request_count(&self, peer_addr: &str) -> usize {
        let requests = self.peer_requests.read().await;
        requests.get(peer_addr).map(|v| v.len()).unwrap_or(0)
    }

    /// Drop peers with no request inside the window
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut peer_requests = self.peer_requests.write().await;
        peer_requests.retain(|_, timestamps| {
            timestamps.retain(|&ts| now.duration_since(ts) < self.window);
            !timestamps.is_empty()
        });
        debug!("Rate limiter cleanup: {} active peers", peer_requests.len());
    }
}

/// Reject requests whose declared Content-Length exceeds `max_bytes`
pub async fn body_size_limit(
    State(max_bytes): State<usize>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if let Some(length) = declared {
        if length > max_bytes {
            warn!("Request body too large: {} bytes (max: {})", length, max_bytes);
            return Err(ApiError::PayloadTooLarge);
        }
    }

    Ok(next.run(request).await)
}

pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer_addr = extract_peer_addr(&request);

    if !rate_limiter.check_peer_rate_limit(&peer_addr).await {
        return Err(ApiError::TooManyRequests);
    }

    debug!(
        "Rate limit OK for {}: {}/{} requests",
        peer_addr,
        rate_limiter.get_peer_request_count(&peer_addr).await,
        rate_limiter.max_requests
    );

    Ok(next.run(request).await)
}

/// Client address from X-Forwarded-For, then the socket peer, or "unknown"
fn extract_peer_addr(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn test_peer_rate_limiter() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        for i in 1..=3 {
            assert!(
                limiter.check_peer_rate_limit("127.0.0.1").await,
                "Request {} should succeed within limit",
                i
            );
        }
        assert!(!limiter.check_peer_rate_limit("127.0.0.1").await);

        // Different peer should succeed
        assert!(limiter.check_peer_rate_limit("127.0.0.2").await);
    }

    #[tokio::test]
    async fn test_rejected_requests_are_not_counted() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        for _ in 0..5 {
            limiter.check_peer_rate_limit("10.0.0.1").await;
        }
        assert_eq!(limiter.get_peer_request_count("10.0.0.1").await, 2);
    }

    #[tokio::test]
    async fn test_window_expiry() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100));
        assert!(limiter.check_peer_rate_limit("10.0.0.1").await);
        assert!(limiter.check_peer_rate_limit("10.0.0.1").await);
        assert!(!limiter.check_peer_rate_limit("10.0.0.1").await);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(limiter.check_peer_rate_limit("10.0.0.1").await);
    }

    #[tokio::test]
    async fn test_cleanup() {
        let limiter = RateLimiter::new(10, Duration::from_millis(50));
        for i in 0..5 {
            limiter.check_peer_rate_limit(&format!("127.0.0.{}", i)).await;
        }
        limiter.cleanup().await;
        assert_eq!(limiter.peer_requests.read().await.len(), 5);

        tokio::time::sleep(Duration::from_millis(80)).await;
        limiter.cleanup().await;
        assert!(limiter.peer_requests.read().await.is_empty());
    }

    #[test]
    fn test_extract_peer_addr() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_peer_addr(&request), "203.0.113.9");

        let mut request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_peer_addr(&request), "unknown");

        let addr: SocketAddr = "192.0.2.7:41000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(extract_peer_addr(&request), "192.0.2.7");
    }
}
