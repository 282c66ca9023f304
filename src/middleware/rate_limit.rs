//! Token-bucket rate limiting (spec.md §4.L, explicitly out-of-core but
//! part of the ambient stack).
//!
//! Grounded on `original_source/.../api/middlewares.py`'s
//! `RateLimitMiddleware(capacity, refill_rate)` and the teacher's own
//! layered `Router::layer` composition in `main.rs`.

use axum::{extract::Request, http::StatusCode, response::IntoResponse};
use futures_util::future::BoxFuture;
use std::{
    net::IpAddr,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::Instant,
};
use tower::{Layer, Service};

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A process-wide token bucket per client IP. Requests consume one token;
/// tokens are replenished continuously at `refill_rate` per second, capped
/// at `capacity`.
pub struct RateLimiter {
    capacity: f64,
    refill_rate: f64,
    buckets: Mutex<std::collections::HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_rate: f64) -> Arc<Self> {
        Arc::new(Self { capacity: capacity as f64, refill_rate, buckets: Mutex::new(std::collections::HashMap::new()) })
    }

    /// Returns `true` if a request from `ip` may proceed, consuming a token.
    fn try_acquire(&self, ip: IpAddr) -> bool {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let bucket = buckets.entry(ip).or_insert_with(|| Bucket { tokens: self.capacity, last_refill: now });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService { inner, limiter: self.limiter.clone() }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> Service<Request> for RateLimitService<S>
where
    S: Service<Request, Response = axum::response::Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = axum::response::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let ip = req
            .extensions()
            .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
            .map(|c| c.0.ip())
            .unwrap_or(IpAddr::from([0, 0, 0, 0]));

        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            if limiter.try_acquire(ip) {
                inner.call(req).await
            } else {
                Ok((StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_allows_burst_up_to_capacity_then_blocks() {
        let limiter = RateLimiter::new(3, 1.0);
        let ip = IpAddr::from([127, 0, 0, 1]);
        assert!(limiter.try_acquire(ip));
        assert!(limiter.try_acquire(ip));
        assert!(limiter.try_acquire(ip));
        assert!(!limiter.try_acquire(ip));
    }

    #[test]
    fn buckets_are_independent_per_ip() {
        let limiter = RateLimiter::new(1, 1.0);
        let a = IpAddr::from([10, 0, 0, 1]);
        let b = IpAddr::from([10, 0, 0, 2]);
        assert!(limiter.try_acquire(a));
        assert!(!limiter.try_acquire(a));
        assert!(limiter.try_acquire(b));
    }
}
