/// Rate Limiting System
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{AppError, AppResult},
};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{keyed::DefaultKeyedStateStore, InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;
type KeyedLimiter = GovernorLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    general: Arc<DirectLimiter>,
    /// One bucket per client address
    code_lookups: Arc<KeyedLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let general_quota =
            Quota::per_second(NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN))
                .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        // Share codes are short, so guessing is throttled much harder than normal traffic
        let lookup_rate = NonZeroU32::new(config.code_lookups_per_minute).unwrap_or(NonZeroU32::MIN);
        let lookup_quota = Quota::per_minute(lookup_rate).allow_burst(lookup_rate);

        Self {
            enabled: config.enabled,
            general: Arc::new(GovernorLimiter::direct(general_quota)),
            code_lookups: Arc::new(GovernorLimiter::keyed(lookup_quota)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check the shared request budget
    pub fn check(&self) -> AppResult<()> {
        match self.general.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(AppError::RateLimitExceeded),
        }
    }

    /// Check the share-code lookup budget of one client
    pub fn check_code_lookup(&self, client: IpAddr) -> AppResult<()> {
        match self.code_lookups.check_key(&client) {
            Ok(_) => Ok(()),
            Err(_) => Err(AppError::RateLimitExceeded),
        }
    }
}

/// Requests that resolve a share code: `GET /api/share-codes/:code` and
/// `POST /api/share-codes/:code/redeem`
fn is_code_lookup(method: &Method, path: &str) -> bool {
    let Some(rest) = path.strip_prefix("/api/share-codes/") else {
        return false;
    };

    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    match (method, segments.as_slice()) {
        (&Method::GET, [_code]) => true,
        (&Method::POST, [_code, "redeem"]) => true,
        _ => false,
    }
}

/// Peer address recorded by the server; requests without one share a bucket
fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !ctx.rate_limiter.is_enabled() {
        return Ok(next.run(request).await);
    }

    ctx.rate_limiter.check()?;

    if is_code_lookup(request.method(), request.uri().path()) {
        let client = client_ip(&request);
        if let Err(e) = ctx.rate_limiter.check_code_lookup(client) {
            tracing::warn!(client = %client, path = %request.uri().path(), "share code lookup rate limit hit");
            return Err(e);
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 0, last))
    }

    fn config(rps: u32, burst: u32, lookups: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            requests_per_second: rps,
            burst_size: burst,
            code_lookups_per_minute: lookups,
        }
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(&config(50, 100, 60));

        assert!(limiter.is_enabled());
        assert!(limiter.check().is_ok());
        assert!(limiter.check_code_lookup(client(1)).is_ok());
    }

    #[test]
    fn test_burst_limit() {
        let limiter = RateLimiter::new(&config(10, 5, 60));

        for _ in 0..5 {
            assert!(limiter.check().is_ok());
        }

        assert!(matches!(limiter.check(), Err(AppError::RateLimitExceeded)));
    }

    #[test]
    fn test_code_lookup_budget_is_separate() {
        let limiter = RateLimiter::new(&config(10, 100, 3));

        for _ in 0..3 {
            assert!(limiter.check_code_lookup(client(1)).is_ok());
        }
        assert!(limiter.check_code_lookup(client(1)).is_err());

        // general budget untouched
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_code_lookup_budget_is_per_client() {
        let limiter = RateLimiter::new(&config(10, 100, 2));

        assert!(limiter.check_code_lookup(client(1)).is_ok());
        assert!(limiter.check_code_lookup(client(1)).is_ok());
        assert!(limiter.check_code_lookup(client(1)).is_err());

        assert!(limiter.check_code_lookup(client(2)).is_ok());
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let mut request = Request::new(axum::body::Body::empty());
        assert_eq!(client_ip(&request), IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let addr: SocketAddr = "10.0.0.7:5000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_ip(&request), addr.ip());
    }

    #[test]
    fn test_zero_values_fall_back_to_one() {
        let limiter = RateLimiter::new(&config(0, 0, 0));

        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_is_code_lookup() {
        assert!(is_code_lookup(&Method::GET, "/api/share-codes/ABCD2345"));
        assert!(is_code_lookup(&Method::POST, "/api/share-codes/ABCD2345/redeem"));

        assert!(!is_code_lookup(&Method::POST, "/api/share-codes"));
        assert!(!is_code_lookup(&Method::GET, "/api/share-codes/child/c1"));
        assert!(!is_code_lookup(&Method::PATCH, "/api/share-codes/c1"));
        assert!(!is_code_lookup(&Method::DELETE, "/api/share-codes/c1"));
        assert!(!is_code_lookup(&Method::GET, "/api/children"));
    }
}
