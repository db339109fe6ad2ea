/// Rate Limiting System
///
/// Two layers: a whole-service throttle (governor, unkeyed) that protects the
/// process, and a per-route sliding-window limiter keyed by client address.
/// The per-route limiter never fails a request because its store failed.
pub mod memory;
pub mod redis;

pub use memory::MemoryRateLimitStore;
pub use self::redis::RedisRateLimitStore;

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tracing::{debug, warn};

/// A limit of `limit` requests per trailing `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self {
            limit,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Parse `limit/window_secs`, e.g. `5/300`
    pub fn parse(raw: &str) -> Option<Self> {
        let (limit, window) = raw.split_once('/')?;
        let limit: u32 = limit.trim().parse().ok()?;
        let window: u64 = window.trim().parse().ok()?;
        if limit == 0 || window == 0 {
            return None;
        }
        Some(Self::new(limit, window))
    }
}

/// Hits recorded for a key inside its trailing window, including the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u32,
    /// Time until a new hit would fit under the limit again
    pub reset_after: Duration,
}

/// Counter storage behind the per-route limiter
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Record one hit for `key` and report the trailing-window count.
    /// Denied hits are recorded too, so probing cannot outrun the window.
    async fn record_hit(&self, key: &str, rule: &RateLimitRule) -> AppResult<WindowCount>;
}

/// Outcome of a per-route check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Per-route, per-client sliding-window limiter
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Limiter backed by the in-process store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRateLimitStore::new()))
    }

    /// Check and record one request from `client` on `route`.
    ///
    /// A missing rule allows unconditionally. Store failures are logged and
    /// the request is allowed.
    pub async fn check(
        &self,
        route: &str,
        client: &str,
        rule: Option<RateLimitRule>,
    ) -> RateDecision {
        let Some(rule) = rule else {
            return RateDecision::Allowed;
        };

        let key = format!("{}:{}", route, client);
        match self.store.record_hit(&key, &rule).await {
            Ok(window) if window.count <= rule.limit => {
                debug!("Rate limit check: {} => {}/{}", key, window.count, rule.limit);
                RateDecision::Allowed
            }
            Ok(window) => {
                warn!("Rate limit exceeded on {}: {}/{}", route, window.count, rule.limit);
                RateDecision::Denied {
                    retry_after: window.reset_after.max(Duration::from_secs(1)),
                }
            }
            Err(e) => {
                warn!("Rate limit store unavailable, allowing request: {}", e);
                RateDecision::Allowed
            }
        }
    }
}

/// Whole-service throttle applied ahead of routing
#[derive(Clone)]
pub struct GlobalThrottle {
    limiter: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    clock: DefaultClock,
}

impl GlobalThrottle {
    pub fn per_minute(requests: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: Arc::new(GovernorLimiter::direct(quota)),
            clock: DefaultClock::default(),
        }
    }

    pub fn check(&self) -> AppResult<()> {
        match self.limiter.check() {
            Ok(_) => Ok(()),
            Err(not_until) => Err(AppError::RateLimitExceeded {
                retry_after: not_until.wait_time_from(self.clock.now()),
            }),
        }
    }
}

/// Global throttling middleware
pub async fn global_throttle_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(throttle) = &ctx.global_throttle {
        if let Err(e) = throttle.check() {
            crate::metrics::record_gate_rejection("*", "global");
            return Err(e);
        }
    }
    Ok(next.run(request).await)
}
