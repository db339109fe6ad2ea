/// Anti-abuse gates applied before a handler's effect runs
///
/// Every endpoint is a [`Route`] with a [`GatePolicy`] saying which gates are
/// active. Origin and rate-limit gates run in [`admit`] before the body is
/// read; the CAPTCHA gate runs in the handler once the token is known.
pub mod captcha;
pub mod origin;

pub use captcha::{CaptchaGate, CaptchaOutcome, CaptchaVerifier, HCaptchaVerifier};
pub use origin::{DeclaredOrigin, OriginGuard};

use crate::{
    context::AppContext,
    error::{AppError, AppResult},
    metrics,
    rate_limit::{RateDecision, RateLimitRule},
};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Instant;
use tracing::debug;

/// Endpoints exposed by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    SubmitComment,
    ListPendingComments,
    ModerateComment,
    AdminSetStatus,
    GetProofLink,
    GetUploadTicket,
    SubmitComplaint,
    SubmitReport,
    GetStatus,
    ListApproved,
    UpvoteIssue,
}

impl Route {
    pub const ALL: [Route; 11] = [
        Route::SubmitComment,
        Route::ListPendingComments,
        Route::ModerateComment,
        Route::AdminSetStatus,
        Route::GetProofLink,
        Route::GetUploadTicket,
        Route::SubmitComplaint,
        Route::SubmitReport,
        Route::GetStatus,
        Route::ListApproved,
        Route::UpvoteIssue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::SubmitComment => "submitComment",
            Route::ListPendingComments => "listPendingComments",
            Route::ModerateComment => "moderateComment",
            Route::AdminSetStatus => "adminSetStatus",
            Route::GetProofLink => "getProofLink",
            Route::GetUploadTicket => "getUploadTicket",
            Route::SubmitComplaint => "submitComplaint",
            Route::SubmitReport => "submitReport",
            Route::GetStatus => "getStatus",
            Route::ListApproved => "listApproved",
            Route::UpvoteIssue => "upvoteIssue",
        }
    }

    /// HTTP path the route is mounted at
    pub fn path(&self) -> &'static str {
        match self {
            Route::SubmitComment => "/api/submitComment",
            Route::ListPendingComments => "/api/listPendingComments",
            Route::ModerateComment => "/api/moderateComment",
            Route::AdminSetStatus => "/api/adminSetStatus",
            Route::GetProofLink => "/api/getProofLink",
            Route::GetUploadTicket => "/api/getUploadTicket",
            Route::SubmitComplaint => "/api/submitComplaint",
            Route::SubmitReport => "/api/submitReport",
            Route::GetStatus => "/api/getStatus",
            Route::ListApproved => "/api/listApproved",
            Route::UpvoteIssue => "/api/upvoteIssue",
        }
    }

    /// Built-in gate policy before configuration overrides
    pub fn default_policy(&self) -> GatePolicy {
        use CaptchaPolicy::*;
        let (captcha, limit, window_secs) = match self {
            Route::SubmitComment => (Required, 5, 300),
            Route::ListPendingComments => (Off, 60, 600),
            Route::ModerateComment => (Off, 30, 60),
            Route::AdminSetStatus => (Optional, 10, 60),
            Route::GetProofLink => (Required, 60, 600),
            Route::GetUploadTicket => (Required, 20, 600),
            Route::SubmitComplaint => (Required, 5, 600),
            Route::SubmitReport => (Required, 5, 600),
            Route::GetStatus => (Off, 120, 300),
            Route::ListApproved => (Off, 120, 300),
            Route::UpvoteIssue => (Required, 120, 300),
        };
        GatePolicy {
            origin_check: true,
            captcha,
            rate_limit: Some(RateLimitRule::new(limit, window_secs)),
        }
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Route::ALL
            .iter()
            .find(|route| route.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown route '{}'", s))
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a route treats CAPTCHA verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaPolicy {
    /// Fails closed when no verifier is configured
    Required,
    /// Verified when a verifier is configured, skipped otherwise
    Optional,
    Off,
}

/// Gates active on a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    pub origin_check: bool,
    pub captcha: CaptchaPolicy,
    pub rate_limit: Option<RateLimitRule>,
}

/// Caller network identity, attached to the request by [`admit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
}

impl ClientInfo {
    /// Address to forward to collaborators, if one is known
    pub fn remote_ip(&self) -> Option<&str> {
        if self.ip == "unknown" {
            None
        } else {
            Some(&self.ip)
        }
    }
}

/// Resolve the caller's address.
///
/// Proxy headers are only consulted when `trust_proxy_headers` is set, since
/// any caller can send them; otherwise the socket peer identifies the client.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let forwarded = || {
        header_value("x-nf-client-connection-ip")
            .or_else(|| header_value("client-ip"))
            .or_else(|| {
                header_value("x-forwarded-for").and_then(|v| {
                    v.split(',')
                        .next()
                        .map(|first| first.trim().to_string())
                        .filter(|first| !first.is_empty())
                })
            })
    };

    trust_proxy_headers
        .then(forwarded)
        .flatten()
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Run the origin and rate-limit gates for `route`
async fn check_gates(
    ctx: &AppContext,
    route: Route,
    origin: &DeclaredOrigin,
    ip: &str,
) -> AppResult<()> {
    let policy = ctx.policy(route);

    if policy.origin_check && !ctx.origin_guard.admits(origin) {
        metrics::record_gate_rejection(route.as_str(), "origin");
        return Err(AppError::OriginDenied);
    }

    if let RateDecision::Denied { retry_after } =
        ctx.rate_limiter.check(route.as_str(), ip, policy.rate_limit).await
    {
        metrics::record_gate_rejection(route.as_str(), "rate_limit");
        return Err(AppError::RateLimitExceeded { retry_after });
    }

    Ok(())
}

/// Route middleware: origin guard, rate limiter, client identity
pub async fn admit(
    State((ctx, route)): State<(AppContext, Route)>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let started = Instant::now();
    let method = request.method().clone();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(
        request.headers(),
        peer,
        ctx.config.service.trust_proxy_headers,
    );
    // Owned so the request is not borrowed across the await
    let origin = DeclaredOrigin::from_headers(request.headers());

    let response = match check_gates(&ctx, route, &origin, &ip).await {
        Ok(()) => {
            request.extensions_mut().insert(ClientInfo { ip });
            next.run(request).await
        }
        Err(e) => {
            debug!("Request to {} refused: {}", route, e);
            e.into_response()
        }
    };

    metrics::record_http_request(
        method.as_str(),
        route.as_str(),
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Empty 200 for `OPTIONS`
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// JSON 405 for any method a route does not serve
pub async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "ok": false,
            "error": "MethodNotAllowed",
            "message": "Method Not Allowed"
        })),
    )
}
