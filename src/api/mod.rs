/// API routes and handlers
pub mod comments;
pub mod extract;
pub mod health;
pub mod status;
pub mod submissions;

use crate::{
    context::AppContext,
    error::AppResult,
    gate::{admit, method_not_allowed, preflight, ClientInfo, Route},
};
use axum::{middleware, routing::MethodRouter, Router};
use extract::JsonBody;

/// Build API routes
pub fn routes(ctx: &AppContext) -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(comments::routes(ctx))
        .merge(submissions::routes(ctx))
        .merge(status::routes(ctx))
}

/// Mount `handler` at `route`'s path behind its gates.
///
/// `OPTIONS` is answered by [`preflight`]; any other unserved method gets a
/// JSON 405.
pub(crate) fn gated(
    ctx: &AppContext,
    route: Route,
    handler: MethodRouter<AppContext>,
) -> Router<AppContext> {
    Router::new().route(
        route.path(),
        handler
            .options(preflight)
            .route_layer(middleware::from_fn_with_state((ctx.clone(), route), admit))
            .fallback(method_not_allowed),
    )
}

/// Run the CAPTCHA gate for `route` with the token carried in `body`
pub(crate) async fn verify_captcha(
    ctx: &AppContext,
    route: Route,
    body: &JsonBody,
    client: &ClientInfo,
) -> AppResult<()> {
    let token = body.captcha_token();
    ctx.captcha
        .check(
            route.as_str(),
            ctx.policy(route).captcha,
            token.as_deref(),
            client.remote_ip(),
        )
        .await
}
