/// Submission status endpoints
use super::{comments::body_password, extract::JsonBody, gated, verify_captcha};
use crate::{
    auth::AdminCredential,
    context::AppContext,
    error::{AppError, AppResult},
    gate::{ClientInfo, Route},
    listing::{ApprovedFilter, ApprovedList, StatusView},
    moderation::StateLabel,
    tracker::ReactionOutcome,
    validation::{positive_number, text},
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn routes(ctx: &AppContext) -> Router<AppContext> {
    Router::new()
        .merge(gated(ctx, Route::AdminSetStatus, post(admin_set_status)))
        .merge(gated(ctx, Route::GetStatus, get(get_status)))
        .merge(gated(ctx, Route::ListApproved, get(list_approved)))
        .merge(gated(ctx, Route::UpvoteIssue, post(upvote_issue)))
}

/// Move a submission to a new state label (admin only)
async fn admin_set_status(
    State(ctx): State<AppContext>,
    Extension(client): Extension<ClientInfo>,
    header_credential: AdminCredential,
    body: JsonBody,
) -> AppResult<Json<Value>> {
    let number = positive_number(body.field("number"));
    let state = text(body.field("state")).parse::<StateLabel>();

    let mut errors = Vec::new();
    if number.is_none() {
        errors.push("Submission number is invalid.".to_string());
    }
    if state.is_err() {
        errors.push(format!(
            "State must be one of: {}.",
            StateLabel::ALL.map(|s| s.as_str()).join(", ")
        ));
    }
    let (Some(number), Ok(state)) = (number, state) else {
        return Err(AppError::Validation(errors));
    };

    verify_captcha(&ctx, Route::AdminSetStatus, &body, &client).await?;

    let credential = header_credential.or(body_password(&body));
    let labels = ctx
        .status_updater
        .set_state(number, state, &credential)
        .await?;

    Ok(Json(json!({ "ok": true, "labels": labels })))
}

#[derive(Deserialize)]
struct StatusParams {
    number: Option<String>,
    nocache: Option<String>,
}

/// Public status of one submission
async fn get_status(
    State(ctx): State<AppContext>,
    Query(params): Query<StatusParams>,
) -> AppResult<Json<StatusView>> {
    let number = params
        .number
        .as_deref()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| AppError::validation("Submission number is invalid."))?;
    let bypass_cache = params.nocache.as_deref() == Some("1");

    let view = ctx.status_reader.get(number, bypass_cache).await?;
    Ok(Json(view))
}

/// Approved submissions, optionally filtered by label values
async fn list_approved(
    State(ctx): State<AppContext>,
    Query(filter): Query<ApprovedFilter>,
) -> AppResult<Json<ApprovedList>> {
    let list = ctx.approved.list(&filter).await?;
    Ok(Json(list))
}

/// Add a `+1` reaction; repeating it is not an error
async fn upvote_issue(
    State(ctx): State<AppContext>,
    Extension(client): Extension<ClientInfo>,
    body: JsonBody,
) -> AppResult<Json<Value>> {
    verify_captcha(&ctx, Route::UpvoteIssue, &body, &client).await?;

    let number = positive_number(body.field("issueNumber"))
        .ok_or_else(|| AppError::validation("Submission number is required."))?;
    let outcome = ctx.tracker.add_reaction(number, "+1").await?;

    Ok(Json(json!({
        "ok": true,
        "alreadyReacted": outcome == ReactionOutcome::AlreadyPresent,
    })))
}
