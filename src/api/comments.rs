/// Comment submission and moderation endpoints
use super::{extract::JsonBody, gated, verify_captcha};
use crate::{
    auth::AdminCredential,
    context::AppContext,
    error::{AppError, AppResult},
    gate::{ClientInfo, Route},
    moderation::{Decision, Resolution},
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
        .merge(gated(ctx, Route::SubmitComment, post(submit_comment)))
        .merge(gated(ctx, Route::ListPendingComments, get(list_pending_comments)))
        .merge(gated(ctx, Route::ModerateComment, post(moderate_comment)))
}

/// Queue a public comment for moderation
async fn submit_comment(
    State(ctx): State<AppContext>,
    Extension(client): Extension<ClientInfo>,
    body: JsonBody,
) -> AppResult<Json<Value>> {
    verify_captcha(&ctx, Route::SubmitComment, &body, &client).await?;

    let row = ctx
        .queue
        .enqueue(
            positive_number(body.field("issueNumber")),
            &text(body.field("fullName")),
            &text(body.field("comment")),
        )
        .await?;

    Ok(Json(json!({
        "ok": true,
        "id": row.id,
        "message": "Comment received and awaiting moderation."
    })))
}

#[derive(Deserialize)]
struct ListParams {
    limit: Option<String>,
}

/// Pending comments, newest first (admin only)
async fn list_pending_comments(
    State(ctx): State<AppContext>,
    credential: AdminCredential,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Value>> {
    ctx.admin.authenticate(&credential).await?;

    let limit = match params.limit.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<usize>()
                .map_err(|_| AppError::validation("limit must be a positive integer."))?,
        ),
    };
    let items = ctx.queue.list(limit).await?;

    Ok(Json(json!({
        "ok": true,
        "count": items.len(),
        "items": items,
    })))
}

/// Approve or reject a queued comment
async fn moderate_comment(
    State(ctx): State<AppContext>,
    header_credential: AdminCredential,
    body: JsonBody,
) -> AppResult<Json<Value>> {
    let id = text(body.field("id"));
    let action = text(body.field("action"));

    let mut errors = Vec::new();
    if id.is_empty() {
        errors.push("Comment id is required.".to_string());
    }
    let decision = match action.parse::<Decision>() {
        Ok(decision) => Some(decision),
        Err(_) => {
            errors.push("Action must be approve or reject.".to_string());
            None
        }
    };
    let decision = match (decision, errors.is_empty()) {
        (Some(decision), true) => decision,
        _ => return Err(AppError::Validation(errors)),
    };

    let credential = header_credential.or(body_password(&body));
    let resolution = ctx.moderation.resolve(&id, decision, &credential).await?;

    let mut response = json!({
        "ok": true,
        "action": decision.past_tense(),
    });
    if let Resolution::Published { comment_id } = resolution {
        response["commentId"] = json!(comment_id);
    }
    Ok(Json(response))
}

/// Admin password carried in the JSON body
pub(crate) fn body_password(body: &JsonBody) -> AdminCredential {
    match body.field("password").and_then(Value::as_str) {
        Some(password) if !password.is_empty() => AdminCredential::password(password),
        _ => AdminCredential::default(),
    }
}
