/// Submission, upload ticket and proof link endpoints
use super::{comments::body_password, extract::JsonBody, gated, verify_captcha};
use crate::{
    auth::AdminCredential,
    context::AppContext,
    error::{AppError, AppResult},
    gate::{ClientInfo, Route},
    proofs::ProofLink,
    submissions::{ComplaintInput, ReportInput, SubmissionReceipt},
    uploads::UploadTicket,
    validation::{positive_number, text},
};
use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::Serialize;

pub fn routes(ctx: &AppContext) -> Router<AppContext> {
    Router::new()
        .merge(gated(ctx, Route::SubmitComplaint, post(submit_complaint)))
        .merge(gated(ctx, Route::SubmitReport, post(submit_report)))
        .merge(gated(ctx, Route::GetUploadTicket, post(get_upload_ticket)))
        .merge(gated(ctx, Route::GetProofLink, post(get_proof_link)))
}

/// Success envelope around a payload
#[derive(Serialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(flatten)]
    payload: T,
}

fn ok<T>(payload: T) -> Json<Envelope<T>> {
    Json(Envelope { ok: true, payload })
}

async fn submit_complaint(
    State(ctx): State<AppContext>,
    Extension(client): Extension<ClientInfo>,
    body: JsonBody,
) -> AppResult<Json<Envelope<SubmissionReceipt>>> {
    verify_captcha(&ctx, Route::SubmitComplaint, &body, &client).await?;

    let input = ComplaintInput {
        full_name: text(body.field("fullName")),
        submitted_date: text(body.field("submittedDate")),
        category: text(body.field("category")),
        summary: text(body.field("summary")),
        show_name: text(body.field("showName")).eq_ignore_ascii_case("yes"),
        place: text(body.field("place")),
        proof_path: text(body.field("proofPath")),
        proof_url: text(body.field("proofUrl")),
    };
    let receipt = ctx
        .submissions
        .submit_complaint(input, client.remote_ip())
        .await?;
    Ok(ok(receipt))
}

async fn submit_report(
    State(ctx): State<AppContext>,
    Extension(client): Extension<ClientInfo>,
    body: JsonBody,
) -> AppResult<Json<Envelope<SubmissionReceipt>>> {
    verify_captcha(&ctx, Route::SubmitReport, &body, &client).await?;

    let input = ReportInput {
        event_date_time: text(body.field("eventDateTime")),
        place: text(body.field("place")),
        category: text(body.field("category")),
        body: text(body.field("body")),
        full_name: text(body.field("fullName")),
        evidence_url: text(body.field("evidenceUrl")),
    };
    let receipt = ctx.submissions.submit_report(input).await?;
    Ok(ok(receipt))
}

/// Signed upload URL for one proof file.
///
/// The MIME check runs before CAPTCHA so an unsupported type never costs a
/// verifier or storage call.
async fn get_upload_ticket(
    State(ctx): State<AppContext>,
    Extension(client): Extension<ClientInfo>,
    body: JsonBody,
) -> AppResult<Json<Envelope<UploadTicket>>> {
    let mime = text(body.field("mime"));
    ctx.uploads.check_mime(&mime)?;

    verify_captcha(&ctx, Route::GetUploadTicket, &body, &client).await?;

    let ticket = ctx.uploads.issue(&mime).await?;
    Ok(ok(ticket))
}

/// Signed download URL for a submission's proof (admin only)
async fn get_proof_link(
    State(ctx): State<AppContext>,
    Extension(client): Extension<ClientInfo>,
    header_credential: AdminCredential,
    body: JsonBody,
) -> AppResult<Json<Envelope<ProofLink>>> {
    verify_captcha(&ctx, Route::GetProofLink, &body, &client).await?;

    let issue_number = positive_number(body.field("issueNumber"))
        .ok_or_else(|| AppError::validation("Submission number is invalid."))?;
    let ttl = positive_number(body.field("expiresIn"));
    let credential = header_credential.or(body_password(&body));

    let link = ctx
        .proof_links
        .resolve(issue_number, &credential, ttl)
        .await?;
    Ok(ok(link))
}
