/// Approve/reject state machine for queued comments
///
/// A queued comment is `Pending` until an administrator decides. Approval
/// publishes the comment to the tracker and then deletes the queue row;
/// rejection deletes the row. The two systems share no transaction, so an
/// approval can end half-done: see [`AppError::PartialFailure`].
///
/// Approval is at-least-once. If the tracker accepts a comment but the
/// response is lost, a retry publishes a duplicate.
use super::queue::PendingCommentQueue;
use crate::{
    auth::{AdminAuthenticator, AdminCredential},
    error::{AppError, AppResult},
    metrics,
    store::PendingComment,
    tracker::IssueTracker,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Administrator decision on a queued comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }

    /// Past tense used in responses
    pub fn past_tense(&self) -> &'static str {
        match self {
            Decision::Approve => "approved",
            Decision::Reject => "rejected",
        }
    }
}

impl FromStr for Decision {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            _ => Err(AppError::validation("Action must be approve or reject.")),
        }
    }
}

/// Terminal outcome of a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Comment is on the tracker and the row is gone
    Published { comment_id: u64 },
    /// Row is gone, nothing was published
    Discarded,
}

/// Body of the tracker comment for an approved row
pub fn approved_comment_body(row: &PendingComment) -> String {
    format!(
        "**Full name:** {}\n\n{}\n\n_(Approved by the administration)_",
        row.full_name, row.comment
    )
}

#[derive(Clone)]
pub struct ModerationResolver {
    auth: Arc<AdminAuthenticator>,
    queue: PendingCommentQueue,
    tracker: Arc<dyn IssueTracker>,
}

impl ModerationResolver {
    pub fn new(
        auth: Arc<AdminAuthenticator>,
        queue: PendingCommentQueue,
        tracker: Arc<dyn IssueTracker>,
    ) -> Self {
        Self {
            auth,
            queue,
            tracker,
        }
    }

    /// Apply `decision` to row `id`.
    ///
    /// Only the id comes from the caller; name, text and target submission
    /// are read from the queue immediately before acting.
    pub async fn resolve(
        &self,
        id: &str,
        decision: Decision,
        credential: &AdminCredential,
    ) -> AppResult<Resolution> {
        self.auth.authenticate(credential).await?;

        let row = self
            .queue
            .fetch(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

        match decision {
            Decision::Approve => self.publish(row).await,
            Decision::Reject => self.discard(row).await,
        }
    }

    pub async fn approve(&self, id: &str, credential: &AdminCredential) -> AppResult<Resolution> {
        self.resolve(id, Decision::Approve, credential).await
    }

    pub async fn reject(&self, id: &str, credential: &AdminCredential) -> AppResult<Resolution> {
        self.resolve(id, Decision::Reject, credential).await
    }

    async fn publish(&self, row: PendingComment) -> AppResult<Resolution> {
        let body = approved_comment_body(&row);

        let comment_id = match self.tracker.create_comment(row.issue_number, &body).await {
            Ok(id) => id,
            Err(e) => {
                // Row stays queued; the decision can be retried
                warn!(
                    "Publishing comment {} to issue #{} failed: {}",
                    row.id, row.issue_number, e
                );
                metrics::record_moderation_decision(Decision::Approve.as_str(), "failed");
                return Err(e);
            }
        };

        if let Err(e) = self.queue.remove(&row.id).await {
            let reconciliation_id = Uuid::new_v4();
            error!(
                target: "civic_desk::reconciliation",
                reconciliation_id = %reconciliation_id,
                row_id = %row.id,
                issue_number = row.issue_number,
                comment_id = comment_id,
                error = %e,
                "Comment published but queue row was not deleted"
            );
            metrics::record_moderation_decision(Decision::Approve.as_str(), "partial");
            return Err(AppError::PartialFailure(format!(
                "comment {} published on issue #{} but queue row {} remains (reconciliation {})",
                comment_id, row.issue_number, row.id, reconciliation_id
            )));
        }

        info!(
            "Comment {} published to issue #{} as {}",
            row.id, row.issue_number, comment_id
        );
        metrics::record_moderation_decision(Decision::Approve.as_str(), "published");
        Ok(Resolution::Published { comment_id })
    }

    async fn discard(&self, row: PendingComment) -> AppResult<Resolution> {
        if let Err(e) = self.queue.remove(&row.id).await {
            metrics::record_moderation_decision(Decision::Reject.as_str(), "failed");
            return Err(e);
        }

        info!("Comment {} for issue #{} rejected", row.id, row.issue_number);
        metrics::record_moderation_decision(Decision::Reject.as_str(), "discarded");
        Ok(Resolution::Discarded)
    }
}
