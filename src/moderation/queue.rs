/// Pending-comment moderation queue
use crate::{
    error::{AppError, AppResult},
    store::{NewPendingComment, PendingComment, PendingCommentStore},
    validation::Validator,
};
use std::sync::Arc;
use tracing::info;

pub const NAME_MIN_CHARS: usize = 8;
pub const NAME_MAX_CHARS: usize = 120;
pub const COMMENT_MIN_CHARS: usize = 40;
pub const COMMENT_MAX_CHARS: usize = 4000;
/// Default and maximum page size for listing
pub const MAX_PAGE_SIZE: usize = 200;

#[derive(Clone)]
pub struct PendingCommentQueue {
    store: Arc<dyn PendingCommentStore>,
}

impl PendingCommentQueue {
    pub fn new(store: Arc<dyn PendingCommentStore>) -> Self {
        Self { store }
    }

    /// Validate and queue a comment for moderation
    pub async fn enqueue(
        &self,
        issue_number: Option<u64>,
        full_name: &str,
        comment: &str,
    ) -> AppResult<PendingComment> {
        let mut v = Validator::new();
        if issue_number.is_none() {
            v.error("issueNumber", "Submission number is invalid.");
        }
        v.length("fullName", full_name, NAME_MIN_CHARS, NAME_MAX_CHARS, "Full name")
            .length("comment", comment, COMMENT_MIN_CHARS, COMMENT_MAX_CHARS, "Comment");
        v.finish()?;

        let row = NewPendingComment {
            issue_number: issue_number.unwrap_or_default(),
            full_name: full_name.trim().to_string(),
            comment: comment.trim().to_string(),
        };
        let inserted = self.store.insert(&row).await?;
        info!("Comment {} queued for issue #{}", inserted.id, inserted.issue_number);
        Ok(inserted)
    }

    /// Newest first; the page size is capped at [`MAX_PAGE_SIZE`]
    pub async fn list(&self, limit: Option<usize>) -> AppResult<Vec<PendingComment>> {
        let limit = limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let mut rows = self.store.list(limit).await?;
        rows.truncate(limit);
        Ok(rows)
    }

    /// Fresh read of one row
    pub async fn fetch(&self, id: &str) -> AppResult<Option<PendingComment>> {
        match valid_row_id(id) {
            Some(id) => self.store.get(id).await,
            None => Ok(None),
        }
    }

    /// Delete a row; an absent id is not an error here
    pub async fn remove(&self, id: &str) -> AppResult<()> {
        let id = valid_row_id(id)
            .ok_or_else(|| AppError::validation("Comment id is invalid."))?;
        self.store.delete(id).await
    }
}

/// Row ids are integers or UUIDs; anything else cannot name a row
pub fn valid_row_id(id: &str) -> Option<&str> {
    let id = id.trim();
    let ok = !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    ok.then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_row_id() {
        assert_eq!(valid_row_id("7"), Some("7"));
        assert_eq!(
            valid_row_id(" 6f1c2b9e-0d7c-4b53-9a63-0c4c1d9e3b11 "),
            Some("6f1c2b9e-0d7c-4b53-9a63-0c4c1d9e3b11")
        );
        assert_eq!(valid_row_id(""), None);
        assert_eq!(valid_row_id("1,or(id.gt.0)"), None);
        assert_eq!(valid_row_id("1&select=*"), None);
    }
}
