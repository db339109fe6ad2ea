/// Queue-store collaborator
///
/// Holds the pending-comment moderation queue and the proof records that
/// link a submission to its private attachment.
pub mod postgrest;

pub use postgrest::PostgrestStore;

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

/// Moderation-queue row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingComment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub issue_number: u64,
    pub full_name: String,
    pub comment: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Row to insert into the moderation queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPendingComment {
    pub issue_number: u64,
    pub full_name: String,
    pub comment: String,
}

/// Link between a submission and its private attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub issue_number: u64,
    pub proof_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
}

#[async_trait]
pub trait PendingCommentStore: Send + Sync {
    async fn insert(&self, row: &NewPendingComment) -> AppResult<PendingComment>;

    async fn get(&self, id: &str) -> AppResult<Option<PendingComment>>;

    /// Newest first, at most `limit` rows
    async fn list(&self, limit: usize) -> AppResult<Vec<PendingComment>>;

    /// Delete a row; deleting an absent id is not an error
    async fn delete(&self, id: &str) -> AppResult<()>;
}

#[async_trait]
pub trait ProofStore: Send + Sync {
    async fn insert_proof(&self, record: &ProofRecord) -> AppResult<()>;

    /// Stored object path for a submission
    async fn proof_path(&self, issue_number: u64) -> AppResult<Option<String>>;
}

/// Row ids may be integers or UUIDs depending on the table definition
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_comment_accepts_numeric_and_uuid_ids() {
        let numeric: PendingComment = serde_json::from_str(
            r#"{"id":7,"issue_number":42,"full_name":"A","comment":"B","created_at":"2024-05-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(numeric.id, "7");

        let uuid: PendingComment = serde_json::from_str(
            r#"{"id":"6f1c2b9e-0d7c-4b53-9a63-0c4c1d9e3b11","issue_number":42,"full_name":"A","comment":"B"}"#,
        )
        .unwrap();
        assert_eq!(uuid.id, "6f1c2b9e-0d7c-4b53-9a63-0c4c1d9e3b11");
        assert!(uuid.created_at.is_none());
    }
}
