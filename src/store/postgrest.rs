/// PostgREST (Supabase `/rest/v1`) implementation of the queue store
use super::{NewPendingComment, PendingComment, PendingCommentStore, ProofRecord, ProofStore};
use crate::{
    error::{AppError, AppResult, Collaborator},
    storage::SupabaseClient,
};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

pub struct PostgrestStore {
    client: SupabaseClient,
    pending_table: String,
    proofs_table: String,
}

#[derive(Deserialize)]
struct ProofPathRow {
    #[serde(default)]
    proof_path: Option<String>,
}

impl PostgrestStore {
    pub fn new(
        client: SupabaseClient,
        pending_table: impl Into<String>,
        proofs_table: impl Into<String>,
    ) -> Self {
        Self {
            client,
            pending_table: pending_table.into(),
            proofs_table: proofs_table.into(),
        }
    }

    fn table_path(table: &str) -> String {
        format!("/rest/v1/{}", urlencoding::encode(table))
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> AppResult<Vec<T>> {
        let request = self
            .client
            .request(Method::GET, &Self::table_path(table))
            .query(query);
        let response = self.client.send(Collaborator::Queue, request).await?;
        if !response.status().is_success() {
            return Err(SupabaseClient::failure(Collaborator::Queue, response).await);
        }
        SupabaseClient::parse(Collaborator::Queue, response).await
    }
}

#[async_trait]
impl PendingCommentStore for PostgrestStore {
    async fn insert(&self, row: &NewPendingComment) -> AppResult<PendingComment> {
        let request = self
            .client
            .request(Method::POST, &Self::table_path(&self.pending_table))
            .header("Prefer", "return=representation")
            .json(row);
        let response = self.client.send(Collaborator::Queue, request).await?;
        if !response.status().is_success() {
            return Err(SupabaseClient::failure(Collaborator::Queue, response).await);
        }

        let mut rows: Vec<PendingComment> =
            SupabaseClient::parse(Collaborator::Queue, response).await?;
        let inserted = rows.pop().ok_or_else(|| {
            AppError::upstream(Collaborator::Queue, None, "insert returned no row")
        })?;
        debug!("Queued comment {} for issue #{}", inserted.id, inserted.issue_number);
        Ok(inserted)
    }

    async fn get(&self, id: &str) -> AppResult<Option<PendingComment>> {
        let mut rows: Vec<PendingComment> = self
            .fetch(
                &self.pending_table,
                &[
                    ("select", "*".to_string()),
                    ("id", format!("eq.{}", id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.pop())
    }

    async fn list(&self, limit: usize) -> AppResult<Vec<PendingComment>> {
        self.fetch(
            &self.pending_table,
            &[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let request = self
            .client
            .request(Method::DELETE, &Self::table_path(&self.pending_table))
            .query(&[("id", format!("eq.{}", id))]);
        let response = self.client.send(Collaborator::Queue, request).await?;
        if !response.status().is_success() {
            return Err(SupabaseClient::failure(Collaborator::Queue, response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl ProofStore for PostgrestStore {
    async fn insert_proof(&self, record: &ProofRecord) -> AppResult<()> {
        let request = self
            .client
            .request(Method::POST, &Self::table_path(&self.proofs_table))
            .header("Prefer", "return=minimal")
            .json(record);
        let response = self.client.send(Collaborator::Queue, request).await?;
        if !response.status().is_success() {
            return Err(SupabaseClient::failure(Collaborator::Queue, response).await);
        }
        Ok(())
    }

    async fn proof_path(&self, issue_number: u64) -> AppResult<Option<String>> {
        let mut rows: Vec<ProofPathRow> = self
            .fetch(
                &self.proofs_table,
                &[
                    ("select", "proof_path".to_string()),
                    ("issue_number", format!("eq.{}", issue_number)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows
            .pop()
            .and_then(|row| row.proof_path)
            .filter(|path| !path.trim().is_empty()))
    }
}
