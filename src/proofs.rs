/// Admin-only signed links to proof attachments
use crate::{
    auth::{AdminAuthenticator, AdminCredential},
    config::clamp_signed_ttl,
    error::{AppError, AppResult},
    storage::ObjectStorage,
    store::ProofStore,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Short-lived download link for a proof
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofLink {
    pub signed_url: String,
    /// Same as `signed_url`, kept for older front ends
    pub url: String,
    /// Milliseconds since the epoch
    pub expires_at: i64,
    pub ttl: u64,
}

#[derive(Clone)]
pub struct ProofLinkResolver {
    auth: Arc<AdminAuthenticator>,
    proofs: Arc<dyn ProofStore>,
    storage: Arc<dyn ObjectStorage>,
    default_ttl_secs: u64,
}

impl ProofLinkResolver {
    pub fn new(
        auth: Arc<AdminAuthenticator>,
        proofs: Arc<dyn ProofStore>,
        storage: Arc<dyn ObjectStorage>,
        default_ttl_secs: u64,
    ) -> Self {
        Self {
            auth,
            proofs,
            storage,
            default_ttl_secs,
        }
    }

    /// Signed download URL for the proof attached to `issue_number`.
    ///
    /// Authentication runs first so an unauthenticated caller learns nothing
    /// about which submissions carry a proof.
    pub async fn resolve(
        &self,
        issue_number: u64,
        credential: &AdminCredential,
        ttl_secs: Option<u64>,
    ) -> AppResult<ProofLink> {
        self.auth.authenticate(credential).await?;

        let stored = self
            .proofs
            .proof_path(issue_number)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No proof attached to issue #{}", issue_number))
            })?;

        let path = normalize_object_path(&stored, self.storage.bucket()).ok_or_else(|| {
            warn!("Stored proof path for issue #{} is invalid", issue_number);
            AppError::Internal("stored proof path is invalid".to_string())
        })?;

        let ttl = clamp_signed_ttl(ttl_secs.unwrap_or(self.default_ttl_secs));
        let signed_url = self.storage.create_signed_download(&path, ttl).await?;

        info!("Proof link issued for issue #{} ({}s)", issue_number, ttl);
        Ok(ProofLink {
            url: signed_url.clone(),
            signed_url,
            expires_at: Utc::now().timestamp_millis() + (ttl as i64) * 1000,
            ttl,
        })
    }
}

/// Object path relative to `bucket`, or `None` if it is unusable.
///
/// Leading slashes and a duplicated `<bucket>/` prefix are stripped; any
/// `..` segment is refused.
pub fn normalize_object_path(raw: &str, bucket: &str) -> Option<String> {
    let mut path = raw.trim().trim_start_matches('/');
    let bucket_prefix = format!("{}/", bucket);
    if let Some(rest) = path.strip_prefix(&bucket_prefix) {
        path = rest.trim_start_matches('/');
    }

    if path.is_empty()
        || path.contains('\\')
        || path.split('/').any(|segment| segment == ".." || segment == ".")
    {
        return None;
    }
    Some(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_object_path() {
        assert_eq!(
            normalize_object_path("incoming/2024/03/07/1-a.pdf", "proofs").as_deref(),
            Some("incoming/2024/03/07/1-a.pdf")
        );
        assert_eq!(
            normalize_object_path("//proofs/incoming/a.pdf", "proofs").as_deref(),
            Some("incoming/a.pdf")
        );
        assert_eq!(
            normalize_object_path("other/incoming/a.pdf", "proofs").as_deref(),
            Some("other/incoming/a.pdf")
        );
    }

    #[test]
    fn test_normalize_rejects_traversal() {
        assert_eq!(normalize_object_path("incoming/../secrets.txt", "proofs"), None);
        assert_eq!(normalize_object_path("../proofs/a.pdf", "proofs"), None);
        assert_eq!(normalize_object_path("incoming\\..\\a.pdf", "proofs"), None);
        assert_eq!(normalize_object_path("/", "proofs"), None);
        assert_eq!(normalize_object_path("proofs/", "proofs"), None);
    }
}
