/// Upload tickets for proof attachments
///
/// A ticket is a signed upload URL for one freshly generated object path
/// under the configured private prefix. Clients never choose the path. The
/// declared MIME type only selects the file extension; bytes are never
/// inspected here and the size limit is enforced by the storage backend.
use crate::{
    config::{clamp_signed_ttl, UploadConfig},
    error::{AppError, AppResult},
    storage::ObjectStorage,
};
use chrono::{DateTime, Datelike, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

const BASE_TYPES: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
];

const EXTENDED_TYPES: &[(&str, &str)] = &[
    ("image/webp", "webp"),
    ("image/heic", "heic"),
    ("image/heif", "heif"),
];

const SUFFIX_LEN: usize = 8;

/// Issued upload ticket
///
/// `expiresAt` and `expiresIn` are advisory: storage fixes the lifetime of a
/// signed upload URL itself and ignores the requested TTL. Clients should
/// upload promptly rather than rely on these values.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub path: String,
    pub token: String,
    pub upload_url: String,
    /// Milliseconds since the epoch
    pub expires_at: i64,
    pub expires_in: u64,
    pub max_bytes: u64,
}

#[derive(Clone)]
pub struct UploadTicketIssuer {
    storage: Arc<dyn ObjectStorage>,
    config: UploadConfig,
}

impl UploadTicketIssuer {
    pub fn new(storage: Arc<dyn ObjectStorage>, config: UploadConfig) -> Self {
        Self { storage, config }
    }

    /// MIME types accepted for upload
    pub fn allowed_types(&self) -> Vec<&'static str> {
        self.type_table().map(|(mime, _)| *mime).collect()
    }

    fn type_table(&self) -> impl Iterator<Item = &(&'static str, &'static str)> {
        let extended: &[(&str, &str)] = if self.config.extended_image_types {
            EXTENDED_TYPES
        } else {
            &[]
        };
        BASE_TYPES.iter().chain(extended.iter())
    }

    /// File extension for an accepted MIME type
    pub fn extension_for(&self, mime: &str) -> Option<&'static str> {
        let mime = mime.trim().to_ascii_lowercase();
        self.type_table()
            .find(|(candidate, _)| *candidate == mime)
            .map(|(_, ext)| *ext)
    }

    /// Reject an unsupported MIME type before anything else runs
    pub fn check_mime(&self, mime: &str) -> AppResult<&'static str> {
        self.extension_for(mime)
            .ok_or_else(|| AppError::UnsupportedMediaType {
                got: mime.trim().to_string(),
                allowed: self.allowed_types().into_iter().map(String::from).collect(),
            })
    }

    /// Issue a ticket for a file of type `mime`
    pub async fn issue(&self, mime: &str) -> AppResult<UploadTicket> {
        let ext = self.check_mime(mime)?;
        let now = Utc::now();
        let path = object_path(&self.config.prefix, now, &random_suffix(), ext);

        let signed = self.storage.create_signed_upload(&path).await?;
        let expires_in = clamp_signed_ttl(self.config.ticket_ttl_secs);

        info!("Upload ticket issued for {}", path);
        Ok(UploadTicket {
            path,
            token: signed.token,
            upload_url: signed.upload_url,
            expires_at: now.timestamp_millis() + (expires_in as i64) * 1000,
            expires_in,
            max_bytes: self.config.max_bytes,
        })
    }
}

/// `<prefix>/<yyyy>/<mm>/<dd>/<millis>-<suffix>.<ext>`
pub fn object_path(prefix: &str, at: DateTime<Utc>, suffix: &str, ext: &str) -> String {
    let prefix = prefix.trim_matches('/');
    format!(
        "{}/{:04}/{:02}/{:02}/{}-{}.{}",
        prefix,
        at.year(),
        at.month(),
        at.day(),
        at.timestamp_millis(),
        suffix,
        ext
    )
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(|b| (b as char).to_ascii_lowercase())
        .take(SUFFIX_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BucketInfo, SignedUpload};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStorage {
        uploads: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStorage for CountingStorage {
        fn bucket(&self) -> &str {
            "proofs"
        }

        async fn create_signed_upload(&self, path: &str) -> AppResult<SignedUpload> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(SignedUpload {
                token: "tok".to_string(),
                upload_url: format!("https://storage.test/upload/{}?token=tok", path),
            })
        }

        async fn create_signed_download(&self, path: &str, _ttl: u64) -> AppResult<String> {
            Ok(format!("https://storage.test/{}", path))
        }

        async fn bucket_info(&self) -> AppResult<Option<BucketInfo>> {
            Ok(None)
        }
    }

    fn issuer(storage: Arc<CountingStorage>, extended: bool) -> UploadTicketIssuer {
        UploadTicketIssuer::new(
            storage,
            UploadConfig {
                extended_image_types: extended,
                ..UploadConfig::default()
            },
        )
    }

    #[test]
    fn test_object_path_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(
            object_path("/incoming/", at, "ab12cd34", "pdf"),
            format!("incoming/2024/03/07/{}-ab12cd34.pdf", at.timestamp_millis())
        );
    }

    #[test]
    fn test_random_suffix_shape() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_extended_types_are_opt_in() {
        let storage = Arc::new(CountingStorage::default());
        assert_eq!(issuer(storage.clone(), false).extension_for("image/webp"), None);
        assert_eq!(issuer(storage.clone(), true).extension_for("image/webp"), Some("webp"));
        assert_eq!(issuer(storage, false).extension_for("IMAGE/JPEG"), Some("jpg"));
    }

    #[tokio::test]
    async fn test_unsupported_mime_makes_no_storage_call() {
        let storage = Arc::new(CountingStorage::default());
        let err = issuer(storage.clone(), false).issue("text/plain").await.unwrap_err();

        match err {
            AppError::UnsupportedMediaType { got, allowed } => {
                assert_eq!(got, "text/plain");
                assert_eq!(allowed, vec!["application/pdf", "image/png", "image/jpeg"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(storage.uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ticket_lives_under_prefix() {
        let storage = Arc::new(CountingStorage::default());
        let ticket = issuer(storage.clone(), false).issue("application/pdf").await.unwrap();

        assert!(ticket.path.starts_with("incoming/"));
        assert!(ticket.path.ends_with(".pdf"));
        assert!(!ticket.path.contains(".."));
        assert!(ticket.expires_in <= 1800);
        assert_eq!(ticket.max_bytes, 10 * 1024 * 1024);
        assert_eq!(storage.uploads.load(Ordering::SeqCst), 1);
    }
}
