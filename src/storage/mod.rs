/// Object storage collaborator
///
/// Proof files live in a private bucket. This service never handles file
/// bytes: it only asks the backend for short-lived signed URLs scoped to a
/// single object.
pub mod supabase;

pub use supabase::{SupabaseClient, SupabaseStorage};

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Credential for uploading exactly one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUpload {
    pub token: String,
    pub upload_url: String,
}

/// Bucket metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub public: bool,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Name of the bucket this storage writes to
    fn bucket(&self) -> &str;

    /// Signed upload URL for `path` inside the bucket
    async fn create_signed_upload(&self, path: &str) -> AppResult<SignedUpload>;

    /// Signed download URL for `path`, valid for `ttl_secs`
    async fn create_signed_download(&self, path: &str, ttl_secs: u64) -> AppResult<String>;

    /// Bucket metadata; `None` if the bucket does not exist
    async fn bucket_info(&self) -> AppResult<Option<BucketInfo>>;
}

/// Percent-encode each segment of an object path
pub fn encode_object_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Object path inside `bucket` referenced by a storage signed URL.
///
/// Accepts `.../object/sign/<bucket>/<path>?token=...`; any other shape, or a
/// URL pointing at a different bucket, yields `None`.
pub fn object_path_from_signed_url(signed_url: &str, bucket: &str) -> Option<String> {
    let url = url::Url::parse(signed_url).ok()?;
    let path = url.path();
    let (_, rest) = path.split_once("/object/sign/")?;
    let (url_bucket, object) = rest.split_once('/')?;
    if url_bucket != bucket || object.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(object).ok()?.into_owned();
    Some(decoded)
}
