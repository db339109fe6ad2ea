/// Supabase Storage implementation
use super::{encode_object_path, BucketInfo, ObjectStorage, SignedUpload};
use crate::{
    config::{Secret, SupabaseConfig},
    error::{AppError, AppResult, Collaborator},
    metrics,
};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

/// Authenticated HTTP access to a Supabase project
#[derive(Clone)]
pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    service_role_key: Secret,
}

impl SupabaseClient {
    pub fn new(client: reqwest::Client, config: &SupabaseConfig) -> Self {
        Self {
            client,
            base_url: config.url.clone(),
            service_role_key: config.service_role_key.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request against `<base_url><path>` carrying the service role key
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(self.service_role_key.expose())
            .header("apikey", self.service_role_key.expose())
    }

    pub async fn send(&self, service: Collaborator, request: RequestBuilder) -> AppResult<Response> {
        request.send().await.map_err(|e| {
            metrics::record_upstream_failure(service.as_str());
            AppError::upstream(service, None, e.to_string())
        })
    }

    /// Upstream error for a non-success response, carrying its body
    pub async fn failure(service: Collaborator, response: Response) -> AppError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        warn!("Supabase {} returned HTTP {}", service, status);
        metrics::record_upstream_failure(service.as_str());
        AppError::upstream(service, Some(status), text)
    }

    pub async fn parse<T: serde::de::DeserializeOwned>(
        service: Collaborator,
        response: Response,
    ) -> AppResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::upstream(service, None, format!("unreadable response: {}", e)))
    }
}

/// Private bucket in Supabase Storage
pub struct SupabaseStorage {
    client: SupabaseClient,
    bucket: String,
}

#[derive(Deserialize)]
struct UploadSigned {
    url: String,
}

#[derive(Deserialize)]
struct DownloadSigned {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

impl SupabaseStorage {
    pub fn new(client: SupabaseClient, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Absolute URL for a path returned relative to `/storage/v1`
    fn storage_url(&self, relative: &str) -> String {
        if relative.starts_with("http://") || relative.starts_with("https://") {
            relative.to_string()
        } else {
            format!(
                "{}/storage/v1/{}",
                self.client.base_url(),
                relative.trim_start_matches('/')
            )
        }
    }
}

/// `token` query parameter of a signed URL
fn token_from_url(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "token")
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|v| v.into_owned())
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_signed_upload(&self, path: &str) -> AppResult<SignedUpload> {
        let endpoint = format!(
            "/storage/v1/object/upload/sign/{}/{}",
            self.bucket,
            encode_object_path(path)
        );
        let response = self
            .client
            .send(
                Collaborator::Storage,
                self.client.request(Method::POST, &endpoint).json(&json!({})),
            )
            .await?;
        if !response.status().is_success() {
            return Err(SupabaseClient::failure(Collaborator::Storage, response).await);
        }

        let signed: UploadSigned = SupabaseClient::parse(Collaborator::Storage, response).await?;
        let token = token_from_url(&signed.url).ok_or_else(|| {
            AppError::upstream(Collaborator::Storage, None, "missing upload token")
        })?;

        Ok(SignedUpload {
            token,
            upload_url: self.storage_url(&signed.url),
        })
    }

    async fn create_signed_download(&self, path: &str, ttl_secs: u64) -> AppResult<String> {
        let endpoint = format!(
            "/storage/v1/object/sign/{}/{}",
            self.bucket,
            encode_object_path(path)
        );
        let response = self
            .client
            .send(
                Collaborator::Storage,
                self.client
                    .request(Method::POST, &endpoint)
                    .json(&json!({ "expiresIn": ttl_secs })),
            )
            .await?;
        if !response.status().is_success() {
            return Err(SupabaseClient::failure(Collaborator::Storage, response).await);
        }

        let signed: DownloadSigned = SupabaseClient::parse(Collaborator::Storage, response).await?;
        Ok(self.storage_url(&signed.signed_url))
    }

    async fn bucket_info(&self) -> AppResult<Option<BucketInfo>> {
        let endpoint = format!("/storage/v1/bucket/{}", urlencoding::encode(&self.bucket));
        let response = self
            .client
            .send(Collaborator::Storage, self.client.request(Method::GET, &endpoint))
            .await?;

        match response.status() {
            // Storage answers 400 for unknown buckets on some versions
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Ok(None),
            status if status.is_success() => {
                let info: BucketInfo = SupabaseClient::parse(Collaborator::Storage, response).await?;
                Ok(Some(info))
            }
            _ => Err(SupabaseClient::failure(Collaborator::Storage, response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> SupabaseStorage {
        let config = SupabaseConfig {
            url: "https://project.supabase.co".to_string(),
            service_role_key: Secret::new("key"),
            bucket: "proofs".to_string(),
            proofs_table: "complaint_proofs".to_string(),
            pending_comments_table: "pending_comments".to_string(),
        };
        SupabaseStorage::new(SupabaseClient::new(reqwest::Client::new(), &config), "proofs")
    }

    #[test]
    fn test_token_from_url() {
        assert_eq!(
            token_from_url("/object/upload/sign/proofs/a.pdf?token=abc%2Edef").as_deref(),
            Some("abc.def")
        );
        assert_eq!(token_from_url("/object/upload/sign/proofs/a.pdf"), None);
    }

    #[test]
    fn test_storage_url() {
        let storage = storage();
        assert_eq!(
            storage.storage_url("/object/sign/proofs/a.pdf?token=t"),
            "https://project.supabase.co/storage/v1/object/sign/proofs/a.pdf?token=t"
        );
        assert_eq!(
            storage.storage_url("https://cdn.example/a.pdf"),
            "https://cdn.example/a.pdf"
        );
    }
}
