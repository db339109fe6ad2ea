/// Administrator authentication
///
/// Two credentials are accepted: a password checked against an Argon2 PHC
/// hash, and a static key sent in `X-Admin-Key` (or as an
/// `Authorization: Bearer` token). Either one is sufficient.
/// Submitted secrets are never logged.
use crate::{
    config::Secret,
    context::AppContext,
    error::{AppError, AppResult},
    metrics,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Header carrying the admin password
pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";
/// Header carrying the static admin key
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Credentials presented with a request
#[derive(Clone, Default)]
pub struct AdminCredential {
    pub password: Option<String>,
    pub key: Option<String>,
}

impl AdminCredential {
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            key: None,
        }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self {
            password: None,
            key: Some(key.into()),
        }
    }

    /// Fill in whatever `self` lacks from `other`
    pub fn or(self, other: AdminCredential) -> Self {
        Self {
            password: self.password.or(other.password),
            key: self.key.or(other.key),
        }
    }

    fn is_empty(&self) -> bool {
        self.password.is_none() && self.key.is_none()
    }
}

impl std::fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredential")
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key", &self.key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Extracts admin credentials from request headers
#[async_trait]
impl FromRequestParts<AppContext> for AdminCredential {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        Ok(AdminCredential::from_headers(&parts.headers))
    }
}

impl AdminCredential {
    /// Read credentials from request headers; `X-Admin-Key` wins over a bearer token
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let bearer = || {
            value(header::AUTHORIZATION.as_str()).and_then(|v| {
                v.strip_prefix("Bearer ")
                    .map(|token| token.trim().to_string())
                    .filter(|token| !token.is_empty())
            })
        };

        AdminCredential {
            password: value(ADMIN_PASSWORD_HEADER),
            key: value(ADMIN_KEY_HEADER).or_else(bearer),
        }
    }
}

/// Verifies admin credentials
#[derive(Clone)]
pub struct AdminAuthenticator {
    password_hash: Option<String>,
    key_digest: Option<[u8; 32]>,
}

impl AdminAuthenticator {
    /// Build from configured credentials; an unparseable hash is rejected
    pub fn new(password_hash: Option<&Secret>, static_key: Option<&Secret>) -> AppResult<Self> {
        if let Some(hash) = password_hash {
            PasswordHash::new(hash.expose()).map_err(|_| {
                AppError::Configuration("ADMIN_HASH is not a valid PHC string".to_string())
            })?;
        }

        Ok(Self {
            password_hash: password_hash.map(|h| h.expose().to_string()),
            key_digest: static_key.map(|k| digest(k.expose())),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.password_hash.is_some() || self.key_digest.is_some()
    }

    /// Authenticate a request.
    ///
    /// Fails with [`AppError::Configuration`] when no credential is
    /// configured at all, and with [`AppError::Authentication`] otherwise.
    /// The error never says whether the targeted entity exists.
    pub async fn authenticate(&self, credential: &AdminCredential) -> AppResult<()> {
        if !self.is_configured() {
            warn!("Admin authentication attempted but no admin credential is configured");
            return Err(AppError::Configuration(
                "no admin credential configured".to_string(),
            ));
        }

        if credential.is_empty() {
            metrics::record_gate_rejection("*", "admin");
            return Err(AppError::Authentication("Missing admin credential".to_string()));
        }

        if let (Some(expected), Some(key)) = (&self.key_digest, &credential.key) {
            if digest(key) == *expected {
                debug!("Admin authenticated by static key");
                return Ok(());
            }
        }

        if let (Some(hash), Some(password)) = (&self.password_hash, &credential.password) {
            let hash = hash.clone();
            let password = password.clone();
            let verified = tokio::task::spawn_blocking(move || verify_secret(&password, &hash))
                .await
                .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?;
            if verified {
                debug!("Admin authenticated by password");
                return Ok(());
            }
        }

        metrics::record_gate_rejection("*", "admin");
        Err(AppError::Authentication("Invalid admin credential".to_string()))
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// Check `submitted` against an Argon2 PHC string
pub fn verify_secret(submitted: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(submitted.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Produce an Argon2id PHC string for `secret` with a fresh salt
pub fn hash_secret(secret: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash secret: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_credential_headers() {
        let mut headers = HeaderMap::new();
        assert!(AdminCredential::from_headers(&headers).is_empty());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  k-1 "));
        let credential = AdminCredential::from_headers(&headers);
        assert_eq!(credential.key.as_deref(), Some("k-1"));
        assert_eq!(credential.password, None);

        headers.insert(ADMIN_KEY_HEADER, HeaderValue::from_static("k-2"));
        headers.insert(ADMIN_PASSWORD_HEADER, HeaderValue::from_static("pw"));
        let credential = AdminCredential::from_headers(&headers);
        assert_eq!(credential.key.as_deref(), Some("k-2"));
        assert_eq!(credential.password.as_deref(), Some("pw"));

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(AdminCredential::from_headers(&basic).is_empty());
    }

    #[test]
    fn test_verify_secret() {
        let hash = hash_secret("correct horse battery staple").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret("correct horse battery staple", &hash));
        assert!(!verify_secret("Correct horse battery staple", &hash));
        assert!(!verify_secret("", &hash));
        assert!(!verify_secret("anything", "not-a-hash"));
    }

    #[test]
    fn test_invalid_hash_is_a_configuration_error() {
        let result = AdminAuthenticator::new(Some(&Secret::new("plaintext")), None);
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_password_credential() {
        let hash = Secret::new(hash_secret("s3cret-admin").unwrap());
        let auth = AdminAuthenticator::new(Some(&hash), None).unwrap();

        assert!(auth
            .authenticate(&AdminCredential::password("s3cret-admin"))
            .await
            .is_ok());
        assert!(matches!(
            auth.authenticate(&AdminCredential::password("wrong")).await,
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            auth.authenticate(&AdminCredential::key("s3cret-admin")).await,
            Err(AppError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_either_credential_suffices() {
        let hash = Secret::new(hash_secret("pw-123456").unwrap());
        let key = Secret::new("static-key");
        let auth = AdminAuthenticator::new(Some(&hash), Some(&key)).unwrap();

        assert!(auth.authenticate(&AdminCredential::key("static-key")).await.is_ok());
        assert!(auth.authenticate(&AdminCredential::password("pw-123456")).await.is_ok());

        let wrong_key_right_password = AdminCredential {
            password: Some("pw-123456".to_string()),
            key: Some("nope".to_string()),
        };
        assert!(auth.authenticate(&wrong_key_right_password).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_configuration_is_distinct() {
        let auth = AdminAuthenticator::new(None, None).unwrap();
        for credential in [
            AdminCredential::default(),
            AdminCredential::password("x"),
            AdminCredential::key("y"),
        ] {
            assert!(matches!(
                auth.authenticate(&credential).await,
                Err(AppError::Configuration(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_empty_credential_is_unauthorized() {
        let auth = AdminAuthenticator::new(None, Some(&Secret::new("k"))).unwrap();
        assert!(matches!(
            auth.authenticate(&AdminCredential::default()).await,
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = AdminCredential {
            password: Some("hunter2".to_string()),
            key: None,
        };
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_credential_merge_prefers_self() {
        let merged = AdminCredential::password("body").or(AdminCredential {
            password: Some("header".to_string()),
            key: Some("k".to_string()),
        });
        assert_eq!(merged.password.as_deref(), Some("body"));
        assert_eq!(merged.key.as_deref(), Some("k"));
    }
}
