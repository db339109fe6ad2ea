/// CAPTCHA verification
use super::CaptchaPolicy;
use crate::{
    config::Secret,
    error::{AppError, AppResult, CaptchaDiagnostics},
    metrics,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of asking the verifier about a token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptchaOutcome {
    pub success: bool,
    pub diagnostics: CaptchaDiagnostics,
}

/// External CAPTCHA verification service
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Verify `token`. Network failure is an error; a verdict of "no" is
    /// an `Ok` outcome with `success == false`.
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> AppResult<CaptchaOutcome>;
}

/// hCaptcha siteverify client
pub struct HCaptchaVerifier {
    client: reqwest::Client,
    verify_url: String,
    secret: Secret,
}

#[derive(Deserialize)]
struct SiteVerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(flatten)]
    diagnostics: CaptchaDiagnostics,
}

impl HCaptchaVerifier {
    pub fn new(client: reqwest::Client, verify_url: impl Into<String>, secret: Secret) -> Self {
        Self {
            client,
            verify_url: verify_url.into(),
            secret,
        }
    }
}

#[async_trait]
impl CaptchaVerifier for HCaptchaVerifier {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> AppResult<CaptchaOutcome> {
        let mut form = vec![("secret", self.secret.expose()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::CaptchaUnavailable(e.to_string()))?;

        let status = response.status();
        let parsed = response.json::<SiteVerifyResponse>().await;

        if !status.is_success() {
            warn!("CAPTCHA verifier answered HTTP {}", status.as_u16());
            let diagnostics = parsed.map(|r| r.diagnostics).unwrap_or_else(|_| CaptchaDiagnostics {
                error_codes: vec![format!("http-{}", status.as_u16())],
                ..Default::default()
            });
            return Ok(CaptchaOutcome {
                success: false,
                diagnostics,
            });
        }

        Ok(match parsed {
            Ok(body) => CaptchaOutcome {
                success: body.success,
                diagnostics: body.diagnostics,
            },
            Err(e) => {
                warn!("CAPTCHA verifier returned an unreadable body: {}", e);
                CaptchaOutcome::default()
            }
        })
    }
}

/// Applies a route's [`CaptchaPolicy`] to a submitted token
#[derive(Clone)]
pub struct CaptchaGate {
    verifier: Option<Arc<dyn CaptchaVerifier>>,
    bypass: bool,
}

impl CaptchaGate {
    pub fn new(verifier: Option<Arc<dyn CaptchaVerifier>>) -> Self {
        Self {
            verifier,
            bypass: false,
        }
    }

    /// Gate that admits every token (development only)
    pub fn bypassed() -> Self {
        Self {
            verifier: None,
            bypass: true,
        }
    }

    /// Check `token` under `policy` for the named route
    pub async fn check(
        &self,
        route: &str,
        policy: CaptchaPolicy,
        token: Option<&str>,
        remote_ip: Option<&str>,
    ) -> AppResult<()> {
        if policy == CaptchaPolicy::Off {
            return Ok(());
        }
        if self.bypass {
            debug!("CAPTCHA bypassed for {}", route);
            return Ok(());
        }

        let verifier = match (&self.verifier, policy) {
            (Some(verifier), _) => verifier,
            (None, CaptchaPolicy::Optional) => return Ok(()),
            (None, _) => {
                return Err(AppError::Configuration(
                    "CAPTCHA verifier not configured".to_string(),
                ))
            }
        };

        let token = token.map(str::trim).filter(|t| !t.is_empty());
        let Some(token) = token else {
            metrics::record_gate_rejection(route, "captcha");
            return Err(AppError::CaptchaRejected(CaptchaDiagnostics {
                error_codes: vec!["missing-input-response".to_string()],
                ..Default::default()
            }));
        };

        let outcome = verifier.verify(token, remote_ip).await.map_err(|e| {
            metrics::record_upstream_failure("captcha");
            e
        })?;

        if outcome.success {
            Ok(())
        } else {
            metrics::record_gate_rejection(route, "captcha");
            Err(AppError::CaptchaRejected(outcome.diagnostics))
        }
    }
}
