/// Request extractors shared by the handlers
use crate::error::AppError;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde_json::{Map, Value};

/// JSON object body; an empty body reads as `{}`
#[derive(Debug, Clone)]
pub struct JsonBody(pub Value);

impl JsonBody {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// CAPTCHA token under either accepted field name
    pub fn captcha_token(&self) -> Option<String> {
        ["captchaToken", "hcaptchaToken"]
            .iter()
            .filter_map(|name| self.0.get(*name).and_then(Value::as_str))
            .map(|token| token.trim().to_string())
            .find(|token| !token.is_empty())
    }
}

#[async_trait]
impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        parse_body(&bytes).map(JsonBody)
    }
}

fn parse_body(bytes: &[u8]) -> Result<Value, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    match serde_json::from_slice::<Value>(bytes) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(AppError::BadRequest("expected a JSON object".to_string())),
        Err(e) => Err(AppError::BadRequest(e.to_string())),
    }
}
