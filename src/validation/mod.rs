/// Input validation
///
/// Rules are checked in full and every violation is reported together, so a
/// caller fixing a form sees all problems at once.
use crate::error::{AppError, AppResult};
use serde_json::Value;

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

/// Accumulates rule violations for one request
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, path: &str, message: impl Into<String>) -> &mut Self {
        self.errors.push(ValidationError {
            path: path.to_string(),
            message: message.into(),
        });
        self
    }

    /// Value must be present and non-blank
    pub fn required(&mut self, path: &str, value: &str, message: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.error(path, message);
        }
        self
    }

    /// Character count (after trimming) must lie within `min..=max`
    pub fn length(
        &mut self,
        path: &str,
        value: &str,
        min: usize,
        max: usize,
        label: &str,
    ) -> &mut Self {
        let len = value.trim().chars().count();
        if len == 0 {
            self.error(path, format!("{} is required.", label));
        } else if len < min {
            self.error(path, format!("{} is too short (at least {} characters).", label, min));
        } else if len > max {
            self.error(path, format!("{} is too long (at most {} characters).", label, max));
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Convert collected violations into a single 422
    pub fn finish(self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(
                self.errors.into_iter().map(|e| e.message).collect(),
            ))
        }
    }
}

/// Accept a positive integer given as a JSON number or a numeric string
pub fn positive_number(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .filter(|n| *n > 0)
}

/// Trimmed string field, empty when absent or not a string
pub fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
