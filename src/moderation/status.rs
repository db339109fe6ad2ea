/// Submission state labels
use crate::{
    auth::{AdminAuthenticator, AdminCredential},
    error::{AppError, AppResult},
    tracker::{Conditional, IssueTracker},
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Mutually exclusive status tag on a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateLabel {
    Pending,
    Approved,
    Rejected,
    UnderReview,
    NeedsMoreInfo,
}

impl StateLabel {
    pub const ALL: [StateLabel; 5] = [
        StateLabel::Pending,
        StateLabel::Approved,
        StateLabel::Rejected,
        StateLabel::UnderReview,
        StateLabel::NeedsMoreInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateLabel::Pending => "pending",
            StateLabel::Approved => "approved",
            StateLabel::Rejected => "rejected",
            StateLabel::UnderReview => "under-review",
            StateLabel::NeedsMoreInfo => "needs-more-info",
        }
    }

    pub fn is_state_label(name: &str) -> bool {
        StateLabel::ALL.iter().any(|s| s.as_str() == name)
    }
}

impl FromStr for StateLabel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(StateLabel::Pending),
            "approved" => Ok(StateLabel::Approved),
            "rejected" => Ok(StateLabel::Rejected),
            "under-review" => Ok(StateLabel::UnderReview),
            "needs-more-info" => Ok(StateLabel::NeedsMoreInfo),
            _ => Err(AppError::validation(format!("Invalid state: {}", s))),
        }
    }
}

/// Replace every state label in `current` with `state`.
///
/// Non-state labels keep their order; duplicates are dropped.
pub fn relabel(current: &[String], state: StateLabel) -> Vec<String> {
    let mut labels: Vec<String> = Vec::with_capacity(current.len() + 1);
    for label in current {
        if !StateLabel::is_state_label(label) && !labels.contains(label) {
            labels.push(label.clone());
        }
    }
    labels.push(state.as_str().to_string());
    labels
}

/// Admin-gated state transitions on submissions
#[derive(Clone)]
pub struct StatusUpdater {
    auth: Arc<AdminAuthenticator>,
    tracker: Arc<dyn IssueTracker>,
}

impl StatusUpdater {
    pub fn new(auth: Arc<AdminAuthenticator>, tracker: Arc<dyn IssueTracker>) -> Self {
        Self { auth, tracker }
    }

    /// Move submission `number` to `state`, returning the new label set
    pub async fn set_state(
        &self,
        number: u64,
        state: StateLabel,
        credential: &AdminCredential,
    ) -> AppResult<Vec<String>> {
        self.auth.authenticate(credential).await?;

        let current = match self.tracker.get_issue(number, None).await {
            Ok(Conditional::Fresh { value, .. }) => value.label_names(),
            Ok(Conditional::NotModified) => {
                return Err(AppError::Internal(
                    "unconditional issue read answered not-modified".to_string(),
                ))
            }
            Err(e) => {
                return Err(AppError::NotFound(format!(
                    "Issue #{} could not be read: {}",
                    number, e
                )))
            }
        };

        let labels = relabel(&current, state);
        let applied = self.tracker.replace_labels(number, &labels).await?;

        info!("Issue #{} moved to {}", number, state.as_str());
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_state_label_parsing() {
        for state in StateLabel::ALL {
            assert_eq!(StateLabel::from_str(state.as_str()).unwrap(), state);
        }
        assert!(matches!(
            StateLabel::from_str("closed"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_relabel_keeps_exactly_one_state() {
        let current = strings(&["pending", "type: complaint", "under-review", "topic: roads"]);
        let labels = relabel(&current, StateLabel::Approved);

        assert_eq!(labels, strings(&["type: complaint", "topic: roads", "approved"]));
        let states = labels.iter().filter(|l| StateLabel::is_state_label(l)).count();
        assert_eq!(states, 1);
    }

    #[test]
    fn test_relabel_preserves_every_other_label() {
        let current = strings(&["city: Fes", "rejected", "type: report", "city: Fes"]);
        for state in StateLabel::ALL {
            let labels = relabel(&current, state);
            assert!(labels.contains(&"city: Fes".to_string()));
            assert!(labels.contains(&"type: report".to_string()));
            assert_eq!(labels.last().map(String::as_str), Some(state.as_str()));
            assert_eq!(labels.len(), 3);
        }
    }

    #[test]
    fn test_relabel_same_state_is_stable() {
        let current = strings(&["approved", "type: report"]);
        assert_eq!(
            relabel(&current, StateLabel::Approved),
            strings(&["type: report", "approved"])
        );
    }
}
