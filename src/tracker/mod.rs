/// Issue tracker collaborator
///
/// The tracker is the system of record for submissions: every complaint or
/// report is an issue, its state is a label, and approved comments are issue
/// comments.
pub mod github;

pub use github::GitHubTracker;

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Issue to create
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Identity of a created issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueLabel {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reactions {
    #[serde(rename = "+1", default)]
    pub plus_one: Option<u64>,
    #[serde(default)]
    pub total_count: Option<u64>,
}

/// Issue as read back from the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<IssueLabel>,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub reactions: Option<Reactions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }

    /// Value of the first `prefix: value` label, e.g. `label_value("type")`
    pub fn label_value(&self, prefix: &str) -> String {
        label_value(&self.labels, prefix)
    }

    /// `+1` reactions, falling back to the total reaction count
    pub fn upvotes(&self) -> u64 {
        self.reactions
            .as_ref()
            .and_then(|r| r.plus_one.or(r.total_count))
            .unwrap_or(0)
    }
}

/// Value of the first label named `<prefix>: <value>`
pub fn label_value(labels: &[IssueLabel], prefix: &str) -> String {
    let wanted = format!("{}:", prefix);
    labels
        .iter()
        .find(|l| l.name.starts_with(&wanted))
        .and_then(|l| l.name.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_default()
}

/// Result of a conditional read
#[derive(Debug, Clone, PartialEq)]
pub enum Conditional<T> {
    NotModified,
    Fresh { value: T, etag: Option<String> },
}

/// Result of adding a reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    Created,
    AlreadyPresent,
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(&self, issue: &NewIssue) -> AppResult<CreatedIssue>;

    /// Read an issue; with `etag`, an unchanged issue yields `NotModified`.
    /// An absent issue is [`crate::error::AppError::NotFound`].
    async fn get_issue(&self, number: u64, etag: Option<&str>) -> AppResult<Conditional<Issue>>;

    /// Replace the full label set, returning the labels now on the issue
    async fn replace_labels(&self, number: u64, labels: &[String]) -> AppResult<Vec<String>>;

    /// Comment on an issue, returning the comment id
    async fn create_comment(&self, number: u64, body: &str) -> AppResult<u64>;

    /// Add a reaction (`+1`, ...) to an issue
    async fn add_reaction(&self, number: u64, content: &str) -> AppResult<ReactionOutcome>;

    /// Open issues carrying `label`, excluding pull requests
    async fn list_issues(
        &self,
        label: &str,
        etag: Option<&str>,
    ) -> AppResult<Conditional<Vec<Issue>>>;
}
