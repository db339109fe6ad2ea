/// Public list of approved submissions
use crate::{
    cache::{CacheLookup, EtagCache},
    error::{AppError, AppResult},
    metrics,
    moderation::StateLabel,
    tracker::{Conditional, Issue, IssueLabel, IssueTracker},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Label filters; empty fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApprovedFilter {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub city: String,
}

impl ApprovedFilter {
    fn cache_key(&self) -> String {
        format!("{}\u{1f}{}\u{1f}{}", self.kind.trim(), self.topic.trim(), self.city.trim())
    }

    pub fn matches(&self, issue: &Issue) -> bool {
        let wanted = [
            ("type", self.kind.trim()),
            ("topic", self.topic.trim()),
            ("city", self.city.trim()),
        ];
        wanted
            .iter()
            .all(|(prefix, value)| value.is_empty() || issue.label_value(prefix) == *value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovedItem {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub created_at: String,
    pub labels: Vec<IssueLabel>,
    pub body: String,
    pub comments: u64,
    pub reactions: u64,
}

impl From<&Issue> for ApprovedItem {
    fn from(issue: &Issue) -> Self {
        Self {
            number: issue.number,
            title: issue.title.clone(),
            html_url: issue.html_url.clone(),
            created_at: issue.created_at.clone(),
            labels: issue.labels.clone(),
            body: issue.body.clone().unwrap_or_default(),
            comments: issue.comments,
            reactions: issue.upvotes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedList {
    pub ok: bool,
    pub count: usize,
    pub items: Vec<ApprovedItem>,
    /// Milliseconds since the epoch
    pub updated_at: i64,
}

/// Approved-list reads, cached per filter and revalidated by ETag
pub struct ApprovedLister {
    tracker: Arc<dyn IssueTracker>,
    cache: EtagCache<ApprovedList>,
}

impl ApprovedLister {
    pub fn new(tracker: Arc<dyn IssueTracker>, ttl: Duration) -> Self {
        Self {
            tracker,
            cache: EtagCache::new(ttl),
        }
    }

    pub async fn list(&self, filter: &ApprovedFilter) -> AppResult<ApprovedList> {
        let key = filter.cache_key();
        let etag = match self.cache.lookup(&key).await {
            CacheLookup::Fresh(list) => {
                metrics::record_status_cache("hit");
                return Ok(list);
            }
            CacheLookup::Stale { etag } => etag,
            CacheLookup::Miss => None,
        };

        match self
            .tracker
            .list_issues(StateLabel::Approved.as_str(), etag.as_deref())
            .await?
        {
            Conditional::NotModified => {
                metrics::record_status_cache("revalidated");
                self.cache.touch(&key).await.ok_or_else(|| {
                    AppError::Internal("approved list not modified but not cached".to_string())
                })
            }
            Conditional::Fresh { value, etag } => {
                metrics::record_status_cache("miss");
                let items: Vec<ApprovedItem> = value
                    .iter()
                    .filter(|issue| filter.matches(issue))
                    .map(ApprovedItem::from)
                    .collect();
                let list = ApprovedList {
                    ok: true,
                    count: items.len(),
                    items,
                    updated_at: Utc::now().timestamp_millis(),
                };
                self.cache.store(&key, list.clone(), etag).await;
                Ok(list)
            }
        }
    }
}
