/// Public status of a single submission
use crate::{
    cache::{CacheLookup, EtagCache},
    error::{AppError, AppResult},
    metrics,
    moderation::StateLabel,
    submissions::SUMMARY_PREFIX,
    tracker::{Conditional, Issue, IssueLabel, IssueTracker},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const EXCERPT_CHARS: usize = 240;

/// Public view of a submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub created_at: String,
    pub labels: Vec<IssueLabel>,
    #[serde(rename = "type")]
    pub kind: String,
    pub topic: String,
    pub city: String,
    pub state: Option<String>,
    pub display: String,
    pub comments: u64,
    pub reactions: u64,
}

impl StatusView {
    pub fn from_issue(issue: &Issue) -> Self {
        let kind = issue.label_value("type");
        let body = issue.body.as_deref().unwrap_or_default();
        let display = if kind == "complaint" {
            complaint_summary(body)
        } else {
            excerpt(body)
        };

        Self {
            number: issue.number,
            title: issue.title.clone(),
            html_url: issue.html_url.clone(),
            created_at: issue.created_at.clone(),
            labels: issue.labels.clone(),
            topic: issue.label_value("topic"),
            city: issue.label_value("city"),
            state: issue
                .labels
                .iter()
                .find(|l| StateLabel::is_state_label(&l.name))
                .map(|l| l.name.clone()),
            kind,
            display,
            comments: issue.comments,
            reactions: issue.upvotes(),
        }
    }
}

/// Summary line of a complaint body, or a dash when it has none
fn complaint_summary(body: &str) -> String {
    body.lines()
        .find_map(|line| line.strip_prefix(SUMMARY_PREFIX))
        .map(|summary| summary.trim().to_string())
        .filter(|summary| !summary.is_empty())
        .unwrap_or_else(|| "—".to_string())
}

/// First characters of the body on one line
fn excerpt(body: &str) -> String {
    let flat = body.replace("\r\n", " ").replace('\n', " ");
    if flat.chars().count() > EXCERPT_CHARS {
        let mut cut: String = flat.chars().take(EXCERPT_CHARS).collect();
        cut.push('…');
        cut
    } else {
        flat
    }
}

/// Status reads with a short-lived cache revalidated by ETag
pub struct StatusReader {
    tracker: Arc<dyn IssueTracker>,
    cache: EtagCache<StatusView>,
}

impl StatusReader {
    pub fn new(tracker: Arc<dyn IssueTracker>, ttl: Duration) -> Self {
        Self {
            tracker,
            cache: EtagCache::new(ttl),
        }
    }

    /// Status of `number`; `bypass_cache` forces an unconditional read
    pub async fn get(&self, number: u64, bypass_cache: bool) -> AppResult<StatusView> {
        let key = number.to_string();

        let etag = if bypass_cache {
            None
        } else {
            match self.cache.lookup(&key).await {
                CacheLookup::Fresh(view) => {
                    metrics::record_status_cache("hit");
                    return Ok(view);
                }
                CacheLookup::Stale { etag } => etag,
                CacheLookup::Miss => None,
            }
        };

        match self.tracker.get_issue(number, etag.as_deref()).await? {
            Conditional::NotModified => {
                metrics::record_status_cache("revalidated");
                self.cache.touch(&key).await.ok_or_else(|| {
                    AppError::Internal(format!("issue #{} not modified but not cached", number))
                })
            }
            Conditional::Fresh { value, etag } => {
                metrics::record_status_cache("miss");
                let view = StatusView::from_issue(&value);
                self.cache.store(&key, view.clone(), etag).await;
                Ok(view)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Reactions;

    fn issue(labels: &[&str], body: &str) -> Issue {
        Issue {
            number: 42,
            title: "Complaint: [roads] Name withheld — 2024-05-01".to_string(),
            html_url: "https://github.com/o/r/issues/42".to_string(),
            created_at: "2024-05-01T10:00:00Z".to_string(),
            body: Some(body.to_string()),
            labels: labels
                .iter()
                .map(|n| IssueLabel { name: n.to_string() })
                .collect(),
            comments: 3,
            reactions: Some(Reactions {
                plus_one: Some(5),
                total_count: Some(7),
            }),
            pull_request: None,
        }
    }

    #[test]
    fn test_complaint_displays_summary_line() {
        let view = StatusView::from_issue(&issue(
            &["approved", "type: complaint", "topic: roads", "city: Rabat"],
            "**Type:** Complaint\n**Summary**: Potholes on the main avenue\n\n> proof",
        ));
        assert_eq!(view.display, "Potholes on the main avenue");
        assert_eq!(view.kind, "complaint");
        assert_eq!(view.city, "Rabat");
        assert_eq!(view.state.as_deref(), Some("approved"));
        assert_eq!(view.reactions, 5);
        assert_eq!(view.comments, 3);
    }

    #[test]
    fn test_complaint_without_summary_shows_dash() {
        let view = StatusView::from_issue(&issue(&["type: complaint"], "no summary here"));
        assert_eq!(view.display, "—");
        assert_eq!(view.state, None);
    }

    #[test]
    fn test_report_displays_flattened_excerpt() {
        let body = format!("line one\nline two {}", "a".repeat(300));
        let view = StatusView::from_issue(&issue(&["type: report"], &body));
        assert!(view.display.starts_with("line one line two"));
        assert!(view.display.ends_with('…'));
        assert_eq!(view.display.chars().count(), EXCERPT_CHARS + 1);

        let short = StatusView::from_issue(&issue(&["type: report"], "short\nbody"));
        assert_eq!(short.display, "short body");
    }
}
