/// GitHub REST implementation of the issue tracker
use super::{Conditional, CreatedIssue, Issue, IssueTracker, NewIssue, ReactionOutcome};
use crate::{
    config::{Secret, TrackerConfig},
    error::{AppError, AppResult, Collaborator},
    metrics,
};
use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const ACCEPT: &str = "application/vnd.github+json, application/vnd.github.squirrel-girl-preview+json";
const PAGE_SIZE: usize = 100;
/// Upper bound on pages fetched for one listing
const MAX_PAGES: u32 = 20;

pub struct GitHubTracker {
    client: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    token: Secret,
}

#[derive(Deserialize)]
struct CommentCreated {
    id: u64,
}

impl GitHubTracker {
    pub fn new(client: reqwest::Client, config: &TrackerConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token: config.token.clone(),
        }
    }

    fn issues_url(&self) -> String {
        format!("{}/repos/{}/{}/issues", self.api_url, self.owner, self.repo)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(self.token.expose())
            .header(header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, request: RequestBuilder) -> AppResult<Response> {
        request.send().await.map_err(|e| {
            metrics::record_upstream_failure(Collaborator::Tracker.as_str());
            AppError::upstream(Collaborator::Tracker, None, e.to_string())
        })
    }

    /// Turn a non-success response into an upstream error carrying its body
    async fn failure(response: Response) -> AppError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        warn!("GitHub returned HTTP {}", status);
        metrics::record_upstream_failure(Collaborator::Tracker.as_str());
        AppError::upstream(Collaborator::Tracker, Some(status), text)
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> AppResult<T> {
        response.json::<T>().await.map_err(|e| {
            AppError::upstream(
                Collaborator::Tracker,
                None,
                format!("unreadable response: {}", e),
            )
        })
    }
}

fn etag_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl IssueTracker for GitHubTracker {
    async fn create_issue(&self, issue: &NewIssue) -> AppResult<CreatedIssue> {
        let response = self
            .send(self.request(Method::POST, &self.issues_url()).json(issue))
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        let created: CreatedIssue = Self::parse(response).await?;
        debug!("Created issue #{}", created.number);
        Ok(created)
    }

    async fn get_issue(&self, number: u64, etag: Option<&str>) -> AppResult<Conditional<Issue>> {
        let url = format!("{}/{}", self.issues_url(), number);
        let mut request = self.request(Method::GET, &url);
        if let Some(etag) = etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }

        let response = self.send(request).await?;
        match response.status() {
            StatusCode::NOT_MODIFIED => Ok(Conditional::NotModified),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(AppError::NotFound(format!("Issue #{} not found", number)))
            }
            status if status.is_success() => {
                let etag = etag_of(&response);
                let value = Self::parse(response).await?;
                Ok(Conditional::Fresh { value, etag })
            }
            _ => Err(Self::failure(response).await),
        }
    }

    async fn replace_labels(&self, number: u64, labels: &[String]) -> AppResult<Vec<String>> {
        let url = format!("{}/{}", self.issues_url(), number);
        let response = self
            .send(self.request(Method::PATCH, &url).json(&json!({ "labels": labels })))
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        let issue: Issue = Self::parse(response).await?;
        Ok(issue.label_names())
    }

    async fn create_comment(&self, number: u64, body: &str) -> AppResult<u64> {
        let url = format!("{}/{}/comments", self.issues_url(), number);
        let response = self
            .send(self.request(Method::POST, &url).json(&json!({ "body": body })))
            .await?;
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        let comment: CommentCreated = Self::parse(response).await?;
        Ok(comment.id)
    }

    async fn add_reaction(&self, number: u64, content: &str) -> AppResult<ReactionOutcome> {
        let url = format!("{}/{}/reactions", self.issues_url(), number);
        let response = self
            .send(self.request(Method::POST, &url).json(&json!({ "content": content })))
            .await?;
        match response.status() {
            StatusCode::CREATED => Ok(ReactionOutcome::Created),
            StatusCode::OK | StatusCode::CONFLICT => Ok(ReactionOutcome::AlreadyPresent),
            StatusCode::NOT_FOUND => Err(AppError::NotFound(format!("Issue #{} not found", number))),
            _ => Err(Self::failure(response).await),
        }
    }

    async fn list_issues(
        &self,
        label: &str,
        etag: Option<&str>,
    ) -> AppResult<Conditional<Vec<Issue>>> {
        let mut items = Vec::new();
        let mut first_etag = None;
        let mut pages_read = 0;

        for page in 1..=MAX_PAGES {
            let per_page = PAGE_SIZE.to_string();
            let page_number = page.to_string();
            let mut request = self.request(Method::GET, &self.issues_url()).query(&[
                ("state", "open"),
                ("labels", label),
                ("per_page", per_page.as_str()),
                ("page", page_number.as_str()),
            ]);
            if page == 1 {
                if let Some(etag) = etag {
                    request = request.header(header::IF_NONE_MATCH, etag);
                }
            }

            let response = self.send(request).await?;
            if page == 1 && response.status() == StatusCode::NOT_MODIFIED {
                return Ok(Conditional::NotModified);
            }
            if !response.status().is_success() {
                return Err(Self::failure(response).await);
            }
            if page == 1 {
                first_etag = etag_of(&response);
            }

            let batch: Vec<Issue> = Self::parse(response).await?;
            pages_read += 1;
            let full_page = batch.len() == PAGE_SIZE;
            items.extend(batch.into_iter().filter(|i| i.pull_request.is_none()));
            if !full_page {
                break;
            }
        }

        // The page-1 ETag says nothing about later pages
        Ok(Conditional::Fresh {
            value: items,
            etag: if pages_read == 1 { first_etag } else { None },
        })
    }
}
