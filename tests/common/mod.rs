//! In-memory stand-ins for every external collaborator
#![allow(dead_code)]

use async_trait::async_trait;
use civic_desk::{
    config::ServerConfig,
    error::{AppError, AppResult, CaptchaDiagnostics, Collaborator},
    gate::{CaptchaOutcome, CaptchaVerifier},
    rate_limit::MemoryRateLimitStore,
    storage::{BucketInfo, ObjectStorage, SignedUpload},
    store::{NewPendingComment, PendingComment, PendingCommentStore, ProofRecord, ProofStore},
    tracker::{
        Conditional, CreatedIssue, Issue, IssueLabel, IssueTracker, NewIssue, ReactionOutcome,
    },
    AppContext, Collaborators,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ADMIN_KEY: &str = "static-admin-key-for-tests";
pub const CAPTCHA_PASS: &str = "10000000-aaaa-bbbb-cccc-000000000001";
pub const BUCKET: &str = "proofs";

// ========== Tracker ==========

#[derive(Default)]
struct TrackerState {
    issues: BTreeMap<u64, (Issue, u64)>,
    comments: Vec<(u64, String)>,
    reactions: HashSet<u64>,
    next_comment_id: u64,
    list_version: u64,
}

#[derive(Default)]
pub struct FakeTracker {
    state: Mutex<TrackerState>,
    pub fail_comments: AtomicBool,
    pub fail_labels: AtomicBool,
    pub issue_reads: AtomicUsize,
}

impl FakeTracker {
    pub fn with_issue(self, number: u64, labels: &[&str], body: &str) -> Self {
        self.insert_issue(number, labels, body);
        self
    }

    pub fn insert_issue(&self, number: u64, labels: &[&str], body: &str) {
        let issue = Issue {
            number,
            title: format!("Issue {}", number),
            html_url: format!("https://github.com/o/r/issues/{}", number),
            created_at: "2024-05-01T10:00:00Z".to_string(),
            body: Some(body.to_string()),
            labels: labels
                .iter()
                .map(|n| IssueLabel { name: n.to_string() })
                .collect(),
            comments: 0,
            reactions: None,
            pull_request: None,
        };
        let mut state = self.state.lock().unwrap();
        state.issues.insert(number, (issue, 1));
        state.list_version += 1;
    }

    pub fn comments_on(&self, number: u64) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .comments
            .iter()
            .filter(|(n, _)| *n == number)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn comment_count(&self) -> usize {
        self.state.lock().unwrap().comments.len()
    }

    pub fn labels_of(&self, number: u64) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .issues
            .get(&number)
            .map(|(issue, _)| issue.label_names())
            .unwrap_or_default()
    }

    pub fn issue(&self, number: u64) -> Option<Issue> {
        self.state
            .lock()
            .unwrap()
            .issues
            .get(&number)
            .map(|(issue, _)| issue.clone())
    }

    fn etag(number: u64, version: u64) -> String {
        format!("\"{}-{}\"", number, version)
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn create_issue(&self, new: &NewIssue) -> AppResult<CreatedIssue> {
        let number = {
            let state = self.state.lock().unwrap();
            state.issues.keys().next_back().copied().unwrap_or(0) + 1
        };
        let labels: Vec<&str> = new.labels.iter().map(String::as_str).collect();
        self.insert_issue(number, &labels, &new.body);
        let mut state = self.state.lock().unwrap();
        if let Some((issue, _)) = state.issues.get_mut(&number) {
            issue.title = new.title.clone();
        }
        Ok(CreatedIssue {
            number,
            html_url: format!("https://github.com/o/r/issues/{}", number),
        })
    }

    async fn get_issue(&self, number: u64, etag: Option<&str>) -> AppResult<Conditional<Issue>> {
        self.issue_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        let (issue, version) = state
            .issues
            .get(&number)
            .ok_or_else(|| AppError::NotFound(format!("issue #{}", number)))?;
        let current = Self::etag(number, *version);
        if etag == Some(current.as_str()) {
            return Ok(Conditional::NotModified);
        }
        Ok(Conditional::Fresh {
            value: issue.clone(),
            etag: Some(current),
        })
    }

    async fn replace_labels(&self, number: u64, labels: &[String]) -> AppResult<Vec<String>> {
        if self.fail_labels.load(Ordering::SeqCst) {
            return Err(AppError::upstream(Collaborator::Tracker, Some(502), "bad gateway"));
        }
        let mut state = self.state.lock().unwrap();
        let (issue, version) = state
            .issues
            .get_mut(&number)
            .ok_or_else(|| AppError::NotFound(format!("issue #{}", number)))?;
        issue.labels = labels
            .iter()
            .map(|name| IssueLabel { name: name.clone() })
            .collect();
        *version += 1;
        let names = issue.label_names();
        state.list_version += 1;
        Ok(names)
    }

    async fn create_comment(&self, number: u64, body: &str) -> AppResult<u64> {
        if self.fail_comments.load(Ordering::SeqCst) {
            return Err(AppError::upstream(
                Collaborator::Tracker,
                Some(500),
                "Server Error",
            ));
        }
        let mut state = self.state.lock().unwrap();
        if !state.issues.contains_key(&number) {
            return Err(AppError::upstream(Collaborator::Tracker, Some(404), "Not Found"));
        }
        state.next_comment_id += 1;
        let id = 9000 + state.next_comment_id;
        state.comments.push((number, body.to_string()));
        if let Some((issue, version)) = state.issues.get_mut(&number) {
            issue.comments += 1;
            *version += 1;
        }
        Ok(id)
    }

    async fn add_reaction(&self, number: u64, _content: &str) -> AppResult<ReactionOutcome> {
        let mut state = self.state.lock().unwrap();
        if !state.issues.contains_key(&number) {
            return Err(AppError::NotFound(format!("issue #{}", number)));
        }
        Ok(if state.reactions.insert(number) {
            ReactionOutcome::Created
        } else {
            ReactionOutcome::AlreadyPresent
        })
    }

    async fn list_issues(
        &self,
        label: &str,
        etag: Option<&str>,
    ) -> AppResult<Conditional<Vec<Issue>>> {
        let state = self.state.lock().unwrap();
        let current = format!("\"list-{}\"", state.list_version);
        if etag == Some(current.as_str()) {
            return Ok(Conditional::NotModified);
        }
        let issues = state
            .issues
            .values()
            .map(|(issue, _)| issue)
            .filter(|issue| issue.labels.iter().any(|l| l.name == label))
            .cloned()
            .collect();
        Ok(Conditional::Fresh {
            value: issues,
            etag: Some(current),
        })
    }
}

// ========== Storage ==========

pub struct FakeStorage {
    pub uploads: Mutex<Vec<String>>,
    pub downloads: Mutex<Vec<(String, u64)>>,
    pub public_bucket: AtomicBool,
    pub fail: AtomicBool,
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            downloads: Mutex::new(Vec::new()),
            public_bucket: AtomicBool::new(false),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    fn bucket(&self) -> &str {
        BUCKET
    }

    async fn create_signed_upload(&self, path: &str) -> AppResult<SignedUpload> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::upstream(Collaborator::Storage, Some(500), "storage down"));
        }
        self.uploads.lock().unwrap().push(path.to_string());
        Ok(SignedUpload {
            token: "upload-token".to_string(),
            upload_url: format!(
                "https://project.supabase.co/storage/v1/object/upload/sign/{}/{}?token=upload-token",
                BUCKET, path
            ),
        })
    }

    async fn create_signed_download(&self, path: &str, ttl_secs: u64) -> AppResult<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::upstream(Collaborator::Storage, Some(500), "storage down"));
        }
        self.downloads.lock().unwrap().push((path.to_string(), ttl_secs));
        Ok(format!(
            "https://project.supabase.co/storage/v1/object/sign/{}/{}?token=download-token",
            BUCKET, path
        ))
    }

    async fn bucket_info(&self) -> AppResult<Option<BucketInfo>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::upstream(Collaborator::Storage, None, "connection refused"));
        }
        Ok(Some(BucketInfo {
            name: BUCKET.to_string(),
            public: self.public_bucket.load(Ordering::SeqCst),
        }))
    }
}

// ========== Queue store ==========

#[derive(Default)]
pub struct FakeQueue {
    rows: Mutex<Vec<PendingComment>>,
    proofs: Mutex<HashMap<u64, ProofRecord>>,
    next_id: AtomicUsize,
    pub fail_delete: AtomicBool,
    pub fail_proof_insert: AtomicBool,
}

impl FakeQueue {
    pub fn with_row(self, id: &str, issue_number: u64, full_name: &str, comment: &str) -> Self {
        self.rows.lock().unwrap().push(PendingComment {
            id: id.to_string(),
            issue_number,
            full_name: full_name.to_string(),
            comment: comment.to_string(),
            created_at: Some("2024-05-01T10:00:00Z".to_string()),
        });
        self
    }

    pub fn with_proof(self, issue_number: u64, proof_path: &str) -> Self {
        self.proofs.lock().unwrap().insert(
            issue_number,
            ProofRecord {
                issue_number,
                proof_path: proof_path.to_string(),
                client_ip: None,
            },
        );
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.lock().unwrap().iter().any(|row| row.id == id)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn proof(&self, issue_number: u64) -> Option<ProofRecord> {
        self.proofs.lock().unwrap().get(&issue_number).cloned()
    }
}

#[async_trait]
impl PendingCommentStore for FakeQueue {
    async fn insert(&self, row: &NewPendingComment) -> AppResult<PendingComment> {
        let id = 100 + self.next_id.fetch_add(1, Ordering::SeqCst);
        let inserted = PendingComment {
            id: id.to_string(),
            issue_number: row.issue_number,
            full_name: row.full_name.clone(),
            comment: row.comment.clone(),
            created_at: Some(format!("2024-05-02T10:00:{:02}Z", id % 60)),
        };
        self.rows.lock().unwrap().push(inserted.clone());
        Ok(inserted)
    }

    async fn get(&self, id: &str) -> AppResult<Option<PendingComment>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.id == id)
            .cloned())
    }

    async fn list(&self, limit: usize) -> AppResult<Vec<PendingComment>> {
        let mut rows = self.rows.lock().unwrap().clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AppError::upstream(Collaborator::Queue, Some(503), "unavailable"));
        }
        self.rows.lock().unwrap().retain(|row| row.id != id);
        Ok(())
    }
}

#[async_trait]
impl ProofStore for FakeQueue {
    async fn insert_proof(&self, record: &ProofRecord) -> AppResult<()> {
        if self.fail_proof_insert.load(Ordering::SeqCst) {
            return Err(AppError::upstream(Collaborator::Queue, Some(500), "insert failed"));
        }
        self.proofs
            .lock()
            .unwrap()
            .insert(record.issue_number, record.clone());
        Ok(())
    }

    async fn proof_path(&self, issue_number: u64) -> AppResult<Option<String>> {
        Ok(self
            .proofs
            .lock()
            .unwrap()
            .get(&issue_number)
            .map(|record| record.proof_path.clone()))
    }
}

// ========== CAPTCHA ==========

/// Accepts exactly [`CAPTCHA_PASS`]
#[derive(Default)]
pub struct FakeCaptcha {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CaptchaVerifier for FakeCaptcha {
    async fn verify(&self, token: &str, _remote_ip: Option<&str>) -> AppResult<CaptchaOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if token == CAPTCHA_PASS {
            Ok(CaptchaOutcome {
                success: true,
                diagnostics: CaptchaDiagnostics::default(),
            })
        } else {
            Ok(CaptchaOutcome {
                success: false,
                diagnostics: CaptchaDiagnostics {
                    error_codes: vec!["invalid-input-response".to_string()],
                    ..Default::default()
                },
            })
        }
    }
}

// ========== Wiring ==========

/// Minimal valid environment; `overrides` replace or add settings
pub fn config(overrides: &[(&str, &str)]) -> ServerConfig {
    let mut env: HashMap<String, String> = [
        ("REPO_OWNER", "civic"),
        ("REPO_NAME", "desk"),
        ("GITHUB_TOKEN", "ghp_test"),
        ("SUPABASE_URL", "https://project.supabase.co"),
        ("SUPABASE_SERVICE_ROLE", "service-role"),
        ("SUPABASE_BUCKET", BUCKET),
        ("HCAPTCHA_SECRET", "0x0000000000000000000000000000000000000000"),
        ("ADMIN_KEY", ADMIN_KEY),
        ("ORIGIN_WHITELIST", "portal.example"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        env.insert(k.to_string(), v.to_string());
    }
    ServerConfig::from_lookup(|name| env.get(name).cloned()).expect("test configuration")
}

pub struct Harness {
    pub ctx: AppContext,
    pub tracker: Arc<FakeTracker>,
    pub storage: Arc<FakeStorage>,
    pub queue: Arc<FakeQueue>,
    pub captcha: Arc<FakeCaptcha>,
}

impl Harness {
    pub fn new(config: ServerConfig, tracker: FakeTracker, queue: FakeQueue) -> Self {
        let tracker = Arc::new(tracker);
        let storage = Arc::new(FakeStorage::default());
        let queue = Arc::new(queue);
        let captcha = Arc::new(FakeCaptcha::default());

        let collaborators = Collaborators {
            tracker: tracker.clone(),
            storage: storage.clone(),
            pending_comments: queue.clone(),
            proofs: queue.clone(),
            captcha: Some(captcha.clone() as Arc<dyn CaptchaVerifier>),
            rate_limit_store: Arc::new(MemoryRateLimitStore::new()),
        };
        let ctx = AppContext::with_collaborators(config, collaborators).expect("context");

        Self {
            ctx,
            tracker,
            storage,
            queue,
            captcha,
        }
    }

    pub fn default_with(tracker: FakeTracker, queue: FakeQueue) -> Self {
        Self::new(config(&[]), tracker, queue)
    }
}
