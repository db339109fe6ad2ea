/// Application context and dependency injection
use crate::{
    auth::AdminAuthenticator,
    config::ServerConfig,
    error::{AppError, AppResult},
    gate::{CaptchaGate, CaptchaVerifier, GatePolicy, HCaptchaVerifier, OriginGuard, Route},
    listing::{ApprovedLister, StatusReader},
    moderation::{ModerationResolver, PendingCommentQueue, StatusUpdater},
    proofs::ProofLinkResolver,
    rate_limit::{
        GlobalThrottle, MemoryRateLimitStore, RateLimitStore, RateLimiter, RedisRateLimitStore,
    },
    storage::{ObjectStorage, SupabaseClient, SupabaseStorage},
    store::{PendingCommentStore, PostgrestStore, ProofStore},
    submissions::SubmissionService,
    tracker::{GitHubTracker, IssueTracker},
    uploads::UploadTicketIssuer,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const USER_AGENT: &str = concat!("civic-desk/", env!("CARGO_PKG_VERSION"));
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// External systems the service talks to
#[derive(Clone)]
pub struct Collaborators {
    pub tracker: Arc<dyn IssueTracker>,
    pub storage: Arc<dyn ObjectStorage>,
    pub pending_comments: Arc<dyn PendingCommentStore>,
    pub proofs: Arc<dyn ProofStore>,
    /// `None` when no CAPTCHA secret is configured
    pub captcha: Option<Arc<dyn CaptchaVerifier>>,
    pub rate_limit_store: Arc<dyn RateLimitStore>,
}

impl Collaborators {
    /// Production adapters built from configuration
    pub async fn from_config(config: &ServerConfig) -> AppResult<Self> {
        let client = http_client()?;

        let tracker = Arc::new(GitHubTracker::new(client.clone(), &config.tracker));
        let supabase = SupabaseClient::new(client.clone(), &config.supabase);
        let storage = Arc::new(SupabaseStorage::new(
            supabase.clone(),
            config.supabase.bucket.clone(),
        ));
        let store = Arc::new(PostgrestStore::new(
            supabase,
            config.supabase.pending_comments_table.clone(),
            config.supabase.proofs_table.clone(),
        ));

        let captcha = config.captcha.secret.as_ref().map(|secret| {
            Arc::new(HCaptchaVerifier::new(
                client.clone(),
                config.captcha.verify_url.clone(),
                secret.clone(),
            )) as Arc<dyn CaptchaVerifier>
        });

        let rate_limit_store: Arc<dyn RateLimitStore> = match &config.rate_limit.redis_url {
            Some(url) => Arc::new(RedisRateLimitStore::connect(url).await?),
            None => {
                info!("Rate limit counters are in-process; limits are per instance");
                Arc::new(MemoryRateLimitStore::new())
            }
        };

        Ok(Self {
            tracker,
            storage,
            pending_comments: store.clone(),
            proofs: store,
            captcha,
            rate_limit_store,
        })
    }
}

/// Shared HTTP client for every collaborator
pub fn http_client() -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(UPSTREAM_TIMEOUT)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    // Gates
    pub origin_guard: Arc<OriginGuard>,
    pub rate_limiter: RateLimiter,
    pub global_throttle: Option<GlobalThrottle>,
    pub captcha: CaptchaGate,
    pub admin: Arc<AdminAuthenticator>,
    // Collaborators
    pub tracker: Arc<dyn IssueTracker>,
    pub storage: Arc<dyn ObjectStorage>,
    // Services
    pub queue: PendingCommentQueue,
    pub moderation: ModerationResolver,
    pub status_updater: StatusUpdater,
    pub proof_links: ProofLinkResolver,
    pub uploads: UploadTicketIssuer,
    pub submissions: SubmissionService,
    pub status_reader: Arc<StatusReader>,
    pub approved: Arc<ApprovedLister>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        let collaborators = Collaborators::from_config(&config).await?;
        Self::with_collaborators(config, collaborators)
    }

    /// Wire services over the given collaborators
    pub fn with_collaborators(config: ServerConfig, c: Collaborators) -> AppResult<Self> {
        let admin = Arc::new(AdminAuthenticator::new(
            config.admin.password_hash.as_ref(),
            config.admin.static_key.as_ref(),
        )?);

        let captcha = if config.captcha.bypass {
            info!("CAPTCHA checks are bypassed");
            CaptchaGate::bypassed()
        } else {
            CaptchaGate::new(c.captcha.clone())
        };

        let global_throttle = config
            .rate_limit
            .enabled
            .then(|| GlobalThrottle::per_minute(config.rate_limit.global_requests_per_minute));

        let queue = PendingCommentQueue::new(c.pending_comments.clone());
        let moderation = ModerationResolver::new(admin.clone(), queue.clone(), c.tracker.clone());
        let status_updater = StatusUpdater::new(admin.clone(), c.tracker.clone());
        let proof_links = ProofLinkResolver::new(
            admin.clone(),
            c.proofs.clone(),
            c.storage.clone(),
            config.proofs.default_ttl_secs,
        );
        let uploads = UploadTicketIssuer::new(c.storage.clone(), config.uploads.clone());
        let submissions = SubmissionService::new(
            c.tracker.clone(),
            c.proofs.clone(),
            c.storage.clone(),
            config.uploads.prefix.clone(),
            config.submissions.embed_proof_preview,
        );
        let status_reader = Arc::new(StatusReader::new(
            c.tracker.clone(),
            config.status_cache.ttl,
        ));
        let approved = Arc::new(ApprovedLister::new(c.tracker.clone(), config.status_cache.ttl));

        Ok(Self {
            origin_guard: Arc::new(OriginGuard::new(&config.service.origin_allowlist)),
            rate_limiter: RateLimiter::new(c.rate_limit_store),
            global_throttle,
            captcha,
            admin,
            tracker: c.tracker,
            storage: c.storage,
            queue,
            moderation,
            status_updater,
            proof_links,
            uploads,
            submissions,
            status_reader,
            approved,
            config: Arc::new(config),
        })
    }

    /// Effective gate policy for a route
    pub fn policy(&self, route: Route) -> GatePolicy {
        self.config.policy_for(route)
    }
}
