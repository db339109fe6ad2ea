/// Configuration management for Civic Desk
///
/// All settings are read once at startup. Missing and invalid settings are
/// collected into a single [`ConfigError`] so an operator sees every problem
/// in one pass instead of discovering them request by request.
use crate::{
    gate::{CaptchaPolicy, GatePolicy, Route},
    rate_limit::RateLimitRule,
};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Lower bound for any issued signed URL lifetime
pub const MIN_SIGNED_TTL_SECS: u64 = 60;
/// Upper bound for any issued signed URL lifetime
pub const MAX_SIGNED_TTL_SECS: u64 = 1800;

/// Clamp a requested signed URL lifetime into the accepted range
pub fn clamp_signed_ttl(secs: u64) -> u64 {
    secs.clamp(MIN_SIGNED_TTL_SECS, MAX_SIGNED_TTL_SECS)
}

/// Secret value that never shows up in Debug output
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "local" => Ok(Environment::Development),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Main server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub tracker: TrackerConfig,
    pub supabase: SupabaseConfig,
    pub captcha: CaptchaConfig,
    pub admin: AdminConfig,
    pub uploads: UploadConfig,
    pub proofs: ProofLinkConfig,
    pub submissions: SubmissionConfig,
    pub rate_limit: RateLimitSettings,
    pub status_cache: StatusCacheConfig,
}

/// Service-level configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    /// Hosts allowed in the Origin header; empty disables the check
    pub origin_allowlist: Vec<String>,
    /// Key clients on proxy-supplied address headers instead of the socket peer
    pub trust_proxy_headers: bool,
}

/// Issue tracker (GitHub) configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub token: Secret,
}

/// Backing store (Supabase) configuration
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: Secret,
    pub bucket: String,
    pub proofs_table: String,
    pub pending_comments_table: String,
}

/// CAPTCHA configuration
#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    pub secret: Option<Secret>,
    pub verify_url: String,
    /// Skip every CAPTCHA check (development only)
    pub bypass: bool,
}

/// Admin credential configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Argon2 PHC string
    pub password_hash: Option<Secret>,
    pub static_key: Option<Secret>,
}

/// Upload ticket configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub prefix: String,
    pub ticket_ttl_secs: u64,
    pub max_bytes: u64,
    /// Also accept WEBP/HEIC/HEIF images
    pub extended_image_types: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            prefix: "incoming".to_string(),
            ticket_ttl_secs: 900,
            max_bytes: 10 * 1024 * 1024,
            extended_image_types: false,
        }
    }
}

/// Proof link configuration
#[derive(Debug, Clone)]
pub struct ProofLinkConfig {
    pub default_ttl_secs: u64,
}

impl Default for ProofLinkConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 600,
        }
    }
}

/// Submission configuration
#[derive(Debug, Clone, Default)]
pub struct SubmissionConfig {
    /// Embed a one-hour signed proof link in new complaint issues
    pub embed_proof_preview: bool,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub global_requests_per_minute: u32,
    /// Effective per-route rule after overrides; `None` means unlimited
    pub routes: HashMap<Route, Option<RateLimitRule>>,
    /// Shared counter store; in-process when absent
    pub redis_url: Option<String>,
}

/// Status read cache configuration
#[derive(Debug, Clone)]
pub struct StatusCacheConfig {
    pub ttl: Duration,
}

/// Every missing or invalid setting found while loading
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid configuration: missing [{}], invalid [{}]", .missing.join(", "), .invalid.join("; "))]
pub struct ConfigError {
    pub missing: Vec<&'static str>,
    pub invalid: Vec<String>,
}

/// Collects lookups so that every problem is reported at once
struct EnvReader<F> {
    lookup: F,
    missing: Vec<&'static str>,
    invalid: Vec<String>,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        Self {
            lookup,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&mut self, name: &'static str) -> String {
        match self.optional(name) {
            Some(value) => value,
            None => {
                self.missing.push(name);
                String::new()
            }
        }
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: FromStr>(&mut self, name: &str, default: T) -> T {
        match self.optional(name) {
            Some(raw) => match raw.parse() {
                Ok(value) => value,
                Err(_) => {
                    self.invalid.push(format!("{} has an invalid value", name));
                    default
                }
            },
            None => default,
        }
    }

    fn flag(&mut self, name: &str, default: bool) -> bool {
        match self.optional(name).map(|v| v.to_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
            Some(_) => {
                self.invalid.push(format!("{} must be a boolean", name));
                default
            }
            None => default,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary lookup function
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = EnvReader::new(lookup);

        let host = env.or("HOST", "0.0.0.0");
        let port = env.parse_or("PORT", 8888u16);
        let environment = env.parse_or("APP_ENV", Environment::Production);
        let origin_allowlist = env
            .optional("ORIGIN_WHITELIST")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();
        let trust_proxy_headers = env.flag("TRUST_PROXY_HEADERS", false);

        let tracker = TrackerConfig {
            api_url: env
                .or("GITHUB_API_URL", "https://api.github.com")
                .trim_end_matches('/')
                .to_string(),
            owner: env.required("REPO_OWNER"),
            repo: env.required("REPO_NAME"),
            token: Secret::new(env.required("GITHUB_TOKEN")),
        };

        let supabase_url = env.required("SUPABASE_URL");
        if !supabase_url.is_empty() {
            match url::Url::parse(&supabase_url) {
                Ok(parsed) if parsed.scheme() == "https" => {}
                Ok(_) => env.invalid.push("SUPABASE_URL must use https".to_string()),
                Err(_) => env.invalid.push("SUPABASE_URL is not a valid URL".to_string()),
            }
        }
        let supabase = SupabaseConfig {
            url: supabase_url.trim_end_matches('/').to_string(),
            service_role_key: Secret::new(env.required("SUPABASE_SERVICE_ROLE")),
            bucket: env.required("SUPABASE_BUCKET"),
            proofs_table: env.or("SUPABASE_PROOFS_TABLE", "complaint_proofs"),
            pending_comments_table: env.or("SUPABASE_PENDING_COMMENTS_TABLE", "pending_comments"),
        };

        let captcha = CaptchaConfig {
            secret: env.optional("HCAPTCHA_SECRET").map(Secret::new),
            verify_url: env.or("HCAPTCHA_VERIFY_URL", "https://hcaptcha.com/siteverify"),
            bypass: env.flag("CAPTCHA_BYPASS", false),
        };

        let admin = AdminConfig {
            password_hash: env.optional("ADMIN_HASH").map(Secret::new),
            static_key: env.optional("ADMIN_KEY").map(Secret::new),
        };

        let upload_defaults = UploadConfig::default();
        let uploads = UploadConfig {
            prefix: env
                .or("UPLOAD_PREFIX", &upload_defaults.prefix)
                .trim_matches('/')
                .to_string(),
            ticket_ttl_secs: clamp_signed_ttl(
                env.parse_or("UPLOAD_TICKET_TTL_SECS", upload_defaults.ticket_ttl_secs),
            ),
            max_bytes: env.parse_or("UPLOAD_MAX_BYTES", upload_defaults.max_bytes),
            extended_image_types: env.flag("UPLOAD_EXTENDED_IMAGE_TYPES", false),
        };

        let proofs = ProofLinkConfig {
            default_ttl_secs: clamp_signed_ttl(
                env.parse_or("PROOF_LINK_TTL_SECS", ProofLinkConfig::default().default_ttl_secs),
            ),
        };

        let submissions = SubmissionConfig {
            embed_proof_preview: env.flag("EMBED_PROOF_PREVIEW", false),
        };

        let rate_limits_enabled = env.flag("RATE_LIMITS_ENABLED", true);
        let mut routes: HashMap<Route, Option<RateLimitRule>> = Route::ALL
            .iter()
            .map(|route| (*route, route.default_policy().rate_limit))
            .collect();
        if let Some(raw) = env.optional("RATE_LIMITS") {
            for entry in split_list(&raw) {
                match parse_route_override(&entry) {
                    Ok((route, rule)) => {
                        routes.insert(route, rule);
                    }
                    Err(message) => env.invalid.push(format!("RATE_LIMITS: {}", message)),
                }
            }
        }
        let rate_limit = RateLimitSettings {
            enabled: rate_limits_enabled,
            global_requests_per_minute: env.parse_or("RATE_LIMIT_GLOBAL_PER_MINUTE", 3000u32),
            routes,
            redis_url: env.optional("REDIS_URL"),
        };

        let status_cache = StatusCacheConfig {
            ttl: Duration::from_secs(env.parse_or("STATUS_CACHE_TTL_SECS", 120u64)),
        };

        let config = ServerConfig {
            service: ServiceConfig {
                host,
                port,
                environment,
                origin_allowlist,
                trust_proxy_headers,
            },
            tracker,
            supabase,
            captcha,
            admin,
            uploads,
            proofs,
            submissions,
            rate_limit,
            status_cache,
        };

        config.validate(&mut env.missing, &mut env.invalid);

        if env.missing.is_empty() && env.invalid.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError {
                missing: env.missing,
                invalid: env.invalid,
            })
        }
    }

    /// Cross-setting checks that a single lookup cannot express
    fn validate(&self, missing: &mut Vec<&'static str>, invalid: &mut Vec<String>) {
        if self.admin.password_hash.is_none() && self.admin.static_key.is_none() {
            missing.push("ADMIN_HASH or ADMIN_KEY");
        }

        if let Some(hash) = &self.admin.password_hash {
            if argon2::PasswordHash::new(hash.expose()).is_err() {
                invalid.push("ADMIN_HASH is not a valid Argon2 PHC string".to_string());
            }
        }

        if self.captcha.bypass && self.service.environment == Environment::Production {
            invalid.push("CAPTCHA_BYPASS is not allowed in production".to_string());
        }

        let captcha_required = Route::ALL
            .iter()
            .any(|route| route.default_policy().captcha == CaptchaPolicy::Required);
        if captcha_required && self.captcha.secret.is_none() && !self.captcha.bypass {
            missing.push("HCAPTCHA_SECRET");
        }

        if self.rate_limit.enabled && self.rate_limit.global_requests_per_minute == 0 {
            invalid.push("RATE_LIMIT_GLOBAL_PER_MINUTE must be positive".to_string());
        }
    }

    /// Effective gate policy for a route
    pub fn policy_for(&self, route: Route) -> GatePolicy {
        let mut policy = route.default_policy();
        policy.rate_limit = if self.rate_limit.enabled {
            self.rate_limit.routes.get(&route).copied().flatten()
        } else {
            None
        };
        policy
    }

    /// Socket address to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.host, self.service.port)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `route=limit/window_secs` or `route=off`
fn parse_route_override(entry: &str) -> Result<(Route, Option<RateLimitRule>), String> {
    let (name, spec) = entry
        .split_once('=')
        .ok_or_else(|| format!("'{}' is not of the form route=limit/secs", entry))?;
    let route = Route::from_str(name.trim())?;
    let spec = spec.trim();
    if spec.eq_ignore_ascii_case("off") {
        return Ok((route, None));
    }
    let rule = RateLimitRule::parse(spec).ok_or_else(|| format!("'{}' is not a valid rule", spec))?;
    Ok((route, Some(rule)))
}
