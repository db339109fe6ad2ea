/// Civic Desk - moderation and trust-gating backend for a civic complaints portal
///
/// Submissions live in an issue tracker, proof files and the pending-comment
/// queue live in a backing store. This crate gates every request (origin,
/// rate limit, CAPTCHA, admin credential) and coordinates the two systems.
pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod listing;
pub mod metrics;
pub mod moderation;
pub mod proofs;
pub mod rate_limit;
pub mod server;
pub mod storage;
pub mod store;
pub mod submissions;
pub mod tracker;
pub mod uploads;
pub mod validation;

pub use context::{AppContext, Collaborators};
pub use error::{AppError, AppResult};
