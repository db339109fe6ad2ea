/// Comment moderation and submission state
pub mod queue;
pub mod resolver;
pub mod status;

pub use queue::PendingCommentQueue;
pub use resolver::{Decision, ModerationResolver, Resolution};
pub use status::{relabel, StateLabel, StatusUpdater};
