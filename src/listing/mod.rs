/// Public read-only views over the tracker
pub mod approved;
pub mod status;

pub use approved::{ApprovedFilter, ApprovedList, ApprovedLister};
pub use status::{StatusReader, StatusView};
