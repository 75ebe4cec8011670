pub mod config;
pub mod error;
pub mod extractor;
pub mod models;
pub mod pipeline;
pub mod slack;
pub mod trackers;

pub use config::{Config, TrackerKind};
pub use error::{ConfigError, MessagingError, TrackerError};
pub use models::*;
pub use pipeline::Pipeline;
pub use slack::SlackClient;
pub use trackers::{create_tracker, grouping_key, JiraTracker, LinearTracker, Tracker};
