pub mod jira;
pub mod linear;

pub use jira::JiraTracker;
pub use linear::LinearTracker;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::{Config, TrackerKind};
use crate::error::ConfigError;
use crate::models::{CycleState, Issue, Iteration, SprintState};

/// Capability contract shared by both tracker backends.
///
/// The pipeline only ever talks to this trait; backend selection happens
/// once, in [`create_tracker`], never through variant checks downstream.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Fetch available issues for the given identifiers.
    ///
    /// Identifiers that are not found, not authorized, or outside the
    /// configured scope are silently omitted. A whole-batch failure is
    /// logged and yields an empty list, never an error.
    async fn get_issues(&self, ids: &[String]) -> Vec<Issue>;

    /// Owner/PM contact for the issue, when this backend knows one
    fn owner_email(&self, issue: &Issue) -> Option<String>;

    /// Deterministic issue URL for a bare identifier
    fn issue_url(&self, key: &str) -> String;

    /// True iff the issue's iteration is currently open: an active sprint
    /// or a started cycle. Issues without an iteration are never active.
    fn is_in_active_iteration(&self, issue: &Issue) -> bool {
        match &issue.iteration {
            Some(Iteration::Sprint(sprint)) => sprint.state == SprintState::Active,
            Some(Iteration::Cycle(cycle)) => cycle.state(Utc::now()) == CycleState::Started,
            None => false,
        }
    }

    /// Keep only issues whose status exactly matches one of the allowed
    /// values. Identity when no allow-list is configured.
    fn filter_by_status(&self, issues: Vec<Issue>, allowed: Option<&[String]>) -> Vec<Issue> {
        match allowed {
            None => issues,
            Some(allowed) if allowed.is_empty() => issues,
            Some(allowed) => issues
                .into_iter()
                .filter(|issue| allowed.iter().any(|status| *status == issue.status))
                .collect(),
        }
    }
}

/// Construct the adapter for the configured tracker variant.
///
/// Required fields are validated here as well as at config load, so a
/// hand-built [`Config`] fails the same way an environment-loaded one does.
pub fn create_tracker(config: &Config) -> Result<Box<dyn Tracker>, ConfigError> {
    match config.tracker {
        TrackerKind::Jira => {
            let base_url = config
                .jira_base_url
                .clone()
                .ok_or(ConfigError::MissingField("JIRA_BASE_URL"))?;
            let email = config
                .jira_email
                .clone()
                .ok_or(ConfigError::MissingField("JIRA_EMAIL"))?;
            let token = config
                .jira_api_token
                .clone()
                .ok_or(ConfigError::MissingField("JIRA_API_TOKEN"))?;
            Ok(Box::new(JiraTracker::new(base_url, email, token)))
        }
        TrackerKind::Linear => {
            let token = config
                .linear_api_token
                .clone()
                .ok_or(ConfigError::MissingField("LINEAR_API_TOKEN"))?;
            Ok(Box::new(LinearTracker::new(
                token,
                config.linear_team_key.clone(),
            )))
        }
    }
}

/// The key scoping identifier extraction and destination mapping: the Jira
/// project key or the Linear team key, whichever variant is active.
pub fn grouping_key(config: &Config) -> Option<String> {
    match config.tracker {
        TrackerKind::Jira => config.jira_project_key.clone(),
        TrackerKind::Linear => config.linear_team_key.clone(),
    }
}
