use std::collections::HashMap;
use std::env;

use tracing::info;

use crate::error::ConfigError;

/// Which tracker backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerKind {
    #[default]
    Jira,
    Linear,
}

/// Immutable snapshot of resolved settings for one run.
///
/// Only the fields of the selected tracker variant are required; the other
/// variant's fields may be absent and are ignored. Validated once at
/// process start, before any network call.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub tracker: TrackerKind,

    // Jira variant
    pub jira_base_url: Option<String>,
    pub jira_email: Option<String>,
    pub jira_api_token: Option<String>,
    pub jira_project_key: Option<String>,

    // Linear variant
    pub linear_api_token: Option<String>,
    pub linear_team_key: Option<String>,

    // Common
    pub slack_token: String,
    pub slack_channel: String,
    pub environment: String,
    /// Grouping key -> Slack destination overrides
    pub destination_map: HashMap<String, String>,
    pub only_active_iteration: bool,
    /// Exact-match status allow-list; None disables status filtering
    pub allowed_statuses: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        info!(tracker = ?config.tracker, environment = %config.environment, "Loaded configuration");
        Ok(config)
    }

    /// Build and validate a config from a key lookup function.
    ///
    /// Separated from [`Config::from_env`] so tests don't have to mutate
    /// process-wide environment state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tracker = match lookup("TRACKER").as_deref() {
            None | Some("jira") => TrackerKind::Jira,
            Some("linear") => TrackerKind::Linear,
            Some(other) => return Err(ConfigError::UnknownTracker(other.to_string())),
        };

        let destination_map = match lookup("DESTINATION_MAP") {
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidField {
                    field: "DESTINATION_MAP",
                    reason: e.to_string(),
                })?
            }
            None => HashMap::new(),
        };

        // The literal string "false" disables the filter; anything else,
        // including absence, leaves it on.
        let only_active_iteration = lookup("ONLY_ACTIVE_ITERATION").as_deref() != Some("false");

        let allowed_statuses = lookup("STATUS_FILTER").and_then(|raw| {
            let statuses: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if statuses.is_empty() {
                None
            } else {
                Some(statuses)
            }
        });

        let config = Self {
            tracker,
            jira_base_url: lookup("JIRA_BASE_URL"),
            jira_email: lookup("JIRA_EMAIL"),
            jira_api_token: lookup("JIRA_API_TOKEN"),
            jira_project_key: lookup("JIRA_PROJECT_KEY"),
            linear_api_token: lookup("LINEAR_API_TOKEN"),
            linear_team_key: lookup("LINEAR_TEAM_KEY"),
            slack_token: lookup("SLACK_BOT_TOKEN")
                .ok_or(ConfigError::MissingField("SLACK_BOT_TOKEN"))?,
            slack_channel: lookup("SLACK_CHANNEL")
                .ok_or(ConfigError::MissingField("SLACK_CHANNEL"))?,
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "staging".to_string()),
            destination_map,
            only_active_iteration,
            allowed_statuses,
        };

        config.validate_tracker_fields()?;
        Ok(config)
    }

    /// Fail fast when a required field for the selected variant is absent.
    fn validate_tracker_fields(&self) -> Result<(), ConfigError> {
        match self.tracker {
            TrackerKind::Jira => {
                if self.jira_base_url.is_none() {
                    return Err(ConfigError::MissingField("JIRA_BASE_URL"));
                }
                if self.jira_email.is_none() {
                    return Err(ConfigError::MissingField("JIRA_EMAIL"));
                }
                if self.jira_api_token.is_none() {
                    return Err(ConfigError::MissingField("JIRA_API_TOKEN"));
                }
                if self.jira_project_key.is_none() {
                    return Err(ConfigError::MissingField("JIRA_PROJECT_KEY"));
                }
            }
            TrackerKind::Linear => {
                if self.linear_api_token.is_none() {
                    return Err(ConfigError::MissingField("LINEAR_API_TOKEN"));
                }
            }
        }
        Ok(())
    }
}
