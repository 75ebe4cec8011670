use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sprint lifecycle state as reported by the Jira backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintState {
    Active,
    Future,
    Closed,
}

/// Cycle lifecycle state, derived from the cycle's timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleState {
    Unstarted,
    Started,
    Completed,
}

/// A Jira sprint embedded in an issue (single current sprint, not a list)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    pub name: String,
    pub state: SprintState,
}

/// A Linear cycle embedded in an issue. The backend does not store a
/// state; it is computed from the timestamps via [`Cycle::state`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Cycle {
    /// Derive the cycle state at a given instant.
    ///
    /// A cycle with `completed_at` set is completed regardless of its
    /// window; otherwise the window decides, and anything past `ends_at`
    /// counts as completed.
    pub fn state(&self, now: DateTime<Utc>) -> CycleState {
        if self.completed_at.is_some() {
            return CycleState::Completed;
        }
        if now < self.starts_at {
            CycleState::Unstarted
        } else if now <= self.ends_at {
            CycleState::Started
        } else {
            CycleState::Completed
        }
    }
}

/// Time-boxed unit of work an issue may belong to. Exactly one variant is
/// populated per issue, matching the backend it was fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Iteration {
    Sprint(Sprint),
    Cycle(Cycle),
}

impl Iteration {
    pub fn name(&self) -> &str {
        match self {
            Iteration::Sprint(s) => &s.name,
            Iteration::Cycle(c) => &c.name,
        }
    }
}

/// Person assigned to an issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignee {
    pub name: String,
    pub email: Option<String>,
}

/// Tracker-agnostic issue snapshot. Constructed once per fetch and never
/// mutated; each run sees fresh values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Backend-internal identity, opaque
    pub id: String,
    /// Human-facing identifier, `PREFIX-NUMBER`
    pub key: String,
    pub summary: String,
    /// Backend-native status label, not normalized
    pub status: String,
    pub assignee: Option<Assignee>,
    pub iteration: Option<Iteration>,
    /// Resolved owner/PM contact, when the backend knows one
    pub owner_email: Option<String>,
    pub url: String,
}

/// One raw commit as supplied by the CI workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author: String,
}

/// A commit that yielded at least one ticket identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommit {
    pub sha: String,
    /// First line of the commit message
    pub message: String,
    pub author: String,
    /// Ordered, per-commit deduplicated
    pub ticket_ids: Vec<String>,
}

/// Deployment metadata attached to the outbound message
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub branch: String,
    pub environment: String,
    pub actor: String,
    pub commit_sha: String,
    pub repo_url: String,
}

/// Flattened projection of an Issue used to build the outbound message.
/// One-way derived; never round-tripped back into an Issue.
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub assignee_name: Option<String>,
    pub iteration_name: Option<String>,
    pub url: String,
}

impl NotificationRecord {
    pub fn from_issue(issue: &Issue) -> Self {
        Self {
            key: issue.key.clone(),
            summary: issue.summary.clone(),
            status: issue.status.clone(),
            assignee_name: issue.assignee.as_ref().map(|a| a.name.clone()),
            iteration_name: issue.iteration.as_ref().map(|i| i.name().to_string()),
            url: issue.url.clone(),
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Distinct identifiers extracted from the commit list
    pub tickets_found: usize,
    /// Issues that made it into the outbound message
    pub tickets_notified: usize,
    /// Slack message timestamp handle, when a message was sent
    pub message_ts: Option<String>,
}
