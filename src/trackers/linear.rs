use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::error::TrackerError;
use crate::models::{Assignee, Cycle, Issue, Iteration};
use crate::trackers::Tracker;

const LINEAR_API_URL: &str = "https://api.linear.app/graphql";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ISSUE_QUERY: &str = r#"
query Issue($id: String!) {
  issue(id: $id) {
    id
    identifier
    title
    url
    state { name }
    assignee { name email }
    team { key }
    cycle { name startsAt endsAt completedAt }
  }
}"#;

const ISSUE_SEARCH_QUERY: &str = r#"
query IssueSearch($query: String!) {
  issueSearch(query: $query, first: 100) {
    nodes {
      id
      identifier
      title
      url
      state { name }
      assignee { name email }
      team { key }
      cycle { name startsAt endsAt completedAt }
    }
  }
}"#;

/// Adapter for the Linear GraphQL backend (bearer token, per-issue lookup)
pub struct LinearTracker {
    client: Client,
    api_token: String,
    /// When set, issues belonging to any other team are treated as not found
    team_key: Option<String>,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct IssueData {
    issue: Option<LinearIssue>,
}

#[derive(Debug, Deserialize)]
struct IssueSearchData {
    #[serde(rename = "issueSearch")]
    issue_search: IssueSearchNodes,
}

#[derive(Debug, Deserialize)]
struct IssueSearchNodes {
    nodes: Vec<LinearIssue>,
}

#[derive(Debug, Deserialize)]
struct LinearIssue {
    id: String,
    identifier: String,
    title: String,
    url: String,
    state: Option<LinearState>,
    assignee: Option<LinearUser>,
    team: Option<LinearTeam>,
    cycle: Option<LinearCycle>,
}

#[derive(Debug, Deserialize)]
struct LinearState {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LinearUser {
    name: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinearTeam {
    key: String,
}

#[derive(Debug, Deserialize)]
struct LinearCycle {
    name: Option<String>,
    #[serde(rename = "startsAt")]
    starts_at: DateTime<Utc>,
    #[serde(rename = "endsAt")]
    ends_at: DateTime<Utc>,
    #[serde(rename = "completedAt")]
    completed_at: Option<DateTime<Utc>>,
}

impl LinearTracker {
    pub fn new(api_token: String, team_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_token,
            team_key,
            endpoint: LINEAR_API_URL.to_string(),
        }
    }

    /// Point the adapter at a different GraphQL endpoint (tests)
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    async fn execute<T: for<'de> Deserialize<'de>>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<GraphQlResponse<T>, TrackerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", &self.api_token)
            .json(&GraphQlRequest { query, variables })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Api { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| TrackerError::Malformed(e.to_string()))
    }

    /// Fetch one issue by identifier.
    ///
    /// GraphQL-level errors mean "this issue not found", not a failure;
    /// only transport/HTTP problems surface as `TrackerError`.
    pub async fn fetch_issue(&self, id: &str) -> Result<Option<Issue>, TrackerError> {
        debug!(id, "Fetching Linear issue");

        let response: GraphQlResponse<IssueData> =
            self.execute(ISSUE_QUERY, json!({ "id": id })).await?;

        if let Some(errors) = response.errors {
            let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
            info!(id, errors = ?messages, "Linear returned errors, treating as not found");
            return Ok(None);
        }

        let issue = response.data.and_then(|d| d.issue);
        Ok(issue.and_then(|i| self.convert_issue(i)))
    }

    /// Bulk retrieval via the search endpoint. Secondary path; the pipeline
    /// fetches per identifier by default.
    pub async fn search_issues(&self, ids: &[String]) -> Result<Vec<Issue>, TrackerError> {
        let response: GraphQlResponse<IssueSearchData> = self
            .execute(ISSUE_SEARCH_QUERY, json!({ "query": ids.join(" ") }))
            .await?;

        if let Some(errors) = response.errors {
            let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
            warn!(errors = ?messages, "Linear search returned errors");
            return Ok(Vec::new());
        }

        let nodes = response
            .data
            .map(|d| d.issue_search.nodes)
            .unwrap_or_default();

        Ok(nodes
            .into_iter()
            .filter_map(|i| self.convert_issue(i))
            .collect())
    }

    /// Convert a fetched issue, or discard it when team scoping rejects it.
    fn convert_issue(&self, issue: LinearIssue) -> Option<Issue> {
        if let Some(team_key) = &self.team_key {
            let issue_team = issue.team.as_ref().map(|t| t.key.as_str());
            if issue_team != Some(team_key.as_str()) {
                info!(
                    key = %issue.identifier,
                    team = ?issue_team,
                    "Issue outside configured team, treating as not found"
                );
                return None;
            }
        }

        let iteration = issue.cycle.map(|cycle| {
            Iteration::Cycle(Cycle {
                name: cycle.name.unwrap_or_else(|| "Cycle".to_string()),
                starts_at: cycle.starts_at,
                ends_at: cycle.ends_at,
                completed_at: cycle.completed_at,
            })
        });

        Some(Issue {
            id: issue.id,
            key: issue.identifier,
            summary: issue.title,
            status: issue
                .state
                .map(|s| s.name)
                .unwrap_or_else(|| "Unknown".to_string()),
            assignee: issue.assignee.map(|a| Assignee {
                name: a.name,
                email: a.email,
            }),
            iteration,
            owner_email: None,
            url: issue.url,
        })
    }
}

#[async_trait]
impl Tracker for LinearTracker {
    /// Sequential per-identifier fetch: identifier N+1 is not requested
    /// until N has resolved, so failures stay attributable per identifier.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_issues(&self, ids: &[String]) -> Vec<Issue> {
        let mut issues = Vec::new();

        for id in ids {
            match self.fetch_issue(id).await {
                Ok(Some(issue)) => issues.push(issue),
                Ok(None) => {}
                Err(e) => {
                    warn!(id, error = %e, "Linear fetch failed, treating as not found");
                }
            }
        }

        info!(requested = ids.len(), fetched = issues.len(), "Fetched Linear issues");
        issues
    }

    /// Linear has no first-class owner field
    fn owner_email(&self, _issue: &Issue) -> Option<String> {
        None
    }

    fn issue_url(&self, key: &str) -> String {
        format!("https://linear.app/issue/{key}")
    }
}
