use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::error::TrackerError;
use crate::models::{Assignee, Issue, Iteration, Sprint, SprintState};
use crate::trackers::Tracker;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_SEARCH_RESULTS: u32 = 100;

/// Adapter for the Jira REST backend (basic auth, JQL search)
pub struct JiraTracker {
    client: Client,
    base_url: String,
    email: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    issues: Vec<JiraIssue>,
}

#[derive(Debug, Deserialize)]
struct JiraIssue {
    id: String,
    key: String,
    fields: JiraFields,
}

#[derive(Debug, Deserialize)]
struct JiraFields {
    summary: String,
    status: JiraStatus,
    assignee: Option<JiraUser>,
    reporter: Option<JiraUser>,
    /// Single current sprint embedded per issue, not a list
    sprint: Option<JiraSprint>,
    /// Designated owner/PM contact field on this Jira instance
    #[serde(rename = "customfield_10500")]
    owner_email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JiraStatus {
    name: String,
}

#[derive(Debug, Deserialize)]
struct JiraUser {
    #[serde(rename = "displayName")]
    display_name: String,
    #[serde(rename = "emailAddress")]
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JiraSprint {
    name: String,
    state: String,
}

impl JiraTracker {
    pub fn new(base_url: String, email: String, api_token: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            email,
            api_token,
        }
    }

    /// Batched JQL search for all requested keys, capped at 100 results.
    async fn search(&self, keys: &[String]) -> Result<Vec<JiraIssue>, TrackerError> {
        let jql = format!("key in ({})", keys.join(","));
        let max_results = MAX_SEARCH_RESULTS.to_string();

        debug!(jql = %jql, "Searching Jira");

        let response = self
            .client
            .get(format!("{}/rest/api/3/search", self.base_url))
            .basic_auth(&self.email, Some(&self.api_token))
            .query(&[
                ("jql", jql.as_str()),
                ("maxResults", max_results.as_str()),
                (
                    "fields",
                    "summary,status,assignee,reporter,sprint,customfield_10500",
                ),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Api { status, body });
        }

        let search: SearchResponse = response
            .json()
            .await
            .map_err(|e| TrackerError::Malformed(e.to_string()))?;

        Ok(search.issues)
    }

    /// Single-issue lookup. A 404 means "not found", not an error.
    pub async fn get_issue(&self, key: &str) -> Result<Option<Issue>, TrackerError> {
        let response = self
            .client
            .get(format!("{}/rest/api/3/issue/{key}", self.base_url))
            .basic_auth(&self.email, Some(&self.api_token))
            .query(&[(
                "fields",
                "summary,status,assignee,reporter,sprint,customfield_10500",
            )])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(key, "Jira issue not found");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Api { status, body });
        }

        let issue: JiraIssue = response
            .json()
            .await
            .map_err(|e| TrackerError::Malformed(e.to_string()))?;

        Ok(Some(self.convert_issue(issue)))
    }

    fn convert_issue(&self, issue: JiraIssue) -> Issue {
        let fields = issue.fields;

        // Owner: designated custom field first, then the reporter's email
        let owner_email = fields.owner_email.or_else(|| {
            fields
                .reporter
                .as_ref()
                .and_then(|r| r.email_address.clone())
        });

        let iteration = fields.sprint.map(|sprint| {
            Iteration::Sprint(Sprint {
                name: sprint.name,
                state: match sprint.state.as_str() {
                    "active" => SprintState::Active,
                    "future" => SprintState::Future,
                    _ => SprintState::Closed,
                },
            })
        });

        let url = self.issue_url(&issue.key);

        Issue {
            id: issue.id,
            key: issue.key,
            summary: fields.summary,
            status: fields.status.name,
            assignee: fields.assignee.map(|a| Assignee {
                name: a.display_name,
                email: a.email_address,
            }),
            iteration,
            owner_email,
            url,
        }
    }
}

#[async_trait]
impl Tracker for JiraTracker {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_issues(&self, ids: &[String]) -> Vec<Issue> {
        if ids.is_empty() {
            return Vec::new();
        }

        match self.search(ids).await {
            Ok(issues) => {
                info!(requested = ids.len(), fetched = issues.len(), "Fetched Jira issues");
                issues.into_iter().map(|i| self.convert_issue(i)).collect()
            }
            Err(e) => {
                // Fail open: a broken batch shrinks the issue set to zero
                // rather than aborting the run.
                warn!(error = %e, "Jira search failed, treating as no issues");
                Vec::new()
            }
        }
    }

    fn owner_email(&self, issue: &Issue) -> Option<String> {
        issue.owner_email.clone()
    }

    fn issue_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.base_url)
    }
}
