use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ConfigError;
use crate::extractor;
use crate::models::{Commit, DeployContext, Issue, NotificationRecord, RunReport};
use crate::slack::SlackClient;
use crate::trackers::{self, Tracker};

/// Orchestrates one run: commits in, one Slack message (at most) out.
///
/// Holds no state between runs; every fetch produces fresh values.
pub struct Pipeline {
    tracker: Box<dyn Tracker>,
    slack: SlackClient,
    config: Config,
}

impl Pipeline {
    pub fn new(tracker: Box<dyn Tracker>, slack: SlackClient, config: Config) -> Self {
        Self {
            tracker,
            slack,
            config,
        }
    }

    /// Build a pipeline from validated configuration.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let tracker = trackers::create_tracker(&config)?;
        let slack = SlackClient::new(config.slack_token.clone());
        Ok(Self::new(tracker, slack, config))
    }

    /// Run the notification pipeline to completion.
    ///
    /// Empty commits, zero extracted identifiers, and zero surviving
    /// issues are all normal zero-notified outcomes, not failures. Only
    /// the outbound send (after its bounded retry) can fail the run.
    pub async fn run(&self, commits: &[Commit], deploy: &DeployContext) -> Result<RunReport> {
        if commits.is_empty() {
            info!("No commits supplied, nothing to notify");
            return Ok(RunReport::default());
        }

        let grouping_key = trackers::grouping_key(&self.config);
        let parsed = extractor::parse_commits(commits, grouping_key.as_deref());
        let ticket_ids = extractor::all_ticket_ids(&parsed);

        if ticket_ids.is_empty() {
            info!(commits = commits.len(), "No ticket identifiers found in commits");
            return Ok(RunReport::default());
        }

        let tickets_found = ticket_ids.len();
        info!(tickets_found, "Extracted ticket identifiers");

        let issues = self.tracker.get_issues(&ticket_ids).await;
        if issues.is_empty() {
            info!("No issues fetched for the extracted identifiers");
            return Ok(RunReport {
                tickets_found,
                ..Default::default()
            });
        }

        let issues = self.apply_filters(issues);
        if issues.is_empty() {
            info!("All issues filtered out, no message sent");
            return Ok(RunReport {
                tickets_found,
                ..Default::default()
            });
        }

        let destination = self
            .resolve_destination(grouping_key.as_deref(), &issues)
            .await;

        let records: Vec<NotificationRecord> =
            issues.iter().map(NotificationRecord::from_issue).collect();
        let tickets_notified = records.len();

        let ts = self
            .slack
            .post_deploy_summary(&destination, &records, deploy)
            .await
            .context("Failed to send deploy notification")?;

        info!(tickets_found, tickets_notified, ts = %ts, "Run complete");

        Ok(RunReport {
            tickets_found,
            tickets_notified,
            message_ts: Some(ts),
        })
    }

    /// Iteration-state filter (on by default), then status allow-list.
    fn apply_filters(&self, issues: Vec<Issue>) -> Vec<Issue> {
        let issues = if self.config.only_active_iteration {
            let before = issues.len();
            let kept: Vec<Issue> = issues
                .into_iter()
                .filter(|issue| self.tracker.is_in_active_iteration(issue))
                .collect();
            info!(before, after = kept.len(), "Applied active-iteration filter");
            kept
        } else {
            issues
        };

        self.tracker
            .filter_by_status(issues, self.config.allowed_statuses.as_deref())
    }

    /// Pick the single destination for this run, in strict priority order:
    /// explicit mapping for the grouping key, then the first surviving
    /// issue's owner (first-wins, no tie-break), then the default channel.
    async fn resolve_destination(&self, grouping_key: Option<&str>, issues: &[Issue]) -> String {
        if let Some(key) = grouping_key {
            if let Some(destination) = self.config.destination_map.get(key) {
                info!(key, destination, "Using mapped destination");
                return destination.clone();
            }
        }

        if let Some(email) = issues.first().and_then(|i| self.tracker.owner_email(i)) {
            match self.slack.lookup_user_by_email(&email).await {
                Ok(Some(user_id)) => {
                    info!(email, user_id, "Using ticket owner as destination");
                    return user_id;
                }
                Ok(None) => info!(email, "Owner not on Slack workspace"),
                Err(e) => warn!(email, error = %e, "Owner lookup failed, using default"),
            }
        }

        self.config.slack_channel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerKind;
    use crate::models::{Iteration, Sprint, SprintState};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// In-memory tracker covering the capability contract for pipeline tests
    struct StubTracker {
        issues: Vec<Issue>,
    }

    #[async_trait]
    impl Tracker for StubTracker {
        async fn get_issues(&self, ids: &[String]) -> Vec<Issue> {
            self.issues
                .iter()
                .filter(|issue| ids.contains(&issue.key))
                .cloned()
                .collect()
        }

        fn owner_email(&self, issue: &Issue) -> Option<String> {
            issue.owner_email.clone()
        }

        fn issue_url(&self, key: &str) -> String {
            format!("https://tracker.test/{key}")
        }
    }

    fn issue(key: &str, sprint_state: SprintState, status: &str) -> Issue {
        Issue {
            id: format!("id-{key}"),
            key: key.to_string(),
            summary: "Fix something".to_string(),
            status: status.to_string(),
            assignee: None,
            iteration: Some(Iteration::Sprint(Sprint {
                name: "Sprint 4".to_string(),
                state: sprint_state,
            })),
            owner_email: Some("owner@example.com".to_string()),
            url: format!("https://tracker.test/{key}"),
        }
    }

    fn commit(message: &str) -> Commit {
        Commit {
            sha: "abc123".to_string(),
            message: message.to_string(),
            author: "dev".to_string(),
        }
    }

    fn deploy() -> DeployContext {
        DeployContext {
            branch: "main".to_string(),
            environment: "staging".to_string(),
            actor: "dana".to_string(),
            commit_sha: "abc1234567".to_string(),
            repo_url: "https://github.com/acme/app".to_string(),
        }
    }

    fn config(project_key: &str) -> Config {
        Config {
            tracker: TrackerKind::Jira,
            jira_project_key: Some(project_key.to_string()),
            slack_token: "xoxb-test".to_string(),
            slack_channel: "#deploys".to_string(),
            environment: "staging".to_string(),
            only_active_iteration: true,
            ..Default::default()
        }
    }

    async fn slack_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "ts": "1712345678.000100"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users.lookupByEmail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "user": { "id": "U777" }
            })))
            .mount(&server)
            .await;
        server
    }

    fn pipeline(server: &MockServer, issues: Vec<Issue>, config: Config) -> Pipeline {
        let slack =
            SlackClient::new("xoxb-test".to_string()).with_base_url(&server.uri());
        Pipeline::new(Box::new(StubTracker { issues }), slack, config)
    }

    #[tokio::test]
    async fn test_active_issue_is_notified() {
        // scenario A: active sprint, no status filter
        let server = slack_server().await;
        let p = pipeline(
            &server,
            vec![issue("AB-1", SprintState::Active, "In Progress")],
            config("AB"),
        );

        let report = p.run(&[commit("AB-1 Fix bug")], &deploy()).await.unwrap();
        assert_eq!(report.tickets_found, 1);
        assert_eq!(report.tickets_notified, 1);
        assert_eq!(report.message_ts.as_deref(), Some("1712345678.000100"));
    }

    #[tokio::test]
    async fn test_future_sprint_is_filtered_out() {
        // scenario B: only-active filter on, sprint is future
        let server = slack_server().await;
        let p = pipeline(
            &server,
            vec![issue("AB-1", SprintState::Future, "In Progress")],
            config("AB"),
        );

        let report = p.run(&[commit("AB-1 Fix bug")], &deploy()).await.unwrap();
        assert_eq!(report.tickets_found, 1);
        assert_eq!(report.tickets_notified, 0);
        assert!(report.message_ts.is_none());

        let sends: Vec<_> = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path().ends_with("chat.postMessage"))
            .collect();
        assert!(sends.is_empty());
    }

    #[tokio::test]
    async fn test_zero_commits_short_circuits() {
        // scenario C: no commits, no network calls
        let server = slack_server().await;
        let p = pipeline(&server, Vec::new(), config("AB"));

        let report = p.run(&[], &deploy()).await.unwrap();
        assert_eq!(report.tickets_found, 0);
        assert_eq!(report.tickets_notified, 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_filter_drops_mismatched_issue() {
        // scenario D: allow-list "Done", issue is "In Progress"
        let server = slack_server().await;
        let mut cfg = config("AB");
        cfg.allowed_statuses = Some(vec!["Done".to_string()]);
        let p = pipeline(
            &server,
            vec![issue("AB-1", SprintState::Active, "In Progress")],
            cfg,
        );

        let report = p.run(&[commit("AB-1 Fix bug")], &deploy()).await.unwrap();
        assert_eq!(report.tickets_found, 1);
        assert_eq!(report.tickets_notified, 0);
    }

    #[tokio::test]
    async fn test_no_identifiers_short_circuits() {
        let server = slack_server().await;
        let p = pipeline(&server, Vec::new(), config("AB"));

        let report = p
            .run(&[commit("Bump dependencies")], &deploy())
            .await
            .unwrap();
        assert_eq!(report.tickets_found, 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_miss_still_reports_found_count() {
        let server = slack_server().await;
        // tracker knows nothing about AB-9
        let p = pipeline(&server, Vec::new(), config("AB"));

        let report = p.run(&[commit("AB-9 Mystery work")], &deploy()).await.unwrap();
        assert_eq!(report.tickets_found, 1);
        assert_eq!(report.tickets_notified, 0);
    }

    #[tokio::test]
    async fn test_mapped_destination_beats_owner_lookup() {
        let server = slack_server().await;
        let mut cfg = config("AB");
        cfg.destination_map =
            HashMap::from([("AB".to_string(), "#team-ab".to_string())]);
        let p = pipeline(
            &server,
            vec![issue("AB-1", SprintState::Active, "In Progress")],
            cfg,
        );

        p.run(&[commit("AB-1 Fix bug")], &deploy()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        // mapping wins unconditionally: no owner lookup at all
        assert!(!requests
            .iter()
            .any(|r| r.url.path().ends_with("users.lookupByEmail")));
        let send = requests
            .iter()
            .find(|r| r.url.path().ends_with("chat.postMessage"))
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&send.body).unwrap();
        assert_eq!(body["channel"], "#team-ab");
    }

    #[tokio::test]
    async fn test_owner_email_resolves_destination_when_unmapped() {
        let server = slack_server().await;
        let p = pipeline(
            &server,
            vec![issue("AB-1", SprintState::Active, "In Progress")],
            config("AB"),
        );

        p.run(&[commit("AB-1 Fix bug")], &deploy()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let send = requests
            .iter()
            .find(|r| r.url.path().ends_with("chat.postMessage"))
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&send.body).unwrap();
        assert_eq!(body["channel"], "U777");
    }

    #[tokio::test]
    async fn test_failed_owner_lookup_falls_back_to_default_channel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.lookupByEmail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "error": "users_not_found"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "ts": "1712345678.000300"
            })))
            .mount(&server)
            .await;

        let p = pipeline(
            &server,
            vec![issue("AB-1", SprintState::Active, "In Progress")],
            config("AB"),
        );
        p.run(&[commit("AB-1 Fix bug")], &deploy()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let send = requests
            .iter()
            .find(|r| r.url.path().ends_with("chat.postMessage"))
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&send.body).unwrap();
        assert_eq!(body["channel"], "#deploys");
    }

    #[tokio::test]
    async fn test_duplicate_identifier_counted_once() {
        let server = slack_server().await;
        let p = pipeline(
            &server,
            vec![issue("AB-1", SprintState::Active, "In Progress")],
            config("AB"),
        );

        let commits = vec![commit("AB-1 Fix bug"), commit("AB-1 More fixes")];
        let report = p.run(&commits, &deploy()).await.unwrap();
        assert_eq!(report.tickets_found, 1);
        assert_eq!(report.tickets_notified, 1);
    }
}
