use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::MessagingError;
use crate::models::{DeployContext, NotificationRecord};

const SLACK_API_URL: &str = "https://slack.com/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_SEND_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Slack Web API client: destination lookup and message posting
pub struct SlackClient {
    client: Client,
    token: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: String,
    blocks: Vec<SlackBlock>,
}

#[derive(Debug, Serialize)]
struct SlackBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<SlackText>,
}

#[derive(Debug, Serialize)]
struct SlackText {
    #[serde(rename = "type")]
    text_type: String,
    text: String,
}

impl SlackBlock {
    fn section(text: String) -> Self {
        Self {
            block_type: "section".to_string(),
            text: Some(SlackText {
                text_type: "mrkdwn".to_string(),
                text,
            }),
        }
    }

    fn divider() -> Self {
        Self {
            block_type: "divider".to_string(),
            text: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    ok: bool,
    error: Option<String>,
    user: Option<SlackUser>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
}

impl SlackClient {
    pub fn new(token: String) -> Self {
        Self {
            client: Client::new(),
            token,
            base_url: SLACK_API_URL.to_string(),
        }
    }

    /// Point the client at a different API base (tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Resolve a Slack user id by email. "Not on this workspace" is a
    /// normal outcome, not an error.
    pub async fn lookup_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<String>, MessagingError> {
        debug!(email, "Looking up Slack user");

        let response = self
            .client
            .get(format!("{}/users.lookupByEmail", self.base_url))
            .bearer_auth(&self.token)
            .query(&[("email", email)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| MessagingError::Transport {
                attempts: 1,
                source: e,
            })?;

        let lookup: LookupResponse =
            response
                .json()
                .await
                .map_err(|e| MessagingError::Transport {
                    attempts: 1,
                    source: e,
                })?;

        if lookup.ok {
            return Ok(lookup.user.map(|u| u.id));
        }

        match lookup.error.as_deref() {
            Some("users_not_found") => Ok(None),
            other => Err(MessagingError::Api {
                code: other.unwrap_or("unknown_error").to_string(),
            }),
        }
    }

    /// Post the deploy summary, returning the message timestamp handle.
    pub async fn post_deploy_summary(
        &self,
        channel: &str,
        records: &[NotificationRecord],
        deploy: &DeployContext,
    ) -> Result<String, MessagingError> {
        let text = format!(
            "🚀 Deployed {} ticket(s) to {}",
            records.len(),
            deploy.environment
        );
        let blocks = build_blocks(records, deploy);

        self.post_message(channel, text, blocks).await
    }

    /// `chat.postMessage` with a bounded retry on transient failures:
    /// transport errors, 5xx, 429, and Slack's own rate_limited error.
    async fn post_message(
        &self,
        channel: &str,
        text: String,
        blocks: Vec<SlackBlock>,
    ) -> Result<String, MessagingError> {
        let request = PostMessageRequest {
            channel,
            text,
            blocks,
        };

        let mut last_transport: Option<reqwest::Error> = None;

        for attempt in 1..=MAX_SEND_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }

            debug!(attempt, channel, "Posting Slack message");

            let response = match self
                .client
                .post(format!("{}/chat.postMessage", self.base_url))
                .bearer_auth(&self.token)
                .json(&request)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt, error = %e, "Slack request failed");
                    last_transport = Some(e);
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() || status.as_u16() == 429 {
                warn!(attempt, status = %status, "Slack returned transient status");
                continue;
            }

            let body: PostMessageResponse =
                response
                    .json()
                    .await
                    .map_err(|e| MessagingError::Transport {
                        attempts: attempt,
                        source: e,
                    })?;

            if body.ok {
                let ts = body.ts.ok_or_else(|| MessagingError::Api {
                    code: "missing_ts".to_string(),
                })?;
                info!(channel, ts = %ts, "Slack message sent");
                return Ok(ts);
            }

            let code = body.error.unwrap_or_else(|| "unknown_error".to_string());
            if code == "rate_limited" {
                warn!(attempt, "Slack rate limited");
                continue;
            }
            return Err(MessagingError::Api { code });
        }

        match last_transport {
            Some(source) => Err(MessagingError::Transport {
                attempts: MAX_SEND_ATTEMPTS,
                source,
            }),
            None => Err(MessagingError::Api {
                code: "retries_exhausted".to_string(),
            }),
        }
    }
}

/// Build the Block Kit layout for a deploy summary message.
fn build_blocks(records: &[NotificationRecord], deploy: &DeployContext) -> Vec<SlackBlock> {
    let mut blocks = vec![SlackBlock::section(format!(
        "🚀 *Deploy to {}* from `{}` by {}",
        deploy.environment, deploy.branch, deploy.actor
    ))];

    let lines: Vec<String> = records
        .iter()
        .map(|record| {
            let mut line = format!("• <{}|{}> {} — _{}_", record.url, record.key, record.summary, record.status);
            if let Some(assignee) = &record.assignee_name {
                line.push_str(&format!(" ({assignee})"));
            }
            if let Some(iteration) = &record.iteration_name {
                line.push_str(&format!(" [{iteration}]"));
            }
            line
        })
        .collect();

    blocks.push(SlackBlock::section(lines.join("\n")));
    blocks.push(SlackBlock::divider());
    blocks.push(SlackBlock::section(format!(
        "<{}|{}> at `{}`",
        deploy.repo_url,
        deploy.repo_url.trim_start_matches("https://"),
        &deploy.commit_sha[..7.min(deploy.commit_sha.len())]
    )));

    blocks
}
