// ABOUTME: Periodic feed announcing newly created pull requests from an Azure DevOps / TFS project.
// ABOUTME: Each poll reports PRs created since the previous poll started, newest first, as one bot message.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use slackbot_core::config::PullRequestFeedConfig;
use slackbot_core::{Attachment, Feed, Message, MessageSubtype};
use tokio_util::sync::CancellationToken;

use super::client::DevOpsClient;

const ANNOUNCEMENT: &str = "Watch out humans!";
const ATTACHMENT_COLOR: &str = "red";

/// How far back the first poll looks
const INITIAL_LOOKBACK_MINUTES: i64 = 30;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default)]
    pub unique_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    #[serde(rename = "pullRequestId", default)]
    pub id: u64,
    #[serde(default)]
    pub url: String,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_by: Identity,
}

/// The list endpoint wraps results in `value`; some gateways return a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum PullRequestList {
    Wrapped { value: Vec<PullRequest> },
    Bare(Vec<PullRequest>),
}

impl PullRequestList {
    fn into_vec(self) -> Vec<PullRequest> {
        match self {
            Self::Wrapped { value } => value,
            Self::Bare(prs) => prs,
        }
    }
}

/// PRs created at or after `since`, newest first.
pub fn created_since(prs: Vec<PullRequest>, since: DateTime<Utc>) -> Vec<PullRequest> {
    let mut fresh: Vec<_> = prs
        .into_iter()
        .filter(|pr| pr.creation_date >= since)
        .collect();
    fresh.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
    fresh
}

/// The announcement for `prs`, or None when there is nothing new.
pub fn announcement(channel: &str, prs: &[PullRequest]) -> Option<Message> {
    if prs.is_empty() {
        return None;
    }

    let attachments = prs
        .iter()
        .map(|pr| {
            let mut attachment = Attachment::new(pr.title.clone())
                .with_color(ATTACHMENT_COLOR)
                .with_title(pr.title.clone())
                .with_title_link(pr.url.clone());
            if let Some(ref avatar) = pr.created_by.image_url {
                attachment = attachment.with_image_url(avatar.clone());
            }
            attachment
        })
        .collect();

    Some(
        Message::new(channel, ANNOUNCEMENT)
            .with_subtype(MessageSubtype::BotMessage)
            .with_attachments(attachments),
    )
}

/// Announces new pull requests on a fixed interval.
pub struct PullRequestFeed {
    client: DevOpsClient,
    project: String,
    channel: String,
    interval: Duration,
    last_poll: Mutex<DateTime<Utc>>,
}

impl PullRequestFeed {
    pub fn new(config: &PullRequestFeedConfig) -> Self {
        Self {
            client: DevOpsClient::with_password(
                &config.project_collection,
                &config.username,
                &config.password,
            ),
            project: config.project.clone(),
            channel: config.channel.clone(),
            interval: config.interval(),
            last_poll: Mutex::new(Utc::now() - chrono::Duration::minutes(INITIAL_LOOKBACK_MINUTES)),
        }
    }

    /// Override where the next poll starts looking from.
    pub fn since(self, since: DateTime<Utc>) -> Self {
        *self.last_poll.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = since;
        self
    }

    async fn load(&self, cancel: &CancellationToken) -> Result<Vec<PullRequest>> {
        let path = format!(
            "{}/_apis/git/pullrequests?searchCriteria.includeLinks=true&searchCriteria.status=active&api-version=3.0-preview",
            self.project
        );
        let list: PullRequestList = self
            .client
            .get_json(&path, cancel)
            .await?
            .ok_or_else(|| anyhow!("pull request endpoint not found for project '{}'", self.project))?;
        Ok(list.into_vec())
    }
}

#[async_trait]
impl Feed for PullRequestFeed {
    fn name(&self) -> &str {
        "pull_requests"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll(&self, cancel: &CancellationToken) -> Result<Vec<Message>> {
        let started = Utc::now();
        let since = *self
            .last_poll
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // A failed load leaves the window where it was so the next poll catches up
        let prs = created_since(self.load(cancel).await?, since);

        *self
            .last_poll
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = started;

        for pr in &prs {
            tracing::info!(id = pr.id, title = %pr.title, author = %pr.created_by.display_name, "New pull request");
        }

        Ok(announcement(&self.channel, &prs).into_iter().collect())
    }
}
