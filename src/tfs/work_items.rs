// ABOUTME: Sink that answers "tfs 123" style references with work item cards from Azure DevOps / TFS.
// ABOUTME: Also runs a saved-query search when a configured trigger string appears in the message.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use slackbot_core::config::{LoginMethod, WorkItemSinkConfig};
use slackbot_core::{Attachment, AttachmentField, Message, MessageSender, Sink, SinkResult};
use tokio_util::sync::CancellationToken;

use super::client::DevOpsClient;

const API_VERSION: &str = "3.0";

const REFERENCE_PATTERN: &str = r"(?i)(?:^|\b)tfs ?#?(?P<id>[0-9]+)";

/// Work item types the search command reports
const SEARCHABLE_TYPES: [&str; 2] = ["Bug", "Product Backlog Item"];

fn default_colors() -> HashMap<String, String> {
    [
        ("bug", "#cc293d"),
        ("task", "#f2cb1d"),
        ("user story", "#009ccc"),
        ("product backlog item", "#009ccc"),
        ("feature", "#773b93"),
        ("epic", "#ff7b00"),
    ]
    .into_iter()
    .map(|(kind, color)| (kind.to_string(), color.to_string()))
    .collect()
}

/// Work item ids referenced in `text`, in order of appearance.
pub fn referenced_ids(pattern: &Regex, text: &str) -> Vec<u64> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.name("id"))
        .filter_map(|id| id.as_str().parse().ok())
        .collect()
}

/// Escape the characters the chat markup reserves.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct WorkItem {
    pub id: u64,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    #[serde(rename = "_links", default)]
    pub links: HashMap<String, Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
}

impl WorkItem {
    /// A field rendered as text. Identity fields render as their display name.
    pub fn field(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Object(identity) => identity
                .get("displayName")
                .and_then(Value::as_str)
                .map(str::to_string),
            other => Some(other.to_string()),
        }
    }

    pub fn kind(&self) -> String {
        self.field("System.WorkItemType").unwrap_or_default()
    }

    pub fn title(&self) -> String {
        self.field("System.Title").unwrap_or_default()
    }

    pub fn html_link(&self) -> Result<&str> {
        self.links
            .get("html")
            .map(|link| link.href.as_str())
            .ok_or_else(|| anyhow!("work item {} has no html link", self.id))
    }

    fn matches_search(&self, term: &str) -> bool {
        ["System.AssignedTo", "System.Title"]
            .iter()
            .filter_map(|name| self.field(name))
            .any(|value| value.contains(term))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    #[serde(default)]
    work_item_relations: Vec<QueryRelation>,
    #[serde(default)]
    work_items: Vec<QueryReference>,
}

#[derive(Debug, Deserialize)]
struct QueryRelation {
    target: Option<QueryReference>,
}

#[derive(Debug, Deserialize)]
struct QueryReference {
    id: u64,
}

impl QueryResult {
    /// Ids returned by a link query, or by a flat query when there are no links.
    fn ids(&self) -> Vec<u64> {
        if self.work_item_relations.is_empty() {
            self.work_items.iter().map(|r| r.id).collect()
        } else {
            self.work_item_relations
                .iter()
                .filter_map(|r| r.target.as_ref().map(|t| t.id))
                .collect()
        }
    }
}

// =============================================================================
// Sink
// =============================================================================

struct SearchCommand {
    trigger: String,
    query_id: String,
}

struct Connected {
    client: DevOpsClient,
    project: String,
    pattern: Regex,
    search: Option<SearchCommand>,
    colors: HashMap<String, String>,
}

/// Looks up work items referenced in chat messages.
pub struct WorkItemSink {
    entries: Vec<WorkItemSinkConfig>,
    connected: Option<Connected>,
}

impl WorkItemSink {
    /// `entries` are the configured `[[sinks]]`; `initialize` picks one by name.
    pub fn new(entries: Vec<WorkItemSinkConfig>) -> Self {
        Self {
            entries,
            connected: None,
        }
    }

    fn connected(&self) -> Result<&Connected> {
        self.connected
            .as_ref()
            .ok_or_else(|| anyhow!("work item sink used before initialization"))
    }
}

impl Connected {
    async fn fetch(&self, id: u64, cancel: &CancellationToken) -> Result<Option<WorkItem>> {
        self.client
            .get_json(
                &format!("_apis/wit/workitems/{}?$expand=links&api-version={}", id, API_VERSION),
                cancel,
            )
            .await
            .with_context(|| format!("failed to fetch work item {}", id))
    }

    async fn search(
        &self,
        search: &SearchCommand,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Attachment>> {
        let term = text.replace(&search.trigger, "");
        let term = term.trim();

        let result: QueryResult = self
            .client
            .get_json(
                &format!(
                    "{}/_apis/wit/wiql/{}?api-version={}",
                    self.project, search.query_id, API_VERSION
                ),
                cancel,
            )
            .await
            .context("saved query failed")?
            .ok_or_else(|| anyhow!("saved query {} not found", search.query_id))?;

        let ids = result.ids();
        tracing::debug!(term = %term, candidates = ids.len(), "Searching work items");

        let mut attachments = Vec::new();
        for id in ids {
            let Some(item) = self.fetch(id, cancel).await? else {
                continue;
            };
            let kind = item.kind();
            if SEARCHABLE_TYPES.contains(&kind.as_str()) && item.matches_search(term) {
                attachments.push(self.attachment(&item)?);
            }
        }
        Ok(attachments)
    }

    fn attachment(&self, item: &WorkItem) -> Result<Attachment> {
        let kind = item.kind();
        let title = item.title();
        let link = item.html_link()?;

        let mut attachment = Attachment::new(format!("{} {}: {}", kind, item.id, link)).with_text(
            format!("<{}|{} {} {}>", escape(link), escape(&kind), item.id, escape(&title)),
        );

        if let Some(color) = self.colors.get(&kind.to_lowercase()) {
            attachment = attachment.with_color(color.clone());
        }
        if let Some(state) = item.field("System.State") {
            attachment = attachment.with_field(AttachmentField::new("State", state, true));
        }
        if let Some(assignee) = item.field("System.AssignedTo") {
            attachment = attachment.with_field(AttachmentField::new("Assigned To", assignee, true));
        }
        Ok(attachment)
    }
}

#[async_trait]
impl Sink for WorkItemSink {
    async fn initialize(&mut self, name: &str, _cancel: &CancellationToken) -> Result<()> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| anyhow!("no [[sinks]] entry named '{}'", name))?;

        let search = match (&entry.search_string, &entry.query_id) {
            (Some(trigger), Some(query_id)) if !trigger.is_empty() => Some(SearchCommand {
                trigger: trigger.clone(),
                query_id: query_id.clone(),
            }),
            _ => None,
        };

        let mut colors = default_colors();
        colors.extend(
            entry
                .colors
                .iter()
                .map(|(kind, color)| (kind.to_lowercase(), color.clone())),
        );

        let client = match entry.login_method {
            LoginMethod::Password => {
                DevOpsClient::with_password(&entry.project_collection, &entry.username, &entry.password)
            }
            LoginMethod::AccessToken => {
                DevOpsClient::with_token(&entry.project_collection, &entry.access_token)
            }
        };

        self.connected = Some(Connected {
            client,
            project: entry.project.clone(),
            pattern: Regex::new(REFERENCE_PATTERN).context("invalid work item pattern")?,
            search,
            colors,
        });

        tracing::info!(
            sink = %name,
            collection = %entry.project_collection,
            project = %entry.project,
            login_method = ?entry.login_method,
            "Work item sink ready"
        );
        Ok(())
    }

    async fn process_message(
        &self,
        sender: &dyn MessageSender,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<SinkResult> {
        let connected = self.connected()?;

        let mut attachments = Vec::new();
        for id in referenced_ids(&connected.pattern, &message.text) {
            match connected.fetch(id, cancel).await? {
                Some(item) => attachments.push(connected.attachment(&item)?),
                None => {
                    tracing::info!(id, "Work item not found");
                    sender
                        .send(message.create_reply(format!("WorkItem {} not found", id)), cancel)
                        .await?;
                    return Ok(SinkResult::Complete);
                }
            }
        }

        if attachments.is_empty() {
            if let Some(ref search) = connected.search {
                if message.text.contains(&search.trigger) {
                    attachments = connected.search(search, &message.text, cancel).await?;
                }
            }
        }

        if attachments.is_empty() {
            return Ok(SinkResult::Continue);
        }

        tracing::debug!(count = attachments.len(), channel = %message.channel, "Replying with work items");
        sender
            .send(message.create_reply_with_attachments("", attachments), cancel)
            .await?;
        Ok(SinkResult::Complete)
    }
}
