// ABOUTME: Azure DevOps / TFS integrations: the work item lookup sink and the pull request feed.
// ABOUTME: build_sinks/build_feeds turn the [[sinks]] and [pull_requests] config into pipeline inputs.

pub mod client;
pub mod pull_requests;
pub mod work_items;

use std::sync::Arc;

use slackbot_core::config::Config;
use slackbot_core::{Feed, PendingSink};
use tokio_util::sync::CancellationToken;

pub use client::DevOpsClient;
pub use pull_requests::PullRequestFeed;
pub use work_items::WorkItemSink;

/// One pending work item sink per `[[sinks]]` entry, in config order.
pub fn build_sinks(config: &Config, cancel: &CancellationToken) -> Vec<PendingSink> {
    config
        .sinks
        .iter()
        .map(|entry| {
            PendingSink::from_sink(
                entry.name.clone(),
                WorkItemSink::new(config.sinks.clone()),
                cancel.clone(),
            )
        })
        .collect()
}

/// The pull request feed, when `[pull_requests]` is configured.
pub fn build_feeds(config: &Config) -> Vec<Arc<dyn Feed>> {
    config
        .pull_requests
        .iter()
        .map(|pr| Arc::new(PullRequestFeed::new(pr)) as Arc<dyn Feed>)
        .collect()
}
