// ABOUTME: Root library: real-time client, reconnect supervisor, bot service, and integrations.
// ABOUTME: Platform-agnostic types (messages, sinks, config) live in slackbot-core.

pub mod logging;
pub mod rtm;
pub mod service;
pub mod supervisor;

#[cfg(feature = "tfs")]
pub mod tfs;

pub use slackbot_core::config;
pub use slackbot_core::paths;
