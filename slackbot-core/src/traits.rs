// ABOUTME: Core traits for pluggable message handling
// ABOUTME: MessageSender (outbound capability), Sink (inbound handler), Feed (periodic producer)

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::message::Message;

// =============================================================================
// Outbound capability
// =============================================================================

/// Anything that can post a message to the platform.
///
/// Sinks receive this instead of the concrete client so they can be tested
/// against a recording double.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: Message, cancel: &CancellationToken) -> Result<(), ClientError>;
}

// =============================================================================
// Sinks
// =============================================================================

/// Outcome of offering a message to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkResult {
    /// Not handled here; try the next sink
    Continue,
    /// Handled; stop the pipeline
    Complete,
}

/// A pluggable inbound message handler.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Prepare the sink. `name` is the configuration key it was registered under.
    async fn initialize(&mut self, name: &str, cancel: &CancellationToken) -> Result<()>;

    /// Inspect a qualifying message and optionally answer it through `sender`.
    async fn process_message(
        &self,
        sender: &dyn MessageSender,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<SinkResult>;
}

// =============================================================================
// Feeds
// =============================================================================

/// Produces zero or more outbound messages on a fixed interval.
#[async_trait]
pub trait Feed: Send + Sync {
    /// Name used in logs and error reports
    fn name(&self) -> &str;

    /// Time between polls
    fn interval(&self) -> Duration;

    /// Fetch whatever should be announced since the previous poll.
    async fn poll(&self, cancel: &CancellationToken) -> Result<Vec<Message>>;
}
