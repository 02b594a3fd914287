// ABOUTME: Ordered sink pipeline -- offers each user message to sinks until one completes it.
// ABOUTME: Sink failures (initialization or processing) are reported and isolated from the other sinks.

use std::sync::Arc;

use futures_util::future::{join_all, BoxFuture};
use tokio_util::sync::CancellationToken;

use crate::error::ErrorSource;
use crate::message::Message;
use crate::reporter::ErrorReporter;
use crate::traits::{MessageSender, Sink, SinkResult};

/// A named sink whose initialization has not finished yet.
pub struct PendingSink {
    name: String,
    init: BoxFuture<'static, anyhow::Result<Arc<dyn Sink>>>,
}

impl PendingSink {
    /// Wrap an arbitrary initialization future.
    pub fn new(
        name: impl Into<String>,
        init: BoxFuture<'static, anyhow::Result<Arc<dyn Sink>>>,
    ) -> Self {
        Self {
            name: name.into(),
            init,
        }
    }

    /// Schedule `sink.initialize(name, cancel)` for an uninitialized sink.
    pub fn from_sink<S>(name: impl Into<String>, mut sink: S, cancel: CancellationToken) -> Self
    where
        S: Sink + 'static,
    {
        let name = name.into();
        let init_name = name.clone();
        Self::new(
            name,
            Box::pin(async move {
                sink.initialize(&init_name, &cancel).await?;
                Ok(Arc::new(sink) as Arc<dyn Sink>)
            }),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// How a dispatched message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Filtered out before reaching any sink (bot/system subtype or hidden)
    Skipped,
    /// The named sink returned `Complete`
    Handled { sink: String },
    /// Every sink returned `Continue` (or failed)
    Unhandled,
}

/// Ordered, fixed list of initialized sinks.
pub struct SinkPipeline {
    sinks: Vec<(String, Arc<dyn Sink>)>,
    reporter: Arc<dyn ErrorReporter>,
}

impl SinkPipeline {
    /// Build a pipeline from sinks that are already initialized.
    pub fn new(sinks: Vec<(String, Arc<dyn Sink>)>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { sinks, reporter }
    }

    /// Await every pending initialization and keep the ones that succeeded.
    ///
    /// Initializations run concurrently; registration order is preserved.
    pub async fn initialize(pending: Vec<PendingSink>, reporter: Arc<dyn ErrorReporter>) -> Self {
        let (names, inits): (Vec<String>, Vec<_>) =
            pending.into_iter().map(|p| (p.name, p.init)).unzip();

        let results = join_all(inits).await;

        let mut sinks = Vec::with_capacity(names.len());
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(sink) => {
                    tracing::info!(sink = %name, "Sink initialized");
                    sinks.push((name, sink));
                }
                Err(e) => {
                    reporter.report(ErrorSource::SinkInitialization { sink: name }, &e);
                }
            }
        }

        tracing::info!(active = sinks.len(), "Sink pipeline ready");
        Self::new(sinks, reporter)
    }

    /// Registered sink names in dispatch order.
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Offer `message` to each sink in order until one completes it.
    pub async fn dispatch(
        &self,
        sender: &dyn MessageSender,
        message: &Message,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        if !message.is_from_user() {
            tracing::trace!(
                channel = %message.channel,
                subtype = %message.subtype.as_str(),
                hidden = message.hidden,
                "Skipping non-user message"
            );
            return DispatchOutcome::Skipped;
        }

        for (name, sink) in &self.sinks {
            if cancel.is_cancelled() {
                break;
            }
            match sink.process_message(sender, message, cancel).await {
                Ok(SinkResult::Complete) => {
                    tracing::debug!(sink = %name, channel = %message.channel, "Message handled");
                    return DispatchOutcome::Handled { sink: name.clone() };
                }
                Ok(SinkResult::Continue) => {}
                Err(e) => {
                    self.reporter
                        .report(ErrorSource::SinkProcessing { sink: name.clone() }, &e);
                }
            }
        }

        DispatchOutcome::Unhandled
    }
}
