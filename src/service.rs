// ABOUTME: Bot service lifecycle: wires the client, sink pipeline, feeds, and reconnect supervisor together.
// ABOUTME: Each user message is dispatched on its own task; stop() shuts everything down and closes the client.

use std::sync::Arc;
use std::time::Duration;

use slackbot_core::config::SlackConfig;
use slackbot_core::{
    ClientEvent, ErrorReporter, ErrorSource, Feed, Message, PendingSink, SinkPipeline,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::rtm::RtmClient;
use crate::supervisor::ReconnectSupervisor;

/// Runtime settings for a service instance.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub token: String,
    pub reconnect_delay: Duration,
    /// Echo connection status and errors to the terminal
    pub console: bool,
}

impl ServiceSettings {
    pub fn from_config(slack: &SlackConfig, console: bool) -> Self {
        Self {
            token: slack.token.clone(),
            reconnect_delay: slack.reconnect_delay(),
            console,
        }
    }
}

/// A running bot.
pub struct BotService {
    client: RtmClient,
    shutdown: CancellationToken,
    supervisor: ReconnectSupervisor,
    dispatcher: JoinHandle<()>,
    feeds: Vec<JoinHandle<()>>,
}

impl BotService {
    /// Subscribe observers, open the connection, and start sink initialization and feeds.
    ///
    /// A failed initial open is reported and retried by the supervisor, so this
    /// never fails.
    pub async fn start(
        client: RtmClient,
        settings: ServiceSettings,
        sinks: Vec<PendingSink>,
        feeds: Vec<Arc<dyn Feed>>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let shutdown = CancellationToken::new();

        let (tx, rx) = mpsc::unbounded_channel();
        client.subscribe(Arc::new(move |event: &ClientEvent| {
            if let ClientEvent::MessageReceived(message) = event {
                let _ = tx.send(message.clone());
            }
        }));

        let supervisor = ReconnectSupervisor::spawn(
            client.clone(),
            settings.token.clone(),
            settings.reconnect_delay,
            Arc::clone(&reporter),
            settings.console,
            shutdown.clone(),
        );

        // Messages arriving before sink initialization finishes wait in the channel
        let dispatcher = tokio::spawn(dispatch_messages(
            client.clone(),
            sinks,
            Arc::clone(&reporter),
            shutdown.clone(),
            rx,
        ));

        let feeds = feeds
            .into_iter()
            .map(|feed| {
                tokio::spawn(run_feed(
                    client.clone(),
                    feed,
                    Arc::clone(&reporter),
                    shutdown.clone(),
                ))
            })
            .collect();

        tracing::info!("Starting bot service");
        if let Err(e) = client.open(&settings.token, &shutdown).await {
            reporter.report(ErrorSource::Connection, &anyhow::Error::new(e));
        }

        Self {
            client,
            shutdown,
            supervisor,
            dispatcher,
            feeds,
        }
    }

    pub fn client(&self) -> &RtmClient {
        &self.client
    }

    /// Stop reconnecting, cancel in-flight work, and close the connection.
    pub async fn stop(self) {
        tracing::info!("Stopping bot service");
        self.shutdown.cancel();

        if let Err(e) = self.client.close(&CancellationToken::new()).await {
            tracing::debug!(error = %e, "Close during shutdown failed");
        }

        self.supervisor.join().await;
        for handle in std::iter::once(self.dispatcher).chain(self.feeds) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Service task failed");
            }
        }
        tracing::info!("Bot service stopped");
    }
}

async fn dispatch_messages(
    client: RtmClient,
    sinks: Vec<PendingSink>,
    reporter: Arc<dyn ErrorReporter>,
    shutdown: CancellationToken,
    mut messages: mpsc::UnboundedReceiver<Message>,
) {
    let pipeline = tokio::select! {
        _ = shutdown.cancelled() => return,
        pipeline = SinkPipeline::initialize(sinks, reporter) => Arc::new(pipeline),
    };

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = messages.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        // One task per message so a slow sink doesn't hold up the next message
        let pipeline = Arc::clone(&pipeline);
        let client = client.clone();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            let outcome = pipeline.dispatch(&client, &message, &cancel).await;
            tracing::trace!(outcome = ?outcome, channel = %message.channel, "Message dispatched");
        });
    }
}

async fn run_feed(
    client: RtmClient,
    feed: Arc<dyn Feed>,
    reporter: Arc<dyn ErrorReporter>,
    shutdown: CancellationToken,
) {
    let period = feed.interval();
    let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(feed = %feed.name(), interval_secs = period.as_secs(), "Feed scheduled");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticks.tick() => {}
        }

        let polled = tokio::select! {
            _ = shutdown.cancelled() => break,
            polled = feed.poll(&shutdown) => polled,
        };

        let messages = match polled {
            Ok(messages) => messages,
            Err(e) => {
                reporter.report(
                    ErrorSource::Feed {
                        feed: feed.name().to_string(),
                    },
                    &e,
                );
                continue;
            }
        };

        for message in messages {
            if let Err(e) = client.send(message, &shutdown).await {
                reporter.report(
                    ErrorSource::Feed {
                        feed: feed.name().to_string(),
                    },
                    &anyhow::Error::new(e),
                );
            }
        }
    }
}
