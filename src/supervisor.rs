// ABOUTME: Keeps the real-time connection alive: every disconnect while running schedules a reopen.
// ABOUTME: Fixed delay between attempts, unbounded retries, failures go to the error reporter.

use std::sync::Arc;
use std::time::Duration;

use slackbot_core::{ClientEvent, ConnectionState, ErrorReporter, ErrorSource};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::rtm::RtmClient;

/// Reopens the connection after each unexpected disconnect.
///
/// "Running" is the shutdown token not yet being cancelled. Cancel it before
/// closing the client so the resulting `Disconnected` is not retried.
pub struct ReconnectSupervisor {
    task: JoinHandle<()>,
}

impl ReconnectSupervisor {
    /// Subscribe to `client` and start the reconnect loop.
    pub fn spawn(
        client: RtmClient,
        token: String,
        delay: Duration,
        reporter: Arc<dyn ErrorReporter>,
        console: bool,
        shutdown: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        client.subscribe(Arc::new(move |event: &ClientEvent| {
            if let ClientEvent::StateChanged(state) = event {
                let _ = tx.send(*state);
            }
        }));

        let task = tokio::spawn(run(client, token, delay, reporter, console, shutdown, rx));
        Self { task }
    }

    /// Wait for the loop to exit after shutdown.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Reconnect supervisor task failed");
        }
    }
}

async fn run(
    client: RtmClient,
    token: String,
    delay: Duration,
    reporter: Arc<dyn ErrorReporter>,
    console: bool,
    shutdown: CancellationToken,
    mut states: mpsc::UnboundedReceiver<ConnectionState>,
) {
    loop {
        let state = tokio::select! {
            _ = shutdown.cancelled() => break,
            state = states.recv() => match state {
                Some(state) => state,
                None => break,
            },
        };

        match state {
            ConnectionState::Established => {
                tracing::info!("Connected");
                if console {
                    println!("Connected");
                }
            }
            ConnectionState::Disconnected => {
                tracing::info!(delay_secs = delay.as_secs(), "Disconnected, reconnecting after delay");
                if console {
                    println!("Disconnected, reconnecting in {}s", delay.as_secs());
                }

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                // A failed open raises Disconnected again, which lands back here
                if let Err(e) = client.open(&token, &shutdown).await {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    reporter.report(ErrorSource::Connection, &anyhow::Error::new(e));
                }
            }
            _ => {}
        }
    }

    tracing::debug!("Reconnect supervisor stopped");
}
