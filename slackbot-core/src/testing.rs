// ABOUTME: Test doubles for the pipeline: recording sender/reporter and scripted sinks.
// ABOUTME: Used by this crate's tests and by the root crate's end-to-end tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, ErrorSource};
use crate::message::Message;
use crate::reporter::ErrorReporter;
use crate::traits::{MessageSender, Sink, SinkResult};

// =============================================================================
// Recording sender
// =============================================================================

/// Captures every message passed to `send`.
#[derive(Clone, Default)]
pub struct RecordingSender {
    sent: Arc<Mutex<Vec<Message>>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, message: Message, _cancel: &CancellationToken) -> Result<(), ClientError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

// =============================================================================
// Recording reporter
// =============================================================================

/// Captures every reported error as `(source, rendered error)`.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    entries: Arc<Mutex<Vec<(ErrorSource, String)>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(ErrorSource, String)> {
        self.entries.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, source: ErrorSource, error: &anyhow::Error) {
        self.entries.lock().unwrap().push((source, error.to_string()));
    }
}

// =============================================================================
// Scripted sink
// =============================================================================

#[derive(Clone)]
enum Behavior {
    Return(SinkResult),
    Fail(String),
    /// Reply with the given text when the message text equals `trigger`
    Reply { trigger: String, reply: String },
}

/// A sink with fixed behavior that counts its invocations.
#[derive(Clone)]
pub struct ScriptedSink {
    behavior: Behavior,
    init_error: Option<String>,
    initialized_as: Arc<Mutex<Option<String>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSink {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            init_error: None,
            initialized_as: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always returns `result`.
    pub fn returning(result: SinkResult) -> Self {
        Self::with_behavior(Behavior::Return(result))
    }

    /// Always fails processing with `error`.
    pub fn failing(error: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Fail(error.into()))
    }

    /// Replies `reply` and completes when the text is exactly `trigger`.
    pub fn echo(trigger: impl Into<String>, reply: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Reply {
            trigger: trigger.into(),
            reply: reply.into(),
        })
    }

    /// Make `initialize` fail with `error`.
    pub fn failing_init(mut self, error: impl Into<String>) -> Self {
        self.init_error = Some(error.into());
        self
    }

    /// How many times `process_message` ran (shared across clones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The name passed to `initialize`, if it ran.
    pub fn initialized_as(&self) -> Option<String> {
        self.initialized_as.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for ScriptedSink {
    async fn initialize(&mut self, name: &str, _cancel: &CancellationToken) -> Result<()> {
        if let Some(ref err) = self.init_error {
            return Err(anyhow!("{}", err));
        }
        *self.initialized_as.lock().unwrap() = Some(name.to_string());
        Ok(())
    }

    async fn process_message(
        &self,
        sender: &dyn MessageSender,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<SinkResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Return(result) => Ok(*result),
            Behavior::Fail(err) => Err(anyhow!("{}", err)),
            Behavior::Reply { trigger, reply } => {
                if message.text != *trigger {
                    return Ok(SinkResult::Continue);
                }
                sender.send(message.create_reply(reply.clone()), cancel).await?;
                Ok(SinkResult::Complete)
            }
        }
    }
}
