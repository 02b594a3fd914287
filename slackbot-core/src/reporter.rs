// ABOUTME: Error channel that receives every caught failure from sinks, feeds, and the connection.
// ABOUTME: LogReporter writes to tracing and, in console mode, echoes to stderr.

/// Sink for `(source, error)` pairs.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, source: crate::ErrorSource, error: &anyhow::Error);
}

/// Default reporter backed by `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogReporter {
    console: bool,
}

impl LogReporter {
    pub fn new(console: bool) -> Self {
        Self { console }
    }
}

impl ErrorReporter for LogReporter {
    fn report(&self, source: crate::ErrorSource, error: &anyhow::Error) {
        tracing::error!(source = %source, error = %format!("{:#}", error), "Error reported");
        if self.console {
            eprintln!("[{}] {:?}", source, error);
        }
    }
}
