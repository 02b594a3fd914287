// ABOUTME: Platform-agnostic core for the chat bot runtime
// ABOUTME: Message types, connection states, sink pipeline, error channel, and configuration

pub mod config;
pub mod error;
pub mod message;
pub mod paths;
pub mod pipeline;
pub mod reporter;
pub mod state;
pub mod testing;
pub mod traits;

pub use error::{ClientError, ErrorSource};
pub use message::{Attachment, AttachmentField, Message, MessageSubtype};
pub use pipeline::{DispatchOutcome, PendingSink, SinkPipeline};
pub use reporter::{ErrorReporter, LogReporter};
pub use state::{ClientEvent, ClientObserver, ConnectionState};
pub use traits::{Feed, MessageSender, Sink, SinkResult};
