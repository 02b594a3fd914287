// ABOUTME: Decoding of inbound real-time frames by their `type` tag.
// ABOUTME: Unknown types decode to Ignored so new platform events never break the client.

use serde::Deserialize;
use slackbot_core::Message;

/// An inbound frame after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Platform is ready; sends are now allowed
    Hello,
    /// A chat message
    Message(Message),
    /// Any other frame type (presence, typing, reconnect_url, ...)
    Ignored(String),
}

#[derive(Deserialize)]
struct FrameHeader {
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl InboundFrame {
    /// Decode a raw text frame.
    ///
    /// Fails only on malformed JSON or a `message` frame whose fields do not
    /// decode; frames without a type (e.g. send acknowledgements) are ignored.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let header = FrameHeader::deserialize(&value)?;

        match header.kind.as_deref() {
            Some("hello") => Ok(Self::Hello),
            Some("message") => Ok(Self::Message(Message::deserialize(value)?)),
            Some(other) => Ok(Self::Ignored(other.to_string())),
            None => Ok(Self::Ignored(String::new())),
        }
    }
}
