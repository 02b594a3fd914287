// ABOUTME: Chat message and attachment value types shared by the client, sinks, and feeds.
// ABOUTME: Field names follow the platform wire format so the same type decodes frames and encodes posts.

use serde::{Deserialize, Serialize};

// =============================================================================
// Subtype
// =============================================================================

/// Message subtype as reported by the platform.
///
/// An absent `subtype` field on the wire means an ordinary user message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum MessageSubtype {
    /// Ordinary message typed by a user
    #[default]
    Message,
    /// Message posted through the bot mechanism (including our own posts)
    BotMessage,
    /// Any other system subtype (edits, joins, topic changes, ...)
    Other(String),
}

impl MessageSubtype {
    pub fn is_plain(&self) -> bool {
        matches!(self, Self::Message)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::BotMessage => "bot_message",
            Self::Other(other) => other,
        }
    }
}

impl From<Option<String>> for MessageSubtype {
    fn from(raw: Option<String>) -> Self {
        match raw.as_deref() {
            None | Some("") | Some("message") => Self::Message,
            Some("bot_message") => Self::BotMessage,
            Some(other) => Self::Other(other.to_string()),
        }
    }
}

impl From<MessageSubtype> for Option<String> {
    fn from(subtype: MessageSubtype) -> Self {
        match subtype {
            MessageSubtype::Message => None,
            other => Some(other.as_str().to_string()),
        }
    }
}

// =============================================================================
// Attachments
// =============================================================================

/// A name/value pair rendered inside an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    #[serde(default)]
    pub short: bool,
}

impl AttachmentField {
    pub fn new(title: impl Into<String>, value: impl Into<String>, short: bool) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short,
        }
    }
}

/// Rich content block attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attachment {
    /// Plain-text summary shown by clients that cannot render attachments
    pub fallback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
}

impl Attachment {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            fallback: fallback.into(),
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_title_link(mut self, link: impl Into<String>) -> Self {
        self.title_link = Some(link.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_field(mut self, field: AttachmentField) -> Self {
        self.fields.push(field);
        self
    }
}

// =============================================================================
// Message
// =============================================================================

/// A chat message, either received from the platform or about to be posted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Channel (conversation) identifier
    #[serde(default)]
    pub channel: String,
    /// Sender identifier; empty for outbound messages
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "MessageSubtype::is_plain")]
    pub subtype: MessageSubtype,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Platform timestamp, doubling as the message id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl Message {
    /// Build an outbound message for `channel`.
    pub fn new(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_subtype(mut self, subtype: MessageSubtype) -> Self {
        self.subtype = subtype;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Build a reply in the same channel (and thread, if this message was threaded).
    pub fn create_reply(&self, text: impl Into<String>) -> Self {
        Self {
            channel: self.channel.clone(),
            text: text.into(),
            thread_ts: self.thread_ts.clone(),
            ..Self::default()
        }
    }

    /// Build a reply carrying attachments.
    pub fn create_reply_with_attachments(
        &self,
        text: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Self {
        self.create_reply(text).with_attachments(attachments)
    }

    /// Whether this message is eligible for the sink pipeline.
    ///
    /// Bot-originated and system subtypes are excluded so a sink replying to a
    /// pattern can never trigger itself, and hidden messages are skipped.
    pub fn is_from_user(&self) -> bool {
        self.subtype.is_plain() && !self.hidden
    }
}

// =============================================================================
// Tests
// =============================================================================
