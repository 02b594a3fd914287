// ABOUTME: HTTP side of the real-time messaging API: rtm.start handshake and chat.postMessage.
// ABOUTME: RtmApi is the seam the connection manager depends on; HttpRtmApi talks to the real Web API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use slackbot_core::{ClientError, Message};

/// Channel metadata returned by the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Websocket endpoint to open
    pub url: String,
    /// Identity assigned to this client
    pub self_id: String,
    pub channels: Vec<ChannelInfo>,
}

/// Web API calls the connection manager needs.
#[async_trait]
pub trait RtmApi: Send + Sync {
    /// Exchange a token for a websocket URL and identity.
    async fn start(&self, token: &str) -> Result<Handshake, ClientError>;

    /// Publish a message.
    async fn post_message(&self, token: &str, message: &Message) -> Result<(), ClientError>;
}

/// The platform reports `ok` as a JSON bool; older gateways sent the string "true".
fn response_ok(body: &Value) -> bool {
    match body.get("ok") {
        Some(Value::Bool(ok)) => *ok,
        Some(Value::String(ok)) => ok == "true",
        _ => false,
    }
}

fn response_error(body: &Value) -> String {
    body.get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string()
}

/// Parse a `rtm.start` response body.
pub fn parse_handshake(body: &Value) -> Result<Handshake, ClientError> {
    if !response_ok(body) {
        return Err(ClientError::handshake(response_error(body)));
    }

    let url = body
        .get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ClientError::handshake("handshake response missing url"))?
        .to_string();

    let self_id = body
        .get("self")
        .and_then(|s| s.get("id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let channels = match body.get("channels") {
        Some(raw) => serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Ignoring malformed channel list in handshake");
            Vec::new()
        }),
        None => Vec::new(),
    };

    Ok(Handshake {
        url,
        self_id,
        channels,
    })
}

/// Parse a `chat.postMessage` response body.
pub fn parse_post_response(body: &Value) -> Result<(), ClientError> {
    if response_ok(body) {
        Ok(())
    } else {
        Err(ClientError::send_rejected(response_error(body)))
    }
}

/// `RtmApi` over the Slack Web API.
#[derive(Clone)]
pub struct HttpRtmApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRtmApi {
    /// `base_url` is the Web API root, e.g. `https://slack.com/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }
}

#[async_trait]
impl RtmApi for HttpRtmApi {
    async fn start(&self, token: &str) -> Result<Handshake, ClientError> {
        let body: Value = self
            .client
            .get(self.endpoint("rtm.start"))
            .query(&[("token", token)])
            .send()
            .await
            .map_err(|e| ClientError::handshake(e.to_string()))?
            .json()
            .await
            .map_err(|e| ClientError::handshake(e.to_string()))?;

        parse_handshake(&body)
    }

    async fn post_message(&self, token: &str, message: &Message) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.endpoint("chat.postMessage"))
            .bearer_auth(token)
            .json(message)
            .send()
            .await
            .map_err(ClientError::transport)?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            ClientError::Transport(format!("chat.postMessage returned {}: {}", status, e))
        })?;

        parse_post_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_handshake_success() {
        let handshake = parse_handshake(&json!({
            "ok": true,
            "url": "wss://ms9.slack-msgs.com/websocket/abc",
            "self": {"id": "U0BOT", "name": "tfsbot"},
            "channels": [{"id": "C1", "name": "general"}, {"id": "C2"}]
        }))
        .unwrap();

        assert_eq!(handshake.url, "wss://ms9.slack-msgs.com/websocket/abc");
        assert_eq!(handshake.self_id, "U0BOT");
        assert_eq!(handshake.channels.len(), 2);
        assert_eq!(handshake.channels[1].name, "");
    }

    #[test]
    fn test_parse_handshake_accepts_string_ok() {
        let handshake =
            parse_handshake(&json!({"ok": "true", "url": "wss://x", "self": {"id": "U1"}}))
                .unwrap();
        assert_eq!(handshake.self_id, "U1");
    }

    #[test]
    fn test_parse_handshake_rejection_carries_reason() {
        let err = parse_handshake(&json!({"ok": false, "error": "invalid_auth"})).unwrap_err();
        assert!(matches!(err, ClientError::Handshake { ref reason } if reason == "invalid_auth"));
    }

    #[test]
    fn test_parse_handshake_missing_url() {
        let err = parse_handshake(&json!({"ok": true})).unwrap_err();
        assert!(matches!(err, ClientError::Handshake { .. }));
    }

    #[test]
    fn test_parse_post_response() {
        assert!(parse_post_response(&json!({"ok": true, "ts": "1.2"})).is_ok());
        let err = parse_post_response(&json!({"ok": false, "error": "channel_not_found"}))
            .unwrap_err();
        assert!(
            matches!(err, ClientError::SendRejected { ref reason } if reason == "channel_not_found")
        );
        let err = parse_post_response(&json!({})).unwrap_err();
        assert!(matches!(err, ClientError::SendRejected { ref reason } if reason == "unknown_error"));
    }
}
