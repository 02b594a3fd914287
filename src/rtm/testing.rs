// ABOUTME: In-memory doubles for the rtm seams: a scripted Web API and a channel-backed transport.
// ABOUTME: Lets tests drive handshakes, inbound frames, and remote disconnects without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use slackbot_core::{ClientError, ClientEvent, ConnectionState, Message};
use tokio::sync::{mpsc, Semaphore};

use super::api::{Handshake, RtmApi};
use super::client::RtmClient;
use super::transport::{Transport, TransportConnection, TransportSession};

pub const HELLO: &str = r#"{"type":"hello"}"#;

/// A plain user message frame.
pub fn message_frame(channel: &str, user: &str, text: &str) -> String {
    serde_json::json!({
        "type": "message",
        "channel": channel,
        "user": user,
        "text": text,
    })
    .to_string()
}

/// A handshake pointing at an in-memory URL.
pub fn handshake(self_id: &str) -> Handshake {
    Handshake {
        url: format!("mem://{}", self_id),
        self_id: self_id.to_string(),
        channels: Vec::new(),
    }
}

// =============================================================================
// Scripted API
// =============================================================================

/// `RtmApi` that replays queued handshake outcomes and records posts.
///
/// Once the queue is empty every handshake succeeds.
#[derive(Clone, Default)]
pub struct ScriptedApi {
    handshakes: Arc<Mutex<VecDeque<Result<Handshake, String>>>>,
    attempts: Arc<AtomicUsize>,
    posts: Arc<Mutex<Vec<Message>>>,
    post_error: Arc<Mutex<Option<String>>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handshakes block until `release_handshake` is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Queue a rejected handshake with the given reason.
    pub fn fail_handshake(self, reason: impl Into<String>) -> Self {
        self.handshakes.lock().unwrap().push_back(Err(reason.into()));
        self
    }

    /// Queue a successful handshake.
    pub fn succeed_handshake(self, handshake: Handshake) -> Self {
        self.handshakes.lock().unwrap().push_back(Ok(handshake));
        self
    }

    /// Reject every post with `reason`.
    pub fn reject_posts(self, reason: impl Into<String>) -> Self {
        *self.post_error.lock().unwrap() = Some(reason.into());
        self
    }

    /// Let one gated handshake proceed.
    pub fn release_handshake(&self) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(1);
        }
    }

    /// Handshakes started so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> Vec<Message> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RtmApi for ScriptedApi {
    async fn start(&self, _token: &str) -> Result<Handshake, ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(ref gate) = self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| ClientError::handshake(e.to_string()))?;
            permit.forget();
        }

        let next = self.handshakes.lock().unwrap().pop_front();
        match next {
            Some(Ok(handshake)) => Ok(handshake),
            Some(Err(reason)) => Err(ClientError::handshake(reason)),
            None => Ok(handshake("U0BOT")),
        }
    }

    async fn post_message(&self, _token: &str, message: &Message) -> Result<(), ClientError> {
        if let Some(reason) = self.post_error.lock().unwrap().clone() {
            return Err(ClientError::send_rejected(reason));
        }
        self.posts.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// =============================================================================
// Channel transport
// =============================================================================

type Remote = Arc<Mutex<Option<mpsc::Sender<String>>>>;

/// `Transport` whose connections are in-memory channels.
///
/// The test side plays the remote end: `push` delivers a frame on the newest
/// connection and `drop_remote` simulates the server going away.
#[derive(Clone, Default)]
pub struct ChannelTransport {
    remotes: Arc<Mutex<Vec<Remote>>>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    failing_opens: Arc<AtomicUsize>,
    auto_hello: Arc<AtomicBool>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a hello frame as soon as each connection opens.
    pub fn with_auto_hello(self) -> Self {
        self.auto_hello.store(true, Ordering::SeqCst);
        self
    }

    /// Make the next `count` opens fail.
    pub fn fail_opens(self, count: usize) -> Self {
        self.failing_opens.store(count, Ordering::SeqCst);
        self
    }

    fn latest(&self) -> Option<mpsc::Sender<String>> {
        self.remotes
            .lock()
            .unwrap()
            .last()
            .and_then(|remote| remote.lock().unwrap().clone())
    }

    /// Send a frame from the remote side of the newest connection.
    ///
    /// Returns false when that connection is already gone.
    pub async fn push(&self, frame: impl Into<String>) -> bool {
        match self.latest() {
            Some(tx) => tx.send(frame.into()).await.is_ok(),
            None => false,
        }
    }

    /// Close the newest connection from the remote side.
    pub fn drop_remote(&self) {
        if let Some(remote) = self.remotes.lock().unwrap().last() {
            remote.lock().unwrap().take();
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn open(&self, _url: &str) -> Result<TransportConnection, ClientError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClientError::Transport("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        if self.auto_hello.load(Ordering::SeqCst) {
            let _ = tx.try_send(HELLO.to_string());
        }

        let remote: Remote = Arc::new(Mutex::new(Some(tx)));
        self.remotes.lock().unwrap().push(Arc::clone(&remote));

        Ok(TransportConnection {
            session: Box::new(ChannelSession {
                remote,
                closes: Arc::clone(&self.closes),
            }),
            frames: rx,
        })
    }
}

struct ChannelSession {
    remote: Remote,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl TransportSession for ChannelSession {
    async fn close(self: Box<Self>) -> Result<(), ClientError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.remote.lock().unwrap().take();
        Ok(())
    }
}

// =============================================================================
// Observation helpers
// =============================================================================

/// Subscribe to `client` and collect every event it raises.
pub fn record_events(client: &RtmClient) -> Arc<Mutex<Vec<ClientEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    client.subscribe(Arc::new(move |event: &ClientEvent| {
        sink.lock().unwrap().push(event.clone());
    }));
    events
}

/// State changes among recorded events, in order.
pub fn states(events: &Mutex<Vec<ClientEvent>>) -> Vec<ConnectionState> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            ClientEvent::StateChanged(state) => Some(*state),
            ClientEvent::MessageReceived(_) => None,
        })
        .collect()
}

/// Poll until `client` reaches `state`; false after `timeout`.
pub async fn wait_for_state(client: &RtmClient, state: ConnectionState, timeout: Duration) -> bool {
    let polled = tokio::time::timeout(timeout, async {
        while client.state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    polled.is_ok()
}
