// ABOUTME: Real-time connection manager: handshake, transport lifecycle, and the connection state machine.
// ABOUTME: Raises ordered state/message events to observers and gates outbound sends on the Established state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use slackbot_core::{ClientError, ClientEvent, ClientObserver, ConnectionState, Message, MessageSender};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::api::RtmApi;
use super::frame::InboundFrame;
use super::transport::{Transport, TransportConnection, TransportSession};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The transport session owned while connected, tagged with the connection it belongs to.
struct ActiveSession {
    generation: u64,
    session: Box<dyn TransportSession>,
}

/// The Open call currently allowed to install a session.
struct Attempt {
    id: u64,
    cancel: CancellationToken,
}

struct Inner {
    api: Arc<dyn RtmApi>,
    transport: Arc<dyn Transport>,
    // Lock order: attempt -> session -> transitions -> state
    attempt: Mutex<Option<Attempt>>,
    session: Mutex<Option<ActiveSession>>,
    // Held across update and notify so events arrive in transition order
    transitions: Mutex<()>,
    // Only ever held briefly, never while observers run
    state: Mutex<ConnectionState>,
    token: RwLock<Option<String>>,
    self_id: RwLock<Option<String>>,
    observers: RwLock<Vec<Arc<dyn ClientObserver>>>,
    next_id: AtomicU64,
    disposed: AtomicBool,
}

/// Connection manager for the real-time messaging API.
///
/// Cheap to clone; clones share the same connection. Observers are invoked
/// synchronously on the task that caused the event, in transition order. They
/// may read `state()` and `self_id()` or call `send()`, which see the new
/// state; opening or closing must be handed off to another task.
#[derive(Clone)]
pub struct RtmClient {
    inner: Arc<Inner>,
}

impl RtmClient {
    pub fn new(api: Arc<dyn RtmApi>, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                transport,
                attempt: Mutex::new(None),
                session: Mutex::new(None),
                transitions: Mutex::new(()),
                state: Mutex::new(ConnectionState::Disconnected),
                token: RwLock::new(None),
                self_id: RwLock::new(None),
                observers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Register an observer for state and message events.
    pub fn subscribe(&self, observer: Arc<dyn ClientObserver>) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    /// Identity assigned by the last successful handshake.
    pub fn self_id(&self) -> Option<String> {
        self.inner
            .self_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ensure_not_disposed(&self) -> Result<(), ClientError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            Err(ClientError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Handshake and open the transport.
    ///
    /// Returns once the transport is open (state `Connected`); the state moves
    /// to `Established` when the platform's `hello` frame arrives. Any failure
    /// leaves the state `Disconnected`.
    pub async fn open(&self, token: &str, cancel: &CancellationToken) -> Result<(), ClientError> {
        self.ensure_not_disposed()?;

        let attempt = {
            let mut slot = lock(&self.inner.attempt);
            self.inner
                .transition_if(|s| s == ConnectionState::Disconnected, ConnectionState::Connecting)
                .map_err(|actual| ClientError::InvalidState {
                    expected: ConnectionState::Disconnected,
                    actual,
                })?;
            let attempt = Attempt {
                id: self.inner.next_id.fetch_add(1, Ordering::SeqCst),
                cancel: cancel.child_token(),
            };
            let handle = (attempt.id, attempt.cancel.clone());
            *slot = Some(attempt);
            handle
        };

        *self
            .inner
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());

        let result = self.connect(token, attempt.0, &attempt.1).await;

        if let Err(ref e) = result {
            tracing::warn!(error = %e, "Failed to open connection");
            let slot = lock(&self.inner.attempt);
            if matches!(slot.as_ref(), Some(a) if a.id == attempt.0) {
                let _ = self
                    .inner
                    .transition_if(|s| s == ConnectionState::Connecting, ConnectionState::Disconnected);
            }
        }

        result
    }

    async fn connect(
        &self,
        token: &str,
        attempt_id: u64,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let handshake = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            result = self.inner.api.start(token) => result?,
        };

        tracing::info!(
            self_id = %handshake.self_id,
            channels = handshake.channels.len(),
            "Handshake complete, opening transport"
        );

        let TransportConnection { session, frames } = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            result = self.inner.transport.open(&handshake.url) => result.map_err(|e| match e {
                ClientError::Transport(reason) => ClientError::Handshake { reason },
                other => other,
            })?,
        };

        *self
            .inner
            .self_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handshake.self_id);

        // Install only if this attempt still owns the connection; a Close that
        // raced us has taken the attempt slot and cancelled it.
        let generation = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let installed = {
            let attempt = lock(&self.inner.attempt);
            let owned = matches!(attempt.as_ref(), Some(a) if a.id == attempt_id)
                && !cancel.is_cancelled();
            let mut slot = lock(&self.inner.session);
            if owned
                && self
                    .inner
                    .transition_if(|s| s == ConnectionState::Connecting, ConnectionState::Connected)
                    .is_ok()
            {
                Ok(slot.replace(ActiveSession {
                    generation,
                    session,
                }))
            } else {
                Err(session)
            }
        };

        match installed {
            Ok(Some(stale)) => release(stale.session).await,
            Ok(None) => {}
            Err(session) => {
                release(session).await;
                return Err(ClientError::Cancelled);
            }
        }

        tokio::spawn(pump_frames(Arc::clone(&self.inner), generation, frames));

        // A Close that landed after the install already took and released
        // the session; report the attempt as cancelled rather than open.
        if !matches!(lock(&self.inner.attempt).as_ref(), Some(a) if a.id == attempt_id) {
            return Err(ClientError::Cancelled);
        }

        tracing::info!("Transport open, waiting for hello");
        Ok(())
    }

    /// Publish a message. Requires the `Established` state.
    pub async fn send(&self, message: Message, cancel: &CancellationToken) -> Result<(), ClientError> {
        self.ensure_not_disposed()?;

        let state = self.state();
        if state != ConnectionState::Established {
            return Err(ClientError::InvalidState {
                expected: ConnectionState::Established,
                actual: state,
            });
        }

        let token = self
            .inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClientError::InvalidState {
                expected: ConnectionState::Established,
                actual: state,
            })?;

        tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.inner.api.post_message(&token, &message) => result,
        }
    }

    /// Release the transport and return to `Disconnected`. No-op when not connected.
    pub async fn close(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        if let Some(attempt) = lock(&self.inner.attempt).take() {
            attempt.cancel.cancel();
        }

        let active = lock(&self.inner.session).take();

        if self
            .inner
            .transition_if(ConnectionState::is_active, ConnectionState::Disconnecting)
            .is_err()
        {
            if let Some(active) = active {
                release(active.session).await;
            }
            return Ok(());
        }

        if let Some(active) = active {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Close cancelled, dropping transport without waiting");
                }
                _ = release(active.session) => {}
            }
        }

        self.inner.transition(ConnectionState::Disconnected);
        Ok(())
    }

    /// Close the connection and refuse all further operations.
    pub async fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        let _ = self.close(&CancellationToken::new()).await;
    }
}

#[async_trait]
impl MessageSender for RtmClient {
    async fn send(&self, message: Message, cancel: &CancellationToken) -> Result<(), ClientError> {
        RtmClient::send(self, message, cancel).await
    }
}

impl Inner {
    /// Move to `to` if `allowed(current)`, then notify observers.
    ///
    /// Returns the previous state, or the current one when not allowed. A
    /// transition to the current state raises no event.
    fn transition_if(
        &self,
        allowed: impl FnOnce(ConnectionState) -> bool,
        to: ConnectionState,
    ) -> Result<ConnectionState, ConnectionState> {
        let _serial = lock(&self.transitions);
        let current = {
            let mut state = lock(&self.state);
            let current = *state;
            if !allowed(current) {
                return Err(current);
            }
            *state = to;
            current
        };
        if current != to {
            tracing::debug!(from = %current, to = %to, "Connection state changed");
            self.notify(&ClientEvent::StateChanged(to));
        }
        Ok(current)
    }

    fn transition(&self, to: ConnectionState) {
        let _ = self.transition_if(|_| true, to);
    }

    fn notify(&self, event: &ClientEvent) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            observer.on_event(event);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        matches!(lock(&self.session).as_ref(), Some(s) if s.generation == generation)
    }

    fn handle_frame(&self, generation: u64, raw: &str) {
        match InboundFrame::parse(raw) {
            Ok(InboundFrame::Hello) => {
                let slot = lock(&self.session);
                if matches!(slot.as_ref(), Some(s) if s.generation == generation) {
                    let _ = self.transition_if(
                        |s| s == ConnectionState::Connected,
                        ConnectionState::Established,
                    );
                }
            }
            Ok(InboundFrame::Message(message)) => {
                if self.is_current(generation) {
                    self.notify(&ClientEvent::MessageReceived(message));
                }
            }
            Ok(InboundFrame::Ignored(kind)) => {
                tracing::trace!(kind = %kind, "Ignoring frame");
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring undecodable frame");
            }
        }
    }

    /// The frame stream for `generation` ended.
    async fn transport_closed(&self, generation: u64) {
        let active = {
            let mut slot = lock(&self.session);
            match slot.as_ref() {
                Some(s) if s.generation == generation => slot.take(),
                _ => None,
            }
        };

        // Closed locally, or superseded by a newer connection
        let Some(active) = active else {
            return;
        };

        tracing::warn!("Connection lost");
        release(active.session).await;
        let _ = self.transition_if(ConnectionState::is_active, ConnectionState::Disconnected);
    }
}

/// Process frames strictly in arrival order until the transport goes away.
async fn pump_frames(inner: Arc<Inner>, generation: u64, mut frames: mpsc::Receiver<String>) {
    while let Some(raw) = frames.recv().await {
        inner.handle_frame(generation, &raw);
    }
    inner.transport_closed(generation).await;
}

/// Close a transport session; failures are logged and swallowed.
async fn release(session: Box<dyn TransportSession>) {
    if let Err(e) = session.close().await {
        tracing::debug!(error = %e, "Transport close failed, ignoring");
    }
}
