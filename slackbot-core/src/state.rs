// ABOUTME: Connection state machine values and the observer interface for client events.
// ABOUTME: Observers are called synchronously, in transition order, after the state field is updated.

use std::fmt;

use crate::message::Message;

/// Lifecycle of the real-time connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    /// Handshake in flight
    Connecting = 1,
    /// Transport open, waiting for the platform's `hello`
    Connected = 2,
    /// `hello` received; sends are allowed
    Established = 3,
    /// Transient state while the transport is being released
    Disconnecting = 4,
}

impl ConnectionState {
    /// Connecting, Connected, or Established.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Connected | Self::Established
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Established => "established",
            Self::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event raised by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The state changed; carries the post-transition value.
    StateChanged(ConnectionState),
    /// A message frame was received and decoded.
    MessageReceived(Message),
}

/// Receives client events on the task that raised them.
///
/// Implementations must not block. Reading the client's state is fine and
/// sees the new value; anything asynchronous, including reconnecting, should
/// be handed off (e.g. through a channel).
pub trait ClientObserver: Send + Sync {
    fn on_event(&self, event: &ClientEvent);
}

impl<F> ClientObserver for F
where
    F: Fn(&ClientEvent) + Send + Sync,
{
    fn on_event(&self, event: &ClientEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_active_states() {
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
        assert!(ConnectionState::Established.is_active());
        assert!(!ConnectionState::Disconnecting.is_active());
    }

    #[test]
    fn test_ordinals_follow_connection_progress() {
        assert!((ConnectionState::Disconnected as u8) < (ConnectionState::Connecting as u8));
        assert!((ConnectionState::Connecting as u8) < (ConnectionState::Connected as u8));
        assert!((ConnectionState::Connected as u8) < (ConnectionState::Established as u8));
    }

    #[test]
    fn test_closure_observer() {
        let seen = std::sync::Mutex::new(Vec::new());
        let observer = |event: &ClientEvent| {
            if let ClientEvent::StateChanged(state) = event {
                seen.lock().unwrap().push(*state);
            }
        };
        observer.on_event(&ClientEvent::StateChanged(ConnectionState::Connecting));
        assert_eq!(*seen.lock().unwrap(), vec![ConnectionState::Connecting]);
    }
}
