// ABOUTME: Real-time messaging client: Web API handshake, websocket transport, and connection manager.
// ABOUTME: The testing submodule provides in-memory doubles for the API and transport seams.

pub mod api;
pub mod client;
pub mod frame;
pub mod testing;
pub mod transport;

pub use api::{ChannelInfo, Handshake, HttpRtmApi, RtmApi};
pub use client::RtmClient;
pub use frame::InboundFrame;
pub use transport::{Transport, TransportConnection, TransportSession, WebSocketTransport};
