//! Event stream subscription
//!
//! This module provides the push side of the client:
//! - Decoding stream payloads into [`StreamEvent`](crate::types::StreamEvent)s
//! - SSE and WebSocket transports behind the [`Transport`] seam
//! - A timer-free reconnect state machine with linear backoff
//! - [`ConnectionManager`], which owns a single live subscription

mod codec;
mod machine;
mod manager;
mod sse;
mod transport;

pub use codec::EventCodec;
pub use machine::{Directive, ReconnectMachine, ReconnectPolicy, ReconnectStatus, Signal};
pub use manager::{ConnectionManager, ErrorCallback, EventCallback, ListenerId, SubscriptionHandle};
pub use sse::{SseDecoder, SseMessage};
pub use transport::{transport_for, PayloadStream, SseTransport, Transport, WsTransport};
