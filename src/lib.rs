//! # matchfeed-rs
//!
//! A resilient client for live match commentary streams.
//!
//! This library subscribes to the push feed of a single live match and keeps
//! a consistent local view of it:
//! - Typed decoding of the tagged event protocol
//! - One subscription per manager, with linear-backoff reconnection and an
//!   attempt limit
//! - A bounded, most-recent-first commentary history
//! - Strictly ordered, non-overlapping narration audio playback
//! - Per-match sessions publishing immutable snapshots
//!
//! ## Features
//!
//! - **Transports**: server-sent events (default) or WebSocket
//! - **Deterministic state machine**: reconnect logic is pure and timer-free
//! - **Proper Error Handling**: No panics, malformed payloads never end a stream
//! - **Audio**: pluggable clip players, with a `rodio` backend behind the
//!   `rodio` feature
//!

// Public modules
pub mod audio;
pub mod client;
pub mod commentary;
pub mod config;
pub mod error;
pub mod session;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use config::{StreamConfig, TransportKind};
pub use error::{Error, Result};
pub use types::{
    CommentaryId, CommentaryItem, ConnectionState, EventType, LastScore, MatchId, Priority, Score,
    Severity, StreamEvent,
};

// Re-export the main entry points
pub use audio::AudioPlaybackQueue;
pub use client::{MatchClient, MatchRefresher};
pub use commentary::CommentaryBuffer;
pub use session::{CommentaryStream, StreamSnapshot};
pub use stream::{ConnectionManager, EventCodec};
