//! Narration audio.
//!
//! - [`AudioPlaybackQueue`]: strictly ordered, non-overlapping clip playback
//! - [`ClipPlayer`]: the seam to an actual audio output

mod player;
mod queue;

pub use player::{ClipPlayer, SilentPlayer};
pub use queue::AudioPlaybackQueue;

#[cfg(feature = "rodio")]
pub use player::RodioPlayer;
