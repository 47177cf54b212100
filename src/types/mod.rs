mod commentary;
mod enums;
mod event;
mod primitives;
pub(crate) mod serde_helpers;

// Re-export all types
pub use commentary::*;
pub use enums::*;
pub use event::*;
pub use primitives::*;
