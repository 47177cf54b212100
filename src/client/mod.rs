//! REST client for match data

mod matches;

pub use matches::{MatchClient, MatchRefresher};
