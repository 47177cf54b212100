//! Bounded commentary history.

use std::collections::VecDeque;

use crate::types::{CommentaryId, CommentaryItem};

/// Most-recent-first log of commentary items with a fixed capacity.
///
/// Pushing beyond capacity discards the oldest item. Score and wicket
/// updates are not stored here; see [`LastScore`](crate::types::LastScore).
#[derive(Debug, Clone)]
pub struct CommentaryBuffer {
    items: VecDeque<CommentaryItem>,
    capacity: usize,
    next_ordinal: u64,
}

impl CommentaryBuffer {
    pub const DEFAULT_CAPACITY: usize = 50;

    /// Create a buffer holding at most `capacity` items (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            next_ordinal: 0,
        }
    }

    /// Prepend an item, assigning a local id if it has none
    pub fn push(&mut self, mut item: CommentaryItem) -> &CommentaryItem {
        if item.id.is_none() {
            self.next_ordinal += 1;
            item.id = Some(CommentaryId::local(self.next_ordinal));
        }
        self.items.push_front(item);
        self.items.truncate(self.capacity);
        &self.items[0]
    }

    /// Most recently pushed item
    pub fn latest(&self) -> Option<&CommentaryItem> {
        self.items.front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items, newest first
    pub fn items(&self) -> impl Iterator<Item = &CommentaryItem> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<CommentaryItem> {
        self.items.iter().cloned().collect()
    }
}

impl Default for CommentaryBuffer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
