//! # Skein View State
//!
//! Bounded per-document cache of cursor position and scroll offsets, used to
//! restore context when a document regains focus.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use document::{DocumentId, TextPosition};

/// Default number of documents remembered.
pub const DEFAULT_CAPACITY: usize = 200;

/// Cached view state for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    /// Last cursor position
    pub cursor: TextPosition,
    /// Vertical scroll offset in pixels
    pub scroll_top: f64,
    /// Horizontal scroll offset in pixels
    pub scroll_left: f64,
}

/// View state cache
pub struct ViewStateCache {
    inner: RwLock<Inner>,
    capacity: usize,
}

struct Inner {
    entries: HashMap<DocumentId, ViewState>,
    /// Insertion order, oldest first. Not reordered on writes.
    order: VecDeque<DocumentId>,
}

impl ViewStateCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Record the cursor position for a document.
    ///
    /// No-op when the cached value is already equal, so rapid-fire cursor
    /// events don't churn the cache.
    pub fn set_cursor(&self, id: DocumentId, cursor: TextPosition) {
        let mut inner = self.inner.write();

        if let Some(state) = inner.entries.get_mut(&id) {
            if state.cursor == cursor {
                return;
            }
            state.cursor = cursor;
            return;
        }

        inner.insert(id, ViewState { cursor, ..Default::default() }, self.capacity);
    }

    /// Record the scroll offsets for a document.
    pub fn set_scroll(&self, id: DocumentId, top: f64, left: f64) {
        let mut inner = self.inner.write();

        if let Some(state) = inner.entries.get_mut(&id) {
            if state.scroll_top == top && state.scroll_left == left {
                return;
            }
            state.scroll_top = top;
            state.scroll_left = left;
            return;
        }

        inner.insert(
            id,
            ViewState { scroll_top: top, scroll_left: left, ..Default::default() },
            self.capacity,
        );
    }

    /// Get a copy of the cached state, or absent.
    pub fn get(&self, id: DocumentId) -> Option<ViewState> {
        self.inner.read().entries.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Remove one document's state, or all of them.
    pub fn clear(&self, id: Option<DocumentId>) {
        let mut inner = self.inner.write();

        match id {
            Some(id) => {
                inner.entries.remove(&id);
                inner.order.retain(|d| *d != id);
            }
            None => {
                inner.entries.clear();
                inner.order.clear();
            }
        }
    }
}

impl Inner {
    /// Insert a fresh entry, evicting the oldest inserted key other than the
    /// one being written once capacity is exceeded.
    fn insert(&mut self, id: DocumentId, state: ViewState, capacity: usize) {
        self.entries.insert(id, state);
        self.order.push_back(id);

        while self.entries.len() > capacity {
            let Some(oldest) = self.order.iter().position(|d| *d != id) else {
                break;
            };
            let Some(evicted) = self.order.remove(oldest) else {
                break;
            };
            self.entries.remove(&evicted);
            tracing::trace!("evicted view state for {:?}", evicted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor_at(offset: usize) -> TextPosition {
        TextPosition::new(0, offset as u32, offset)
    }

    #[test]
    fn test_round_trip() {
        let cache = ViewStateCache::new(8);
        let doc = DocumentId(1);

        cache.set_cursor(doc, cursor_at(5));
        cache.set_scroll(doc, 120.0, 0.0);

        let state = cache.get(doc).unwrap();
        assert_eq!(state.cursor, cursor_at(5));
        assert_eq!(state.scroll_top, 120.0);
    }

    #[test]
    fn test_get_returns_copy() {
        let cache = ViewStateCache::new(8);
        let doc = DocumentId(1);
        cache.set_cursor(doc, cursor_at(3));

        let mut copy = cache.get(doc).unwrap();
        copy.scroll_top = 999.0;

        assert_eq!(cache.get(doc).unwrap().scroll_top, 0.0);
    }

    #[test]
    fn test_capacity_evicts_oldest_inserted() {
        let cache = ViewStateCache::new(2);
        let (a, b, c) = (DocumentId(1), DocumentId(2), DocumentId(3));

        cache.set_cursor(a, cursor_at(1));
        cache.set_cursor(b, cursor_at(2));
        // Updating `a` does not refresh its insertion slot
        cache.set_scroll(a, 40.0, 0.0);

        cache.set_cursor(c, cursor_at(3));

        assert!(cache.get(a).is_none());
        assert!(cache.get(b).is_some());
        assert!(cache.get(c).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_eviction_spares_key_being_written() {
        let cache = ViewStateCache::new(1);
        let (a, b) = (DocumentId(1), DocumentId(2));

        cache.set_cursor(a, cursor_at(1));
        cache.set_cursor(b, cursor_at(2));

        assert!(cache.get(a).is_none());
        assert!(cache.get(b).is_some());
    }

    #[test]
    fn test_identical_write_is_noop() {
        let cache = ViewStateCache::new(8);
        let doc = DocumentId(1);

        cache.set_cursor(doc, cursor_at(5));
        cache.set_scroll(doc, 10.0, 0.0);
        let before = cache.get(doc).unwrap();

        cache.set_cursor(doc, cursor_at(5));
        cache.set_scroll(doc, 10.0, 0.0);

        assert_eq!(cache.get(doc).unwrap(), before);
    }

    #[test]
    fn test_clear_one_and_all() {
        let cache = ViewStateCache::new(8);
        let (a, b) = (DocumentId(1), DocumentId(2));
        cache.set_cursor(a, cursor_at(1));
        cache.set_cursor(b, cursor_at(2));

        cache.clear(Some(a));
        assert!(cache.get(a).is_none());
        assert!(cache.get(b).is_some());

        cache.clear(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_state_serializes() {
        let state = ViewState { cursor: cursor_at(7), scroll_top: 33.5, scroll_left: 4.0 };
        let json = serde_json::to_string(&state).unwrap();
        let back: ViewState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
