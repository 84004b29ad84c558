//! # Skein Multi-Cursor
//!
//! Multiple independent edit points in one document, and the pure
//! transformation functions that apply a single user action across all of
//! them without corrupting offsets.

pub mod edit;

use serde::{Deserialize, Serialize};

use document::TextPosition;

pub use edit::{EditConfig, EditOp, apply_backspace, apply_edit, apply_insert};

/// Cursor ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorId(pub u64);

/// One independent edit point, with an optional attached selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub id: CursorId,
    pub position: TextPosition,
    pub selection: Option<SelectionRange>,
}

impl Cursor {
    pub fn new(id: CursorId, position: TextPosition) -> Self {
        Self { id, position, selection: None }
    }

    pub fn has_selection(&self) -> bool {
        self.selection.is_some()
    }
}

/// A selection attached to a cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: TextPosition,
    pub end: TextPosition,
}

impl SelectionRange {
    pub fn new(start: TextPosition, end: TextPosition) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start.offset == self.end.offset
    }

    pub fn is_reversed(&self) -> bool {
        self.start.offset > self.end.offset
    }

    pub fn normalized(&self) -> Self {
        if self.is_reversed() {
            Self { start: self.end, end: self.start }
        } else {
            self.clone()
        }
    }
}

/// The cursor set for one document.
///
/// Invariants: at least one cursor; exactly one is primary; no two cursors
/// share a position at insertion time (edits may later make positions
/// coincide, and such cursors are deliberately kept distinct).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiCursorState {
    cursors: Vec<Cursor>,
    primary: CursorId,
    next_id: u64,
}

impl MultiCursorState {
    /// A single primary cursor at the given position.
    pub fn single(position: TextPosition) -> Self {
        let id = CursorId(1);
        Self {
            cursors: vec![Cursor::new(id, position)],
            primary: id,
            next_id: 2,
        }
    }

    fn mint_id(&mut self) -> CursorId {
        let id = CursorId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn cursors(&self) -> &[Cursor] {
        &self.cursors
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_multi(&self) -> bool {
        self.cursors.len() > 1
    }

    pub fn primary_id(&self) -> CursorId {
        self.primary
    }

    pub fn primary(&self) -> Option<&Cursor> {
        self.cursors.iter().find(|c| c.id == self.primary)
    }

    /// Add a cursor at a position (modifier-click). Deduplicated: returns
    /// absent when a cursor already sits there.
    pub fn add_cursor(&mut self, position: TextPosition) -> Option<CursorId> {
        if self.cursors.iter().any(|c| c.position.offset == position.offset) {
            return None;
        }

        let id = self.mint_id();
        self.cursors.push(Cursor::new(id, position));
        Some(id)
    }

    /// Add a cursor one line above the primary, clamped to line length.
    pub fn add_cursor_above(&mut self, text: &str) -> Option<CursorId> {
        let primary = self.primary()?;
        if primary.position.line == 0 {
            return None;
        }

        let target =
            TextPosition::resolve(text, primary.position.line - 1, primary.position.column);
        self.add_cursor(target)
    }

    /// Add a cursor one line below the primary, clamped to line length.
    pub fn add_cursor_below(&mut self, text: &str) -> Option<CursorId> {
        let primary = self.primary()?;

        let target =
            TextPosition::resolve(text, primary.position.line + 1, primary.position.column);
        if target.line == primary.position.line {
            return None; // already on the last line
        }
        self.add_cursor(target)
    }

    /// Remove a cursor. The last cursor cannot be removed; removing the
    /// primary promotes the first remaining cursor.
    pub fn remove_cursor(&mut self, id: CursorId) -> bool {
        if self.cursors.len() <= 1 {
            return false;
        }

        let Some(index) = self.cursors.iter().position(|c| c.id == id) else {
            return false;
        };
        self.cursors.remove(index);

        if self.primary == id {
            self.primary = self.cursors[0].id;
        }
        true
    }

    /// Collapse back to the primary cursor alone (Escape, plain click).
    pub fn collapse_to_primary(&mut self) {
        let primary = self.primary;
        self.cursors.retain(|c| c.id == primary);
    }

    /// Replace the cursor list wholesale, preserving the primary id.
    ///
    /// Used by the edit engine to rebuild state after a transform; list
    /// order is not significant, only the identity-to-position mapping.
    pub(crate) fn rebuilt(&self, cursors: Vec<Cursor>) -> Self {
        debug_assert!(cursors.iter().any(|c| c.id == self.primary));
        Self {
            cursors,
            primary: self.primary,
            next_id: self.next_id,
        }
    }
}
