//! # Skein Decorations
//!
//! Range-indexed store of visual annotations (diagnostics, git status),
//! queryable by line, position, or range overlap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Decoration ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecorationId(u64);

/// Annotation severity, ordered most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Information => "Info",
            Severity::Hint => "Hint",
        }
    }
}

/// Git file change kind, ordered least prominent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn symbol(&self) -> char {
        match self {
            ChangeKind::Added => 'A',
            ChangeKind::Modified => 'M',
            ChangeKind::Deleted => 'D',
        }
    }
}

/// A (line, column) coordinate. Ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinePosition {
    pub line: u32,
    pub column: u32,
}

impl LinePosition {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A half-open range of document positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecorationRange {
    pub start: LinePosition,
    pub end: LinePosition,
}

impl DecorationRange {
    pub fn new(start: LinePosition, end: LinePosition) -> Self {
        Self { start, end }
    }

    /// Range covering a whole line.
    pub fn line(line: u32) -> Self {
        Self {
            start: LinePosition::new(line, 0),
            end: LinePosition::new(line, u32::MAX),
        }
    }

    /// Half-open overlap test: two ranges overlap unless one ends strictly
    /// before the other starts.
    pub fn overlaps(&self, other: &DecorationRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Point containment under half-open semantics.
    pub fn contains(&self, position: LinePosition) -> bool {
        self.start <= position && position < self.end
    }

    /// Does the range span the given line?
    pub fn spans_line(&self, line: u32) -> bool {
        line >= self.start.line && line <= self.end.line
    }
}

/// Decoration placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecorationKind {
    /// Rendered in the gutter column
    Gutter,
    /// Rendered within the text
    Inline,
    /// Rendered above the text (e.g. selection highlight)
    Overlay,
}

/// What the decoration conveys. Gutter consumers rank diagnostics by
/// severity when several cover the same line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecorationStyle {
    Diagnostic(Severity),
    GitChange(ChangeKind),
    Class(String),
}

/// A stored decoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoration {
    /// Unique ID
    pub id: DecorationId,
    /// Placement
    pub kind: DecorationKind,
    /// Covered range
    pub range: DecorationRange,
    /// Style tag
    pub style: DecorationStyle,
}

/// Decoration fields without an id, as handed to `add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecorationSpec {
    pub kind: DecorationKind,
    pub range: DecorationRange,
    pub style: DecorationStyle,
}

impl DecorationSpec {
    pub fn new(kind: DecorationKind, range: DecorationRange, style: DecorationStyle) -> Self {
        Self { kind, range, style }
    }
}

/// Partial update applied by `update`. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct DecorationUpdate {
    pub kind: Option<DecorationKind>,
    pub range: Option<DecorationRange>,
    pub style: Option<DecorationStyle>,
}

/// Decoration index
pub struct DecorationIndex {
    decorations: RwLock<HashMap<DecorationId, Decoration>>,
    next_id: AtomicU64,
}

impl DecorationIndex {
    pub fn new() -> Self {
        Self {
            decorations: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn mint_id(&self) -> DecorationId {
        DecorationId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Add a decoration, assigning a fresh id.
    pub fn add(&self, spec: DecorationSpec) -> DecorationId {
        let id = self.mint_id();

        self.decorations.write().insert(
            id,
            Decoration { id, kind: spec.kind, range: spec.range, style: spec.style },
        );

        id
    }

    /// Add a batch of decorations, returning ids in input order.
    pub fn add_batch(&self, specs: Vec<DecorationSpec>) -> Vec<DecorationId> {
        let mut decorations = self.decorations.write();

        specs
            .into_iter()
            .map(|spec| {
                let id = self.mint_id();
                decorations.insert(
                    id,
                    Decoration { id, kind: spec.kind, range: spec.range, style: spec.style },
                );
                id
            })
            .collect()
    }

    /// Remove by id. Idempotent on unknown ids.
    pub fn remove(&self, id: DecorationId) {
        self.decorations.write().remove(&id);
    }

    /// Remove a batch by id. Unknown ids are skipped.
    pub fn remove_batch(&self, ids: &[DecorationId]) {
        let mut decorations = self.decorations.write();
        for id in ids {
            decorations.remove(id);
        }
    }

    /// Apply a partial update. No-op on unknown ids.
    pub fn update(&self, id: DecorationId, update: DecorationUpdate) {
        let mut decorations = self.decorations.write();

        let Some(decoration) = decorations.get_mut(&id) else {
            return;
        };

        if let Some(kind) = update.kind {
            decoration.kind = kind;
        }
        if let Some(range) = update.range {
            decoration.range = range;
        }
        if let Some(style) = update.style {
            decoration.style = style;
        }
    }

    /// Get a decoration by id.
    pub fn get(&self, id: DecorationId) -> Option<Decoration> {
        self.decorations.read().get(&id).cloned()
    }

    /// All decorations, ordered by id.
    pub fn all(&self) -> Vec<Decoration> {
        let mut all: Vec<_> = self.decorations.read().values().cloned().collect();
        all.sort_by_key(|d| d.id.0);
        all
    }

    /// Decorations whose range overlaps the given range.
    pub fn in_range(&self, range: DecorationRange) -> Vec<Decoration> {
        let mut found: Vec<_> = self
            .decorations
            .read()
            .values()
            .filter(|d| d.range.overlaps(&range))
            .cloned()
            .collect();
        found.sort_by_key(|d| d.id.0);
        found
    }

    /// Decorations containing the given position.
    pub fn at_position(&self, position: LinePosition) -> Vec<Decoration> {
        let mut found: Vec<_> = self
            .decorations
            .read()
            .values()
            .filter(|d| d.range.contains(position))
            .cloned()
            .collect();
        found.sort_by_key(|d| d.id.0);
        found
    }

    /// Decorations whose range spans the given line.
    pub fn for_line(&self, line: u32) -> Vec<Decoration> {
        let mut found: Vec<_> = self
            .decorations
            .read()
            .values()
            .filter(|d| d.range.spans_line(line))
            .cloned()
            .collect();
        found.sort_by_key(|d| d.id.0);
        found
    }

    pub fn len(&self) -> usize {
        self.decorations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.decorations.read().is_empty()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.decorations.write().clear();
    }
}

impl Default for DecorationIndex {
    fn default() -> Self {
        Self::new()
    }
}
