//! # Skein Document
//!
//! Host document boundary: document ids, document events, the host seam,
//! and the text coordinate types shared across the editor core.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Document ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub u64);

/// A position in document text.
///
/// `offset` is a byte offset into the UTF-8 text and always lands on a char
/// boundary; `column` counts chars from the start of the line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPosition {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl TextPosition {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self { line, column, offset }
    }

    /// Compute the position at a byte offset.
    ///
    /// Offsets past the end of the text or inside a char are clamped to the
    /// nearest valid boundary at or before the requested offset.
    pub fn at_offset(text: &str, offset: usize) -> Self {
        let offset = clamp_to_char_boundary(text, offset);
        let before = &text[..offset];

        let line = before.matches('\n').count() as u32;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() as u32;

        Self { line, column, offset }
    }

    /// Compute the position at a (line, column) coordinate.
    ///
    /// Lines past the end clamp to the last line; columns past the end of
    /// the line clamp to the line's last char.
    pub fn resolve(text: &str, line: u32, column: u32) -> Self {
        let mut line_start = 0;
        let mut current = 0u32;

        while current < line {
            match text[line_start..].find('\n') {
                Some(i) => {
                    line_start += i + 1;
                    current += 1;
                }
                None => break,
            }
        }

        let line_end = text[line_start..]
            .find('\n')
            .map(|i| line_start + i)
            .unwrap_or(text.len());

        let mut offset = line_start;
        let mut col = 0u32;
        for c in text[line_start..line_end].chars() {
            if col >= column {
                break;
            }
            offset += c.len_utf8();
            col += 1;
        }

        Self { line: current, column: col, offset }
    }
}

/// Clamp a byte offset to the nearest char boundary at or before it.
pub fn clamp_to_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Document metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Unique ID
    pub id: DocumentId,
    /// File path (if any)
    pub path: Option<PathBuf>,
    /// Language ID
    pub language_id: Option<String>,
    /// Version (increments on each content change)
    pub version: u64,
}

/// Document lifecycle event
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    Opened { id: DocumentId },
    ContentChanged { id: DocumentId, version: u64 },
    Closed { id: DocumentId },
}

/// The host seam the editor core reads documents through.
///
/// The host application owns document contents; the core reads them, writes
/// edited text back, and subscribes to lifecycle events.
pub trait DocumentHost: Send + Sync {
    /// Get document content, or absent if the document is not open.
    fn content(&self, id: DocumentId) -> Option<String>;

    /// Persist edited content back to the host.
    fn set_content(&self, id: DocumentId, text: String);

    /// Get document metadata.
    fn info(&self, id: DocumentId) -> Option<DocumentInfo>;

    /// Subscribe to lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<DocumentEvent>;
}

/// In-memory document registry.
///
/// The reference `DocumentHost` used by the session and by tests. Real hosts
/// implement the trait over their own storage.
pub struct DocumentRegistry {
    documents: RwLock<HashMap<DocumentId, DocumentRecord>>,
    next_id: AtomicU64,
    events: broadcast::Sender<DocumentEvent>,
}

struct DocumentRecord {
    info: DocumentInfo,
    text: String,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);

        Self {
            documents: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    /// Open a document and return its id.
    pub fn open(
        &self,
        path: Option<PathBuf>,
        language_id: Option<String>,
        text: impl Into<String>,
    ) -> DocumentId {
        let id = DocumentId(self.next_id.fetch_add(1, Ordering::SeqCst));

        self.documents.write().insert(
            id,
            DocumentRecord {
                info: DocumentInfo { id, path, language_id, version: 0 },
                text: text.into(),
            },
        );

        let _ = self.events.send(DocumentEvent::Opened { id });
        id
    }

    /// Close a document. Idempotent on unknown ids.
    pub fn close(&self, id: DocumentId) {
        if self.documents.write().remove(&id).is_some() {
            let _ = self.events.send(DocumentEvent::Closed { id });
        }
    }

    /// Number of open documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    pub fn is_open(&self, id: DocumentId) -> bool {
        self.documents.read().contains_key(&id)
    }

    /// Line count of a document's content.
    pub fn line_count(&self, id: DocumentId) -> Option<u32> {
        self.documents
            .read()
            .get(&id)
            .map(|d| d.text.lines().count().max(1) as u32)
    }
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentHost for DocumentRegistry {
    fn content(&self, id: DocumentId) -> Option<String> {
        self.documents.read().get(&id).map(|d| d.text.clone())
    }

    fn set_content(&self, id: DocumentId, text: String) {
        let mut documents = self.documents.write();

        let Some(record) = documents.get_mut(&id) else {
            tracing::warn!("set_content on unknown document {:?}", id);
            return;
        };

        record.text = text;
        record.info.version += 1;
        let version = record.info.version;
        drop(documents);

        let _ = self.events.send(DocumentEvent::ContentChanged { id, version });
    }

    fn info(&self, id: DocumentId) -> Option<DocumentInfo> {
        self.documents.read().get(&id).map(|d| d.info.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }
}
