//! # Skein Parse Cache
//!
//! One cached syntax tree per open document. Tree handles come from an
//! opaque incremental-parsing engine and require explicit release; the cache
//! owns them, releases exactly once, and frees them automatically when the
//! host closes a document.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use document::{DocumentEvent, DocumentId};

/// An engine-owned syntax tree handle.
///
/// `release` frees engine resources. The cache guarantees it is called at
/// most once per handle; implementations need no double-release guard.
pub trait SyntaxTree: Send + Sync {
    fn release(&mut self);
}

/// The incremental-parsing engine seam.
///
/// `old_tree` is the previous tree for the same document, when one exists,
/// so the engine can reuse unchanged subtrees.
pub trait IncrementalParser: Send {
    fn parse(
        &mut self,
        text: &str,
        old_tree: Option<&mut (dyn SyntaxTree + 'static)>,
    ) -> Box<dyn SyntaxTree>;
}

/// Owning wrapper around a tree handle.
///
/// Releases the handle exactly once, either on explicit `release` or on
/// drop. Once released, the handle is gone and can no longer be reached.
pub struct OwnedTree {
    inner: Option<Box<dyn SyntaxTree>>,
}

impl OwnedTree {
    pub fn new(tree: Box<dyn SyntaxTree>) -> Self {
        Self { inner: Some(tree) }
    }

    /// Access the underlying tree, or absent if released.
    pub fn tree(&self) -> Option<&dyn SyntaxTree> {
        self.inner.as_deref()
    }

    /// Mutable access, used to feed the old tree back into the parser.
    pub fn tree_mut(&mut self) -> Option<&mut (dyn SyntaxTree + 'static)> {
        self.inner.as_deref_mut()
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    /// Release the handle. Idempotent.
    pub fn release(&mut self) {
        if let Some(mut tree) = self.inner.take() {
            tree.release();
        }
    }
}

impl Drop for OwnedTree {
    fn drop(&mut self) {
        self.release();
    }
}

/// One cache entry per open document.
struct CacheEntry {
    tree: OwnedTree,
    /// Cheap staleness proxy supplied by the edit pipeline (content length).
    fingerprint: u64,
    language_id: String,
    updated_at: Instant,
}

/// Parse tree cache
pub struct ParseTreeCache {
    entries: RwLock<HashMap<DocumentId, CacheEntry>>,
}

impl ParseTreeCache {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Store a freshly parsed tree, replacing and releasing any prior tree
    /// for the document.
    pub fn set_tree(
        &self,
        id: DocumentId,
        tree: Box<dyn SyntaxTree>,
        fingerprint: u64,
        language_id: impl Into<String>,
    ) {
        let entry = CacheEntry {
            tree: OwnedTree::new(tree),
            fingerprint,
            language_id: language_id.into(),
            updated_at: Instant::now(),
        };

        // The replaced entry drops here, releasing its tree.
        self.entries.write().insert(id, entry);
    }

    /// Run a closure against the cached tree, or absent.
    pub fn with_tree<R>(&self, id: DocumentId, f: impl FnOnce(&dyn SyntaxTree) -> R) -> Option<R> {
        let entries = self.entries.read();
        let tree = entries.get(&id)?.tree.tree()?;
        Some(f(tree))
    }

    /// Remove the entry and hand its tree back to the caller, for feeding
    /// into an incremental reparse. The cache holds nothing for the document
    /// until the next `set_tree`.
    pub fn take_tree(&self, id: DocumentId) -> Option<OwnedTree> {
        self.entries.write().remove(&id).map(|entry| entry.tree)
    }

    /// The fingerprint stored with the current tree, or absent.
    pub fn fingerprint(&self, id: DocumentId) -> Option<u64> {
        self.entries.read().get(&id).map(|e| e.fingerprint)
    }

    /// The language the current tree was parsed with, or absent.
    pub fn language_id(&self, id: DocumentId) -> Option<String> {
        self.entries.read().get(&id).map(|e| e.language_id.clone())
    }

    /// When the current tree was stored, or absent.
    pub fn updated_at(&self, id: DocumentId) -> Option<Instant> {
        self.entries.read().get(&id).map(|e| e.updated_at)
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.entries.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Release and remove one document's tree. Idempotent.
    pub fn clear_tree(&self, id: DocumentId) {
        if self.entries.write().remove(&id).is_some() {
            tracing::debug!("released parse tree for {:?}", id);
        }
    }

    /// Release every tree. Used on session teardown.
    pub fn clear_all(&self) {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();

        if count > 0 {
            tracing::debug!("released {} parse trees", count);
        }
    }

    /// Watch host document events, releasing trees when documents close.
    ///
    /// This is the one path that frees a tree without an explicit
    /// `set_tree`/`clear_tree` from the edit pipeline; it exists so closing
    /// a document never leaks its tree. The caller owns the handle and
    /// aborts it on teardown.
    pub fn watch_documents(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<DocumentEvent>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(DocumentEvent::Closed { id }) => cache.clear_tree(id),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("document event stream lagged by {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for ParseTreeCache {
    fn default() -> Self {
        Self::new()
    }
}
