//! # Skein Session
//!
//! The editor-session context: owns one instance of every core store,
//! wires the keystroke pipeline (multi-cursor transform → host content →
//! reparse → viewport), and exposes the read surface renderers consume.

pub mod config;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use decorations::{Decoration, DecorationIndex};
use document::{DocumentEvent, DocumentHost, DocumentId, TextPosition};
use gutter::{GutterConfig, GutterLine, GutterRenderer};
use multi_cursor::{CursorId, EditConfig, EditOp, MultiCursorState, apply_edit};
use parse_cache::{IncrementalParser, ParseTreeCache};
use scroll_sync::{FrameScheduler, ScrollOffset, ScrollSynchronizer, SyncedScroll};
use view_state::ViewStateCache;
use viewport::{ViewportConfig, ViewportRange, ViewportTracker};

pub use config::{ReparseMode, SessionConfig, reparse_delay};

/// Session error
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown document: {0:?}")]
    UnknownDocument(DocumentId),
}

/// Editor session
///
/// One per editing surface. All stores are constructor-injected and owned
/// here; components receive them by reference, so there is no hidden global
/// state.
pub struct EditorSession {
    config: SessionConfig,
    host: Arc<dyn DocumentHost>,
    parser: Mutex<Box<dyn IncrementalParser>>,
    trees: Arc<ParseTreeCache>,
    decorations: Arc<DecorationIndex>,
    view_states: Arc<ViewStateCache>,
    viewport: Arc<ViewportTracker>,
    scroll: Arc<ScrollSynchronizer>,
    gutter: Arc<GutterRenderer>,
    cursors: RwLock<HashMap<DocumentId, MultiCursorState>>,
    pending_reparse: FrameScheduler<DocumentId>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
}

impl EditorSession {
    pub fn new(
        config: SessionConfig,
        host: Arc<dyn DocumentHost>,
        parser: Box<dyn IncrementalParser>,
    ) -> Self {
        let viewport = Arc::new(ViewportTracker::new(ViewportConfig {
            padding_lines: config.viewport_padding_lines,
            hysteresis_lines: config.hysteresis_lines,
        }));

        let scroll = Arc::new(ScrollSynchronizer::new(Arc::clone(&viewport)));
        scroll.set_geometry(scroll_sync::ScrollGeometry {
            line_height: config.line_height(),
            ..Default::default()
        });

        let view_states = Arc::new(ViewStateCache::new(config.view_state_capacity));

        Self {
            host,
            parser: Mutex::new(parser),
            trees: Arc::new(ParseTreeCache::new()),
            decorations: Arc::new(DecorationIndex::new()),
            view_states,
            viewport,
            scroll,
            gutter: Arc::new(GutterRenderer::new(GutterConfig::default())),
            cursors: RwLock::new(HashMap::new()),
            pending_reparse: FrameScheduler::new(),
            watchers: Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn decorations(&self) -> &DecorationIndex {
        &self.decorations
    }

    pub fn view_states(&self) -> &ViewStateCache {
        &self.view_states
    }

    pub fn trees(&self) -> &ParseTreeCache {
        &self.trees
    }

    pub fn scroll(&self) -> &ScrollSynchronizer {
        &self.scroll
    }

    pub fn gutter(&self) -> &GutterRenderer {
        &self.gutter
    }

    /// Subscribe the session to host document events: the tree cache
    /// releases trees on close, and per-document cursor and fold state is
    /// dropped. Requires a tokio runtime; idempotent.
    pub fn attach(self: &Arc<Self>) {
        let mut watchers = self.watchers.lock();
        if !watchers.is_empty() {
            return;
        }

        watchers.push(self.trees.watch_documents(self.host.subscribe()));

        let session = Arc::clone(self);
        let mut events = self.host.subscribe();
        watchers.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(DocumentEvent::Closed { id }) => {
                        session.cursors.write().remove(&id);
                        session.gutter.clear_folds(id);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Tear the session down: cancel pending frame work, stop watchers,
    /// release every cached tree.
    pub fn shutdown(&self) {
        self.scroll.cancel_pending();
        self.pending_reparse.cancel();

        for watcher in self.watchers.lock().drain(..) {
            watcher.abort();
        }

        self.trees.clear_all();
        tracing::debug!("editor session shut down");
    }

    // ── Edit pipeline ────────────────────────────────────────────────

    /// Apply one keystroke across the document's cursor set.
    ///
    /// A document without multi-cursor state gets a single cursor at its
    /// cached position (or the document start). The parse tree is refreshed
    /// synchronously for small documents and deferred for large ones.
    pub fn handle_keystroke(
        &self,
        id: DocumentId,
        op: &EditOp,
    ) -> Result<ReparseMode, SessionError> {
        let text = self.host.content(id).ok_or(SessionError::UnknownDocument(id))?;
        let state = self.cursor_state_or_default(id, &text);

        let edit_config = EditConfig { tab_width: self.config.tab_width };
        let (new_text, new_state) = apply_edit(&text, &state, op, &edit_config);

        self.host.set_content(id, new_text.clone());
        self.scroll.set_total_lines(new_text.lines().count().max(1) as u32);

        if let Some(primary) = new_state.primary() {
            self.view_states.set_cursor(id, primary.position);
        }
        self.cursors.write().insert(id, new_state);

        match reparse_delay(new_text.len(), self.config.sync_parse_limit) {
            None => {
                self.reparse_now(id, &new_text);
                Ok(ReparseMode::Immediate)
            }
            Some(delay) => {
                self.pending_reparse.schedule(id);
                tracing::trace!("deferred reparse of {:?} by {:?}", id, delay);
                Ok(ReparseMode::Deferred(delay))
            }
        }
    }

    /// Parse a document now and cache the resulting tree.
    pub fn ensure_parsed(&self, id: DocumentId) -> Result<(), SessionError> {
        if self.trees.contains(id) {
            return Ok(());
        }

        let text = self.host.content(id).ok_or(SessionError::UnknownDocument(id))?;
        self.reparse_now(id, &text);
        Ok(())
    }

    /// Drain the pending deferred reparse, if any. Returns whether one ran.
    pub fn flush_reparse(&self) -> bool {
        let Some(id) = self.pending_reparse.take() else {
            return false;
        };

        match self.host.content(id) {
            Some(text) => {
                self.reparse_now(id, &text);
                true
            }
            // Document closed while the reparse was pending.
            None => false,
        }
    }

    fn reparse_now(&self, id: DocumentId, text: &str) {
        let mut old_tree = self.trees.take_tree(id);

        let tree = self.parser.lock().parse(text, old_tree.as_mut().and_then(|t| t.tree_mut()));

        let language_id = self
            .host
            .info(id)
            .and_then(|info| info.language_id)
            .unwrap_or_else(|| "plain".to_string());

        // Content length is the staleness fingerprint.
        self.trees.set_tree(id, tree, text.len() as u64, language_id);
        // `old_tree` drops here, releasing the replaced handle.
    }

    // ── Cursor operations ────────────────────────────────────────────

    fn cursor_state_or_default(&self, id: DocumentId, text: &str) -> MultiCursorState {
        if let Some(state) = self.cursors.read().get(&id) {
            return state.clone();
        }

        let position = self
            .view_states
            .get(id)
            .map(|state| TextPosition::at_offset(text, state.cursor.offset))
            .unwrap_or_default();
        MultiCursorState::single(position)
    }

    /// Add an edit point at (line, column), e.g. on modifier-click.
    pub fn add_cursor(
        &self,
        id: DocumentId,
        line: u32,
        column: u32,
    ) -> Result<Option<CursorId>, SessionError> {
        let text = self.host.content(id).ok_or(SessionError::UnknownDocument(id))?;
        let mut state = self.cursor_state_or_default(id, &text);

        let added = state.add_cursor(TextPosition::resolve(&text, line, column));
        self.cursors.write().insert(id, state);
        Ok(added)
    }

    /// Collapse to a single primary cursor (Escape, plain click).
    pub fn collapse_cursors(&self, id: DocumentId) {
        if let Some(state) = self.cursors.write().get_mut(&id) {
            state.collapse_to_primary();
        }
    }

    /// The document's cursor set, or absent when it has never been edited.
    pub fn cursor_state(&self, id: DocumentId) -> Option<MultiCursorState> {
        self.cursors.read().get(&id).cloned()
    }

    // ── Scroll pipeline ──────────────────────────────────────────────

    /// Accept a raw scroll event. Returns true when a frame must be queued.
    pub fn on_scroll(&self, id: DocumentId, top: f64, left: f64) -> bool {
        self.view_states.set_scroll(id, top, left);
        self.scroll.on_scroll(ScrollOffset::new(top, left))
    }

    /// The per-tick frame callback.
    pub fn run_frame(&self) -> Option<SyncedScroll> {
        self.scroll.run_frame()
    }

    // ── Renderer surface ─────────────────────────────────────────────

    /// The current materialized line window, or absent before first layout.
    pub fn viewport_range(&self) -> Option<ViewportRange> {
        self.viewport.current()
    }

    /// Decorations covering one line.
    pub fn decorations_for_line(&self, line: u32) -> Vec<Decoration> {
        self.decorations.for_line(line)
    }

    /// The cached cursor position for a document, or absent.
    pub fn cached_cursor(&self, id: DocumentId) -> Option<TextPosition> {
        self.view_states.get(id).map(|state| state.cursor)
    }

    /// Compose gutter content for the current window.
    pub fn render_gutter(&self, id: DocumentId) -> Vec<GutterLine> {
        let total_lines = self
            .host
            .content(id)
            .map(|text| text.lines().count().max(1) as u32)
            .unwrap_or(0);

        let window = self
            .viewport
            .current()
            .unwrap_or_else(|| ViewportRange::new(0, total_lines));

        let current_line = self.cached_cursor(id).map(|cursor| cursor.line).unwrap_or(0);

        self.gutter
            .render_window(id, &self.decorations, window, current_line, total_lines)
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        for watcher in self.watchers.lock().drain(..) {
            watcher.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use document::DocumentRegistry;
    use parse_cache::SyntaxTree;

    /// Tree that counts releases.
    struct FakeTree {
        releases: Arc<AtomicUsize>,
    }

    impl SyntaxTree for FakeTree {
        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Parser that records how it was driven.
    struct FakeParser {
        parses: Arc<AtomicUsize>,
        incremental_parses: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    impl IncrementalParser for FakeParser {
        fn parse(
            &mut self,
            _text: &str,
            old_tree: Option<&mut (dyn SyntaxTree + 'static)>,
        ) -> Box<dyn SyntaxTree> {
            self.parses.fetch_add(1, Ordering::SeqCst);
            if old_tree.is_some() {
                self.incremental_parses.fetch_add(1, Ordering::SeqCst);
            }
            Box::new(FakeTree { releases: Arc::clone(&self.releases) })
        }
    }

    struct Counters {
        parses: Arc<AtomicUsize>,
        incremental_parses: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    fn session_with(registry: Arc<DocumentRegistry>) -> (EditorSession, Counters) {
        let counters = Counters {
            parses: Arc::new(AtomicUsize::new(0)),
            incremental_parses: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        };
        let parser = FakeParser {
            parses: Arc::clone(&counters.parses),
            incremental_parses: Arc::clone(&counters.incremental_parses),
            releases: Arc::clone(&counters.releases),
        };

        let session = EditorSession::new(SessionConfig::default(), registry, Box::new(parser));
        (session, counters)
    }

    #[test]
    fn test_keystroke_updates_content_and_tree() {
        let registry = Arc::new(DocumentRegistry::new());
        let doc = registry.open(None, Some("rust".into()), "fn main() {}");
        let (session, counters) = session_with(Arc::clone(&registry));

        session.ensure_parsed(doc).unwrap();
        let mode = session.handle_keystroke(doc, &EditOp::Insert("x".into())).unwrap();

        assert_eq!(mode, ReparseMode::Immediate);
        assert_eq!(registry.content(doc).unwrap(), "xfn main() {}");
        assert_eq!(session.trees().fingerprint(doc), Some(13));
        assert_eq!(session.trees().language_id(doc).as_deref(), Some("rust"));

        // ensure_parsed + keystroke; the reparse fed the old tree back in
        // and released it.
        assert_eq!(counters.parses.load(Ordering::SeqCst), 2);
        assert_eq!(counters.incremental_parses.load(Ordering::SeqCst), 1);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_keystroke_restores_cached_cursor() {
        let registry = Arc::new(DocumentRegistry::new());
        let doc = registry.open(None, None, "hello world");
        let (session, _) = session_with(Arc::clone(&registry));

        // Simulate a previous visit ending with the cursor at offset 5.
        session.view_states().set_cursor(doc, TextPosition::at_offset("hello world", 5));

        session.handle_keystroke(doc, &EditOp::Insert("!".into())).unwrap();
        assert_eq!(registry.content(doc).unwrap(), "hello! world");
        assert_eq!(session.cached_cursor(doc).unwrap().offset, 6);
    }

    #[test]
    fn test_multi_cursor_keystroke_splices_every_point() {
        let registry = Arc::new(DocumentRegistry::new());
        let doc = registry.open(None, None, "aaa bbb ccc");
        let (session, _) = session_with(Arc::clone(&registry));

        session.add_cursor(doc, 0, 0).unwrap();
        session.add_cursor(doc, 0, 4).unwrap();
        session.add_cursor(doc, 0, 8).unwrap();

        session.handle_keystroke(doc, &EditOp::Insert("-".into())).unwrap();
        assert_eq!(registry.content(doc).unwrap(), "-aaa -bbb -ccc");

        session.collapse_cursors(doc);
        assert_eq!(session.cursor_state(doc).unwrap().cursor_count(), 1);
    }

    #[test]
    fn test_large_document_defers_reparse() {
        let registry = Arc::new(DocumentRegistry::new());
        let text = "x".repeat(100 * 1024);
        let doc = registry.open(None, None, text);
        let (session, counters) = session_with(Arc::clone(&registry));

        let mode = session.handle_keystroke(doc, &EditOp::Insert("y".into())).unwrap();
        assert!(matches!(mode, ReparseMode::Deferred(_)));
        assert_eq!(counters.parses.load(Ordering::SeqCst), 0);
        assert!(!session.trees().contains(doc));

        assert!(session.flush_reparse());
        assert_eq!(counters.parses.load(Ordering::SeqCst), 1);
        assert_eq!(session.trees().fingerprint(doc), Some(100 * 1024 + 1));

        // Slot drained.
        assert!(!session.flush_reparse());
    }

    #[test]
    fn test_keystroke_on_unknown_document_errors() {
        let registry = Arc::new(DocumentRegistry::new());
        let (session, _) = session_with(registry);

        let ghost = DocumentId(404);
        assert!(matches!(
            session.handle_keystroke(ghost, &EditOp::Backspace),
            Err(SessionError::UnknownDocument(id)) if id == ghost
        ));
    }

    #[test]
    fn test_scroll_pipeline_reaches_viewport() {
        let registry = Arc::new(DocumentRegistry::new());
        let doc = registry.open(None, None, "line\n".repeat(1000));
        let (session, _) = session_with(Arc::clone(&registry));

        session.scroll().set_geometry(scroll_sync::ScrollGeometry {
            line_height: 21.0,
            viewport_height: 630.0,
            total_lines: 1000,
            measured_height: 21_000.0,
        });

        assert!(session.on_scroll(doc, 2100.0, 0.0));
        // Burst before the frame fires: coalesced.
        assert!(!session.on_scroll(doc, 2121.0, 0.0));

        let synced = session.run_frame().unwrap();
        assert_eq!(synced.raw.top, 2121.0);
        assert_eq!(session.viewport_range(), Some(synced.viewport));
        assert!(synced.viewport.contains_line(101));

        // Scroll position round-trips through the view-state cache.
        let state = session.view_states().get(doc).unwrap();
        assert_eq!(state.scroll_top, 2121.0);
    }

    #[test]
    fn test_render_gutter_uses_current_window() {
        let registry = Arc::new(DocumentRegistry::new());
        let doc = registry.open(None, None, "line\n".repeat(50));
        let (session, _) = session_with(Arc::clone(&registry));

        session.decorations().add(decorations::DecorationSpec::new(
            decorations::DecorationKind::Gutter,
            decorations::DecorationRange::line(3),
            decorations::DecorationStyle::Diagnostic(decorations::Severity::Warning),
        ));

        let lines = session.render_gutter(doc);
        assert_eq!(lines.len(), 50);
        assert_eq!(lines[3].diagnostic, Some(decorations::Severity::Warning));
        assert_eq!(session.decorations_for_line(3).len(), 1);
    }

    #[tokio::test]
    async fn test_close_releases_tree_and_cursors() {
        let registry = Arc::new(DocumentRegistry::new());
        let doc = registry.open(None, None, "fn main() {}");
        let (session, counters) = session_with(Arc::clone(&registry));
        let session = Arc::new(session);
        session.attach();

        session.ensure_parsed(doc).unwrap();
        session.add_cursor(doc, 0, 3).unwrap();
        assert!(session.trees().contains(doc));

        registry.close(doc);

        for _ in 0..50 {
            if !session.trees().contains(doc) && session.cursor_state(doc).is_none() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        assert!(!session.trees().contains(doc));
        assert!(session.cursor_state(doc).is_none());
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);

        session.shutdown();
    }

    #[test]
    fn test_shutdown_cancels_pending_work() {
        let registry = Arc::new(DocumentRegistry::new());
        let doc = registry.open(None, None, "x".repeat(100 * 1024));
        let (session, counters) = session_with(Arc::clone(&registry));

        session.handle_keystroke(doc, &EditOp::Insert("y".into())).unwrap();
        session.on_scroll(doc, 10.0, 0.0);

        session.shutdown();

        assert!(session.run_frame().is_none());
        assert!(!session.flush_reparse());
        assert_eq!(counters.parses.load(Ordering::SeqCst), 0);
    }
}
