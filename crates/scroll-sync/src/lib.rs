//! # Skein Scroll Sync
//!
//! Listens to the authoritative scroll position and propagates it,
//! frame-batched, to every dependent visual layer and to the viewport
//! tracker, compensating for layout drift between analytic and measured
//! content heights.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use viewport::{ViewportRange, ViewportTracker};

/// A scroll offset in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub top: f64,
    pub left: f64,
}

impl ScrollOffset {
    pub fn new(top: f64, left: f64) -> Self {
        Self { top, left }
    }
}

/// One-shot-per-tick work coalescing.
///
/// A scroll or resize burst sets the pending value repeatedly; only the
/// first set asks the caller to queue a frame, and the frame callback reads
/// the latest value, not the value at schedule time.
pub struct FrameScheduler<T> {
    slot: Mutex<Option<T>>,
}

impl<T> FrameScheduler<T> {
    pub fn new() -> Self {
        Self { slot: Mutex::new(None) }
    }

    /// Store the latest pending value. Returns true when no frame was
    /// pending, i.e. the caller must queue one.
    pub fn schedule(&self, value: T) -> bool {
        let mut slot = self.slot.lock();
        let fresh = slot.is_none();
        *slot = Some(value);
        fresh
    }

    /// Take the pending value, clearing the slot.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    /// Drop any pending value. Returns true when one was pending.
    pub fn cancel(&self) -> bool {
        self.slot.lock().take().is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl<T> Default for FrameScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A visual layer kept pixel-aligned with the authoritative surface.
pub trait ScrollLayer: Send + Sync {
    /// Layer name, for diagnostics.
    fn name(&self) -> &str;

    /// Apply the corrected scroll offset.
    fn apply_scroll(&self, offset: ScrollOffset);
}

/// Scroll geometry of the authoritative surface.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScrollGeometry {
    /// Line height used for analytic layout, in pixels
    pub line_height: f64,
    /// Viewport height in pixels
    pub viewport_height: f64,
    /// Total line count of the document
    pub total_lines: u32,
    /// Scroll height as measured on the authoritative surface
    pub measured_height: f64,
}

impl ScrollGeometry {
    /// Content height as computed analytically from line count.
    pub fn analytic_height(&self) -> f64 {
        self.total_lines as f64 * self.line_height
    }

    /// Correction ratio applied to raw offsets before propagation.
    ///
    /// The authoritative surface may measure line heights fractionally
    /// differently than the analytic layout; scaling by this ratio keeps
    /// all layers aligned. Degenerate measurements fall back to 1.0.
    pub fn correction_ratio(&self) -> f64 {
        let analytic = self.analytic_height();
        if self.measured_height > 0.0 && analytic > 0.0 && self.measured_height.is_finite() {
            analytic / self.measured_height
        } else {
            1.0
        }
    }
}

/// Scroll synchronizer
pub struct ScrollSynchronizer {
    layers: RwLock<Vec<Box<dyn ScrollLayer>>>,
    geometry: RwLock<ScrollGeometry>,
    pending: FrameScheduler<ScrollOffset>,
    viewport: Arc<ViewportTracker>,
    events: broadcast::Sender<SyncedScroll>,
}

/// Offset actually propagated on a frame.
#[derive(Debug, Clone, Copy)]
pub struct SyncedScroll {
    pub raw: ScrollOffset,
    pub corrected: ScrollOffset,
    pub viewport: ViewportRange,
}

impl ScrollSynchronizer {
    pub fn new(viewport: Arc<ViewportTracker>) -> Self {
        let (events, _) = broadcast::channel(64);

        Self {
            layers: RwLock::new(Vec::new()),
            geometry: RwLock::new(ScrollGeometry::default()),
            pending: FrameScheduler::new(),
            viewport,
            events,
        }
    }

    /// Subscribe to propagated offsets.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncedScroll> {
        self.events.subscribe()
    }

    /// Register a dependent layer.
    pub fn register_layer(&self, layer: Box<dyn ScrollLayer>) {
        tracing::debug!("registered scroll layer {}", layer.name());
        self.layers.write().push(layer);
    }

    pub fn layer_count(&self) -> usize {
        self.layers.read().len()
    }

    /// Update the scroll geometry (on resize, font change, or edit).
    pub fn set_geometry(&self, geometry: ScrollGeometry) {
        *self.geometry.write() = geometry;
    }

    pub fn geometry(&self) -> ScrollGeometry {
        *self.geometry.read()
    }

    /// Record the measured scroll height of the authoritative surface.
    pub fn set_measured_height(&self, measured_height: f64) {
        self.geometry.write().measured_height = measured_height;
    }

    /// Update the document line count (after an edit).
    pub fn set_total_lines(&self, total_lines: u32) {
        self.geometry.write().total_lines = total_lines;
    }

    /// Accept a raw scroll event from the authoritative surface.
    ///
    /// Returns true when the caller must queue a frame; false when an
    /// already-pending frame absorbed the value.
    pub fn on_scroll(&self, raw: ScrollOffset) -> bool {
        self.pending.schedule(raw)
    }

    /// The per-tick frame callback: propagate the latest pending offset to
    /// every layer and feed the viewport tracker. No-op when nothing is
    /// pending.
    pub fn run_frame(&self) -> Option<SyncedScroll> {
        let raw = self.pending.take()?;
        let geometry = *self.geometry.read();

        let ratio = geometry.correction_ratio();
        let corrected = ScrollOffset::new(raw.top * ratio, raw.left);

        for layer in self.layers.read().iter() {
            layer.apply_scroll(corrected);
        }

        let viewport = self.viewport.compute(
            corrected.top,
            geometry.line_height,
            geometry.viewport_height,
            geometry.total_lines,
        );

        let synced = SyncedScroll { raw, corrected, viewport };
        let _ = self.events.send(synced);
        Some(synced)
    }

    /// Drop any pending frame. Called on component teardown so a stale
    /// frame never writes into torn-down layers.
    pub fn cancel_pending(&self) {
        if self.pending.cancel() {
            tracing::debug!("cancelled pending scroll frame");
        }
    }

    pub fn has_pending_frame(&self) -> bool {
        self.pending.has_pending()
    }
}
