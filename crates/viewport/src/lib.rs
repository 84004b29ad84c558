//! # Skein Viewport
//!
//! Computes which line window must be materialized for rendering, given the
//! scroll position, with a padding margin and hysteresis against sub-pixel
//! scroll jitter.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A half-open line window `[start_line, end_line)` within `[0, total_lines]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportRange {
    pub start_line: u32,
    pub end_line: u32,
}

impl ViewportRange {
    pub fn new(start_line: u32, end_line: u32) -> Self {
        Self { start_line, end_line: end_line.max(start_line) }
    }

    pub fn len(&self) -> u32 {
        self.end_line - self.start_line
    }

    pub fn is_empty(&self) -> bool {
        self.end_line == self.start_line
    }

    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line < self.end_line
    }

    /// Smallest range covering both.
    pub fn union(&self, other: ViewportRange) -> ViewportRange {
        ViewportRange {
            start_line: self.start_line.min(other.start_line),
            end_line: self.end_line.max(other.end_line),
        }
    }

    /// Does this range cover all of `other`?
    pub fn covers(&self, other: ViewportRange) -> bool {
        self.start_line <= other.start_line && self.end_line >= other.end_line
    }

    pub fn lines(&self) -> impl Iterator<Item = u32> {
        self.start_line..self.end_line
    }
}

/// Viewport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportConfig {
    /// Extra lines materialized on each side of the visible window
    pub padding_lines: u32,
    /// Minimum start/end movement before the published range is replaced
    pub hysteresis_lines: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self { padding_lines: 20, hysteresis_lines: 10 }
    }
}

/// Viewport tracker
pub struct ViewportTracker {
    config: RwLock<ViewportConfig>,
    published: RwLock<Option<ViewportRange>>,
}

impl ViewportTracker {
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config: RwLock::new(config),
            published: RwLock::new(None),
        }
    }

    pub fn configure(&self, config: ViewportConfig) {
        *self.config.write() = config;
    }

    pub fn config(&self) -> ViewportConfig {
        self.config.read().clone()
    }

    /// The last published range, or absent before the first compute.
    pub fn current(&self) -> Option<ViewportRange> {
        *self.published.read()
    }

    /// Forget the published range, e.g. when switching documents.
    pub fn reset(&self) {
        *self.published.write() = None;
    }

    /// Compute the window to materialize for the given scroll geometry.
    ///
    /// Total: out-of-range inputs are clamped, never rejected. The returned
    /// range always covers the geometrically visible lines; the previously
    /// published range is kept while neither bound has moved past the
    /// hysteresis threshold.
    pub fn compute(
        &self,
        scroll_top: f64,
        line_height: f64,
        viewport_height: f64,
        total_lines: u32,
    ) -> ViewportRange {
        let config = self.config.read().clone();

        let line_height = if line_height.is_finite() && line_height > 0.0 {
            line_height
        } else {
            1.0
        };
        let scroll_top = if scroll_top.is_finite() { scroll_top.max(0.0) } else { 0.0 };
        let viewport_height = if viewport_height.is_finite() {
            viewport_height.max(0.0)
        } else {
            0.0
        };

        let visible_start = ((scroll_top / line_height).floor() as u32).min(total_lines);
        let visible_end = (((scroll_top + viewport_height) / line_height).ceil() as u32)
            .clamp(visible_start, total_lines);
        let visible = ViewportRange::new(visible_start, visible_end);

        let padded = ViewportRange::new(
            visible_start.saturating_sub(config.padding_lines),
            visible_end.saturating_add(config.padding_lines).min(total_lines),
        );

        let mut published = self.published.write();

        let candidate = match *published {
            Some(previous)
                if previous.start_line.abs_diff(padded.start_line) <= config.hysteresis_lines
                    && previous.end_line.abs_diff(padded.end_line) <= config.hysteresis_lines =>
            {
                previous
            }
            _ => padded,
        };

        // Whatever hysteresis decided, what is on screen must be covered.
        let exposed = candidate.union(visible);
        *published = Some(exposed);
        exposed
    }
}

impl Default for ViewportTracker {
    fn default() -> Self {
        Self::new(ViewportConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE_HEIGHT: f64 = 20.0;
    const VIEW_HEIGHT: f64 = 600.0; // 30 lines

    fn visible_range(scroll_top: f64, total_lines: u32) -> ViewportRange {
        let start = (scroll_top / LINE_HEIGHT).floor() as u32;
        let end = (((scroll_top + VIEW_HEIGHT) / LINE_HEIGHT).ceil() as u32).min(total_lines);
        ViewportRange::new(start.min(total_lines), end)
    }

    #[test]
    fn test_visible_window_is_always_covered() {
        let tracker = ViewportTracker::default();

        for step in 0..200u32 {
            let scroll_top = step as f64 * 37.0;
            let range = tracker.compute(scroll_top, LINE_HEIGHT, VIEW_HEIGHT, 10_000);
            assert!(
                range.covers(visible_range(scroll_top, 10_000)),
                "scroll_top {scroll_top}: {range:?}"
            );
        }
    }

    #[test]
    fn test_padding_extends_both_sides() {
        let tracker = ViewportTracker::default();
        let range = tracker.compute(2000.0, LINE_HEIGHT, VIEW_HEIGHT, 10_000);

        // Visible is [100, 130); padded by 20 each side.
        assert_eq!(range, ViewportRange::new(80, 150));
    }

    #[test]
    fn test_hysteresis_absorbs_jitter() {
        let tracker = ViewportTracker::default();
        let first = tracker.compute(2000.0, LINE_HEIGHT, VIEW_HEIGHT, 10_000);

        // Oscillate by a few lines, well under the 10-line threshold.
        for delta in [40.0, -60.0, 100.0, -80.0, 0.0] {
            let range = tracker.compute(2000.0 + delta, LINE_HEIGHT, VIEW_HEIGHT, 10_000);
            assert_eq!(range, first, "delta {delta}");
        }
    }

    #[test]
    fn test_large_jump_republishes() {
        let tracker = ViewportTracker::default();
        let first = tracker.compute(2000.0, LINE_HEIGHT, VIEW_HEIGHT, 10_000);
        let jumped = tracker.compute(8000.0, LINE_HEIGHT, VIEW_HEIGHT, 10_000);

        assert_ne!(first, jumped);
        assert!(jumped.covers(visible_range(8000.0, 10_000)));
    }

    #[test]
    fn test_out_of_bounds_inputs_clamp() {
        let tracker = ViewportTracker::default();

        let range = tracker.compute(-500.0, LINE_HEIGHT, VIEW_HEIGHT, 100);
        assert_eq!(range.start_line, 0);
        assert!(range.end_line <= 100);

        let range = tracker.compute(1.0e12, LINE_HEIGHT, VIEW_HEIGHT, 100);
        assert!(range.end_line <= 100);
        assert!(range.start_line <= range.end_line);

        // Degenerate geometry falls back instead of dividing by zero
        let range = tracker.compute(50.0, 0.0, VIEW_HEIGHT, 100);
        assert!(range.end_line <= 100);

        let range = tracker.compute(f64::NAN, LINE_HEIGHT, f64::INFINITY, 100);
        assert!(range.end_line <= 100);
    }

    #[test]
    fn test_short_document_fits_entirely() {
        let tracker = ViewportTracker::default();
        let range = tracker.compute(0.0, LINE_HEIGHT, VIEW_HEIGHT, 12);
        assert_eq!(range, ViewportRange::new(0, 12));
        assert_eq!(range.len(), 12);
        assert!(!range.is_empty());
        assert_eq!(range.lines().count(), 12);
    }

    #[test]
    fn test_reset_forgets_published_range() {
        let tracker = ViewportTracker::default();
        tracker.compute(2000.0, LINE_HEIGHT, VIEW_HEIGHT, 10_000);
        assert!(tracker.current().is_some());

        tracker.reset();
        assert!(tracker.current().is_none());

        // Fresh publish, no hysteresis against the old range.
        let range = tracker.compute(0.0, LINE_HEIGHT, VIEW_HEIGHT, 10_000);
        assert_eq!(range.start_line, 0);
    }
}
