//! Session configuration and reparse pacing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration surfaced to the editor core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Font size in pixels
    pub font_size: f64,
    /// Line height as a multiple of font size
    pub line_height_multiplier: f64,
    /// Spaces inserted per Tab
    pub tab_width: usize,
    /// Extra lines materialized on each side of the visible window
    pub viewport_padding_lines: u32,
    /// Minimum start/end movement before the viewport range is replaced
    pub hysteresis_lines: u32,
    /// Documents remembered by the view-state cache
    pub view_state_capacity: usize,
    /// Documents at or below this byte size reparse synchronously on edit
    pub sync_parse_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            font_size: 14.0,
            line_height_multiplier: 1.5,
            tab_width: 4,
            viewport_padding_lines: 20,
            hysteresis_lines: 10,
            view_state_capacity: view_state::DEFAULT_CAPACITY,
            sync_parse_limit: 64 * 1024,
        }
    }
}

impl SessionConfig {
    /// Line height in pixels.
    pub fn line_height(&self) -> f64 {
        self.font_size * self.line_height_multiplier
    }
}

/// How an edit's reparse was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReparseMode {
    /// Parsed synchronously inside the edit call
    Immediate,
    /// Deferred; `flush_reparse` drains the pending slot
    Deferred(Duration),
}

/// Debounce curve for large documents: the bigger the document, the longer
/// the quiet period before reparsing.
pub fn reparse_delay(text_len: usize, sync_limit: usize) -> Option<Duration> {
    if text_len <= sync_limit {
        return None;
    }

    let excess_chunks = (text_len - sync_limit) / (32 * 1024);
    let millis = (8 + excess_chunks as u64).min(50);
    Some(Duration::from_millis(millis))
}
