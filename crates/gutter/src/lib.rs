//! # Skein Gutter
//!
//! Composes line numbers, fold markers, diagnostic dots, and git change
//! bars into per-line gutter content, querying only the current viewport
//! window.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use decorations::{ChangeKind, DecorationIndex, DecorationStyle, Severity};
use document::DocumentId;
use viewport::ViewportRange;

/// Gutter renderer
pub struct GutterRenderer {
    config: RwLock<GutterConfig>,
    /// Foldable lines per document: line -> collapsed?
    folds: RwLock<HashMap<DocumentId, HashMap<u32, bool>>>,
}

impl GutterRenderer {
    pub fn new(config: GutterConfig) -> Self {
        Self {
            config: RwLock::new(config),
            folds: RwLock::new(HashMap::new()),
        }
    }

    pub fn configure(&self, config: GutterConfig) {
        *self.config.write() = config;
    }

    pub fn config(&self) -> GutterConfig {
        self.config.read().clone()
    }

    /// Declare which lines can fold. Replaces previous fold points; already
    /// collapsed lines stay collapsed when still foldable.
    pub fn set_fold_points(&self, id: DocumentId, lines: Vec<u32>) {
        let mut folds = self.folds.write();
        let entry = folds.entry(id).or_default();

        let collapsed: Vec<u32> = entry
            .iter()
            .filter(|(_, folded)| **folded)
            .map(|(line, _)| *line)
            .collect();

        entry.clear();
        for line in lines {
            entry.insert(line, collapsed.contains(&line));
        }
    }

    /// Toggle a fold. No-op on lines that cannot fold.
    pub fn toggle_fold(&self, id: DocumentId, line: u32) {
        if let Some(entry) = self.folds.write().get_mut(&id) {
            if let Some(folded) = entry.get_mut(&line) {
                *folded = !*folded;
            }
        }
    }

    /// Drop fold state for a document.
    pub fn clear_folds(&self, id: DocumentId) {
        self.folds.write().remove(&id);
    }

    /// Compose gutter content for every line of the viewport window.
    ///
    /// Only the window's lines are visited; decorations outside it cost
    /// nothing. When several diagnostics cover a line the most severe wins;
    /// for git bars a deletion outranks a modification outranks an
    /// addition.
    pub fn render_window(
        &self,
        id: DocumentId,
        index: &DecorationIndex,
        window: ViewportRange,
        current_line: u32,
        total_lines: u32,
    ) -> Vec<GutterLine> {
        let config = self.config.read().clone();
        let folds = self.folds.read();
        let document_folds = folds.get(&id);

        window
            .lines()
            .filter(|line| *line < total_lines)
            .map(|line| {
                let mut diagnostic: Option<Severity> = None;
                let mut git: Option<ChangeKind> = None;

                for decoration in index.for_line(line) {
                    match decoration.style {
                        DecorationStyle::Diagnostic(severity) if config.show_diagnostics => {
                            // Severity orders most severe first.
                            diagnostic = Some(match diagnostic {
                                Some(current) => current.min(severity),
                                None => severity,
                            });
                        }
                        DecorationStyle::GitChange(kind) if config.show_git => {
                            git = Some(match git {
                                Some(current) => current.max(kind),
                                None => kind,
                            });
                        }
                        _ => {}
                    }
                }

                let fold = if config.show_folds {
                    document_folds.and_then(|f| f.get(&line)).map(|folded| {
                        if *folded {
                            FoldIndicator::Collapsed
                        } else {
                            FoldIndicator::Expanded
                        }
                    })
                } else {
                    None
                };

                GutterLine {
                    line,
                    number: format_line_number(&config, line, current_line, total_lines),
                    fold,
                    diagnostic,
                    git,
                    is_current: line == current_line,
                }
            })
            .collect()
    }

    /// Gutter width in character cells for the enabled columns.
    pub fn width(&self, total_lines: u32) -> u32 {
        let config = self.config.read();
        let mut width = 0;

        if config.line_numbers != LineNumberMode::Off {
            width += digits(total_lines) + 2; // +2 for padding
        }
        if config.show_folds {
            width += 2;
        }
        if config.show_diagnostics || config.show_git {
            width += 2;
        }

        width.max(4)
    }
}

impl Default for GutterRenderer {
    fn default() -> Self {
        Self::new(GutterConfig::default())
    }
}

fn digits(total_lines: u32) -> u32 {
    total_lines.max(1).to_string().len() as u32
}

fn format_line_number(
    config: &GutterConfig,
    line: u32,
    current_line: u32,
    total_lines: u32,
) -> Option<String> {
    let width = digits(total_lines) as usize;
    let display_line = line + 1; // 1-based for display

    match config.line_numbers {
        LineNumberMode::Off => None,
        LineNumberMode::On => Some(format!("{display_line:>width$}")),
        LineNumberMode::Relative => {
            if line == current_line {
                Some(format!("{display_line:>width$}"))
            } else {
                let relative = (line as i64 - current_line as i64).unsigned_abs();
                Some(format!("{relative:>width$}"))
            }
        }
    }
}

/// Composed gutter content for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GutterLine {
    pub line: u32,
    /// Formatted line number, absent when numbers are off
    pub number: Option<String>,
    pub fold: Option<FoldIndicator>,
    /// Most severe diagnostic covering the line
    pub diagnostic: Option<Severity>,
    /// Most prominent git change covering the line
    pub git: Option<ChangeKind>,
    pub is_current: bool,
}

/// Fold indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoldIndicator {
    Expanded,
    Collapsed,
}

impl FoldIndicator {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Expanded => "▼",
            Self::Collapsed => "▶",
        }
    }
}

/// Line number mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineNumberMode {
    /// No line numbers
    Off,
    /// Absolute line numbers
    On,
    /// Relative to the current line
    Relative,
}

/// Gutter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GutterConfig {
    pub line_numbers: LineNumberMode,
    pub show_folds: bool,
    pub show_diagnostics: bool,
    pub show_git: bool,
}

impl Default for GutterConfig {
    fn default() -> Self {
        Self {
            line_numbers: LineNumberMode::On,
            show_folds: true,
            show_diagnostics: true,
            show_git: true,
        }
    }
}
