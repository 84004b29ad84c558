//! Pure multi-cursor edit transforms.
//!
//! One user action is applied atomically across every cursor. Splices run
//! back-to-front (descending original offset), so each splice position is
//! taken from the untouched prefix of the string and never needs
//! adjustment. Final cursor offsets then advance by the accumulated length
//! of the splices at or before their own original offset. Selections
//! collapse to their cursor when an edit applies.

use serde::{Deserialize, Serialize};

use document::{TextPosition, clamp_to_char_boundary};

use crate::{Cursor, MultiCursorState};

/// A single user edit action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditOp {
    /// Type text at every cursor
    Insert(String),
    /// Delete one char before every cursor
    Backspace,
    /// Insert a line break at every cursor
    Newline,
    /// Insert indentation at every cursor
    Tab,
}

/// Edit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditConfig {
    /// Spaces inserted per Tab
    pub tab_width: usize,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self { tab_width: 4 }
    }
}

impl EditOp {
    /// The text this op inserts, or absent for deletions.
    fn inserted_text(&self, config: &EditConfig) -> Option<String> {
        match self {
            EditOp::Insert(text) => Some(text.clone()),
            EditOp::Newline => Some("\n".to_string()),
            EditOp::Tab => Some(" ".repeat(config.tab_width.max(1))),
            EditOp::Backspace => None,
        }
    }
}

/// Apply one edit op across all cursors.
pub fn apply_edit(
    text: &str,
    state: &MultiCursorState,
    op: &EditOp,
    config: &EditConfig,
) -> (String, MultiCursorState) {
    match op.inserted_text(config) {
        Some(inserted) => apply_insert(text, state, &inserted),
        None => apply_backspace(text, state),
    }
}

/// Insert `inserted` at every cursor.
///
/// Each cursor ends up just after its own insertion; cursors further into
/// the document also absorb the length of every insertion before them.
/// Cursors that land on the same final offset are kept distinct.
pub fn apply_insert(
    text: &str,
    state: &MultiCursorState,
    inserted: &str,
) -> (String, MultiCursorState) {
    if inserted.is_empty() {
        return (text.to_string(), state.clone());
    }

    // (cursor id, clamped original offset), ascending.
    let mut cursors = clamped_offsets(text, state);
    cursors.sort_by_key(|(_, offset)| *offset);

    let mut new_text = text.to_string();
    for (_, offset) in cursors.iter().rev() {
        new_text.insert_str(*offset, inserted);
    }

    // Walk forward, accumulating the shift from insertions at or before
    // each cursor's original offset.
    let mut shift = 0;
    let rebuilt = cursors
        .iter()
        .map(|(id, offset)| {
            shift += inserted.len();
            Cursor::new(*id, TextPosition::at_offset(&new_text, offset + shift))
        })
        .collect();

    (new_text, state.rebuilt(rebuilt))
}

/// Delete the char before every cursor.
///
/// A cursor at offset 0 is a no-op for that cursor only; the rest of the
/// set still applies.
pub fn apply_backspace(text: &str, state: &MultiCursorState) -> (String, MultiCursorState) {
    let mut cursors = clamped_offsets(text, state);
    cursors.sort_by_key(|(_, offset)| *offset);

    // Bytes removed by each cursor, measured against the original text:
    // descending splices never touch the text before a cursor's offset.
    let removals: Vec<usize> = cursors
        .iter()
        .map(|(_, offset)| match *offset {
            0 => 0,
            offset => offset - prev_char_boundary(text, offset),
        })
        .collect();

    let mut new_text = text.to_string();
    for ((_, offset), removed) in cursors.iter().zip(&removals).rev() {
        if *removed > 0 {
            new_text.replace_range(offset - removed..*offset, "");
        }
    }

    let mut shift = 0;
    let rebuilt = cursors
        .iter()
        .zip(&removals)
        .map(|((id, offset), removed)| {
            shift += removed;
            Cursor::new(*id, TextPosition::at_offset(&new_text, offset - shift))
        })
        .collect();

    (new_text, state.rebuilt(rebuilt))
}

fn clamped_offsets(text: &str, state: &MultiCursorState) -> Vec<(crate::CursorId, usize)> {
    state
        .cursors()
        .iter()
        .map(|c| (c.id, clamp_to_char_boundary(text, c.position.offset)))
        .collect()
}

/// Byte index where the char ending at `offset` starts.
fn prev_char_boundary(text: &str, offset: usize) -> usize {
    let mut index = offset - 1;
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at(text: &str, offsets: &[usize]) -> MultiCursorState {
        let mut state = MultiCursorState::single(TextPosition::at_offset(text, offsets[0]));
        for &offset in &offsets[1..] {
            state.add_cursor(TextPosition::at_offset(text, offset));
        }
        state
    }

    fn sorted_offsets(state: &MultiCursorState) -> Vec<usize> {
        let mut offsets: Vec<usize> =
            state.cursors().iter().map(|c| c.position.offset).collect();
        offsets.sort();
        offsets
    }

    #[test]
    fn test_insert_advances_by_preceding_insertions() {
        // Cursors at 5, 10, 20 in a 30-char document; "XYZ" at each.
        let text = "0123456789ABCDEFGHIJKLMNOPQRST";
        let state = state_at(text, &[5, 10, 20]);

        let (new_text, new_state) = apply_insert(text, &state, "XYZ");

        assert_eq!(new_text.len(), 39);
        assert_eq!(sorted_offsets(&new_state), vec![8, 16, 29]);
        assert_eq!(new_text, "01234XYZ56789XYZABCDEFGHIJXYZKLMNOPQRST");
    }

    #[test]
    fn test_backspace_at_zero_is_noop_for_that_cursor() {
        let text = "hello";
        let state = state_at(text, &[0, 5]);

        let (new_text, new_state) = apply_backspace(text, &state);

        assert_eq!(new_text, "hell");
        assert_eq!(sorted_offsets(&new_state), vec![0, 4]);
    }

    #[test]
    fn test_backspace_all_at_zero_changes_nothing() {
        let text = "hello";
        let state = state_at(text, &[0]);

        let (new_text, new_state) = apply_backspace(text, &state);
        assert_eq!(new_text, "hello");
        assert_eq!(sorted_offsets(&new_state), vec![0]);
    }

    #[test]
    fn test_adjacent_backspaces_land_on_same_offset_unmerged() {
        let text = "abc";
        let state = state_at(text, &[1, 2]);

        let (new_text, new_state) = apply_backspace(text, &state);

        assert_eq!(new_text, "c");
        // Both cursors land on offset 0 and are deliberately kept distinct.
        assert_eq!(sorted_offsets(&new_state), vec![0, 0]);
        assert_eq!(new_state.cursor_count(), 2);
    }

    #[test]
    fn test_insert_recomputes_line_and_column() {
        let text = "ab\ncd";
        let state = state_at(text, &[1, 4]);

        let (new_text, new_state) = apply_edit(
            text,
            &state,
            &EditOp::Newline,
            &EditConfig::default(),
        );

        assert_eq!(new_text, "a\nb\nc\nd");
        let mut cursors: Vec<_> = new_state.cursors().to_vec();
        cursors.sort_by_key(|c| c.position.offset);

        assert_eq!(cursors[0].position, TextPosition::new(1, 0, 2));
        assert_eq!(cursors[1].position, TextPosition::new(3, 0, 6));
    }

    #[test]
    fn test_tab_expands_to_configured_width() {
        let text = "x";
        let state = state_at(text, &[0]);

        let config = EditConfig { tab_width: 2 };
        let (new_text, new_state) = apply_edit(text, &state, &EditOp::Tab, &config);

        assert_eq!(new_text, "  x");
        assert_eq!(sorted_offsets(&new_state), vec![2]);
    }

    #[test]
    fn test_multibyte_backspace_removes_whole_char() {
        let text = "héllo";
        let state = state_at(text, &[3]); // after the 2-byte 'é'

        let (new_text, new_state) = apply_backspace(text, &state);

        assert_eq!(new_text, "hllo");
        assert_eq!(sorted_offsets(&new_state), vec![1]);
    }

    #[test]
    fn test_multibyte_insert_keeps_boundaries() {
        let text = "héllo";
        let state = state_at(text, &[1, 3]);

        let (new_text, new_state) = apply_insert(text, &state, "ü");

        assert_eq!(new_text, "hüéüllo");
        assert_eq!(sorted_offsets(&new_state), vec![3, 7]);
    }

    #[test]
    fn test_out_of_bounds_cursor_clamps_to_end() {
        let text = "ab";
        let mut state = MultiCursorState::single(TextPosition::new(0, 99, 99));

        let (new_text, _) = apply_insert(text, &state, "!");
        assert_eq!(new_text, "ab!");

        let (new_text, _) = apply_backspace(text, &state);
        assert_eq!(new_text, "a");

        // Insert still lands inside for a second, in-bounds cursor.
        state.add_cursor(TextPosition::at_offset(text, 1));
        let (new_text, _) = apply_insert(text, &state, "-");
        assert_eq!(new_text, "a-b-");
    }

    #[test]
    fn test_primary_identity_survives_transform() {
        let text = "one two three";
        let state = state_at(text, &[3, 7]);
        let primary = state.primary_id();

        let (_, new_state) = apply_insert(text, &state, ", ");

        assert_eq!(new_state.primary_id(), primary);
        // The primary was the cursor at offset 3; it moved to 5.
        assert_eq!(new_state.primary().unwrap().position.offset, 5);
    }

    #[test]
    fn test_single_cursor_is_the_one_element_case() {
        let text = "abc";
        let state = state_at(text, &[2]);

        let (new_text, new_state) =
            apply_edit(text, &state, &EditOp::Insert("Z".into()), &EditConfig::default());

        assert_eq!(new_text, "abZc");
        assert_eq!(sorted_offsets(&new_state), vec![3]);
    }
}
