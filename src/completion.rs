//! Editing helpers for the source buffer. All positions are char offsets.

pub const MAX_SUGGESTIONS: usize = 8;

const PAIRS: [(char, char); 6] = [
    ('{', '}'),
    ('(', ')'),
    ('[', ']'),
    ('<', '>'),
    ('"', '"'),
    ('\'', '\''),
];

/// Result of an edit: the new text and the selection to put back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub text: String,
    pub selection_start: usize,
    pub selection_end: usize,
}

impl Edit {
    fn caret(text: String, at: usize) -> Self {
        Self {
            text,
            selection_start: at,
            selection_end: at,
        }
    }
}

pub fn closing_pair(open: char) -> Option<char> {
    PAIRS
        .iter()
        .find(|(o, _)| *o == open)
        .map(|(_, close)| *close)
}

fn is_closing(ch: char) -> bool {
    PAIRS.iter().any(|(_, close)| *close == ch)
}

/// Handles a typed character for pair autocompletion.
///
/// Openers insert their pair (wrapping the selection if any). A closer typed
/// right before the same closer just steps over it. `None` means the caller
/// should insert `typed` normally.
pub fn auto_pair(text: &str, start: usize, end: usize, typed: char) -> Option<Edit> {
    let (start, end) = if start <= end { (start, end) } else { (end, start) };

    if let Some(close) = closing_pair(typed) {
        let start_byte = byte_offset(text, start);
        let end_byte = byte_offset(text, end);
        let mut out = String::with_capacity(text.len() + 2);
        out.push_str(&text[..start_byte]);
        out.push(typed);
        out.push_str(&text[start_byte..end_byte]);
        out.push(close);
        out.push_str(&text[end_byte..]);
        return Some(Edit {
            text: out,
            selection_start: start + 1,
            selection_end: end + 1,
        });
    }

    if is_closing(typed) && start == end {
        let next = text[byte_offset(text, start)..].chars().next();
        if next == Some(typed) {
            return Some(Edit::caret(text.to_string(), start + 1));
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSuggestion {
    pub items: Vec<String>,
    /// Position of the `{` that opened the marker being typed.
    pub brace: usize,
}

/// Marker keys matching the `{prefix` typed just before the cursor.
pub fn suggest_markers<'k>(
    text: &str,
    cursor: usize,
    keys: impl IntoIterator<Item = &'k str>,
) -> Option<MarkerSuggestion> {
    let cursor_byte = byte_offset(text, cursor);
    let before = &text[..cursor_byte];
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let brace_byte = line_start + before[line_start..].rfind('{')?;

    let typed = &before[brace_byte + 1..];
    if typed.contains(['}', ':']) {
        return None;
    }
    if !typed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return None;
    }

    let query = typed.to_lowercase();
    let items: Vec<String> = keys
        .into_iter()
        .filter(|key| key.to_lowercase().starts_with(&query))
        .take(MAX_SUGGESTIONS)
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        return None;
    }

    Some(MarkerSuggestion {
        items,
        brace: text[..brace_byte].chars().count(),
    })
}

/// Replaces `{typed` before the cursor with `{key:` and closes the marker
/// unless a `}` already follows the cursor.
pub fn apply_marker_suggestion(text: &str, cursor: usize, brace: usize, key: &str) -> Option<Edit> {
    if brace >= cursor || cursor > text.chars().count() {
        return None;
    }
    let brace_byte = byte_offset(text, brace);
    let cursor_byte = byte_offset(text, cursor);
    let after = &text[cursor_byte..];
    let opener = format!("{{{key}:");

    let mut out = String::with_capacity(text.len() + opener.len() + 1);
    out.push_str(&text[..brace_byte]);
    out.push_str(&opener);
    if !after.starts_with('}') {
        out.push('}');
    }
    out.push_str(after);

    let caret = brace + opener.chars().count();
    Some(Edit::caret(out, caret))
}

fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}
