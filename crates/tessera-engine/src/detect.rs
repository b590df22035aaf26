//! Command detection.
//!
//! Two independent detections run over the text around the caret: the `/`
//! trigger that opens the command menu, and the markdown shortcut table
//! that retypes a block on a Space keystroke. Both are pure functions over
//! block plain text; the controller owns all resulting state changes.

use crate::model::{BlockId, BlockType};

/// The fixed markdown shortcut table.
///
/// Longer tokens are matched first, so `##` wins over `#`. The divider
/// tokens are full-match only: `---` converts, `--- and more` does not.
pub const MARKDOWN_SHORTCUTS: &[(&str, BlockType)] = &[
    ("###", BlockType::Heading3),
    ("##", BlockType::Heading2),
    ("#", BlockType::Heading1),
    ("```", BlockType::Code),
    ("---", BlockType::Divider),
    ("***", BlockType::Divider),
    ("-", BlockType::BulletList),
    ("*", BlockType::BulletList),
    ("1.", BlockType::NumberedList),
    (">", BlockType::Quote),
];

/// A matched markdown shortcut: the target type and the content left over
/// once the shortcut token (and its separating space) is stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutMatch {
    pub kind: BlockType,
    pub rest: String,
    /// Bytes to strip from the front of the block's plain text.
    pub strip_len: usize,
}

/// Compare a block's plain text against the shortcut table, as evaluated
/// on a Space keystroke (before the space is inserted).
///
/// Match policy: exact equality with a token, or `token + " " + rest`.
/// Divider tokens accept the exact form only.
pub fn match_markdown_shortcut(text: &str) -> Option<ShortcutMatch> {
    for (token, kind) in MARKDOWN_SHORTCUTS {
        if text == *token {
            return Some(ShortcutMatch {
                kind: *kind,
                rest: String::new(),
                strip_len: token.len(),
            });
        }
        if *kind == BlockType::Divider {
            // Full match only: a prefix form like "--- note" stays text
            continue;
        }
        if let Some(rest) = text.strip_prefix(token).and_then(|r| r.strip_prefix(' ')) {
            return Some(ShortcutMatch {
                kind: *kind,
                rest: rest.to_string(),
                strip_len: token.len() + 1,
            });
        }
    }
    None
}

/// Live state of an open slash trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashState {
    pub block_id: BlockId,
    /// Byte offset of the `/` in the block's plain text.
    pub trigger_offset: usize,
    pub filter: String,
}

/// Whether a `/` typed at `caret` (offset just *after* the slash) opens
/// the menu: everything before the slash must be empty or whitespace.
pub fn slash_triggers(text: &str, caret: usize) -> bool {
    let Some(slash_at) = caret.checked_sub(1) else {
        return false;
    };
    if text.as_bytes().get(slash_at) != Some(&b'/') {
        return false;
    }
    text[..slash_at].chars().all(char::is_whitespace)
}

/// Outcome of re-evaluating an open slash trigger after an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashUpdate {
    /// Trigger still live; the filter is the text between `/` and caret.
    Filter(String),
    /// Trigger text was deleted or the filter stopped looking like a
    /// command query; the menu should close.
    Close,
}

/// Recompute the filter for an open trigger given the block's current
/// text and caret.
pub fn update_slash(state: &SlashState, text: &str, caret: usize) -> SlashUpdate {
    if caret <= state.trigger_offset
        || text.as_bytes().get(state.trigger_offset) != Some(&b'/')
        || caret > text.len()
    {
        return SlashUpdate::Close;
    }
    let filter = text[state.trigger_offset + 1..caret].to_string();
    SlashUpdate::Filter(filter)
}

/// The abandoning rule: once the filter contains whitespace, a first word
/// that matches no candidate means the user is writing prose, not picking
/// a command.
pub fn slash_should_close(filter: &str, matches_any: impl Fn(&str) -> bool) -> bool {
    let Some((first_word, _)) = filter.split_once(char::is_whitespace) else {
        return false;
    };
    !matches_any(first_word)
}
