//! The slash command menu.
//!
//! Pure presentation and selection state: a static catalog of block-type
//! commands, a live filter, and a focused row. The controller decides when
//! the menu opens and what a confirmation does to the document.

use serde::{Deserialize, Serialize};

use crate::floating::Placement;
use crate::model::BlockType;
use crate::selection::Rect;

/// One entry of the command catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandCandidate {
    pub kind: BlockType,
    pub label: &'static str,
    pub icon: &'static str,
    pub shortcut_text: &'static str,
}

/// The static catalog, one candidate per block type, in [`BlockType::ALL`]
/// order.
pub fn command_catalog() -> Vec<CommandCandidate> {
    BlockType::ALL
        .iter()
        .map(|kind| CommandCandidate {
            kind: *kind,
            label: kind.label(),
            icon: kind.icon(),
            shortcut_text: kind.shortcut_text(),
        })
        .collect()
}

/// Focus movement policy at the ends of the candidate list.
///
/// The default wraps around, matching arrow-key navigation in the slash
/// menu; `Clamp` stops at the ends. Whichever is configured applies
/// consistently to every `move_focus` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MenuWrap {
    #[default]
    Wrap,
    Clamp,
}

/// Filterable, keyboard-navigable command list.
pub struct CommandMenu {
    candidates: Vec<CommandCandidate>,
    wrap: MenuWrap,
    open: bool,
    filter: String,
    focused: usize,
    anchor: Option<Rect>,
    placement: Option<Placement>,
}

impl CommandMenu {
    pub fn new(wrap: MenuWrap) -> Self {
        Self {
            candidates: command_catalog(),
            wrap,
            open: false,
            filter: String::new(),
            focused: 0,
            anchor: None,
            placement: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn filter(&self) -> &str {
        self.filter.as_str()
    }

    pub fn anchor(&self) -> Option<Rect> {
        self.anchor
    }

    pub fn placement(&self) -> Option<Placement> {
        self.placement
    }

    pub fn set_placement(&mut self, placement: Option<Placement>) {
        self.placement = placement;
    }

    pub fn open(&mut self, anchor: Option<Rect>) {
        self.open = true;
        self.anchor = anchor;
        self.filter.clear();
        self.focused = 0;
    }

    /// Closing is always safe, whatever state the menu is in.
    pub fn close(&mut self) {
        self.open = false;
        self.filter.clear();
        self.focused = 0;
        self.anchor = None;
        self.placement = None;
    }

    /// Replace the filter query; focus resets to the first match.
    pub fn set_filter(&mut self, query: &str) {
        self.filter = query.to_string();
        self.focused = 0;
    }

    /// Candidates matching the filter, original order preserved. Matches
    /// label, shortcut text, or type name, case-insensitively, substring.
    pub fn filtered(&self) -> Vec<CommandCandidate> {
        let needle = self.filter.to_lowercase();
        self.candidates
            .iter()
            .filter(|c| {
                needle.is_empty()
                    || c.label.to_lowercase().contains(&needle)
                    || c.shortcut_text.contains(needle.as_str())
                    || c.kind.name().contains(needle.as_str())
            })
            .copied()
            .collect()
    }

    /// Whether any candidate label/name/shortcut matches `word`. Used by
    /// the detector's abandoning rule.
    pub fn matches_any(&self, word: &str) -> bool {
        let needle = word.to_lowercase();
        self.candidates.iter().any(|c| {
            c.label.to_lowercase().contains(&needle)
                || c.shortcut_text.contains(needle.as_str())
                || c.kind.name().contains(needle.as_str())
        })
    }

    /// Index of the focused row within the filtered list.
    pub fn focused_index(&self) -> usize {
        let count = self.filtered().len();
        if count == 0 { 0 } else { self.focused.min(count - 1) }
    }

    /// Move focus by `delta` rows, wrapping or clamping per policy.
    pub fn move_focus(&mut self, delta: isize) {
        let count = self.filtered().len();
        if count == 0 {
            self.focused = 0;
            return;
        }
        let current = self.focused_index() as isize;
        let moved = current + delta;
        self.focused = match self.wrap {
            MenuWrap::Wrap => moved.rem_euclid(count as isize) as usize,
            MenuWrap::Clamp => moved.clamp(0, count as isize - 1) as usize,
        };
    }

    /// The focused candidate, if the filtered list is non-empty. An empty
    /// result is an explicit empty state and the menu stays open.
    pub fn confirm_focused(&self) -> Option<CommandCandidate> {
        self.filtered().get(self.focused_index()).copied()
    }
}

impl Default for CommandMenu {
    fn default() -> Self {
        Self::new(MenuWrap::default())
    }
}
