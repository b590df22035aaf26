//! Tessera: a block-oriented rich-text editing engine.
//!
//! The engine turns an editable surface into a structured document of
//! typed blocks and interprets keystrokes as structural edits: Enter
//! splits a block, Backspace at a block's start merges it, arrows cross
//! block boundaries, `/` opens a command menu, markdown shortcuts retype
//! blocks, and a floating toolbar formats the live selection.
//!
//! Everything host-specific is injected: selection primitives through
//! [`selection::SelectionHost`], panel positioning through
//! [`floating::FloatingLayer`]. The engine itself does no I/O and keeps no
//! global state, so it runs the same under a browser shell, the bundled
//! terminal demo, or a test harness.

pub mod controller;
pub mod detect;
pub mod events;
pub mod floating;
pub mod html;
pub mod inline;
pub mod menu;
pub mod model;
pub mod normalize;
pub mod selection;
pub mod toolbar;

// Re-export key types for easier usage
pub use controller::{
    EditorController, EditorOptions, EditorState, Key, KeyDisposition, KeyInput,
};
pub use events::{BlockAction, Deferral, DeferredTask, EditorEvent};
pub use floating::{FloatingLayer, IconSource, NullFloatingLayer, Placement, PreferredSide};
pub use menu::{CommandCandidate, CommandMenu, MenuWrap, command_catalog};
pub use model::{Block, BlockId, BlockType, Document, ModelError};
pub use normalize::{NormalizedContent, normalize, normalize_html};
pub use selection::{
    MemorySelection, RawSelection, Rect, SelectionHost, SelectionSnapshot, SelectionTracker,
};
pub use toolbar::{FormatToolbar, InlineFormat, ToolbarVisibility};
