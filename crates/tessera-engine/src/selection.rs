//! Selection and caret tracking.
//!
//! The platform's selection primitives are injected through
//! [`SelectionHost`] rather than read from ambient globals, so tests and
//! headless hosts provide their own. The tracker derives a
//! [`SelectionSnapshot`] per event (boundary predicates and an anchoring
//! rectangle) and never caches across events.
//!
//! Offsets are byte offsets into a block's flattened plain text. Offset 0
//! is therefore the structural start of the block by construction; there is
//! no "first character of a sub-element" ambiguity to resolve.

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::model::{BlockId, Document};

/// Viewport-relative rectangle used to anchor floating UI.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// What the host reports: which block the selection lives in, its range in
/// that block's plain text, and a bounding rectangle if one is available.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSelection {
    pub block_id: BlockId,
    pub range: Range<usize>,
    pub rect: Option<Rect>,
}

impl RawSelection {
    pub fn caret(block_id: BlockId, offset: usize) -> Self {
        Self {
            block_id,
            range: offset..offset,
            rect: None,
        }
    }
}

/// The injected selection primitives. Implemented over the DOM selection
/// in a browser host, over app state in headless hosts.
pub trait SelectionHost {
    /// Current selection, or `None` when the host reports none.
    fn read(&self) -> Option<RawSelection>;

    /// Place a collapsed caret. Called after structural transitions
    /// (split, merge, navigation) to move the platform caret.
    fn write_caret(&mut self, block_id: BlockId, offset: usize);
}

/// Derived, never-cached view of the current selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSnapshot {
    pub block_id: Option<BlockId>,
    pub range: Range<usize>,
    pub collapsed: bool,
    pub at_start: bool,
    pub at_end: bool,
    pub rect: Option<Rect>,
}

impl SelectionSnapshot {
    /// The "no selection" snapshot.
    pub fn inactive() -> Self {
        Self {
            block_id: None,
            range: 0..0,
            collapsed: true,
            at_start: false,
            at_end: false,
            rect: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.block_id.is_some()
    }

    pub fn has_range(&self) -> bool {
        self.block_id.is_some() && !self.collapsed
    }
}

/// Wraps the injected host and turns raw selections into snapshots.
pub struct SelectionTracker {
    host: Box<dyn SelectionHost>,
}

impl SelectionTracker {
    pub fn new(host: Box<dyn SelectionHost>) -> Self {
        Self { host }
    }

    /// Snapshot the current selection against the document. Never fails:
    /// a missing selection or a reference to a block no longer in the
    /// model yields the inactive snapshot.
    pub fn snapshot(&self, doc: &Document) -> SelectionSnapshot {
        let Some(raw) = self.host.read() else {
            return SelectionSnapshot::inactive();
        };
        let Some(block) = doc.get(raw.block_id) else {
            return SelectionSnapshot::inactive();
        };
        let len = block.text_len();
        let start = raw.range.start.min(len);
        let end = raw.range.end.min(len).max(start);
        let collapsed = start == end;
        SelectionSnapshot {
            block_id: Some(raw.block_id),
            range: start..end,
            collapsed,
            at_start: collapsed && start == 0,
            at_end: collapsed && end == len,
            rect: raw.rect,
        }
    }

    /// True structural start-of-block: collapsed caret at offset 0.
    pub fn is_at_block_start(&self, doc: &Document, block_id: BlockId) -> bool {
        let snap = self.snapshot(doc);
        snap.block_id == Some(block_id) && snap.at_start
    }

    /// True structural end-of-block: collapsed caret at the plain-text end.
    pub fn is_at_block_end(&self, doc: &Document, block_id: BlockId) -> bool {
        let snap = self.snapshot(doc);
        snap.block_id == Some(block_id) && snap.at_end
    }

    pub fn write_caret(&mut self, block_id: BlockId, offset: usize) {
        self.host.write_caret(block_id, offset);
    }
}

/// In-memory [`SelectionHost`] for headless embeddings and tests.
///
/// Cloneable handle over shared interior state: the host application keeps
/// one clone to feed caret movement in, the controller owns another through
/// the tracker. Single-threaded by design, like the rest of the engine.
#[derive(Clone, Default)]
pub struct MemorySelection {
    inner: Rc<RefCell<Option<RawSelection>>>,
}

impl MemorySelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, selection: Option<RawSelection>) {
        *self.inner.borrow_mut() = selection;
    }

    pub fn set_caret(&self, block_id: BlockId, offset: usize) {
        self.set(Some(RawSelection::caret(block_id, offset)));
    }

    pub fn set_range(&self, block_id: BlockId, range: Range<usize>, rect: Option<Rect>) {
        self.set(Some(RawSelection {
            block_id,
            range,
            rect,
        }));
    }

    pub fn get(&self) -> Option<RawSelection> {
        self.inner.borrow().clone()
    }
}

impl SelectionHost for MemorySelection {
    fn read(&self) -> Option<RawSelection> {
        self.get()
    }

    fn write_caret(&mut self, block_id: BlockId, offset: usize) {
        self.set_caret(block_id, offset);
    }
}
