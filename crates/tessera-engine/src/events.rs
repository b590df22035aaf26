//! Events emitted to the host application.
//!
//! The controller accumulates events during each synchronous handler and
//! the host drains them afterwards with
//! [`EditorController::take_events`](crate::controller::EditorController::take_events).

use serde::Serialize;

use crate::model::{Block, BlockId};

/// What a block change did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockAction {
    Add,
    Remove,
    Update,
    Move,
}

/// A deferred-work slot (the engine's only asynchronous boundaries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeferredTask {
    /// Re-measure and re-anchor the open overlay once layout has settled
    /// (one animation frame).
    RemeasureOverlay,
    /// Finalize a blur after the short grace period that lets focus move
    /// into the menu/toolbar without counting as leaving the editor.
    FinalizeBlur,
}

/// Handle for a scheduled deferred task. The generation makes completion
/// idempotent: a handle superseded by newer work fires as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Deferral {
    pub task: DeferredTask,
    pub generation: u64,
}

/// Events delivered to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EditorEvent {
    /// The block sequence changed. Carries the full sequence, the block
    /// the change centered on, and what happened to it.
    #[serde(rename_all = "camelCase")]
    BlockChange {
        blocks: Vec<Block>,
        changed_block: Block,
        action: BlockAction,
    },
    /// Content changed under user input.
    #[serde(rename_all = "camelCase")]
    Input { value: String, text_content: String },
    /// Fired on blur when the value differs from its capture at focus
    /// time.
    #[serde(rename_all = "camelCase")]
    Change { value: String, text_content: String },
    Focus,
    Blur,
    /// The engine moved the caret; the host applies it to the platform
    /// selection.
    #[serde(rename_all = "camelCase")]
    CaretMoved { block_id: BlockId, offset: usize },
    /// The engine wants `complete_deferred` called back: after one
    /// animation frame for [`DeferredTask::RemeasureOverlay`], after
    /// ~100ms for [`DeferredTask::FinalizeBlur`].
    Schedule(Deferral),
}
