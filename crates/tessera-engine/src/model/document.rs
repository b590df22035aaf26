use thiserror::Error;

use super::block::{Block, BlockId, BlockType};

/// Errors from block model operations.
///
/// `NotFound` is the only variant: the referenced block left the model
/// before the operation arrived. Callers above the model recover it as a
/// no-op; it is never surfaced to the host.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("block {0} is not in the document")]
    NotFound(BlockId),
}

/// The document: a non-empty ordered sequence of blocks.
///
/// All operations are synchronous and order preserving. No operation can
/// leave the sequence empty: an empty document is one empty paragraph
/// block, never zero blocks. The controller is the only writer; everything
/// else reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    blocks: Vec<Block>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            blocks: vec![Block::empty_paragraph()],
        }
    }
}

impl Document {
    /// Build a document from a block sequence. An empty input collapses to
    /// the single-empty-paragraph representation.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        if blocks.is_empty() {
            Self::default()
        } else {
            Self { blocks }
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        // The sequence itself is never empty; "empty" means the default
        // single blank paragraph.
        self.blocks.len() == 1 && self.blocks[0].kind == BlockType::Paragraph && self.blocks[0].is_empty()
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    pub fn index_of(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    /// The block before `id`, if any.
    pub fn previous(&self, id: BlockId) -> Option<&Block> {
        let idx = self.index_of(id)?;
        idx.checked_sub(1).map(|i| &self.blocks[i])
    }

    /// The block after `id`, if any.
    pub fn next(&self, id: BlockId) -> Option<&Block> {
        let idx = self.index_of(id)?;
        self.blocks.get(idx + 1)
    }

    /// Nearest editable block before `id`, skipping dividers.
    pub fn previous_editable(&self, id: BlockId) -> Option<&Block> {
        let idx = self.index_of(id)?;
        self.blocks[..idx].iter().rev().find(|b| b.kind.is_editable())
    }

    /// Nearest editable block after `id`, skipping dividers.
    pub fn next_editable(&self, id: BlockId) -> Option<&Block> {
        let idx = self.index_of(id)?;
        self.blocks[idx + 1..].iter().find(|b| b.kind.is_editable())
    }

    /// Insert `block` immediately after the block with `after`.
    pub fn insert_after(&mut self, after: BlockId, block: Block) -> Result<(), ModelError> {
        let idx = self.index_of(after).ok_or(ModelError::NotFound(after))?;
        self.blocks.insert(idx + 1, block);
        Ok(())
    }

    /// Remove the block with `id`.
    ///
    /// Returns the removed block, or `None` when `id` named the last
    /// remaining block: the document refuses to drop below one block, so
    /// the block is cleared to an empty paragraph in place instead.
    pub fn remove(&mut self, id: BlockId) -> Result<Option<Block>, ModelError> {
        let idx = self.index_of(id).ok_or(ModelError::NotFound(id))?;
        if self.blocks.len() == 1 {
            let block = &mut self.blocks[0];
            block.content.clear();
            block.kind = BlockType::Paragraph;
            block.attrs.clear();
            return Ok(None);
        }
        Ok(Some(self.blocks.remove(idx)))
    }

    /// Replace the block's inline content. Dividers are non-editable; a
    /// content update against one is accepted and ignored.
    pub fn update_content(
        &mut self,
        id: BlockId,
        content: impl Into<String>,
    ) -> Result<(), ModelError> {
        let block = self.get_mut(id).ok_or(ModelError::NotFound(id))?;
        if block.kind.is_editable() {
            block.content = content.into();
        }
        Ok(())
    }

    /// Change the block's type in place, preserving id and content.
    /// Retyping to a divider clears content (dividers are always empty).
    pub fn retype(&mut self, id: BlockId, kind: BlockType) -> Result<(), ModelError> {
        let block = self.get_mut(id).ok_or(ModelError::NotFound(id))?;
        block.kind = kind;
        if kind == BlockType::Divider {
            block.content.clear();
        }
        Ok(())
    }

    /// Move the block to `to_index` (clamped to the sequence length).
    pub fn move_block(&mut self, id: BlockId, to_index: usize) -> Result<(), ModelError> {
        let idx = self.index_of(id).ok_or(ModelError::NotFound(id))?;
        let block = self.blocks.remove(idx);
        let to = to_index.min(self.blocks.len());
        self.blocks.insert(to, block);
        Ok(())
    }

    /// Replace the whole sequence (programmatic `set_value`).
    pub fn replace_all(&mut self, blocks: Vec<Block>) {
        *self = Self::from_blocks(blocks);
    }
}
