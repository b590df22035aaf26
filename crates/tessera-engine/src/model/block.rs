use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::inline;

/// Stable identifier for a block.
///
/// Assigned once at creation and never reused. The id survives re-renders,
/// re-ordering and re-typing: converting a paragraph into a heading keeps the
/// same `BlockId`, only the [`BlockType`] changes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct BlockId(Uuid);

impl BlockId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The closed set of block types the editor understands.
///
/// Every type carries its rendering and command metadata through the
/// exhaustive tables below (`render_tag`, `label`, `icon`, `shortcut_text`),
/// so there is no string-keyed tag dispatch anywhere in the engine: adding a
/// variant forces every table to be extended before the crate compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockType {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletList,
    NumberedList,
    Quote,
    Code,
    Divider,
}

impl BlockType {
    /// Every block type, in catalog order. This is the order the command
    /// menu presents candidates in.
    pub const ALL: [BlockType; 9] = [
        BlockType::Paragraph,
        BlockType::Heading1,
        BlockType::Heading2,
        BlockType::Heading3,
        BlockType::BulletList,
        BlockType::NumberedList,
        BlockType::Quote,
        BlockType::Code,
        BlockType::Divider,
    ];

    /// Wire name of the type, matching the serde representation.
    pub fn name(&self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading1 => "heading1",
            BlockType::Heading2 => "heading2",
            BlockType::Heading3 => "heading3",
            BlockType::BulletList => "bullet-list",
            BlockType::NumberedList => "numbered-list",
            BlockType::Quote => "quote",
            BlockType::Code => "code",
            BlockType::Divider => "divider",
        }
    }

    /// HTML tag the block serializes to. List items serialize as `li`;
    /// contiguous runs are wrapped in `ul`/`ol` by the serializer.
    pub fn render_tag(&self) -> &'static str {
        match self {
            BlockType::Paragraph => "p",
            BlockType::Heading1 => "h1",
            BlockType::Heading2 => "h2",
            BlockType::Heading3 => "h3",
            BlockType::BulletList | BlockType::NumberedList => "li",
            BlockType::Quote => "blockquote",
            BlockType::Code => "pre",
            BlockType::Divider => "hr",
        }
    }

    /// Human-readable label shown in the command menu.
    pub fn label(&self) -> &'static str {
        match self {
            BlockType::Paragraph => "Paragraph",
            BlockType::Heading1 => "Heading 1",
            BlockType::Heading2 => "Heading 2",
            BlockType::Heading3 => "Heading 3",
            BlockType::BulletList => "Bulleted list",
            BlockType::NumberedList => "Numbered list",
            BlockType::Quote => "Quote",
            BlockType::Code => "Code block",
            BlockType::Divider => "Divider",
        }
    }

    /// Icon name handed to the host's icon renderer.
    pub fn icon(&self) -> &'static str {
        match self {
            BlockType::Paragraph => "text",
            BlockType::Heading1 => "heading-1",
            BlockType::Heading2 => "heading-2",
            BlockType::Heading3 => "heading-3",
            BlockType::BulletList => "list-bullet",
            BlockType::NumberedList => "list-numbered",
            BlockType::Quote => "quote",
            BlockType::Code => "code",
            BlockType::Divider => "divider",
        }
    }

    /// Markdown shortcut shown next to the command menu entry. The detector
    /// has its own token table ([`crate::detect::MARKDOWN_SHORTCUTS`]); this
    /// is the display form.
    pub fn shortcut_text(&self) -> &'static str {
        match self {
            BlockType::Paragraph => "",
            BlockType::Heading1 => "#",
            BlockType::Heading2 => "##",
            BlockType::Heading3 => "###",
            BlockType::BulletList => "-",
            BlockType::NumberedList => "1.",
            BlockType::Quote => ">",
            BlockType::Code => "```",
            BlockType::Divider => "---",
        }
    }

    /// Whether the caret may sit inside this block. Dividers are opaque.
    pub fn is_editable(&self) -> bool {
        !matches!(self, BlockType::Divider)
    }

    /// Type of the second half when a block of this type is split by Enter.
    ///
    /// Heading and list blocks hand the remainder off as a paragraph; the
    /// first half keeps its type and id.
    pub fn split_remainder(&self) -> BlockType {
        match self {
            BlockType::Heading1
            | BlockType::Heading2
            | BlockType::Heading3
            | BlockType::BulletList
            | BlockType::NumberedList => BlockType::Paragraph,
            other => *other,
        }
    }
}

/// One structural unit of the document.
///
/// `content` holds canonical inline markup (`strong`/`em`/`u`/`s`/`code`/
/// `a href` spans only, never nested blocks). For [`BlockType::Code`] the
/// content is raw program text with no inline marks. `attrs` is an open map
/// for type-specific data such as the code language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    #[serde(rename = "type")]
    pub kind: BlockType,
    pub content: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

impl Block {
    pub fn new(kind: BlockType, content: impl Into<String>) -> Self {
        let content = if kind == BlockType::Divider {
            String::new()
        } else {
            content.into()
        };
        Self {
            id: BlockId::new(),
            kind,
            content,
            attrs: BTreeMap::new(),
        }
    }

    pub fn paragraph(content: impl Into<String>) -> Self {
        Self::new(BlockType::Paragraph, content)
    }

    pub fn empty_paragraph() -> Self {
        Self::new(BlockType::Paragraph, "")
    }

    pub fn divider() -> Self {
        Self::new(BlockType::Divider, "")
    }

    /// Plain text of the block, markup stripped.
    pub fn text(&self) -> String {
        if self.kind == BlockType::Code {
            self.content.clone()
        } else {
            inline::plain_text(&inline::parse_markup(&self.content))
        }
    }

    /// Byte length of the plain text. Caret offsets address this string.
    pub fn text_len(&self) -> usize {
        self.text().len()
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_empty()
    }
}
