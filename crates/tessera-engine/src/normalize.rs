//! Content normalization.
//!
//! Arbitrary injected content (seed markup, pasted fragments, anything the
//! host hands over) becomes a sequence of well-formed blocks here. The
//! walk enforces the one structural invariant everything else relies on:
//! every top-level unit is a block.
//!
//! The algorithm is a single pass in document order. Consecutive inline and
//! text nodes accumulate into an implicit open paragraph; a recognized
//! block-level node closes that paragraph (if non-empty) and emits its own
//! block(s); at the end of the walk any still-open paragraph closes.
//! Content the walker cannot classify is wrapped verbatim in a paragraph;
//! normalization never fails.

use crate::html::{HtmlNode, parse_fragment};
use crate::inline;
use crate::model::{Block, BlockType};

/// Result of a normalization pass.
///
/// `simple` is set when the entire input was one inline/text run; the
/// controller then serializes the value back as bare inline markup instead
/// of a wrapped paragraph, preserving round-trip fidelity for simple
/// consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedContent {
    pub blocks: Vec<Block>,
    pub simple: bool,
}

/// Tags that participate in inline accumulation rather than forcing a
/// block boundary.
const INLINE_TAGS: &[&str] = &[
    "strong", "b", "em", "i", "u", "s", "del", "strike", "code", "a", "span", "br", "img",
];

fn is_inline(node: &HtmlNode) -> bool {
    match node {
        HtmlNode::Text(_) => true,
        HtmlNode::Element { tag, .. } => INLINE_TAGS.contains(&tag.as_str()),
    }
}

/// Normalize an already-parsed node tree into blocks.
pub fn normalize(nodes: &[HtmlNode]) -> NormalizedContent {
    let mut walker = Walker::default();
    for node in nodes {
        if is_inline(node) {
            walker.open_run.push(node.clone());
        } else {
            walker.close_open_run();
            walker.saw_block = true;
            walker.emit_block_node(node);
        }
    }
    walker.close_open_run();

    let simple = !walker.saw_block && walker.blocks.len() == 1;
    let blocks = if walker.blocks.is_empty() {
        vec![Block::empty_paragraph()]
    } else {
        walker.blocks
    };
    NormalizedContent { blocks, simple }
}

/// Parse and normalize an HTML string (the programmatic `set_value` path).
pub fn normalize_html(value: &str) -> NormalizedContent {
    normalize(&parse_fragment(value))
}

#[derive(Default)]
struct Walker {
    blocks: Vec<Block>,
    open_run: Vec<HtmlNode>,
    saw_block: bool,
}

impl Walker {
    /// Close the implicit open paragraph, emitting it if it holds any
    /// non-whitespace text. Whitespace-only runs (pretty-printing between
    /// block tags) are dropped.
    fn close_open_run(&mut self) {
        if self.open_run.is_empty() {
            return;
        }
        let nodes = std::mem::take(&mut self.open_run);
        let spans = inline::spans_from_nodes(&nodes);
        if !inline::plain_text(&spans).trim().is_empty() {
            self.blocks
                .push(Block::paragraph(inline::to_markup(&spans)));
        }
    }

    fn emit_block_node(&mut self, node: &HtmlNode) {
        let HtmlNode::Element { tag, children, .. } = node else {
            return;
        };
        match tag.as_str() {
            "p" | "div" => {
                let content = inline_content(children);
                self.blocks.push(Block::paragraph(content));
            }
            "h1" => self.push_heading(BlockType::Heading1, children),
            "h2" => self.push_heading(BlockType::Heading2, children),
            // Levels below three clamp to the deepest heading we model
            "h3" | "h4" | "h5" | "h6" => self.push_heading(BlockType::Heading3, children),
            "ul" => self.emit_list(BlockType::BulletList, children),
            "ol" => self.emit_list(BlockType::NumberedList, children),
            // An orphaned list item still becomes one list block
            "li" => self.emit_list_item(BlockType::BulletList, node),
            "blockquote" => {
                let content = joined_paragraph_content(children);
                self.blocks.push(Block::new(BlockType::Quote, content));
            }
            "pre" => self.emit_code(node, children),
            "hr" => self.blocks.push(Block::divider()),
            _ => {
                // Unclassifiable block-level content: wrap its text
                // verbatim in a paragraph rather than dropping or failing.
                let text = node.text_content();
                if !text.trim().is_empty() {
                    let span = inline::InlineSpan::plain(text);
                    self.blocks
                        .push(Block::paragraph(inline::to_markup(&[span])));
                }
            }
        }
    }

    fn push_heading(&mut self, kind: BlockType, children: &[HtmlNode]) {
        self.blocks.push(Block::new(kind, inline_content(children)));
    }

    /// Every list item becomes one independent block; nested lists are
    /// flattened into following blocks of their own kind.
    fn emit_list(&mut self, kind: BlockType, children: &[HtmlNode]) {
        for child in children {
            match child.tag() {
                Some("li") => self.emit_list_item(kind, child),
                // A nested list directly under ul/ol (missing its li)
                Some("ul") => {
                    if let HtmlNode::Element { children, .. } = child {
                        self.emit_list(BlockType::BulletList, children);
                    }
                }
                Some("ol") => {
                    if let HtmlNode::Element { children, .. } = child {
                        self.emit_list(BlockType::NumberedList, children);
                    }
                }
                _ => {}
            }
        }
    }

    fn emit_list_item(&mut self, kind: BlockType, item: &HtmlNode) {
        let HtmlNode::Element { children, .. } = item else {
            return;
        };
        let (inline_children, nested): (Vec<_>, Vec<_>) =
            children.iter().cloned().partition(|c| is_inline(c));
        let content = inline_content(&inline_children);
        if !content.is_empty() {
            self.blocks.push(Block::new(kind, content));
        }
        for node in &nested {
            match node.tag() {
                Some("ul") | Some("ol") => self.emit_block_node(node),
                // A paragraph wrapped inside the item contributes content
                Some("p") | Some("div") => {
                    if let HtmlNode::Element { children, .. } = node {
                        let content = inline_content(children);
                        if !content.is_empty() {
                            self.blocks.push(Block::new(kind, content));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn emit_code(&mut self, pre: &HtmlNode, children: &[HtmlNode]) {
        // Prefer the conventional pre > code wrapper, fall back to the
        // pre's own text
        let code_child = children
            .iter()
            .find(|c| c.tag() == Some("code"));
        let (text, language) = match code_child {
            Some(code) => (code.text_content(), language_from_class(code)),
            None => (pre.text_content(), None),
        };
        let mut block = Block::new(BlockType::Code, text);
        if let Some(lang) = language {
            block.attrs.insert("language".to_string(), lang);
        }
        self.blocks.push(block);
    }
}

/// Canonical inline markup for a list of child nodes.
fn inline_content(children: &[HtmlNode]) -> String {
    inline::to_markup(&inline::spans_from_nodes(children))
}

/// Flatten blockquote children: paragraph-like children become lines
/// joined by newlines, inline children join the current line.
fn joined_paragraph_content(children: &[HtmlNode]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut run: Vec<HtmlNode> = Vec::new();
    for child in children {
        if is_inline(child) {
            run.push(child.clone());
        } else {
            if !run.is_empty() {
                lines.push(inline_content(&std::mem::take(&mut run)));
            }
            if let HtmlNode::Element { children, .. } = child {
                lines.push(inline_content(children));
            }
        }
    }
    if !run.is_empty() {
        lines.push(inline_content(&run));
    }
    lines.retain(|l| !l.trim().is_empty());
    lines.join("\n")
}

fn language_from_class(node: &HtmlNode) -> Option<String> {
    let class = node.attr("class")?;
    class
        .split_ascii_whitespace()
        .find_map(|c| c.strip_prefix("language-"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::serialize;
    use crate::model::Document;
    use pretty_assertions::assert_eq;

    /// Shape of a block without its id, for equality across passes.
    fn shape(blocks: &[Block]) -> Vec<(BlockType, String)> {
        blocks
            .iter()
            .map(|b| (b.kind, b.content.clone()))
            .collect()
    }

    #[test]
    fn test_empty_input_yields_one_empty_paragraph() {
        let result = normalize_html("");
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].kind, BlockType::Paragraph);
        assert!(result.blocks[0].is_empty());
        assert!(!result.simple);
    }

    #[test]
    fn test_bare_text_is_simple() {
        let result = normalize_html("just some text");
        assert_eq!(
            shape(&result.blocks),
            vec![(BlockType::Paragraph, "just some text".to_string())]
        );
        assert!(result.simple);
    }

    #[test]
    fn test_inline_run_with_markup_is_simple() {
        let result = normalize_html("a <b>bold</b> run");
        assert_eq!(
            shape(&result.blocks),
            vec![(BlockType::Paragraph, "a <strong>bold</strong> run".to_string())]
        );
        assert!(result.simple);
    }

    #[test]
    fn test_block_content_is_not_simple() {
        let result = normalize_html("<p>wrapped</p>");
        assert!(!result.simple);
    }

    #[test]
    fn test_headings_clamp_below_three() {
        let result = normalize_html("<h1>a</h1><h3>b</h3><h5>c</h5>");
        assert_eq!(
            shape(&result.blocks),
            vec![
                (BlockType::Heading1, "a".to_string()),
                (BlockType::Heading3, "b".to_string()),
                (BlockType::Heading3, "c".to_string()),
            ]
        );
    }

    #[test]
    fn test_list_items_become_independent_blocks() {
        let result = normalize_html("<ul><li>one</li><li>two</li></ul><ol><li>1st</li></ol>");
        assert_eq!(
            shape(&result.blocks),
            vec![
                (BlockType::BulletList, "one".to_string()),
                (BlockType::BulletList, "two".to_string()),
                (BlockType::NumberedList, "1st".to_string()),
            ]
        );
    }

    #[test]
    fn test_nested_list_flattens() {
        let result =
            normalize_html("<ul><li>parent<ul><li>child</li></ul></li><li>sibling</li></ul>");
        assert_eq!(
            shape(&result.blocks),
            vec![
                (BlockType::BulletList, "parent".to_string()),
                (BlockType::BulletList, "child".to_string()),
                (BlockType::BulletList, "sibling".to_string()),
            ]
        );
    }

    #[test]
    fn test_text_between_blocks_becomes_paragraph() {
        let result = normalize_html("before<p>middle</p>after");
        assert_eq!(
            shape(&result.blocks),
            vec![
                (BlockType::Paragraph, "before".to_string()),
                (BlockType::Paragraph, "middle".to_string()),
                (BlockType::Paragraph, "after".to_string()),
            ]
        );
    }

    #[test]
    fn test_whitespace_between_blocks_is_dropped() {
        let result = normalize_html("<p>a</p>\n  <p>b</p>\n");
        assert_eq!(result.blocks.len(), 2);
    }

    #[test]
    fn test_code_block_with_language() {
        let result =
            normalize_html("<pre><code class=\"language-rust\">fn main() {}</code></pre>");
        let block = &result.blocks[0];
        assert_eq!(block.kind, BlockType::Code);
        assert_eq!(block.content, "fn main() {}");
        assert_eq!(block.attrs.get("language").map(String::as_str), Some("rust"));
    }

    #[test]
    fn test_blockquote_paragraphs_join_with_newlines() {
        let result = normalize_html("<blockquote><p>first</p><p>second</p></blockquote>");
        assert_eq!(
            shape(&result.blocks),
            vec![(BlockType::Quote, "first\nsecond".to_string())]
        );
    }

    #[test]
    fn test_divider_from_hr() {
        let result = normalize_html("<p>a</p><hr><p>b</p>");
        assert_eq!(result.blocks[1].kind, BlockType::Divider);
        assert_eq!(result.blocks[1].content, "");
    }

    #[test]
    fn test_malformed_content_wraps_verbatim() {
        let result = normalize_html("<table><tr><td>cell</td></tr></table>");
        assert_eq!(
            shape(&result.blocks),
            vec![(BlockType::Paragraph, "cell".to_string())]
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "loose text<h2>head</h2><ul><li>a</li><li>b</li></ul>",
            "<p>a <b>b</b></p><hr><blockquote>q</blockquote>",
            "<pre><code class=\"language-js\">let x = 1 &lt; 2;</code></pre>",
            "plain <i>inline</i> only",
        ];
        for input in inputs {
            let first = normalize_html(input);
            let reserialized = serialize(&Document::from_blocks(first.blocks.clone()));
            let second = normalize_html(&reserialized);
            assert_eq!(shape(&first.blocks), shape(&second.blocks), "input: {input}");
        }
    }
}
