//! HTML fragment scanning and serialization.
//!
//! The host-facing `value` is a plain HTML string; injected seed content and
//! pasted fragments arrive the same way. This module turns such strings into
//! a lightweight node tree for the normalizer and turns the block sequence
//! back into a string.
//!
//! The scanner is deliberately small and tolerant: every byte of input lands
//! either in a text node or in tag syntax, unclosed elements are closed at
//! end of input, and stray `<` characters degrade to text. It never fails.

use crate::model::{Block, BlockType, Document};

/// One node of a parsed HTML fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum HtmlNode {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<HtmlNode>,
    },
    Text(String),
}

impl HtmlNode {
    pub fn element(tag: &str, children: Vec<HtmlNode>) -> Self {
        HtmlNode::Element {
            tag: tag.to_string(),
            attrs: Vec::new(),
            children,
        }
    }

    pub fn text(content: &str) -> Self {
        HtmlNode::Text(content.to_string())
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            HtmlNode::Element { tag, .. } => Some(tag),
            HtmlNode::Text(_) => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            HtmlNode::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            HtmlNode::Text(_) => None,
        }
    }

    /// Concatenated text of this node and its descendants. `br` elements
    /// contribute a newline.
    pub fn text_content(&self) -> String {
        match self {
            HtmlNode::Text(text) => text.clone(),
            HtmlNode::Element { tag, children, .. } => {
                if tag == "br" {
                    "\n".to_string()
                } else {
                    children.iter().map(|c| c.text_content()).collect()
                }
            }
        }
    }
}

/// Elements that never have children.
const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "meta", "link", "wbr"];

fn is_void(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

/// Byte cursor over the input string.
#[derive(Clone)]
struct Cursor<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    fn eof(&self) -> bool {
        self.i >= self.s.len()
    }

    fn peek(&self) -> Option<u8> {
        self.s.as_bytes().get(self.i).copied()
    }

    fn starts_with(&self, pat: &str) -> bool {
        self.s.as_bytes()[self.i..].starts_with(pat.as_bytes())
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.i += 1;
        Some(b)
    }

    fn bump_n(&mut self, n: usize) {
        self.i = (self.i + n).min(self.s.len());
    }

    /// Advance past bytes matching `pred`, returning the consumed slice.
    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.i;
        while let Some(b) = self.peek() {
            if !pred(b) {
                break;
            }
            self.i += 1;
        }
        &self.s[start..self.i]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(|b| b.is_ascii_whitespace());
    }
}

/// An element still waiting for its close tag.
struct OpenElement {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<HtmlNode>,
}

/// Parse an HTML fragment into a node tree. Tolerant by construction:
/// unknown tags are kept, unmatched close tags are dropped, unclosed
/// elements are closed at end of input, entities are decoded.
pub fn parse_fragment(input: &str) -> Vec<HtmlNode> {
    let mut cur = Cursor::new(input);
    let mut roots: Vec<HtmlNode> = Vec::new();
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut text = String::new();

    fn attach(roots: &mut Vec<HtmlNode>, stack: &mut [OpenElement], node: HtmlNode) {
        match stack.last_mut() {
            Some(open) => open.children.push(node),
            None => roots.push(node),
        }
    }

    fn flush_text(roots: &mut Vec<HtmlNode>, stack: &mut [OpenElement], text: &mut String) {
        if !text.is_empty() {
            let decoded = html_escape::decode_html_entities(text.as_str()).into_owned();
            attach(roots, stack, HtmlNode::Text(decoded));
            text.clear();
        }
    }

    while !cur.eof() {
        if cur.starts_with("<!--") {
            flush_text(&mut roots, &mut stack, &mut text);
            cur.bump_n(4);
            while !cur.eof() && !cur.starts_with("-->") {
                cur.bump();
            }
            cur.bump_n(3);
        } else if cur.starts_with("</") {
            flush_text(&mut roots, &mut stack, &mut text);
            cur.bump_n(2);
            let name = cur
                .take_while(|b| b.is_ascii_alphanumeric() || b == b'-')
                .to_ascii_lowercase();
            while let Some(b) = cur.bump() {
                if b == b'>' {
                    break;
                }
            }
            close_element(&mut roots, &mut stack, &name);
        } else if cur.peek() == Some(b'<')
            && cur
                .s
                .as_bytes()
                .get(cur.i + 1)
                .is_some_and(|b| b.is_ascii_alphabetic())
        {
            flush_text(&mut roots, &mut stack, &mut text);
            cur.bump();
            let tag = cur
                .take_while(|b| b.is_ascii_alphanumeric() || b == b'-')
                .to_ascii_lowercase();
            let (attrs, self_closed) = parse_attrs(&mut cur);
            if self_closed || is_void(&tag) {
                attach(
                    &mut roots,
                    &mut stack,
                    HtmlNode::Element {
                        tag,
                        attrs,
                        children: Vec::new(),
                    },
                );
            } else {
                stack.push(OpenElement {
                    tag,
                    attrs,
                    children: Vec::new(),
                });
            }
        } else {
            // Plain text, including stray '<'. Sliced by byte range so
            // multi-byte UTF-8 sequences survive intact.
            let start = cur.i;
            cur.bump();
            while let Some(b) = cur.peek() {
                if b == b'<' {
                    break;
                }
                cur.bump();
            }
            text.push_str(&cur.s[start..cur.i]);
        }
    }

    flush_text(&mut roots, &mut stack, &mut text);

    // Close everything still open, innermost first
    while let Some(open) = stack.pop() {
        let node = HtmlNode::Element {
            tag: open.tag,
            attrs: open.attrs,
            children: open.children,
        };
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }

    roots
}

/// Pop open elements down to (and including) the one matching `name`.
/// A close tag with no matching open element is ignored.
fn close_element(roots: &mut Vec<HtmlNode>, stack: &mut Vec<OpenElement>, name: &str) {
    let Some(match_idx) = stack.iter().rposition(|open| open.tag == name) else {
        return;
    };
    while stack.len() > match_idx {
        let open = stack.pop().expect("stack length checked");
        let node = HtmlNode::Element {
            tag: open.tag,
            attrs: open.attrs,
            children: open.children,
        };
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }
}

/// Parse attributes up to `>` (or `/>`). Returns the attribute list and
/// whether the tag self-closed.
fn parse_attrs(cur: &mut Cursor<'_>) -> (Vec<(String, String)>, bool) {
    let mut attrs = Vec::new();
    loop {
        cur.skip_whitespace();
        match cur.peek() {
            None => return (attrs, false),
            Some(b'>') => {
                cur.bump();
                return (attrs, false);
            }
            Some(b'/') => {
                cur.bump();
                if cur.peek() == Some(b'>') {
                    cur.bump();
                }
                return (attrs, true);
            }
            Some(_) => {
                let name = cur
                    .take_while(|b| {
                        !b.is_ascii_whitespace() && b != b'=' && b != b'>' && b != b'/'
                    })
                    .to_ascii_lowercase();
                if name.is_empty() {
                    cur.bump();
                    continue;
                }
                cur.skip_whitespace();
                let value = if cur.peek() == Some(b'=') {
                    cur.bump();
                    cur.skip_whitespace();
                    match cur.peek() {
                        Some(quote @ (b'"' | b'\'')) => {
                            cur.bump();
                            let raw = cur.take_while(|b| b != quote).to_string();
                            cur.bump();
                            html_escape::decode_html_entities(&raw).into_owned()
                        }
                        _ => cur
                            .take_while(|b| !b.is_ascii_whitespace() && b != b'>')
                            .to_string(),
                    }
                } else {
                    String::new()
                };
                attrs.push((name, value));
            }
        }
    }
}

/// Serialize the block sequence to the host-facing HTML string.
///
/// Contiguous runs of list blocks are wrapped in one `ul`/`ol` so they
/// render as a single visual list while staying independent blocks in the
/// model.
pub fn serialize(doc: &Document) -> String {
    let mut out = String::new();
    let blocks = doc.blocks();
    let mut i = 0;
    while i < blocks.len() {
        let block = &blocks[i];
        match block.kind {
            BlockType::BulletList | BlockType::NumberedList => {
                let list_kind = block.kind;
                let wrapper = if list_kind == BlockType::BulletList {
                    "ul"
                } else {
                    "ol"
                };
                out.push('<');
                out.push_str(wrapper);
                out.push('>');
                while i < blocks.len() && blocks[i].kind == list_kind {
                    out.push_str("<li>");
                    out.push_str(&blocks[i].content);
                    out.push_str("</li>");
                    i += 1;
                }
                out.push_str("</");
                out.push_str(wrapper);
                out.push('>');
            }
            _ => {
                write_single_block(&mut out, block);
                i += 1;
            }
        }
    }
    out
}

fn write_single_block(out: &mut String, block: &Block) {
    match block.kind {
        BlockType::Divider => out.push_str("<hr>"),
        BlockType::Code => {
            out.push_str("<pre><code");
            if let Some(lang) = block.attrs.get("language") {
                out.push_str(" class=\"language-");
                out.push_str(lang);
                out.push('"');
            }
            out.push('>');
            out.push_str(&html_escape::encode_text(&block.content));
            out.push_str("</code></pre>");
        }
        kind => {
            let tag = kind.render_tag();
            out.push('<');
            out.push_str(tag);
            out.push('>');
            out.push_str(&block.content);
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

/// Serialize a single-paragraph document back to bare inline markup, for
/// content that arrived as one inline run (the "simple" round-trip case).
pub fn serialize_simple(doc: &Document) -> String {
    doc.blocks()[0].content.clone()
}

/// Plain text of the whole document, one line per block.
pub fn text_content(doc: &Document) -> String {
    doc.blocks()
        .iter()
        .map(|b| b.text())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Block;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plain_text() {
        let nodes = parse_fragment("hello world");
        assert_eq!(nodes, vec![HtmlNode::text("hello world")]);
    }

    #[test]
    fn test_parse_nested_elements() {
        let nodes = parse_fragment("<p>a <strong>b</strong></p>");
        assert_eq!(
            nodes,
            vec![HtmlNode::element(
                "p",
                vec![
                    HtmlNode::text("a "),
                    HtmlNode::element("strong", vec![HtmlNode::text("b")]),
                ]
            )]
        );
    }

    #[test]
    fn test_parse_attributes() {
        let nodes = parse_fragment(r#"<a href="https://example.com" target=_blank>x</a>"#);
        assert_eq!(nodes[0].attr("href"), Some("https://example.com"));
        assert_eq!(nodes[0].attr("target"), Some("_blank"));
    }

    #[test]
    fn test_parse_void_and_self_closing() {
        let nodes = parse_fragment("a<br>b<hr/>");
        assert_eq!(
            nodes,
            vec![
                HtmlNode::text("a"),
                HtmlNode::element("br", vec![]),
                HtmlNode::text("b"),
                HtmlNode::element("hr", vec![]),
            ]
        );
    }

    #[test]
    fn test_parse_unclosed_element_closes_at_eof() {
        let nodes = parse_fragment("<p>dangling");
        assert_eq!(
            nodes,
            vec![HtmlNode::element("p", vec![HtmlNode::text("dangling")])]
        );
    }

    #[test]
    fn test_parse_unmatched_close_tag_is_dropped() {
        let nodes = parse_fragment("a</p>b");
        assert_eq!(nodes, vec![HtmlNode::text("a"), HtmlNode::text("b")]);
    }

    #[test]
    fn test_parse_stray_angle_bracket_is_text() {
        let nodes = parse_fragment("1 < 2");
        assert_eq!(nodes, vec![HtmlNode::text("1 < 2")]);
    }

    #[test]
    fn test_parse_decodes_entities() {
        let nodes = parse_fragment("<p>a &amp; b &lt;c&gt;</p>");
        assert_eq!(nodes[0].text_content(), "a & b <c>");
    }

    #[test]
    fn test_parse_skips_comments() {
        let nodes = parse_fragment("a<!-- hidden -->b");
        assert_eq!(nodes, vec![HtmlNode::text("a"), HtmlNode::text("b")]);
    }

    #[test]
    fn test_serialize_groups_contiguous_lists() {
        let doc = Document::from_blocks(vec![
            Block::new(BlockType::BulletList, "one"),
            Block::new(BlockType::BulletList, "two"),
            Block::paragraph("gap"),
            Block::new(BlockType::NumberedList, "first"),
        ]);
        assert_eq!(
            serialize(&doc),
            "<ul><li>one</li><li>two</li></ul><p>gap</p><ol><li>first</li></ol>"
        );
    }

    #[test]
    fn test_serialize_code_block_escapes_and_carries_language() {
        let mut block = Block::new(BlockType::Code, "if a < b {}");
        block.attrs.insert("language".into(), "rust".into());
        let doc = Document::from_blocks(vec![block]);
        assert_eq!(
            serialize(&doc),
            "<pre><code class=\"language-rust\">if a &lt; b {}</code></pre>"
        );
    }

    #[test]
    fn test_serialize_divider_and_heading() {
        let doc = Document::from_blocks(vec![
            Block::new(BlockType::Heading1, "Title"),
            Block::divider(),
        ]);
        assert_eq!(serialize(&doc), "<h1>Title</h1><hr>");
    }

    #[test]
    fn test_text_content_joins_blocks_with_newlines() {
        let doc = Document::from_blocks(vec![
            Block::paragraph("one"),
            Block::paragraph("<strong>two</strong>"),
        ]);
        assert_eq!(text_content(&doc), "one\ntwo");
    }
}
