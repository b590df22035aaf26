//! Inline content layer.
//!
//! A block's `content` string is canonical inline markup. This module is
//! the single place that understands it: parsing markup into a flat list of
//! [`InlineSpan`]s, serializing spans back (a fixed point for canonical
//! input), and the span surgery the controller and toolbar need: split,
//! concat, insert, delete, mark application.
//!
//! Spans are flat on purpose. Nesting lives only in the serialized form,
//! with a fixed wrapping order, so `parse(serialize(spans))` cannot drift.

use serde::{Deserialize, Serialize};

use crate::html::{HtmlNode, parse_fragment};

/// One inline formatting mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
}

/// The set of marks active on a span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSet {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub code: bool,
}

impl MarkSet {
    pub fn has(&self, mark: Mark) -> bool {
        match mark {
            Mark::Bold => self.bold,
            Mark::Italic => self.italic,
            Mark::Underline => self.underline,
            Mark::Strikethrough => self.strikethrough,
            Mark::Code => self.code,
        }
    }

    pub fn set(&mut self, mark: Mark, on: bool) {
        match mark {
            Mark::Bold => self.bold = on,
            Mark::Italic => self.italic = on,
            Mark::Underline => self.underline = on,
            Mark::Strikethrough => self.strikethrough = on,
            Mark::Code => self.code = on,
        }
    }

    pub fn is_plain(&self) -> bool {
        *self == MarkSet::default()
    }
}

/// A run of text with uniform formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineSpan {
    pub text: String,
    pub marks: MarkSet,
    pub link: Option<String>,
}

impl InlineSpan {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: MarkSet::default(),
            link: None,
        }
    }

    fn same_style(&self, other: &InlineSpan) -> bool {
        self.marks == other.marks && self.link == other.link
    }
}

/// Parse inline markup into spans. Alias tags are canonicalized
/// (`b`→strong, `i`→em, `del`/`strike`→s); unknown tags contribute their
/// text only.
pub fn parse_markup(markup: &str) -> Vec<InlineSpan> {
    spans_from_nodes(&parse_fragment(markup))
}

/// Flatten a node tree into spans, accumulating marks down the tree.
pub fn spans_from_nodes(nodes: &[HtmlNode]) -> Vec<InlineSpan> {
    let mut spans = Vec::new();
    walk(nodes, MarkSet::default(), None, &mut spans);
    merge_adjacent(spans)
}

fn walk(nodes: &[HtmlNode], marks: MarkSet, link: Option<&str>, out: &mut Vec<InlineSpan>) {
    for node in nodes {
        match node {
            HtmlNode::Text(text) => out.push(InlineSpan {
                text: text.clone(),
                marks,
                link: link.map(str::to_string),
            }),
            HtmlNode::Element {
                tag,
                children,
                ..
            } => {
                let mut marks = marks;
                let mut link = link;
                match tag.as_str() {
                    "strong" | "b" => marks.bold = true,
                    "em" | "i" => marks.italic = true,
                    "u" => marks.underline = true,
                    "s" | "del" | "strike" => marks.strikethrough = true,
                    "code" => marks.code = true,
                    "a" => link = node.attr("href").or(link),
                    "br" => {
                        out.push(InlineSpan {
                            text: "\n".to_string(),
                            marks,
                            link: link.map(str::to_string),
                        });
                        continue;
                    }
                    _ => {}
                }
                walk(children, marks, link, out);
            }
        }
    }
}

/// Serialize spans to canonical markup. Wrapping order is fixed
/// (link outermost, then strong, em, u, s, code) so reparsing yields the
/// same spans.
pub fn to_markup(spans: &[InlineSpan]) -> String {
    let spans = merge_adjacent(spans.to_vec());
    let mut out = String::new();
    for span in &spans {
        let mut piece = html_escape::encode_text(&span.text).into_owned();
        if span.marks.code {
            piece = format!("<code>{piece}</code>");
        }
        if span.marks.strikethrough {
            piece = format!("<s>{piece}</s>");
        }
        if span.marks.underline {
            piece = format!("<u>{piece}</u>");
        }
        if span.marks.italic {
            piece = format!("<em>{piece}</em>");
        }
        if span.marks.bold {
            piece = format!("<strong>{piece}</strong>");
        }
        if let Some(url) = &span.link {
            let href = html_escape::encode_double_quoted_attribute(url.as_str());
            piece = format!("<a href=\"{href}\">{piece}</a>");
        }
        out.push_str(&piece);
    }
    out
}

/// Drop empty spans and merge runs with identical styling.
fn merge_adjacent(spans: Vec<InlineSpan>) -> Vec<InlineSpan> {
    let mut merged: Vec<InlineSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if span.text.is_empty() {
            continue;
        }
        match merged.last_mut() {
            Some(last) if last.same_style(&span) => last.text.push_str(&span.text),
            _ => merged.push(span),
        }
    }
    merged
}

/// Concatenated plain text of the spans.
pub fn plain_text(spans: &[InlineSpan]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

/// Byte length of the plain text.
pub fn text_len(spans: &[InlineSpan]) -> usize {
    spans.iter().map(|s| s.text.len()).sum()
}

/// Snap a byte offset down to the nearest char boundary within the plain
/// text, clamped to the total length.
fn snap_offset(spans: &[InlineSpan], offset: usize) -> usize {
    let total = text_len(spans);
    let mut offset = offset.min(total);
    let text = plain_text(spans);
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Split the span list at a plain-text byte offset, duplicating style
/// across the cut. `concat(split_at(spans, k))` reproduces the input.
pub fn split_at(spans: &[InlineSpan], offset: usize) -> (Vec<InlineSpan>, Vec<InlineSpan>) {
    let offset = snap_offset(spans, offset);
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut consumed = 0;
    for span in spans {
        let span_end = consumed + span.text.len();
        if span_end <= offset {
            left.push(span.clone());
        } else if consumed >= offset {
            right.push(span.clone());
        } else {
            let cut = offset - consumed;
            let mut head = span.clone();
            let tail_text = head.text.split_off(cut);
            left.push(head);
            right.push(InlineSpan {
                text: tail_text,
                marks: span.marks,
                link: span.link.clone(),
            });
        }
        consumed = span_end;
    }
    (merge_adjacent(left), merge_adjacent(right))
}

/// Join two span lists, merging the seam if styles line up.
pub fn concat(left: Vec<InlineSpan>, right: Vec<InlineSpan>) -> Vec<InlineSpan> {
    let mut joined = left;
    joined.extend(right);
    merge_adjacent(joined)
}

/// Insert plain text at a byte offset. The inserted run inherits the style
/// of the span the caret sits at the end of, so typing continues the
/// current formatting.
pub fn insert_text(spans: &[InlineSpan], offset: usize, text: &str) -> Vec<InlineSpan> {
    if text.is_empty() {
        return spans.to_vec();
    }
    let (left, right) = split_at(spans, offset);
    let inserted = match left.last() {
        Some(prev) => InlineSpan {
            text: text.to_string(),
            marks: prev.marks,
            link: prev.link.clone(),
        },
        None => InlineSpan::plain(text),
    };
    concat(concat(left, vec![inserted]), right)
}

/// Delete a plain-text byte range.
pub fn delete_range(spans: &[InlineSpan], range: std::ops::Range<usize>) -> Vec<InlineSpan> {
    let (left, rest) = split_at(spans, range.start);
    let (_, right) = split_at(&rest, range.end.saturating_sub(range.start));
    concat(left, right)
}

/// Marks active across the entire range (the intersection). Used for
/// toolbar active-state highlighting.
pub fn marks_in_range(spans: &[InlineSpan], range: std::ops::Range<usize>) -> MarkSet {
    let (_, rest) = split_at(spans, range.start);
    let (selected, _) = split_at(&rest, range.end.saturating_sub(range.start));
    let mut acc = MarkSet {
        bold: true,
        italic: true,
        underline: true,
        strikethrough: true,
        code: true,
    };
    if selected.is_empty() {
        return MarkSet::default();
    }
    for span in &selected {
        acc.bold &= span.marks.bold;
        acc.italic &= span.marks.italic;
        acc.underline &= span.marks.underline;
        acc.strikethrough &= span.marks.strikethrough;
        acc.code &= span.marks.code;
    }
    acc
}

/// The link target shared by the entire range, if it is uniform.
pub fn link_in_range(spans: &[InlineSpan], range: std::ops::Range<usize>) -> Option<String> {
    let (_, rest) = split_at(spans, range.start);
    let (selected, _) = split_at(&rest, range.end.saturating_sub(range.start));
    let first = selected.first()?.link.clone()?;
    selected
        .iter()
        .all(|s| s.link.as_deref() == Some(first.as_str()))
        .then_some(first)
}

/// Toggle a mark over a range: if every selected span already carries it,
/// clear it; otherwise set it everywhere in the range.
pub fn toggle_mark(spans: &[InlineSpan], range: std::ops::Range<usize>, mark: Mark) -> Vec<InlineSpan> {
    let enable = !marks_in_range(spans, range.clone()).has(mark);
    let (left, rest) = split_at(spans, range.start);
    let (mut selected, right) = split_at(&rest, range.end.saturating_sub(range.start));
    for span in &mut selected {
        span.marks.set(mark, enable);
    }
    concat(concat(left, selected), right)
}

/// Set (or clear, with `None`) the link target over a range.
pub fn set_link(
    spans: &[InlineSpan],
    range: std::ops::Range<usize>,
    url: Option<&str>,
) -> Vec<InlineSpan> {
    let (left, rest) = split_at(spans, range.start);
    let (mut selected, right) = split_at(&rest, range.end.saturating_sub(range.start));
    for span in &mut selected {
        span.link = url.map(str::to_string);
    }
    concat(concat(left, selected), right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_parse_canonicalizes_alias_tags() {
        let spans = parse_markup("<b>x</b><i>y</i><del>z</del>");
        assert_eq!(to_markup(&spans), "<strong>x</strong><em>y</em><s>z</s>");
    }

    #[test]
    fn test_markup_round_trip_is_fixed_point() {
        let canonical = "plain <strong>bold <em>both</em></strong> <a href=\"https://example.com\">link</a>";
        let spans = parse_markup(canonical);
        let once = to_markup(&spans);
        let twice = to_markup(&parse_markup(&once));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unknown_tags_contribute_text_only() {
        let spans = parse_markup("<span class=\"x\">keep</span>");
        assert_eq!(spans, vec![InlineSpan::plain("keep")]);
    }

    #[test]
    fn test_plain_text_and_len() {
        let spans = parse_markup("a<strong>bc</strong>d");
        assert_eq!(plain_text(&spans), "abcd");
        assert_eq!(text_len(&spans), 4);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(3)]
    #[case(5)]
    #[case(8)]
    fn test_split_concat_inverse_at_every_offset(#[case] offset: usize) {
        let spans = parse_markup("ab<strong>cde</strong><em>fgh</em>");
        let (left, right) = split_at(&spans, offset);
        assert_eq!(concat(left.clone(), right.clone()), spans);
        assert_eq!(text_len(&left), offset);
    }

    #[test]
    fn test_split_mid_span_duplicates_marks() {
        let spans = parse_markup("<strong>bold</strong>");
        let (left, right) = split_at(&spans, 2);
        assert_eq!(to_markup(&left), "<strong>bo</strong>");
        assert_eq!(to_markup(&right), "<strong>ld</strong>");
    }

    #[test]
    fn test_split_snaps_to_char_boundary() {
        let spans = parse_markup("héllo");
        // Offset 2 lands inside the two-byte é; snaps down to 1
        let (left, _) = split_at(&spans, 2);
        assert_eq!(plain_text(&left), "h");
    }

    #[test]
    fn test_insert_inherits_left_style() {
        let spans = parse_markup("<strong>ab</strong>cd");
        let result = insert_text(&spans, 2, "X");
        assert_eq!(to_markup(&result), "<strong>abX</strong>cd");
    }

    #[test]
    fn test_insert_into_empty_content() {
        let result = insert_text(&[], 0, "hi");
        assert_eq!(to_markup(&result), "hi");
    }

    #[test]
    fn test_delete_range_across_spans() {
        let spans = parse_markup("ab<strong>cd</strong>ef");
        let result = delete_range(&spans, 1..5);
        assert_eq!(to_markup(&result), "af");
    }

    #[test]
    fn test_toggle_mark_sets_then_clears() {
        let spans = parse_markup("abcd");
        let bolded = toggle_mark(&spans, 1..3, Mark::Bold);
        assert_eq!(to_markup(&bolded), "a<strong>bc</strong>d");
        let cleared = toggle_mark(&bolded, 1..3, Mark::Bold);
        assert_eq!(to_markup(&cleared), "abcd");
    }

    #[test]
    fn test_toggle_mark_mixed_range_enables_everywhere() {
        let spans = parse_markup("a<strong>b</strong>c");
        let result = toggle_mark(&spans, 0..3, Mark::Bold);
        assert_eq!(to_markup(&result), "<strong>abc</strong>");
    }

    #[test]
    fn test_marks_in_range_is_intersection() {
        let spans = parse_markup("<strong>a<em>b</em></strong>");
        let marks = marks_in_range(&spans, 0..2);
        assert!(marks.bold);
        assert!(!marks.italic);
        let inner = marks_in_range(&spans, 1..2);
        assert!(inner.bold && inner.italic);
    }

    #[test]
    fn test_set_link_and_clear() {
        let spans = parse_markup("visit here");
        let linked = set_link(&spans, 6..10, Some("https://example.com"));
        assert_eq!(
            to_markup(&linked),
            "visit <a href=\"https://example.com\">here</a>"
        );
        let cleared = set_link(&linked, 6..10, None);
        assert_eq!(to_markup(&cleared), "visit here");
    }

    #[test]
    fn test_text_is_escaped_on_serialize() {
        let spans = vec![InlineSpan::plain("a < b & c")];
        assert_eq!(to_markup(&spans), "a &lt; b &amp; c");
    }
}
