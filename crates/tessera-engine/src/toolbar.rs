//! The floating inline-format toolbar.
//!
//! Driven entirely by selection state: shown over a non-collapsed
//! selection (per the visibility policy), applying marks through the
//! inline layer, with a two-step link sub-state that captures the
//! selection before the URL input steals focus.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::inline::{Mark, MarkSet};
use crate::model::BlockId;
use crate::selection::Rect;

/// When the toolbar is allowed to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolbarVisibility {
    Always,
    OnFocus,
    #[default]
    OnSelection,
}

/// The inline formatting commands the toolbar offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InlineFormat {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    Link,
}

impl InlineFormat {
    /// The mark this format toggles; `None` for the two-step link flow.
    pub fn mark(&self) -> Option<Mark> {
        match self {
            InlineFormat::Bold => Some(Mark::Bold),
            InlineFormat::Italic => Some(Mark::Italic),
            InlineFormat::Underline => Some(Mark::Underline),
            InlineFormat::Strikethrough => Some(Mark::Strikethrough),
            InlineFormat::Code => Some(Mark::Code),
            InlineFormat::Link => None,
        }
    }
}

/// Selection captured when the link input opens, so submitting applies to
/// what the user had selected, not to wherever focus wandered.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedSelection {
    pub block_id: BlockId,
    pub range: Range<usize>,
}

/// The link input sub-state.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDraft {
    pub url: String,
    pub target: CapturedSelection,
}

/// Active-state flags for button highlighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveFormats {
    pub marks: MarkSet,
    pub link: bool,
}

/// Floating toolbar state machine: hidden, buttons, or the link input.
pub struct FormatToolbar {
    visible: bool,
    rect: Option<Rect>,
    active: ActiveFormats,
    link_draft: Option<LinkDraft>,
}

impl Default for FormatToolbar {
    fn default() -> Self {
        Self {
            visible: false,
            rect: None,
            active: ActiveFormats::default(),
            link_draft: None,
        }
    }
}

impl FormatToolbar {
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn rect(&self) -> Option<Rect> {
        self.rect
    }

    pub fn active(&self) -> ActiveFormats {
        self.active
    }

    pub fn link_draft(&self) -> Option<&LinkDraft> {
        self.link_draft.as_ref()
    }

    pub fn is_link_input_open(&self) -> bool {
        self.link_draft.is_some()
    }

    pub fn show(&mut self, rect: Rect) {
        self.visible = true;
        self.rect = Some(rect);
    }

    /// Hiding is always safe and drops any link draft.
    pub fn hide(&mut self) {
        self.visible = false;
        self.rect = None;
        self.link_draft = None;
        self.active = ActiveFormats::default();
    }

    /// Refresh active-state highlighting from the current selection's
    /// marks.
    pub fn set_active(&mut self, active: ActiveFormats) {
        self.active = active;
    }

    /// First step of the link flow: reveal the URL input, capturing the
    /// selection it will apply to.
    pub fn begin_link(&mut self, target: CapturedSelection) {
        self.link_draft = Some(LinkDraft {
            url: String::new(),
            target,
        });
    }

    pub fn set_link_url(&mut self, url: &str) {
        if let Some(draft) = &mut self.link_draft {
            draft.url = url.to_string();
        }
    }

    /// Cancel returns to the button sub-state without touching content.
    pub fn cancel_link(&mut self) {
        self.link_draft = None;
    }

    /// Submit the draft: yields the captured target and the sanitized URL,
    /// and leaves the link sub-state. Empty drafts submit as `None`.
    pub fn submit_link(&mut self) -> Option<(CapturedSelection, String)> {
        let draft = self.link_draft.take()?;
        if draft.url.trim().is_empty() {
            return None;
        }
        Some((draft.target, sanitize_url(draft.url.trim())))
    }
}

/// Accept URLs as typed when they carry a scheme; prefix `https://`
/// otherwise.
pub fn sanitize_url(url: &str) -> String {
    static URL_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = URL_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").expect("Invalid URL regex"));
    if re.is_match(url) {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn target() -> CapturedSelection {
        CapturedSelection {
            block_id: BlockId::new(),
            range: 2..6,
        }
    }

    #[test]
    fn test_show_hide_cycle() {
        let mut toolbar = FormatToolbar::default();
        assert!(!toolbar.is_visible());
        toolbar.show(Rect::default());
        assert!(toolbar.is_visible());
        toolbar.hide();
        assert!(!toolbar.is_visible());
        assert_eq!(toolbar.rect(), None);
    }

    #[test]
    fn test_link_flow_submit() {
        let mut toolbar = FormatToolbar::default();
        toolbar.show(Rect::default());
        let captured = target();
        toolbar.begin_link(captured.clone());
        assert!(toolbar.is_link_input_open());
        toolbar.set_link_url("example.com/page");
        let (applied_to, url) = toolbar.submit_link().expect("draft submitted");
        assert_eq!(applied_to, captured);
        assert_eq!(url, "https://example.com/page");
        assert!(!toolbar.is_link_input_open());
    }

    #[test]
    fn test_link_flow_cancel_keeps_buttons() {
        let mut toolbar = FormatToolbar::default();
        toolbar.show(Rect::default());
        toolbar.begin_link(target());
        toolbar.set_link_url("typed then abandoned");
        toolbar.cancel_link();
        assert!(!toolbar.is_link_input_open());
        assert!(toolbar.is_visible());
        assert_eq!(toolbar.submit_link(), None);
    }

    #[test]
    fn test_empty_link_draft_submits_nothing() {
        let mut toolbar = FormatToolbar::default();
        toolbar.begin_link(target());
        toolbar.set_link_url("   ");
        assert_eq!(toolbar.submit_link(), None);
    }

    #[test]
    fn test_hide_drops_link_draft() {
        let mut toolbar = FormatToolbar::default();
        toolbar.show(Rect::default());
        toolbar.begin_link(target());
        toolbar.hide();
        assert!(!toolbar.is_link_input_open());
    }

    #[rstest]
    #[case("https://a.com", "https://a.com")]
    #[case("http://a.com", "http://a.com")]
    #[case("mailto:x@y.z", "mailto:x@y.z")]
    #[case("a.com/path", "https://a.com/path")]
    fn test_sanitize_url(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_url(input), expected);
    }

    #[test]
    fn test_format_mark_mapping_is_exhaustive_for_non_link() {
        for format in [
            InlineFormat::Bold,
            InlineFormat::Italic,
            InlineFormat::Underline,
            InlineFormat::Strikethrough,
            InlineFormat::Code,
        ] {
            assert!(format.mark().is_some());
        }
        assert!(InlineFormat::Link.mark().is_none());
    }
}
