//! External collaborator interfaces.
//!
//! The engine never positions panels or draws icons itself; those live in
//! the host's floating-layer and icon services. Only their seams are
//! declared here, plus a null passthrough for headless hosts.

use crate::selection::Rect;

/// Side of the anchor the panel prefers to open on. The layer may flip it
/// on viewport collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredSide {
    Above,
    Below,
}

/// A resolved panel position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Placement {
    pub top: f64,
    pub left: f64,
    /// Height cap applied when the panel would overflow the viewport.
    pub max_height: Option<f64>,
}

/// The host's floating-layer service: place a panel near an anchor,
/// handling viewport collision.
pub trait FloatingLayer {
    fn position(&self, anchor: Rect, side: PreferredSide) -> Placement;
}

/// The host's icon renderer: name in, markup out.
pub trait IconSource {
    fn markup(&self, name: &str) -> String;
}

/// Passthrough layer for hosts without real positioning: panels open
/// directly below (or above) the anchor, uncapped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFloatingLayer;

impl FloatingLayer for NullFloatingLayer {
    fn position(&self, anchor: Rect, side: PreferredSide) -> Placement {
        let top = match side {
            PreferredSide::Below => anchor.y + anchor.height,
            PreferredSide::Above => anchor.y,
        };
        Placement {
            top,
            left: anchor.x,
            max_height: None,
        }
    }
}
