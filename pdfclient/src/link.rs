//! Link results extracted from a page.

use serde::Serialize;

use pdfclient_engine::Rect;

/// A link to an external URI.
///
/// A link flowing across several lines carries one rectangle per line.
#[derive(Debug, Clone, Serialize)]
pub struct WebLink {
    /// Device-space bounding rectangles.
    pub rects: Vec<Rect>,
    /// The target URI.
    pub url: String,
}

/// Destination of an internal link.
///
/// Coordinates are in the page space of the *destination* page; a
/// coordinate left unspecified by the document is `None`, meaning the
/// viewer keeps its current position on that axis.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GotoLinkDest {
    /// Zero-based target page.
    pub page_index: usize,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub zoom: Option<f32>,
}

/// A link to a destination inside the same document.
#[derive(Debug, Clone, Serialize)]
pub struct GotoLink {
    /// Device-space bounding rectangles.
    pub rects: Vec<Rect>,
    /// Where the link goes.
    pub dest: GotoLinkDest,
}
