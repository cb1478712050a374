//! # pdfclient
//!
//! A client layer between an opaque, callback-driven PDF engine and an
//! application. The engine parses bytes and produces per-character and
//! per-annotation primitives; this crate turns those into document
//! services:
//!
//! - **progressive loading**: a cooperative-poll load state machine over
//!   a byte source that is still downloading;
//! - **page lifecycle**: disposable pages on demand, retained pages
//!   cached and tracked for form filling and invalidation;
//! - **text**: character-indexed extraction with hyphenated line wraps
//!   restored, accent/case-insensitive search, and point- or index-based
//!   selection boundaries with right-to-left awareness;
//! - **invalidation**: coalesced screen-redraw accounting fed by the
//!   engine's asynchronous form callbacks;
//! - **forms**: widget snapshots and click/text/choice mutations with
//!   read-only, cardinality, and range invariants enforced up front.
//!
//! The engine itself lives behind the [`PdfEngine`] trait from
//! `pdfclient-engine`; nothing here parses or rasterizes PDF data.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use pdfclient::{Document, FullReader, LoadResult};
//! # fn engine() -> Rc<dyn pdfclient::PdfEngine> { unimplemented!() }
//!
//! let source = Rc::new(RefCell::new(FullReader::new(std::fs::read("doc.pdf")?)));
//! let doc = match Document::load(engine(), source, None, false) {
//!     LoadResult::Loaded(doc) => doc,
//!     LoadResult::RequiresPassword { .. } => panic!("needs a password"),
//!     _ => panic!("unusable document"),
//! };
//!
//! let page = doc.page(0, /* retain */ true)?;
//! for m in page.find_matches("needle") {
//!     println!("match at {}..{}", m.start, m.stop);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Every entry point is synchronous and must be externally serialized per
//! document; there is no background work and no cross-document shared
//! state.

mod document;
mod error;
mod form;
mod link;
mod normalize;
mod page;
mod progressive;
mod selection;

pub use document::{Document, LoadResult};
pub use error::{PdfError, Result};
pub use form::{ChoiceOption, FormWidgetInfo};
pub use link::{GotoLink, GotoLinkDest, WebLink};
pub use normalize::{
    fold_char, fold_query, is_line_break, is_skippable, is_word_break, HYPHEN_EXPANSION,
    HYPHEN_LINE_BREAK,
};
pub use page::{MatchRects, Page, TextRange};
pub use progressive::{FileWriter, FullReader, ProgressiveReader, SegmentCollector, VecWriter};
pub use selection::SelectionBoundary;

// Engine-interface vocabulary callers need alongside this crate's types.
pub use pdfclient_engine::{
    Availability, BlockWriter, ByteRange, ByteSource, DownloadHints, FieldFlags, FormType,
    Linearization, OpenError, PdfEngine, Point, PointF, Rect, RectF, SaveFlags, WidgetKind,
};
