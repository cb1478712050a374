//! # pdfclient-engine
//!
//! The narrow interface between the `pdfclient` layer and the opaque PDF
//! engine that actually parses and renders documents. The engine is
//! consumed through the [`PdfEngine`] trait: per-character text
//! primitives, page-space/device-space transforms, annotation and link
//! accessors, an interactive-form environment, and progressive-open
//! support. Document bytes flow in through [`ByteSource`] and saved
//! documents flow out through [`BlockWriter`].
//!
//! Handles are typed but non-owning ([`handle`]); each is valid only while
//! the engine object that issued it is alive.
//!
//! The `fake` feature adds a scripted in-memory engine ([`fake`]) used by
//! the client layer's tests.

mod engine;
mod geometry;
mod handle;
mod source;

#[cfg(feature = "fake")]
pub mod fake;

pub use engine::{
    AnnotationKind, Availability, FieldFlags, FormEventSink, FormType, Linearization, LinkTarget,
    OpenError, PdfEngine, SaveFlags, WidgetKind,
};
pub use geometry::{Point, PointF, Rect, RectF};
pub use handle::{
    AnnotationHandle, AvailabilityHandle, DocumentHandle, FormHandle, PageHandle, TextHandle,
};
pub use source::{BlockWriter, ByteRange, ByteSource, DownloadHints};
