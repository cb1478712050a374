//! The narrow interface through which the PDF engine collaborator is consumed.
//!
//! Everything the client layer needs from the engine (per-character text
//! primitives, coordinate transforms, annotation and link accessors, the
//! interactive-form environment, and progressive-open support) is expressed
//! here as one object-safe trait plus a handful of closed enums. The engine
//! is assumed not safe for concurrent use; the whole interface is
//! single-threaded and held as `Rc<dyn PdfEngine>`.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;

use crate::geometry::{Point, PointF, Rect, RectF};
use crate::handle::{
    AnnotationHandle, AvailabilityHandle, DocumentHandle, FormHandle, PageHandle, TextHandle,
};
use crate::source::{BlockWriter, ByteSource, DownloadHints};

/// Why the engine refused to open a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OpenError {
    /// The document is encrypted and the password was missing or wrong.
    #[error("document requires a (different) password")]
    BadPassword,
    /// The bytes are not a well-formed document.
    #[error("malformed document")]
    BadFormat,
    /// The byte source failed (short read, unavailable range).
    #[error("file access error")]
    File,
    /// An unsupported security scheme.
    #[error("unsupported security handler")]
    Security,
    /// Any other engine-reported failure.
    #[error("engine error")]
    Unknown,
}

/// Result of a data-availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Data is available and ready.
    Available,
    /// Data is not yet available (more bytes needed).
    NotAvailable,
    /// An error occurred checking availability.
    Error,
}

/// Result of checking document linearization.
///
/// Linearized documents are web-optimized: the first page can be opened
/// before the whole file has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linearization {
    /// The document is linearized.
    Linearized,
    /// The document is not linearized.
    NotLinearized,
    /// Cannot be determined (insufficient data).
    Unknown,
}

/// Kind of interactive form carried by a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormType {
    /// No interactive form.
    None,
    /// Standard AcroForm.
    AcroForm,
    /// Full XFA form.
    XfaFull,
    /// XFA foreground form.
    XfaForeground,
}

/// Annotation subtype, reduced to what this layer consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    /// A link annotation (URI or internal destination).
    Link,
    /// A form widget.
    Widget,
    /// Anything else.
    Other,
}

/// Form widget type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WidgetKind {
    /// Unknown or unsupported widget.
    Unknown,
    /// Push button.
    PushButton,
    /// Checkbox.
    CheckBox,
    /// Radio button.
    RadioButton,
    /// Combo box (dropdown).
    ComboBox,
    /// List box.
    ListBox,
    /// Text field.
    TextField,
    /// Digital signature field.
    Signature,
}

impl WidgetKind {
    /// Widgets whose only interaction is a click (no live-edited state).
    pub fn is_click_action(&self) -> bool {
        matches!(self, Self::PushButton | Self::CheckBox | Self::RadioButton)
    }

    /// Choice widgets (combo box / list box).
    pub fn is_choice(&self) -> bool {
        matches!(self, Self::ComboBox | Self::ListBox)
    }

    /// Text input widgets.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::TextField)
    }

    /// Whether this layer can interact with the widget at all.
    pub fn is_supported(&self) -> bool {
        self.is_click_action() || self.is_choice() || self.is_text()
    }
}

/// Form field flags (values from the PDF reference).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldFlags(pub u32);

impl FieldFlags {
    /// No flags set.
    pub const NONE: FieldFlags = FieldFlags(0);
    /// Field is read-only.
    pub const READ_ONLY: FieldFlags = FieldFlags(1);
    /// Field is required.
    pub const REQUIRED: FieldFlags = FieldFlags(1 << 1);
    /// Text field: multi-line text.
    pub const TEXT_MULTILINE: FieldFlags = FieldFlags(1 << 12);
    /// Text field: password (obscured) text.
    pub const TEXT_PASSWORD: FieldFlags = FieldFlags(1 << 13);
    /// Choice field: combo box rather than list box.
    pub const CHOICE_COMBO: FieldFlags = FieldFlags(1 << 17);
    /// Choice field: combo box with an editable text portion.
    pub const CHOICE_EDIT: FieldFlags = FieldFlags(1 << 18);
    /// Choice field: multiple options may be selected at once.
    pub const CHOICE_MULTI_SELECT: FieldFlags = FieldFlags(1 << 21);

    /// Check whether a flag is set.
    pub fn contains(&self, flag: FieldFlags) -> bool {
        (self.0 & flag.0) != 0
    }

    /// Check if the field is read-only.
    pub fn is_read_only(&self) -> bool {
        self.contains(Self::READ_ONLY)
    }

    /// Check if this is a multi-line text field.
    pub fn is_multiline(&self) -> bool {
        self.contains(Self::TEXT_MULTILINE)
    }

    /// Check if this combo box has an editable text portion.
    pub fn is_editable_choice(&self) -> bool {
        self.contains(Self::CHOICE_EDIT)
    }

    /// Check if multiple selection is allowed.
    pub fn allows_multi_select(&self) -> bool {
        self.contains(Self::CHOICE_MULTI_SELECT)
    }
}

/// Where a link annotation points.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    /// An external URI.
    Uri(String),
    /// A destination inside the same document.
    Goto {
        /// Zero-based target page.
        page_index: usize,
        /// Target x in page space of the destination page, if specified.
        x: Option<f32>,
        /// Target y in page space of the destination page, if specified.
        y: Option<f32>,
        /// Target zoom factor, if specified.
        zoom: Option<f32>,
    },
}

/// Flags controlling how a document is saved.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveFlags {
    /// Save incrementally (append changes instead of rewriting).
    pub incremental: bool,
    /// Strip security/encryption from the saved document.
    pub remove_security: bool,
}

impl SaveFlags {
    /// Create new save flags with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable incremental save mode.
    pub fn incremental(mut self) -> Self {
        self.incremental = true;
        self
    }

    /// Enable security stripping.
    pub fn remove_security(mut self) -> Self {
        self.remove_security = true;
        self
    }
}

/// Receiver for asynchronous form-environment events.
///
/// The engine raises [`invalidate`](FormEventSink::invalidate) whenever a
/// form mutation makes part of a page stale. The rectangle is in page
/// space; routing it to the right page is the receiver's job.
pub trait FormEventSink {
    /// `rect` of `page` needs redrawing.
    fn invalidate(&self, page: PageHandle, rect: RectF);
}

/// The engine collaborator.
///
/// One instance serves any number of documents. Methods never suspend and
/// must be called from a single thread; callers serialize access
/// externally. Handles passed in must be live; behavior on a stale handle
/// is the implementation's contract (the scripted test engine panics).
pub trait PdfEngine {
    // --- documents ---

    /// Open a document from a byte source, optionally with a password.
    fn open_document(
        &self,
        source: Rc<RefCell<dyn ByteSource>>,
        password: Option<&str>,
    ) -> Result<DocumentHandle, OpenError>;

    /// Close a document and everything the engine holds for it.
    fn close_document(&self, doc: DocumentHandle);

    /// Number of pages in the document.
    fn page_count(&self, doc: DocumentHandle) -> usize;

    /// Kind of interactive form the document carries.
    fn form_type(&self, doc: DocumentHandle) -> FormType;

    /// Stream the document out through `writer`. Returns `false` on failure.
    fn save_document(
        &self,
        doc: DocumentHandle,
        writer: &mut dyn BlockWriter,
        flags: SaveFlags,
    ) -> bool;

    // --- progressive availability ---

    /// Create an availability checker over a (possibly incomplete) source.
    fn create_availability(&self, source: Rc<RefCell<dyn ByteSource>>) -> AvailabilityHandle;

    /// Destroy an availability checker.
    fn destroy_availability(&self, avail: AvailabilityHandle);

    /// Linearization status of the underlying document.
    fn linearization(&self, avail: AvailabilityHandle) -> Linearization;

    /// Whether enough bytes are present to open the document. Missing
    /// ranges are reported through `hints`.
    fn is_document_available(
        &self,
        avail: AvailabilityHandle,
        hints: &mut dyn DownloadHints,
    ) -> Availability;

    /// Whether enough bytes are present to load the given page.
    fn is_page_available(
        &self,
        avail: AvailabilityHandle,
        page_index: usize,
        hints: &mut dyn DownloadHints,
    ) -> Availability;

    /// Open the document through the availability checker (the linearized
    /// fast path: succeeds before the whole file has arrived).
    fn open_available_document(
        &self,
        avail: AvailabilityHandle,
        password: Option<&str>,
    ) -> Result<DocumentHandle, OpenError>;

    // --- pages ---

    /// Load a page by zero-based index.
    fn load_page(&self, doc: DocumentHandle, index: usize) -> Option<PageHandle>;

    /// Close a loaded page.
    fn close_page(&self, page: PageHandle);

    /// Page size as (width, height) in page units.
    fn page_size(&self, page: PageHandle) -> (f32, f32);

    /// Transform a page-space point to device space.
    fn page_to_device_point(&self, page: PageHandle, p: PointF) -> Point;

    /// Transform a page-space rectangle to device space.
    fn page_to_device_rect(&self, page: PageHandle, r: RectF) -> Rect;

    /// Transform a device-space point to page space.
    fn device_to_page_point(&self, page: PageHandle, p: Point) -> PointF;

    // --- text ---

    /// Load (or get) the text layer of a page.
    fn load_text(&self, page: PageHandle) -> TextHandle;

    /// Close a text layer.
    fn close_text(&self, text: TextHandle);

    /// Number of characters in the text layer.
    fn char_count(&self, text: TextHandle) -> usize;

    /// Unicode codepoint of the character at `index`.
    fn char_at(&self, text: TextHandle, index: usize) -> u32;

    /// Raw page-space bounding box of the character at `index`.
    fn char_box(&self, text: TextHandle, index: usize) -> RectF;

    /// Baseline origin of the character at `index`.
    fn char_origin(&self, text: TextHandle, index: usize) -> PointF;

    // --- annotations & links ---

    /// Number of annotations on the page.
    fn annotation_count(&self, page: PageHandle) -> usize;

    /// Annotation by zero-based index.
    fn annotation_at(&self, page: PageHandle, index: usize) -> AnnotationHandle;

    /// Index of an annotation on its page.
    fn annotation_index(&self, annot: AnnotationHandle) -> usize;

    /// Subtype of the annotation.
    fn annotation_kind(&self, annot: AnnotationHandle) -> AnnotationKind;

    /// Page-space bounding rectangle of the annotation.
    fn annotation_rect(&self, annot: AnnotationHandle) -> RectF;

    /// Per-line rectangles of the annotation. A link spanning several
    /// lines has one rectangle per line; widgets have exactly one.
    fn annotation_rects(&self, annot: AnnotationHandle) -> Vec<RectF> {
        vec![self.annotation_rect(annot)]
    }

    /// Resolve a link annotation's action, if it has one this layer
    /// understands.
    fn link_target(&self, doc: DocumentHandle, annot: AnnotationHandle) -> Option<LinkTarget>;

    // --- interactive forms ---

    /// Create the form environment for a document. The engine holds `sink`
    /// until [`exit_form_environment`](PdfEngine::exit_form_environment).
    fn init_form_environment(
        &self,
        doc: DocumentHandle,
        sink: Rc<dyn FormEventSink>,
    ) -> FormHandle;

    /// Tear down a form environment, dropping its event sink.
    fn exit_form_environment(&self, form: FormHandle);

    /// Announce that a page participates in form filling.
    fn on_page_attached(&self, form: FormHandle, page: PageHandle);

    /// Announce that a page stops participating in form filling.
    fn on_page_detached(&self, form: FormHandle, page: PageHandle);

    /// Form widget under a page-space point, if any.
    fn widget_at_point(
        &self,
        form: FormHandle,
        page: PageHandle,
        point: PointF,
    ) -> Option<AnnotationHandle>;

    /// Field type of a widget annotation.
    fn field_kind(&self, form: FormHandle, annot: AnnotationHandle) -> WidgetKind;

    /// Field flags of a widget annotation.
    fn field_flags(&self, form: FormHandle, annot: AnnotationHandle) -> FieldFlags;

    /// Stored field value (not the live-edited one).
    fn field_value(&self, form: FormHandle, annot: AnnotationHandle) -> String;

    /// Accessibility label (alternate field name).
    fn field_label(&self, form: FormHandle, annot: AnnotationHandle) -> String;

    /// Maximum text length, if the field declares one.
    fn field_max_length(&self, form: FormHandle, annot: AnnotationHandle) -> Option<usize>;

    /// Font size in points; 0 means auto-sized.
    fn field_font_size(&self, form: FormHandle, annot: AnnotationHandle) -> f32;

    /// Checked state of a checkbox or radio button.
    fn is_checked(&self, form: FormHandle, annot: AnnotationHandle) -> bool;

    /// Number of options of a choice widget.
    fn option_count(&self, form: FormHandle, annot: AnnotationHandle) -> usize;

    /// Label of a choice option.
    fn option_label(&self, form: FormHandle, annot: AnnotationHandle, index: usize) -> String;

    /// Whether a choice option is currently selected.
    fn is_option_selected(&self, form: FormHandle, annot: AnnotationHandle, index: usize) -> bool;

    /// Give a widget keyboard focus.
    fn set_focused(&self, form: FormHandle, annot: AnnotationHandle) -> bool;

    /// Drop keyboard focus, committing any live edit.
    fn kill_focus(&self, form: FormHandle) -> bool;

    /// Live text of the focused field (may differ from the stored value
    /// while an edit is in flight).
    fn focused_field_text(&self, form: FormHandle, page: PageHandle) -> String;

    /// Send a click (button down + up) at a page-space point.
    fn click(&self, form: FormHandle, page: PageHandle, point: PointF);

    /// Select the entire text of the focused field.
    fn select_all(&self, form: FormHandle, page: PageHandle);

    /// Replace the current selection of the focused field.
    fn replace_selection(&self, form: FormHandle, page: PageHandle, text: &str);

    /// Select or deselect one option of the focused choice widget.
    fn set_index_selected(
        &self,
        form: FormHandle,
        page: PageHandle,
        index: usize,
        selected: bool,
    ) -> bool;
}
