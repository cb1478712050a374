//! Interactive form filling.
//!
//! One [`FormFiller`] exists per document and wraps the engine's form
//! environment. Widgets fall into three behavior groups:
//!
//! - **click-action**: push buttons, checkboxes, radio buttons; the only
//!   interaction is a click, there is no live-edited state;
//! - **choice**: combo boxes and list boxes;
//! - **text**: text fields.
//!
//! Reads produce an immutable [`FormWidgetInfo`] snapshot; callers
//! re-query after every mutation instead of mutating a snapshot. Reading
//! the live value of an editable choice/text widget engages engine focus
//! for the duration of that one call only, so no widget stays "active"
//! between calls. Mutations validate every constraint *before* touching
//! engine state, so a rejected call leaves the document untouched.
//!
//! Form mutations make the engine report page areas to redraw; the
//! [`FormEventSink`] implementation here routes those to the retained page
//! they belong to. Non-retained pages are not tracked and never receive
//! invalidation.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, trace};

use pdfclient_engine::{
    AnnotationHandle, AnnotationKind, DocumentHandle, FormEventSink, FormHandle, PageHandle,
    PdfEngine, Point, Rect, RectF, WidgetKind,
};

use crate::document::PageRegistry;
use crate::page::Page;

/// One option of a choice widget.
#[derive(Debug, Clone, Serialize)]
pub struct ChoiceOption {
    /// Position in the widget's option list.
    pub index: usize,
    /// Display label.
    pub label: String,
    /// Whether the option is currently selected.
    pub selected: bool,
}

/// Immutable snapshot of one form widget at query time.
///
/// An "empty" info ([`found()`](FormWidgetInfo::found) returns `false`)
/// means no supported widget was resolved; every other field of an empty
/// info is meaningless.
#[derive(Debug, Clone, Serialize)]
pub struct FormWidgetInfo {
    /// Widget behavior group.
    pub kind: WidgetKind,
    /// Annotation index of the widget on its page.
    pub index: usize,
    /// Device-space bounding rectangle.
    pub widget_rect: Rect,
    /// Whether the widget rejects all mutation.
    pub read_only: bool,
    /// Current value. Checkboxes and radio buttons report `"true"` or
    /// `"false"`; editable widgets report the live value.
    pub text_value: String,
    /// Accessibility label (alternate field name).
    pub accessibility_label: String,
    /// Whether text can be typed into the widget.
    pub editable_text: bool,
    /// Whether several options may be selected at once.
    pub multiselect: bool,
    /// Whether the text field accepts line breaks.
    pub multi_line_text: bool,
    /// Maximum text length, if the field declares one.
    pub max_length: Option<usize>,
    /// Font size in points; 0 means auto-sized.
    pub font_size: f32,
    /// Options of a choice widget, in order.
    pub options: Vec<ChoiceOption>,
    found: bool,
}

impl FormWidgetInfo {
    pub(crate) fn empty() -> Self {
        Self {
            kind: WidgetKind::Unknown,
            index: 0,
            widget_rect: Rect::EMPTY,
            read_only: false,
            text_value: String::new(),
            accessibility_label: String::new(),
            editable_text: false,
            multiselect: false,
            multi_line_text: false,
            max_length: None,
            font_size: 0.0,
            options: Vec::new(),
            found: false,
        }
    }

    /// Whether a supported widget was resolved.
    pub fn found(&self) -> bool {
        self.found
    }
}

/// Routes engine invalidation callbacks to retained pages.
struct InvalidationSink {
    registry: Rc<RefCell<PageRegistry>>,
}

impl FormEventSink for InvalidationSink {
    fn invalidate(&self, handle: PageHandle, rect: RectF) {
        // Resolve outside the page call so the registry borrow is short.
        let page = self.registry.borrow().page_for_handle(handle);
        match page {
            Some(page) => page.accumulate_invalid_rect(rect),
            None => trace!(?handle, "invalidation for untracked page dropped"),
        }
    }
}

/// The per-document form environment.
///
/// Owned by the document; pages hold a shared reference for delegation.
/// After [`teardown`](FormFiller::teardown) every operation degrades to
/// the empty/false result.
pub(crate) struct FormFiller {
    engine: Rc<dyn PdfEngine>,
    handle: Cell<Option<FormHandle>>,
}

impl FormFiller {
    pub(crate) fn new(
        engine: Rc<dyn PdfEngine>,
        doc: DocumentHandle,
        registry: Rc<RefCell<PageRegistry>>,
    ) -> Self {
        let sink = Rc::new(InvalidationSink { registry });
        let handle = engine.init_form_environment(doc, sink);
        Self {
            engine,
            handle: Cell::new(Some(handle)),
        }
    }

    /// Tear down the engine-side form environment. Idempotent; called by
    /// the owning document before the engine document is closed.
    pub(crate) fn teardown(&self) {
        if let Some(handle) = self.handle.take() {
            self.engine.exit_form_environment(handle);
        }
    }

    pub(crate) fn attach_page(&self, page: PageHandle) {
        if let Some(form) = self.handle.get() {
            self.engine.on_page_attached(form, page);
        }
    }

    pub(crate) fn detach_page(&self, page: PageHandle) {
        if let Some(form) = self.handle.get() {
            self.engine.on_page_detached(form, page);
        }
    }

    pub(crate) fn widget_info_at_point(&self, page: &Page, point: Point) -> FormWidgetInfo {
        let Some(form) = self.handle.get() else {
            return FormWidgetInfo::empty();
        };
        let page_point = self.engine.device_to_page_point(page.handle(), point);
        match self.engine.widget_at_point(form, page.handle(), page_point) {
            Some(annot) => self.build_info(form, page, annot),
            None => FormWidgetInfo::empty(),
        }
    }

    pub(crate) fn widget_info_at_index(&self, page: &Page, index: usize) -> FormWidgetInfo {
        let Some(form) = self.handle.get() else {
            return FormWidgetInfo::empty();
        };
        match self.widget_at_index(page, index) {
            Some(annot) => self.build_info(form, page, annot),
            None => FormWidgetInfo::empty(),
        }
    }

    pub(crate) fn widget_infos(&self, page: &Page, kinds: &[WidgetKind]) -> Vec<FormWidgetInfo> {
        let Some(form) = self.handle.get() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for index in 0..self.engine.annotation_count(page.handle()) {
            let annot = self.engine.annotation_at(page.handle(), index);
            if self.engine.annotation_kind(annot) != AnnotationKind::Widget {
                continue;
            }
            if !kinds.is_empty() && !kinds.contains(&self.engine.field_kind(form, annot)) {
                continue;
            }
            let info = self.build_info(form, page, annot);
            if info.found() {
                out.push(info);
            }
        }
        out
    }

    pub(crate) fn click_on_point(&self, page: &Page, point: Point) -> bool {
        let Some(form) = self.handle.get() else {
            return false;
        };
        let page_point = self.engine.device_to_page_point(page.handle(), point);
        let Some(annot) = self.engine.widget_at_point(form, page.handle(), page_point) else {
            return false;
        };
        let kind = self.engine.field_kind(form, annot);
        if !kind.is_click_action() || self.engine.field_flags(form, annot).is_read_only() {
            debug!(?kind, "click rejected: not a writable click-action widget");
            return false;
        }
        self.engine.click(form, page.handle(), page_point);
        self.engine.kill_focus(form);
        true
    }

    pub(crate) fn set_text(&self, page: &Page, index: usize, text: &str) -> bool {
        let Some(form) = self.handle.get() else {
            return false;
        };
        let Some(annot) = self.widget_at_index(page, index) else {
            return false;
        };
        let kind = self.engine.field_kind(form, annot);
        if !kind.is_text() || self.engine.field_flags(form, annot).is_read_only() {
            debug!(?kind, "set_text rejected: not an editable text field");
            return false;
        }
        self.engine.set_focused(form, annot);
        self.engine.select_all(form, page.handle());
        self.engine.replace_selection(form, page.handle(), text);
        self.engine.kill_focus(form);
        true
    }

    pub(crate) fn set_choice_selection(
        &self,
        page: &Page,
        index: usize,
        selected: &[usize],
    ) -> bool {
        let Some(form) = self.handle.get() else {
            return false;
        };
        let Some(annot) = self.widget_at_index(page, index) else {
            return false;
        };
        let kind = self.engine.field_kind(form, annot);
        let flags = self.engine.field_flags(form, annot);
        if !kind.is_choice() || flags.is_read_only() {
            return false;
        }
        // Every constraint is checked before the first engine mutation, so
        // a rejection leaves the widget untouched.
        let count = self.engine.option_count(form, annot);
        if selected.iter().any(|&i| i >= count) {
            debug!("choice selection rejected: index out of range");
            return false;
        }
        match kind {
            WidgetKind::ComboBox if selected.len() != 1 => {
                debug!("combobox selection rejected: exactly one index required");
                return false;
            }
            WidgetKind::ListBox if !flags.allows_multi_select() && selected.len() > 1 => {
                debug!("listbox selection rejected: widget is single-select");
                return false;
            }
            _ => {}
        }
        self.engine.set_focused(form, annot);
        if kind == WidgetKind::ComboBox {
            self.engine
                .set_index_selected(form, page.handle(), selected[0], true);
        } else {
            for i in 0..count {
                self.engine.set_index_selected(form, page.handle(), i, false);
            }
            for &i in selected {
                self.engine.set_index_selected(form, page.handle(), i, true);
            }
        }
        self.engine.kill_focus(form);
        true
    }

    /// Resolve the annotation at `index` if it is a form widget.
    fn widget_at_index(&self, page: &Page, index: usize) -> Option<AnnotationHandle> {
        if index >= self.engine.annotation_count(page.handle()) {
            return None;
        }
        let annot = self.engine.annotation_at(page.handle(), index);
        if self.engine.annotation_kind(annot) != AnnotationKind::Widget {
            return None;
        }
        Some(annot)
    }

    fn build_info(&self, form: FormHandle, page: &Page, annot: AnnotationHandle) -> FormWidgetInfo {
        let kind = self.engine.field_kind(form, annot);
        if !kind.is_supported() {
            return FormWidgetInfo::empty();
        }
        let flags = self.engine.field_flags(form, annot);
        let read_only = flags.is_read_only();

        let mut info = FormWidgetInfo::empty();
        info.kind = kind;
        info.index = self.engine.annotation_index(annot);
        info.widget_rect = self
            .engine
            .page_to_device_rect(page.handle(), self.engine.annotation_rect(annot));
        info.read_only = read_only;
        info.accessibility_label = self.engine.field_label(form, annot);
        info.font_size = self.engine.field_font_size(form, annot);
        info.found = true;

        if read_only || kind.is_click_action() {
            // No live-edited state to read; a plain snapshot suffices and
            // engine focus stays untouched.
            info.text_value = match kind {
                WidgetKind::CheckBox | WidgetKind::RadioButton => {
                    if self.engine.is_checked(form, annot) {
                        "true".to_string()
                    } else {
                        "false".to_string()
                    }
                }
                _ => self.engine.field_value(form, annot),
            };
            return info;
        }

        // Editable choice/text: focus the widget for the duration of this
        // call to read the live value, and always release before returning.
        self.engine.set_focused(form, annot);
        info.text_value = self.engine.focused_field_text(form, page.handle());
        if kind.is_choice() {
            info.multiselect = flags.allows_multi_select();
            info.editable_text = flags.is_editable_choice();
            let count = self.engine.option_count(form, annot);
            info.options = (0..count)
                .map(|i| ChoiceOption {
                    index: i,
                    label: self.engine.option_label(form, annot, i),
                    selected: self.engine.is_option_selected(form, annot, i),
                })
                .collect();
        } else {
            info.editable_text = true;
            info.multi_line_text = flags.is_multiline();
            info.max_length = self.engine.field_max_length(form, annot);
        }
        self.engine.kill_focus(form);
        info
    }
}

impl Drop for FormFiller {
    fn drop(&mut self) {
        self.teardown();
    }
}
