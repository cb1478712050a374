//! Scripted in-memory engine for tests.
//!
//! [`FakeEngine`] implements every [`PdfEngine`] method over plain data: a
//! document is described up front as a [`FakeDocument`] blueprint (pages,
//! characters, widgets, links, a password, an availability threshold) and
//! instantiated when opened. Form mutations are applied to the instance and
//! raise [`FormEventSink::invalidate`] with the widget rectangle, so the
//! whole invalidation route can be exercised without a real engine.
//!
//! The page-to-device transform is the plain y-flip: device `(x, h - y)`.
//!
//! Handles are checked at use time; reading through a stale or unknown
//! handle panics. Close/teardown calls are idempotent and tolerate handles
//! that are already gone, since owners tear down in arbitrary drop order.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::engine::{
    AnnotationKind, Availability, FieldFlags, FormEventSink, FormType, Linearization, LinkTarget,
    OpenError, PdfEngine, SaveFlags, WidgetKind,
};
use crate::geometry::{Point, PointF, Rect, RectF};
use crate::handle::{
    AnnotationHandle, AvailabilityHandle, DocumentHandle, FormHandle, PageHandle, TextHandle,
};
use crate::source::{BlockWriter, ByteSource, DownloadHints};

/// Advance used by the text-line builders, in page units.
pub const CHAR_ADVANCE: f32 = 10.0;
/// Glyph height used by the text-line builders.
pub const CHAR_HEIGHT: f32 = 12.0;

/// One scripted character: codepoint, raw box, baseline origin.
#[derive(Debug, Clone)]
pub struct FakeChar {
    pub code: u32,
    pub bounds: RectF,
    pub origin: PointF,
}

/// One scripted form widget.
#[derive(Debug, Clone)]
pub struct FakeWidget {
    pub kind: WidgetKind,
    pub flags: FieldFlags,
    pub rect: RectF,
    pub value: String,
    pub label: String,
    pub max_length: Option<usize>,
    pub font_size: f32,
    /// (label, selected) pairs for choice widgets.
    pub options: Vec<(String, bool)>,
    pub checked: bool,
}

impl FakeWidget {
    /// A widget of the given kind with everything else defaulted.
    pub fn new(kind: WidgetKind, rect: RectF) -> Self {
        Self {
            kind,
            flags: FieldFlags::NONE,
            rect,
            value: String::new(),
            label: String::new(),
            max_length: None,
            font_size: 0.0,
            options: Vec::new(),
            checked: false,
        }
    }

    /// Builder-style flag setter.
    pub fn with_flags(mut self, flags: FieldFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Builder-style value setter.
    pub fn with_value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    /// Builder-style label setter.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Builder-style options setter.
    pub fn with_options(mut self, options: &[(&str, bool)]) -> Self {
        self.options = options
            .iter()
            .map(|(l, s)| (l.to_string(), *s))
            .collect();
        self
    }
}

/// One scripted link annotation.
#[derive(Debug, Clone)]
pub struct FakeLink {
    pub rects: Vec<RectF>,
    pub target: LinkTarget,
}

/// A scripted annotation.
#[derive(Debug, Clone)]
pub enum FakeAnnot {
    Widget(FakeWidget),
    Link(FakeLink),
    /// Any annotation subtype this layer ignores.
    Other(RectF),
}

/// Blueprint for one page.
#[derive(Debug, Clone)]
pub struct FakePage {
    pub width: f32,
    pub height: f32,
    pub chars: Vec<FakeChar>,
    pub annots: Vec<FakeAnnot>,
}

impl FakePage {
    /// An empty page of the given size.
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            chars: Vec::new(),
            annots: Vec::new(),
        }
    }

    /// Append one character with an explicit box and origin.
    pub fn add_char(&mut self, code: u32, bounds: RectF, origin: PointF) {
        self.chars.push(FakeChar {
            code,
            bounds,
            origin,
        });
    }

    /// Lay `text` out left-to-right starting at (`left`, `baseline`),
    /// advancing [`CHAR_ADVANCE`] per character.
    pub fn add_line(&mut self, text: &str, left: f32, baseline: f32) {
        let mut x = left;
        for c in text.chars() {
            self.add_char(
                c as u32,
                RectF::new(x, baseline, x + CHAR_ADVANCE - 2.0, baseline + CHAR_HEIGHT),
                PointF::new(x, baseline),
            );
            x += CHAR_ADVANCE;
        }
    }

    /// Lay `text` out right-to-left: the first character of `text` gets the
    /// rightmost box. Used to script RTL words.
    pub fn add_rtl_line(&mut self, text: &str, right: f32, baseline: f32) {
        let mut x = right - CHAR_ADVANCE;
        for c in text.chars() {
            self.add_char(
                c as u32,
                RectF::new(x, baseline, x + CHAR_ADVANCE - 2.0, baseline + CHAR_HEIGHT),
                PointF::new(x + CHAR_ADVANCE, baseline),
            );
            x -= CHAR_ADVANCE;
        }
    }

    /// Append an annotation, returning its index.
    pub fn add_annot(&mut self, annot: FakeAnnot) -> usize {
        self.annots.push(annot);
        self.annots.len() - 1
    }

    /// Append a widget annotation, returning its index.
    pub fn add_widget(&mut self, widget: FakeWidget) -> usize {
        self.add_annot(FakeAnnot::Widget(widget))
    }
}

/// Blueprint for a whole document.
#[derive(Debug, Clone)]
pub struct FakeDocument {
    pub pages: Vec<FakePage>,
    /// Required password, if the document is encrypted.
    pub password: Option<String>,
    pub linearized: bool,
    /// When set, opening fails with [`OpenError::BadFormat`].
    pub malformed: bool,
    /// Bytes that must be available before the document opens. Defaults to
    /// the full source length.
    pub available_threshold: Option<u64>,
}

impl FakeDocument {
    /// An empty document blueprint.
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            password: None,
            linearized: false,
            malformed: false,
            available_threshold: None,
        }
    }

    /// Builder-style page append.
    pub fn with_page(mut self, page: FakePage) -> Self {
        self.pages.push(page);
        self
    }

    /// Builder-style password setter.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Mark the document linearized.
    pub fn linearized(mut self) -> Self {
        self.linearized = true;
        self
    }
}

impl Default for FakeDocument {
    fn default() -> Self {
        Self::new()
    }
}

struct DocInst {
    pages: Vec<FakePage>,
}

struct FormInst {
    doc: u64,
    sink: Rc<dyn FormEventSink>,
    focused: Option<u64>,
    select_all_pending: bool,
}

struct State {
    blueprint: FakeDocument,
    next: u64,
    docs: HashMap<u64, DocInst>,
    /// page handle -> (doc handle, page index)
    pages: HashMap<u64, (u64, usize)>,
    /// text handle -> page handle
    texts: HashMap<u64, u64>,
    /// annot handle -> (page handle, annot index)
    annots: HashMap<u64, (u64, usize)>,
    /// (page handle, annot index) -> annot handle, for stable identity
    annot_handles: HashMap<(u64, usize), u64>,
    forms: HashMap<u64, FormInst>,
    avails: HashMap<u64, Rc<RefCell<dyn ByteSource>>>,
}

/// The scripted engine. Serves exactly one document blueprint; every
/// successful open instantiates a fresh copy of it.
pub struct FakeEngine {
    state: RefCell<State>,
    generic_opens: Cell<u32>,
    fast_path_opens: Cell<u32>,
    focus_engagements: Cell<u32>,
    last_save_flags: Cell<Option<SaveFlags>>,
}

impl FakeEngine {
    /// Create an engine serving `blueprint`.
    pub fn new(blueprint: FakeDocument) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(State {
                blueprint,
                next: 1,
                docs: HashMap::new(),
                pages: HashMap::new(),
                texts: HashMap::new(),
                annots: HashMap::new(),
                annot_handles: HashMap::new(),
                forms: HashMap::new(),
                avails: HashMap::new(),
            }),
            generic_opens: Cell::new(0),
            fast_path_opens: Cell::new(0),
            focus_engagements: Cell::new(0),
            last_save_flags: Cell::new(None),
        })
    }

    /// How many times the generic opener ran.
    pub fn generic_opens(&self) -> u32 {
        self.generic_opens.get()
    }

    /// How many times the linearized fast-path opener ran.
    pub fn fast_path_opens(&self) -> u32 {
        self.fast_path_opens.get()
    }

    /// How many times a widget received focus.
    pub fn focus_engagements(&self) -> u32 {
        self.focus_engagements.get()
    }

    /// Flags of the most recent save, if any.
    pub fn last_save_flags(&self) -> Option<SaveFlags> {
        self.last_save_flags.get()
    }

    /// Currently focused widget across all form environments.
    pub fn focused_widget(&self) -> Option<AnnotationHandle> {
        let state = self.state.borrow();
        state
            .forms
            .values()
            .find_map(|f| f.focused)
            .map(AnnotationHandle)
    }

    /// Deliver an invalidation for every loaded page with the given page
    /// index, as if a form mutation caused it.
    ///
    /// Routes through the same [`FormEventSink`] the client registered, so
    /// tests exercise the full sink -> registry -> page path; pages the
    /// client does not track simply drop the callback.
    pub fn raise_invalidation_for_page_index(&self, page_index: usize, rect: RectF) {
        let targets: Vec<(PageHandle, Rc<dyn FormEventSink>)> = {
            let state = self.state.borrow();
            state
                .pages
                .iter()
                .filter(|(_, (_, index))| *index == page_index)
                .filter_map(|(handle, (doc, _))| {
                    state
                        .forms
                        .values()
                        .find(|f| f.doc == *doc)
                        .map(|f| (PageHandle(*handle), Rc::clone(&f.sink)))
                })
                .collect()
        };
        for (handle, sink) in targets {
            sink.invalidate(handle, rect);
        }
    }

    fn alloc(state: &mut State) -> u64 {
        let h = state.next;
        state.next += 1;
        h
    }

    fn try_open(
        &self,
        source: &Rc<RefCell<dyn ByteSource>>,
        password: Option<&str>,
    ) -> Result<DocumentHandle, OpenError> {
        let mut state = self.state.borrow_mut();
        if state.blueprint.malformed {
            return Err(OpenError::BadFormat);
        }
        {
            let src = source.borrow();
            let threshold = state.blueprint.available_threshold.unwrap_or(src.len());
            if !src.is_range_available(0, threshold) {
                return Err(OpenError::File);
            }
        }
        let required = state.blueprint.password.as_deref().filter(|p| !p.is_empty());
        let provided = password.filter(|p| !p.is_empty());
        if required != provided {
            return Err(OpenError::BadPassword);
        }
        let h = Self::alloc(&mut state);
        let pages = state.blueprint.pages.clone();
        state.docs.insert(h, DocInst { pages });
        Ok(DocumentHandle(h))
    }

    fn widget<'a>(state: &'a State, annot: AnnotationHandle) -> &'a FakeWidget {
        let (page_h, idx) = *state.annots.get(&annot.0).expect("unknown annotation handle");
        let (doc, page_idx) = *state.pages.get(&page_h).expect("stale page handle");
        match &state.docs.get(&doc).expect("stale document handle").pages[page_idx].annots[idx] {
            FakeAnnot::Widget(w) => w,
            _ => panic!("annotation {idx} is not a widget"),
        }
    }

    fn widget_mut<'a>(state: &'a mut State, annot_h: u64) -> &'a mut FakeWidget {
        let (page_h, idx) = *state.annots.get(&annot_h).expect("unknown annotation handle");
        let (doc, page_idx) = *state.pages.get(&page_h).expect("stale page handle");
        match &mut state
            .docs
            .get_mut(&doc)
            .expect("stale document handle")
            .pages[page_idx]
            .annots[idx]
        {
            FakeAnnot::Widget(w) => w,
            _ => panic!("annotation {idx} is not a widget"),
        }
    }

    fn annot<'a>(state: &'a State, annot: AnnotationHandle) -> &'a FakeAnnot {
        let (page_h, idx) = *state.annots.get(&annot.0).expect("unknown annotation handle");
        let (doc, page_idx) = *state.pages.get(&page_h).expect("stale page handle");
        &state.docs.get(&doc).expect("stale document handle").pages[page_idx].annots[idx]
    }

    fn page<'a>(state: &'a State, page: PageHandle) -> &'a FakePage {
        let (doc, idx) = *state.pages.get(&page.0).expect("unknown page handle");
        &state.docs.get(&doc).expect("stale document handle").pages[idx]
    }

    fn text_page<'a>(state: &'a State, text: TextHandle) -> &'a FakePage {
        let page_h = *state.texts.get(&text.0).expect("unknown text handle");
        Self::page(state, PageHandle(page_h))
    }

    fn annot_handle(state: &mut State, page: PageHandle, idx: usize) -> u64 {
        if let Some(&h) = state.annot_handles.get(&(page.0, idx)) {
            return h;
        }
        let h = Self::alloc(state);
        state.annots.insert(h, (page.0, idx));
        state.annot_handles.insert((page.0, idx), h);
        h
    }

    /// Run `mutate` against the focused widget of `form`, then raise an
    /// invalidation for the widget's rectangle outside the state borrow.
    ///
    /// `mutate` also receives the form's select-all-pending flag.
    fn mutate_focused<F>(&self, form: FormHandle, page: PageHandle, mutate: F) -> bool
    where
        F: FnOnce(&mut FakeWidget, &mut bool) -> bool,
    {
        let (changed, sink, rect) = {
            let mut state = self.state.borrow_mut();
            let (focused, mut pending) = {
                let inst = state.forms.get(&form.0).expect("unknown form handle");
                match inst.focused {
                    Some(h) => (h, inst.select_all_pending),
                    None => return false,
                }
            };
            let (changed, rect) = {
                let widget = Self::widget_mut(&mut state, focused);
                let changed = mutate(widget, &mut pending);
                (changed, widget.rect)
            };
            let inst = state.forms.get_mut(&form.0).expect("unknown form handle");
            inst.select_all_pending = pending;
            let sink = Rc::clone(&inst.sink);
            (changed, sink, rect)
        };
        if changed {
            sink.invalidate(page, rect);
        }
        changed
    }
}

impl PdfEngine for FakeEngine {
    fn open_document(
        &self,
        source: Rc<RefCell<dyn ByteSource>>,
        password: Option<&str>,
    ) -> Result<DocumentHandle, OpenError> {
        let result = self.try_open(&source, password);
        if result.is_ok() {
            self.generic_opens.set(self.generic_opens.get() + 1);
        }
        result
    }

    fn close_document(&self, doc: DocumentHandle) {
        let mut state = self.state.borrow_mut();
        state.docs.remove(&doc.0);
    }

    fn page_count(&self, doc: DocumentHandle) -> usize {
        let state = self.state.borrow();
        state
            .docs
            .get(&doc.0)
            .expect("unknown document handle")
            .pages
            .len()
    }

    fn form_type(&self, doc: DocumentHandle) -> FormType {
        let state = self.state.borrow();
        let has_widgets = state
            .docs
            .get(&doc.0)
            .expect("unknown document handle")
            .pages
            .iter()
            .any(|p| p.annots.iter().any(|a| matches!(a, FakeAnnot::Widget(_))));
        if has_widgets {
            FormType::AcroForm
        } else {
            FormType::None
        }
    }

    fn save_document(
        &self,
        doc: DocumentHandle,
        writer: &mut dyn BlockWriter,
        flags: SaveFlags,
    ) -> bool {
        self.last_save_flags.set(Some(flags));
        let state = self.state.borrow();
        let inst = state.docs.get(&doc.0).expect("unknown document handle");
        if !writer.write_block(b"%FAKEPDF-1.7\n") {
            return false;
        }
        if state.blueprint.password.is_some() && !flags.remove_security {
            if !writer.write_block(b"[ENCRYPTED]\n") {
                return false;
            }
        }
        let body = format!("pages {}\n", inst.pages.len());
        writer.write_block(body.as_bytes())
    }

    fn create_availability(&self, source: Rc<RefCell<dyn ByteSource>>) -> AvailabilityHandle {
        let mut state = self.state.borrow_mut();
        let h = Self::alloc(&mut state);
        state.avails.insert(h, source);
        AvailabilityHandle(h)
    }

    fn destroy_availability(&self, avail: AvailabilityHandle) {
        let mut state = self.state.borrow_mut();
        state.avails.remove(&avail.0);
    }

    fn linearization(&self, avail: AvailabilityHandle) -> Linearization {
        let state = self.state.borrow();
        let source = state.avails.get(&avail.0).expect("unknown availability handle");
        let src = source.borrow();
        if !src.is_range_available(0, src.len().min(1024)) {
            return Linearization::Unknown;
        }
        if state.blueprint.linearized {
            Linearization::Linearized
        } else {
            Linearization::NotLinearized
        }
    }

    fn is_document_available(
        &self,
        avail: AvailabilityHandle,
        hints: &mut dyn DownloadHints,
    ) -> Availability {
        let state = self.state.borrow();
        let source = state.avails.get(&avail.0).expect("unknown availability handle");
        let src = source.borrow();
        let threshold = state.blueprint.available_threshold.unwrap_or(src.len());
        if src.is_range_available(0, threshold) {
            Availability::Available
        } else {
            let head = src.len().min(1024);
            hints.add_segment(0, head);
            hints.add_segment(src.len().saturating_sub(head), head);
            Availability::NotAvailable
        }
    }

    fn is_page_available(
        &self,
        avail: AvailabilityHandle,
        _page_index: usize,
        hints: &mut dyn DownloadHints,
    ) -> Availability {
        self.is_document_available(avail, hints)
    }

    fn open_available_document(
        &self,
        avail: AvailabilityHandle,
        password: Option<&str>,
    ) -> Result<DocumentHandle, OpenError> {
        let source = {
            let state = self.state.borrow();
            Rc::clone(state.avails.get(&avail.0).expect("unknown availability handle"))
        };
        let result = self.try_open(&source, password);
        if result.is_ok() {
            self.fast_path_opens.set(self.fast_path_opens.get() + 1);
        }
        result
    }

    fn load_page(&self, doc: DocumentHandle, index: usize) -> Option<PageHandle> {
        let mut state = self.state.borrow_mut();
        if index >= state.docs.get(&doc.0)?.pages.len() {
            return None;
        }
        let h = Self::alloc(&mut state);
        state.pages.insert(h, (doc.0, index));
        Some(PageHandle(h))
    }

    fn close_page(&self, page: PageHandle) {
        let mut state = self.state.borrow_mut();
        state.pages.remove(&page.0);
        state.texts.retain(|_, p| *p != page.0);
        state.annots.retain(|_, (p, _)| *p != page.0);
        state.annot_handles.retain(|(p, _), _| *p != page.0);
    }

    fn page_size(&self, page: PageHandle) -> (f32, f32) {
        let state = self.state.borrow();
        let p = Self::page(&state, page);
        (p.width, p.height)
    }

    fn page_to_device_point(&self, page: PageHandle, p: PointF) -> Point {
        let (_, height) = self.page_size(page);
        Point::new(p.x.round() as i32, (height - p.y).round() as i32)
    }

    fn page_to_device_rect(&self, page: PageHandle, r: RectF) -> Rect {
        let (_, height) = self.page_size(page);
        Rect::new(
            r.left.round() as i32,
            (height - r.top).round() as i32,
            r.right.round() as i32,
            (height - r.bottom).round() as i32,
        )
    }

    fn device_to_page_point(&self, page: PageHandle, p: Point) -> PointF {
        let (_, height) = self.page_size(page);
        PointF::new(p.x as f32, height - p.y as f32)
    }

    fn load_text(&self, page: PageHandle) -> TextHandle {
        let mut state = self.state.borrow_mut();
        assert!(state.pages.contains_key(&page.0), "unknown page handle");
        let h = Self::alloc(&mut state);
        state.texts.insert(h, page.0);
        TextHandle(h)
    }

    fn close_text(&self, text: TextHandle) {
        let mut state = self.state.borrow_mut();
        state.texts.remove(&text.0);
    }

    fn char_count(&self, text: TextHandle) -> usize {
        let state = self.state.borrow();
        Self::text_page(&state, text).chars.len()
    }

    fn char_at(&self, text: TextHandle, index: usize) -> u32 {
        let state = self.state.borrow();
        Self::text_page(&state, text).chars[index].code
    }

    fn char_box(&self, text: TextHandle, index: usize) -> RectF {
        let state = self.state.borrow();
        Self::text_page(&state, text).chars[index].bounds
    }

    fn char_origin(&self, text: TextHandle, index: usize) -> PointF {
        let state = self.state.borrow();
        Self::text_page(&state, text).chars[index].origin
    }

    fn annotation_count(&self, page: PageHandle) -> usize {
        let state = self.state.borrow();
        Self::page(&state, page).annots.len()
    }

    fn annotation_at(&self, page: PageHandle, index: usize) -> AnnotationHandle {
        let mut state = self.state.borrow_mut();
        let count = Self::page(&state, page).annots.len();
        assert!(index < count, "annotation index {index} out of range");
        AnnotationHandle(Self::annot_handle(&mut state, page, index))
    }

    fn annotation_index(&self, annot: AnnotationHandle) -> usize {
        let state = self.state.borrow();
        state.annots.get(&annot.0).expect("unknown annotation handle").1
    }

    fn annotation_kind(&self, annot: AnnotationHandle) -> AnnotationKind {
        let state = self.state.borrow();
        match Self::annot(&state, annot) {
            FakeAnnot::Widget(_) => AnnotationKind::Widget,
            FakeAnnot::Link(_) => AnnotationKind::Link,
            FakeAnnot::Other(_) => AnnotationKind::Other,
        }
    }

    fn annotation_rect(&self, annot: AnnotationHandle) -> RectF {
        let state = self.state.borrow();
        match Self::annot(&state, annot) {
            FakeAnnot::Widget(w) => w.rect,
            FakeAnnot::Link(l) => l
                .rects
                .iter()
                .fold(RectF::EMPTY, |acc, r| acc.union(*r)),
            FakeAnnot::Other(r) => *r,
        }
    }

    fn annotation_rects(&self, annot: AnnotationHandle) -> Vec<RectF> {
        let state = self.state.borrow();
        match Self::annot(&state, annot) {
            FakeAnnot::Link(l) => l.rects.clone(),
            FakeAnnot::Widget(w) => vec![w.rect],
            FakeAnnot::Other(r) => vec![*r],
        }
    }

    fn link_target(&self, _doc: DocumentHandle, annot: AnnotationHandle) -> Option<LinkTarget> {
        let state = self.state.borrow();
        match Self::annot(&state, annot) {
            FakeAnnot::Link(l) => Some(l.target.clone()),
            _ => None,
        }
    }

    fn init_form_environment(
        &self,
        doc: DocumentHandle,
        sink: Rc<dyn FormEventSink>,
    ) -> FormHandle {
        let mut state = self.state.borrow_mut();
        assert!(state.docs.contains_key(&doc.0), "unknown document handle");
        let h = Self::alloc(&mut state);
        state.forms.insert(
            h,
            FormInst {
                doc: doc.0,
                sink,
                focused: None,
                select_all_pending: false,
            },
        );
        FormHandle(h)
    }

    fn exit_form_environment(&self, form: FormHandle) {
        let mut state = self.state.borrow_mut();
        state.forms.remove(&form.0);
    }

    fn on_page_attached(&self, _form: FormHandle, _page: PageHandle) {}

    fn on_page_detached(&self, _form: FormHandle, _page: PageHandle) {}

    fn widget_at_point(
        &self,
        _form: FormHandle,
        page: PageHandle,
        point: PointF,
    ) -> Option<AnnotationHandle> {
        let mut state = self.state.borrow_mut();
        let idx = Self::page(&state, page)
            .annots
            .iter()
            .position(|a| matches!(a, FakeAnnot::Widget(w) if w.rect.contains(point)))?;
        Some(AnnotationHandle(Self::annot_handle(&mut state, page, idx)))
    }

    fn field_kind(&self, _form: FormHandle, annot: AnnotationHandle) -> WidgetKind {
        let state = self.state.borrow();
        Self::widget(&state, annot).kind
    }

    fn field_flags(&self, _form: FormHandle, annot: AnnotationHandle) -> FieldFlags {
        let state = self.state.borrow();
        Self::widget(&state, annot).flags
    }

    fn field_value(&self, _form: FormHandle, annot: AnnotationHandle) -> String {
        let state = self.state.borrow();
        Self::widget(&state, annot).value.clone()
    }

    fn field_label(&self, _form: FormHandle, annot: AnnotationHandle) -> String {
        let state = self.state.borrow();
        Self::widget(&state, annot).label.clone()
    }

    fn field_max_length(&self, _form: FormHandle, annot: AnnotationHandle) -> Option<usize> {
        let state = self.state.borrow();
        Self::widget(&state, annot).max_length
    }

    fn field_font_size(&self, _form: FormHandle, annot: AnnotationHandle) -> f32 {
        let state = self.state.borrow();
        Self::widget(&state, annot).font_size
    }

    fn is_checked(&self, _form: FormHandle, annot: AnnotationHandle) -> bool {
        let state = self.state.borrow();
        Self::widget(&state, annot).checked
    }

    fn option_count(&self, _form: FormHandle, annot: AnnotationHandle) -> usize {
        let state = self.state.borrow();
        Self::widget(&state, annot).options.len()
    }

    fn option_label(&self, _form: FormHandle, annot: AnnotationHandle, index: usize) -> String {
        let state = self.state.borrow();
        Self::widget(&state, annot).options[index].0.clone()
    }

    fn is_option_selected(
        &self,
        _form: FormHandle,
        annot: AnnotationHandle,
        index: usize,
    ) -> bool {
        let state = self.state.borrow();
        Self::widget(&state, annot).options[index].1
    }

    fn set_focused(&self, form: FormHandle, annot: AnnotationHandle) -> bool {
        let mut state = self.state.borrow_mut();
        assert!(state.annots.contains_key(&annot.0), "unknown annotation handle");
        let inst = state.forms.get_mut(&form.0).expect("unknown form handle");
        inst.focused = Some(annot.0);
        inst.select_all_pending = false;
        self.focus_engagements.set(self.focus_engagements.get() + 1);
        true
    }

    fn kill_focus(&self, form: FormHandle) -> bool {
        let mut state = self.state.borrow_mut();
        let inst = state.forms.get_mut(&form.0).expect("unknown form handle");
        let had_focus = inst.focused.is_some();
        inst.focused = None;
        inst.select_all_pending = false;
        had_focus
    }

    fn focused_field_text(&self, form: FormHandle, _page: PageHandle) -> String {
        let state = self.state.borrow();
        match state.forms.get(&form.0).expect("unknown form handle").focused {
            Some(h) => Self::widget(&state, AnnotationHandle(h)).value.clone(),
            None => String::new(),
        }
    }

    fn click(&self, form: FormHandle, page: PageHandle, point: PointF) {
        let (sink, rect) = {
            let mut state = self.state.borrow_mut();
            let idx = match Self::page(&state, page)
                .annots
                .iter()
                .position(|a| matches!(a, FakeAnnot::Widget(w) if w.rect.contains(point)))
            {
                Some(i) => i,
                None => return,
            };
            let annot_h = Self::annot_handle(&mut state, page, idx);
            let kind = Self::widget(&state, AnnotationHandle(annot_h)).kind;
            match kind {
                WidgetKind::CheckBox | WidgetKind::RadioButton => {
                    let w = Self::widget_mut(&mut state, annot_h);
                    w.checked = !w.checked;
                    w.value = if w.checked { "true" } else { "false" }.to_string();
                }
                WidgetKind::PushButton => {}
                _ => {
                    let inst = state.forms.get_mut(&form.0).expect("unknown form handle");
                    inst.focused = Some(annot_h);
                }
            }
            let rect = Self::widget(&state, AnnotationHandle(annot_h)).rect;
            let sink = Rc::clone(&state.forms.get(&form.0).expect("unknown form handle").sink);
            (sink, rect)
        };
        sink.invalidate(page, rect);
    }

    fn select_all(&self, form: FormHandle, _page: PageHandle) {
        let mut state = self.state.borrow_mut();
        let inst = state.forms.get_mut(&form.0).expect("unknown form handle");
        if inst.focused.is_some() {
            inst.select_all_pending = true;
        }
    }

    fn replace_selection(&self, form: FormHandle, page: PageHandle, text: &str) {
        self.mutate_focused(form, page, |widget, pending| {
            if *pending {
                widget.value = text.to_string();
            } else {
                widget.value.push_str(text);
            }
            *pending = false;
            if let Some(max) = widget.max_length {
                widget.value.truncate(max);
            }
            true
        });
    }

    fn set_index_selected(
        &self,
        form: FormHandle,
        page: PageHandle,
        index: usize,
        selected: bool,
    ) -> bool {
        self.mutate_focused(form, page, |widget, _| {
            if index >= widget.options.len() {
                return false;
            }
            if widget.kind == WidgetKind::ComboBox && selected {
                for opt in &mut widget.options {
                    opt.1 = false;
                }
            }
            widget.options[index].1 = selected;
            widget.value = widget
                .options
                .iter()
                .find(|o| o.1)
                .map(|o| o.0.clone())
                .unwrap_or_default();
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    struct NullSink;
    impl FormEventSink for NullSink {
        fn invalidate(&self, _page: PageHandle, _rect: RectF) {}
    }

    struct FullSource(Vec<u8>);
    impl ByteSource for FullSource {
        fn len(&self) -> u64 {
            self.0.len() as u64
        }
        fn is_complete(&self) -> bool {
            true
        }
        fn is_range_available(&self, offset: u64, len: u64) -> bool {
            offset + len <= self.len()
        }
        fn read(&self, offset: u64, buf: &mut [u8]) -> bool {
            let start = offset as usize;
            if start + buf.len() > self.0.len() {
                return false;
            }
            buf.copy_from_slice(&self.0[start..start + buf.len()]);
            true
        }
    }

    fn source(n: usize) -> Rc<StdRefCell<dyn ByteSource>> {
        Rc::new(StdRefCell::new(FullSource(vec![0u8; n])))
    }

    #[test]
    fn test_open_and_read_chars() {
        let mut page = FakePage::new(600.0, 800.0);
        page.add_line("hi", 100.0, 700.0);
        let engine = FakeEngine::new(FakeDocument::new().with_page(page));
        let doc = engine.open_document(source(2048), None).unwrap();
        assert_eq!(engine.page_count(doc), 1);
        let p = engine.load_page(doc, 0).unwrap();
        let t = engine.load_text(p);
        assert_eq!(engine.char_count(t), 2);
        assert_eq!(engine.char_at(t, 0), 'h' as u32);
        assert_eq!(engine.char_at(t, 1), 'i' as u32);
    }

    #[test]
    fn test_password_mismatch() {
        let engine = FakeEngine::new(
            FakeDocument::new()
                .with_page(FakePage::new(600.0, 800.0))
                .with_password("secret"),
        );
        assert_eq!(
            engine.open_document(source(2048), None).unwrap_err(),
            OpenError::BadPassword
        );
        assert_eq!(
            engine.open_document(source(2048), Some("wrong")).unwrap_err(),
            OpenError::BadPassword
        );
        assert!(engine.open_document(source(2048), Some("secret")).is_ok());
    }

    #[test]
    fn test_device_transform_is_y_flip() {
        let engine = FakeEngine::new(FakeDocument::new().with_page(FakePage::new(600.0, 800.0)));
        let doc = engine.open_document(source(2048), None).unwrap();
        let p = engine.load_page(doc, 0).unwrap();
        let d = engine.page_to_device_point(p, PointF::new(100.0, 700.0));
        assert_eq!(d, Point::new(100, 100));
        let back = engine.device_to_page_point(p, d);
        assert_eq!(back, PointF::new(100.0, 700.0));
    }

    #[test]
    fn test_checkbox_click_toggles_and_invalidates() {
        struct CountSink(Cell<u32>);
        impl FormEventSink for CountSink {
            fn invalidate(&self, _page: PageHandle, _rect: RectF) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut page = FakePage::new(600.0, 800.0);
        page.add_widget(FakeWidget::new(
            WidgetKind::CheckBox,
            RectF::new(10.0, 10.0, 30.0, 30.0),
        ));
        let engine = FakeEngine::new(FakeDocument::new().with_page(page));
        let doc = engine.open_document(source(2048), None).unwrap();
        let sink = Rc::new(CountSink(Cell::new(0)));
        let form = engine.init_form_environment(doc, sink.clone());
        let p = engine.load_page(doc, 0).unwrap();

        let annot = engine.widget_at_point(form, p, PointF::new(20.0, 20.0)).unwrap();
        assert!(!engine.is_checked(form, annot));
        engine.click(form, p, PointF::new(20.0, 20.0));
        assert!(engine.is_checked(form, annot));
        assert_eq!(sink.0.get(), 1);
    }
}
