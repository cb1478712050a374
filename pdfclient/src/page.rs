//! A single document page: text, search, selection, links, invalidation.
//!
//! The page's character stream is index-addressable over `[0, char_count())`;
//! each index yields one codepoint plus a raw page-space box and baseline
//! origin from the engine. One reserved codepoint
//! ([`HYPHEN_LINE_BREAK`](crate::normalize::HYPHEN_LINE_BREAK)) stands for
//! a line-wrap hyphenation, "hyphen + line break" as a unit, and expands
//! back to `-\r\n` when text is extracted.
//!
//! The text layer and the printable range are computed once on first text
//! access and cached. Everything a caller gets back (match rectangles,
//! boundary points, link and widget rectangles) is in device space.

use std::cell::Cell;
use std::rc::Rc;

use once_cell::unsync::OnceCell;
use serde::Serialize;
use tracing::debug;

use pdfclient_engine::{
    AnnotationKind, DocumentHandle, LinkTarget, PageHandle, PdfEngine, Point, Rect, RectF,
    TextHandle, WidgetKind,
};

use crate::form::{FormFiller, FormWidgetInfo};
use crate::link::{GotoLink, GotoLinkDest, WebLink};
use crate::normalize::{
    fold_char, fold_query, is_line_break, is_word_break, HYPHEN_EXPANSION, HYPHEN_LINE_BREAK,
};
use crate::selection::{word_bounds, SelectionBoundary};

/// A half-open range of character indices, `start..stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextRange {
    pub start: usize,
    pub stop: usize,
}

impl TextRange {
    /// Create a new range.
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    /// Number of characters covered.
    pub fn len(&self) -> usize {
        self.stop.saturating_sub(self.start)
    }

    /// Whether the range covers nothing.
    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }
}

/// Bounding rectangles for a set of search matches.
///
/// A match that crosses a line break contributes more than one rectangle,
/// so matches map to rectangles through `match_to_rect`: match `i` owns
/// the rectangles from `match_to_rect[i]` up to `match_to_rect[i + 1]`
/// (or the end for the last match). Matches that produced no rectangle at
/// all are dropped and do not count.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchRects {
    /// Device-space rectangles for all matches, flattened.
    pub rects: Vec<Rect>,
    /// Index of the first rectangle of each match.
    pub match_to_rect: Vec<usize>,
}

impl MatchRects {
    /// Number of matches that produced rectangles.
    pub fn match_count(&self) -> usize {
        self.match_to_rect.len()
    }

    /// Rectangles of match `index`.
    pub fn rects_for_match(&self, index: usize) -> &[Rect] {
        let start = self.match_to_rect[index];
        let stop = self
            .match_to_rect
            .get(index + 1)
            .copied()
            .unwrap_or(self.rects.len());
        &self.rects[start..stop]
    }
}

struct TextLayer {
    handle: TextHandle,
    /// Printable range `first..stop`: leading/trailing word breaks trimmed.
    first: usize,
    stop: usize,
}

/// One page of an open document.
///
/// A page returned without retention is a disposable value object; a
/// retained page is cached by its document, participates in form filling,
/// and can receive invalidation. The page handle is owned by the engine
/// document and must not be used after that document is gone.
pub struct Page {
    engine: Rc<dyn PdfEngine>,
    doc: DocumentHandle,
    handle: PageHandle,
    index: usize,
    form: Rc<FormFiller>,
    text: OnceCell<TextLayer>,
    /// Coalesced region needing redraw; empty or positive-area.
    invalid: Cell<Rect>,
}

impl Page {
    pub(crate) fn new(
        engine: Rc<dyn PdfEngine>,
        doc: DocumentHandle,
        handle: PageHandle,
        index: usize,
        form: Rc<FormFiller>,
    ) -> Self {
        Self {
            engine,
            doc,
            handle,
            index,
            form,
            text: OnceCell::new(),
            invalid: Cell::new(Rect::EMPTY),
        }
    }

    pub(crate) fn handle(&self) -> PageHandle {
        self.handle
    }

    /// Zero-based page number.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Page width in page units.
    pub fn width(&self) -> f32 {
        self.engine.page_size(self.handle).0
    }

    /// Page height in page units.
    pub fn height(&self) -> f32 {
        self.engine.page_size(self.handle).1
    }

    /// Page bounds in device space.
    fn device_bounds(&self) -> Rect {
        let (w, h) = self.engine.page_size(self.handle);
        Rect::new(0, 0, w.round() as i32, h.round() as i32)
    }

    fn layer(&self) -> &TextLayer {
        self.text.get_or_init(|| {
            let handle = self.engine.load_text(self.handle);
            let count = self.engine.char_count(handle);
            let mut first = 0;
            while first < count && is_word_break(self.char_via(handle, first)) {
                first += 1;
            }
            let mut stop = count;
            while stop > first && is_word_break(self.char_via(handle, stop - 1)) {
                stop -= 1;
            }
            TextLayer {
                handle,
                first,
                stop,
            }
        })
    }

    fn char_via(&self, handle: TextHandle, index: usize) -> char {
        char::from_u32(self.engine.char_at(handle, index)).unwrap_or('\u{FFFD}')
    }

    fn raw_char(&self, index: usize) -> char {
        self.char_via(self.layer().handle, index)
    }

    fn device_box(&self, index: usize) -> Rect {
        let b = self.engine.char_box(self.layer().handle, index);
        self.engine.page_to_device_rect(self.handle, b)
    }

    fn device_origin(&self, index: usize) -> Point {
        let o = self.engine.char_origin(self.layer().handle, index);
        self.engine.page_to_device_point(self.handle, o)
    }

    fn chars_vec(&self) -> Vec<char> {
        (0..self.char_count()).map(|i| self.raw_char(i)).collect()
    }

    /// Number of characters in the page's character stream.
    pub fn char_count(&self) -> usize {
        self.engine.char_count(self.layer().handle)
    }

    // --- text extraction ---

    /// Whole-page text over the printable range, UTF-8, with hyphenation
    /// markers expanded to `-\r\n`.
    pub fn text(&self) -> String {
        let layer = self.layer();
        self.text_range(layer.first, layer.stop - layer.first)
    }

    /// Text of `count` characters starting at `start`, with hyphenation
    /// markers expanded. The range is clamped to the character stream.
    pub fn text_range(&self, start: usize, count: usize) -> String {
        let n = self.char_count();
        let start = start.min(n);
        let stop = start.saturating_add(count).min(n);
        let mut out = String::with_capacity(stop - start);
        for i in start..stop {
            let c = self.raw_char(i);
            if c == HYPHEN_LINE_BREAK {
                out.push_str(HYPHEN_EXPANSION);
            } else {
                out.push(c);
            }
        }
        out
    }

    // --- search ---

    /// Find every non-overlapping occurrence of `query` in the printable
    /// range, matching case- and accent-insensitively and crossing
    /// hyphenated line wraps. An empty query yields no matches.
    pub fn find_matches(&self, query: &str) -> Vec<TextRange> {
        let query = fold_query(query);
        if query.is_empty() {
            debug!("empty search query yields no matches");
            return Vec::new();
        }
        let layer = self.layer();
        let (first, stop) = (layer.first, layer.stop);
        let raw: Vec<char> = (first..stop).map(|i| self.raw_char(i)).collect();
        let folded: Vec<char> = raw.iter().map(|&c| fold_char(c)).collect();

        let mut matches = Vec::new();
        let mut i = 0;
        while i < raw.len() {
            match match_at(&raw, &folded, i, &query) {
                Some(end) => {
                    matches.push(TextRange::new(first + i, first + end));
                    // Matches never overlap: resume after the match end.
                    i = end;
                }
                None => i += 1,
            }
        }
        matches
    }

    /// Bounding rectangles for every match of `query`.
    pub fn bounds_of_matches(&self, query: &str) -> MatchRects {
        let mut out = MatchRects::default();
        for m in self.find_matches(query) {
            let rects = self.text_bounds(m.start, m.stop);
            if rects.is_empty() {
                continue;
            }
            out.match_to_rect.push(out.rects.len());
            out.rects.extend(rects);
        }
        out
    }

    /// Device-space bounding rectangles of the characters in
    /// `start..stop`: one rectangle per visual line, flushed at every
    /// line-break codepoint crossed. Degenerate character boxes contribute
    /// nothing.
    pub fn text_bounds(&self, start: usize, stop: usize) -> Vec<Rect> {
        let n = self.char_count();
        let start = start.min(n);
        let stop = stop.min(n);
        let mut out = Vec::new();
        let mut run = RectF::EMPTY;
        for i in start..stop {
            let c = self.raw_char(i);
            if is_line_break(c) {
                if !run.is_empty() {
                    out.push(run);
                    run = RectF::EMPTY;
                }
                continue;
            }
            let b = self.engine.char_box(self.layer().handle, i);
            if b.is_empty() {
                continue;
            }
            run = run.union(b);
        }
        if !run.is_empty() {
            out.push(run);
        }
        out.into_iter()
            .map(|r| self.engine.page_to_device_rect(self.handle, r))
            .filter(|r| !r.is_empty())
            .collect()
    }

    // --- selection ---

    /// Boundary at stream position `index`, aligned to the leading edge of
    /// the character at `index`, or the trailing edge of the previous
    /// character when `index` sits on a word break or at end of text. The
    /// vertical coordinate is the anchor character's baseline. In a
    /// right-to-left word the leading/trailing edges swap physical sides.
    pub fn boundary_at_index(&self, index: usize) -> SelectionBoundary {
        let chars = self.chars_vec();
        self.boundary_at_index_in(&chars, index)
    }

    fn boundary_at_index_in(&self, chars: &[char], index: usize) -> SelectionBoundary {
        let n = chars.len();
        let index = index.min(n);
        if n == 0 {
            return SelectionBoundary {
                index: Some(0),
                point: Point::default(),
                is_rtl: false,
            };
        }
        let (anchor, leading) = if index >= n || is_word_break(chars[index]) {
            if index == 0 {
                (0, true)
            } else {
                (index - 1, false)
            }
        } else {
            (index, true)
        };
        let is_rtl = self.word_is_rtl(chars, anchor);
        let bbox = self.device_box(anchor);
        // "Leading" is the left edge only in a left-to-right word.
        let x = if leading != is_rtl { bbox.left } else { bbox.right };
        let y = self.device_origin(anchor).y;
        SelectionBoundary {
            index: Some(index),
            point: Point::new(x, y),
            is_rtl,
        }
    }

    /// Directionality of the word containing `anchor`, inferred by
    /// comparing the horizontal centers of the word's first and last
    /// characters. Only meaningful for words longer than one character;
    /// anything else defaults to left-to-right.
    fn word_is_rtl(&self, chars: &[char], anchor: usize) -> bool {
        match word_bounds(chars, anchor) {
            Some((start, stop)) if stop - start > 1 => {
                let first = self.device_box(start).center().x;
                let last = self.device_box(stop - 1).center().x;
                last < first
            }
            _ => false,
        }
    }

    /// Boundary nearest to a device-space point: a linear scan over every
    /// boundary position adjoining a word character, minimizing squared
    /// distance.
    pub fn boundary_at_point(&self, point: Point) -> SelectionBoundary {
        let chars = self.chars_vec();
        let n = chars.len();
        let mut best: Option<(i64, SelectionBoundary)> = None;
        for i in 0..=n {
            let adjoins_word = (i < n && !is_word_break(chars[i]))
                || (i > 0 && !is_word_break(chars[i - 1]));
            if !adjoins_word {
                continue;
            }
            let b = self.boundary_at_index_in(&chars, i);
            let d = b.point.distance_squared(point);
            if best.as_ref().map_or(true, |(bd, _)| d < *bd) {
                best = Some((d, b));
            }
        }
        match best {
            Some((_, b)) => b,
            None => SelectionBoundary::from_point(point),
        }
    }

    /// Select the word under a device-space point. Fails (returns `None`)
    /// when the nearest character is a word break: there is no word
    /// there. On success the boundaries span the enclosing word.
    pub fn select_word_at(&self, point: Point) -> Option<(SelectionBoundary, SelectionBoundary)> {
        let chars = self.chars_vec();
        if chars.is_empty() {
            return None;
        }
        let nearest = (0..chars.len())
            .min_by_key(|&i| self.device_box(i).center().distance_squared(point))?;
        let (start, stop) = word_bounds(&chars, nearest)?;
        Some((
            self.boundary_at_index_in(&chars, start),
            self.boundary_at_index_in(&chars, stop),
        ))
    }

    /// Make a boundary's index and point consistent. An index, when
    /// present, is authoritative: it is clamped to the printable range and
    /// re-pointed. A point-only boundary resolves to the nearest boundary
    /// position.
    pub fn constrain_boundary(&self, boundary: SelectionBoundary) -> SelectionBoundary {
        match boundary.index {
            Some(index) => {
                let layer = self.layer();
                let clamped = index.clamp(layer.first, layer.stop);
                self.boundary_at_index(clamped)
            }
            None => self.boundary_at_point(boundary.point),
        }
    }

    // --- links ---

    /// Links to external URIs, with device-space rectangles.
    pub fn web_links(&self) -> Vec<WebLink> {
        let mut out = Vec::new();
        for i in 0..self.engine.annotation_count(self.handle) {
            let annot = self.engine.annotation_at(self.handle, i);
            if self.engine.annotation_kind(annot) != AnnotationKind::Link {
                continue;
            }
            if let Some(LinkTarget::Uri(url)) = self.engine.link_target(self.doc, annot) {
                let rects = self.link_rects(annot);
                if !rects.is_empty() {
                    out.push(WebLink { rects, url });
                }
            }
        }
        out
    }

    /// Links to destinations inside this document.
    pub fn goto_links(&self) -> Vec<GotoLink> {
        let mut out = Vec::new();
        for i in 0..self.engine.annotation_count(self.handle) {
            let annot = self.engine.annotation_at(self.handle, i);
            if self.engine.annotation_kind(annot) != AnnotationKind::Link {
                continue;
            }
            if let Some(LinkTarget::Goto {
                page_index,
                x,
                y,
                zoom,
            }) = self.engine.link_target(self.doc, annot)
            {
                let rects = self.link_rects(annot);
                if !rects.is_empty() {
                    out.push(GotoLink {
                        rects,
                        dest: GotoLinkDest {
                            page_index,
                            x,
                            y,
                            zoom,
                        },
                    });
                }
            }
        }
        out
    }

    fn link_rects(&self, annot: pdfclient_engine::AnnotationHandle) -> Vec<Rect> {
        self.engine
            .annotation_rects(annot)
            .into_iter()
            .map(|r| self.engine.page_to_device_rect(self.handle, r))
            .filter(|r| !r.is_empty())
            .collect()
    }

    // --- invalidation ---

    /// Fold a page-space area reported by the engine into the accumulator.
    /// Degenerate and negative rectangles are legitimate no-op callbacks
    /// and are silently dropped.
    pub(crate) fn accumulate_invalid_rect(&self, area: RectF) {
        if area.is_empty() || area.left < 0.0 || area.bottom < 0.0 {
            debug!(?area, "dropping degenerate invalidation rect");
            return;
        }
        let device = self.engine.page_to_device_rect(self.handle, area);
        let clipped = device.intersect(self.device_bounds());
        if clipped.is_empty() {
            return;
        }
        self.invalid.set(self.invalid.get().union(clipped));
    }

    /// Whether any area is waiting to be redrawn.
    pub fn has_invalid_rect(&self) -> bool {
        !self.invalid.get().is_empty()
    }

    /// Drain the accumulated redraw area. Consuming an empty accumulator
    /// yields [`Rect::EMPTY`], not an error.
    pub fn consume_invalid_rect(&self) -> Rect {
        self.invalid.replace(Rect::EMPTY)
    }

    // --- forms (delegated to the document's FormFiller) ---

    /// Snapshot the form widget under a device-space point.
    pub fn form_widget_info_at_point(&self, point: Point) -> FormWidgetInfo {
        self.form.widget_info_at_point(self, point)
    }

    /// Snapshot the form widget at an annotation index.
    pub fn form_widget_info_at_index(&self, index: usize) -> FormWidgetInfo {
        self.form.widget_info_at_index(self, index)
    }

    /// Snapshot every supported widget on the page, optionally filtered to
    /// the given kinds (an empty filter means all).
    pub fn form_widget_infos(&self, kinds: &[WidgetKind]) -> Vec<FormWidgetInfo> {
        self.form.widget_infos(self, kinds)
    }

    /// Click the click-action widget under a device-space point. A no-op
    /// returning `false` unless the widget is a writable click-action
    /// widget.
    pub fn click_on_point(&self, point: Point) -> bool {
        self.form.click_on_point(self, point)
    }

    /// Replace the text of the editable text field at `index`
    /// (select-all-then-replace). A no-op returning `false` unless the
    /// field is editable text and not read-only.
    pub fn set_form_field_text(&self, index: usize, text: &str) -> bool {
        self.form.set_text(self, index, text)
    }

    /// Replace the selection of the choice widget at `index`. The whole
    /// call is rejected, with nothing mutated, if any requested index is out
    /// of range, a combobox is not given exactly one index, or a
    /// single-select listbox is given more than one.
    pub fn set_choice_selection(&self, index: usize, selected: &[usize]) -> bool {
        self.form.set_choice_selection(self, index, selected)
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        if let Some(layer) = self.text.get() {
            self.engine.close_text(layer.handle);
        }
        self.engine.close_page(self.handle);
    }
}

/// Try to match `query` against the folded page text at `start`.
/// Returns the exclusive end index on success.
///
/// Page and query cursors advance together on equal search keys. The page
/// cursor alone may cross a skippable codepoint (the hyphenation marker,
/// or whitespace right after matched whitespace) once the query cursor is
/// past its first character and enough page text remains to finish the
/// query. Anything else is a mismatch.
fn match_at(raw: &[char], folded: &[char], start: usize, query: &[char]) -> Option<usize> {
    let mut pi = start;
    let mut qi = 0;
    while qi < query.len() {
        if pi >= raw.len() {
            return None;
        }
        if folded[pi] == query[qi] {
            pi += 1;
            qi += 1;
            continue;
        }
        let skippable =
            raw[pi] == HYPHEN_LINE_BREAK || (folded[pi] == ' ' && qi > 0 && query[qi - 1] == ' ');
        if skippable && qi > 0 {
            if raw.len() - (pi + 1) < query.len() - qi {
                return None;
            }
            pi += 1;
            continue;
        }
        return None;
    }
    Some(pi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prep(s: &str) -> (Vec<char>, Vec<char>) {
        let raw: Vec<char> = s.chars().collect();
        let folded = raw.iter().map(|&c| fold_char(c)).collect();
        (raw, folded)
    }

    #[test]
    fn test_match_at_plain() {
        let (raw, folded) = prep("hello world");
        let q = fold_query("World");
        assert_eq!(match_at(&raw, &folded, 6, &q), Some(11));
        assert_eq!(match_at(&raw, &folded, 0, &q), None);
    }

    #[test]
    fn test_match_at_crosses_hyphen_marker() {
        let (raw, folded) = prep("sup\u{FFFE}port");
        let q = fold_query("support");
        assert_eq!(match_at(&raw, &folded, 0, &q), Some(8));
    }

    #[test]
    fn test_match_at_rejects_misplaced_hyphen() {
        let (raw, folded) = prep("sup\u{FFFE}port");
        let q = fold_query("s-upport");
        assert_eq!(match_at(&raw, &folded, 0, &q), None);
    }

    #[test]
    fn test_match_at_skips_redundant_whitespace() {
        let (raw, folded) = prep("foo  \t bar");
        let q = fold_query("foo bar");
        assert_eq!(match_at(&raw, &folded, 0, &q), Some(10));
    }

    #[test]
    fn test_match_at_no_skip_before_first_query_char() {
        let (raw, folded) = prep("\u{FFFE}abc");
        let q = fold_query("abc");
        assert_eq!(match_at(&raw, &folded, 0, &q), None);
        assert_eq!(match_at(&raw, &folded, 1, &q), Some(4));
    }

    #[test]
    fn test_match_at_fails_early_when_page_too_short() {
        let (raw, folded) = prep("ab\u{FFFE}");
        let q = fold_query("abc");
        assert_eq!(match_at(&raw, &folded, 0, &q), None);
    }

    #[test]
    fn test_text_range_type() {
        let r = TextRange::new(3, 7);
        assert_eq!(r.len(), 4);
        assert!(!r.is_empty());
        assert!(TextRange::new(5, 5).is_empty());
    }
}
