//! Document loading and lifecycle.
//!
//! [`Document::load`] is the single entry into the load state machine.
//! Loading is a cooperative poll: when a progressive byte source does not
//! yet hold enough data, the call returns
//! [`LoadResult::NeedMoreData`] together with the byte ranges the engine
//! wants next, and the caller is expected to append bytes and call `load`
//! again. There is no internal retry loop, timeout, or cancellation.
//!
//! A loaded document owns its byte source, its form environment, and its
//! *retained* pages. Retained pages are cached across calls, participate
//! in form filling, and are routable for invalidation; non-retained pages
//! are disposable value objects recreated on every request and can receive
//! neither.
//!
//! Everything here is synchronous and single-threaded; a caller using one
//! document from several threads must serialize access externally.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use pdfclient_engine::{
    Availability, AvailabilityHandle, BlockWriter, ByteRange, ByteSource, DocumentHandle,
    FormType, Linearization, OpenError, PageHandle, PdfEngine, SaveFlags,
};

use crate::error::{PdfError, Result};
use crate::form::FormFiller;
use crate::page::Page;
use crate::progressive::SegmentCollector;

/// Outcome of one [`Document::load`] attempt.
///
/// Failure variants hand the byte source back to the caller, unless the
/// load was invoked with `close_on_failure`, in which case the source is
/// dropped and the variant carries `None`.
pub enum LoadResult {
    /// The document opened.
    Loaded(Document),
    /// Not enough bytes yet; `requested` lists the ranges the engine wants
    /// prioritized (typically the file header and footer). Append bytes
    /// and call [`Document::load`] again.
    NeedMoreData {
        source: Option<Rc<RefCell<dyn ByteSource>>>,
        requested: Vec<ByteRange>,
    },
    /// The document is encrypted and the password was missing or wrong;
    /// retry with a (different) password.
    RequiresPassword {
        source: Option<Rc<RefCell<dyn ByteSource>>>,
    },
    /// The bytes are not a usable document.
    PdfError {
        source: Option<Rc<RefCell<dyn ByteSource>>>,
    },
    /// The byte source itself failed.
    FileError {
        source: Option<Rc<RefCell<dyn ByteSource>>>,
    },
}

impl LoadResult {
    /// Whether the document opened.
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadResult::Loaded(_))
    }

    /// Unwrap the loaded document.
    ///
    /// # Panics
    ///
    /// Panics if the load did not succeed.
    pub fn unwrap_loaded(self) -> Document {
        match self {
            LoadResult::Loaded(doc) => doc,
            _ => panic!("load did not produce a document"),
        }
    }
}

/// Retained pages plus the reverse lookup used to route invalidation.
///
/// Invariant: a retained page appears in both maps or in neither. Only
/// retained pages are routable: a non-retained page has no stable
/// identity the engine could report back against.
#[derive(Default)]
pub(crate) struct PageRegistry {
    retained: FxHashMap<usize, Rc<Page>>,
    by_handle: FxHashMap<PageHandle, usize>,
}

impl PageRegistry {
    pub(crate) fn page_for_handle(&self, handle: PageHandle) -> Option<Rc<Page>> {
        self.by_handle
            .get(&handle)
            .and_then(|index| self.retained.get(index))
            .cloned()
    }
}

/// An open document.
///
/// Dropping the document tears down form filling for every retained page,
/// exits the form environment, and closes the engine document. Pages must
/// not be used after their document is gone.
pub struct Document {
    engine: Rc<dyn PdfEngine>,
    handle: DocumentHandle,
    /// Owned once the load succeeds - kept alive because the engine keeps
    /// reading from it for progressively loaded documents.
    _source: Rc<RefCell<dyn ByteSource>>,
    avail: Option<AvailabilityHandle>,
    form: Rc<FormFiller>,
    registry: Rc<RefCell<PageRegistry>>,
    linearized: bool,
    password_protected: bool,
}

impl Document {
    /// Attempt to open a document from `source`.
    ///
    /// The availability of the bytes is checked first: a progressive
    /// source that cannot satisfy the engine yet produces
    /// [`LoadResult::NeedMoreData`]. A linearized document is opened
    /// through the engine's fast-path opener, anything else through the
    /// generic one. On failure the source is handed back unless
    /// `close_on_failure` is set.
    ///
    /// A password only marks the document password-protected when it is
    /// non-empty; an empty password is treated exactly like no password.
    pub fn load(
        engine: Rc<dyn PdfEngine>,
        source: Rc<RefCell<dyn ByteSource>>,
        password: Option<&str>,
        close_on_failure: bool,
    ) -> LoadResult {
        let give_back = |source: Rc<RefCell<dyn ByteSource>>| {
            if close_on_failure {
                None
            } else {
                Some(source)
            }
        };

        let avail = engine.create_availability(Rc::clone(&source));

        if !source.borrow().is_complete() {
            let mut hints = SegmentCollector::new();
            match engine.is_document_available(avail, &mut hints) {
                Availability::Available => {}
                Availability::NotAvailable => {
                    debug!("load deferred: more data needed");
                    engine.destroy_availability(avail);
                    return LoadResult::NeedMoreData {
                        source: give_back(source),
                        requested: hints.into_segments(),
                    };
                }
                Availability::Error => {
                    warn!("availability check failed");
                    engine.destroy_availability(avail);
                    return LoadResult::FileError {
                        source: give_back(source),
                    };
                }
            }
        }

        let linearized = engine.linearization(avail) == Linearization::Linearized;
        let opened = if linearized {
            engine.open_available_document(avail, password)
        } else {
            engine.open_document(Rc::clone(&source), password)
        };

        let handle = match opened {
            Ok(handle) => handle,
            Err(err) => {
                engine.destroy_availability(avail);
                debug!(?err, "document open failed");
                return match err {
                    OpenError::BadPassword => LoadResult::RequiresPassword {
                        source: give_back(source),
                    },
                    OpenError::File => LoadResult::FileError {
                        source: give_back(source),
                    },
                    _ => LoadResult::PdfError {
                        source: give_back(source),
                    },
                };
            }
        };

        let password_protected = password.is_some_and(|p| !p.is_empty());
        debug!(linearized, password_protected, "document loaded");

        let registry = Rc::new(RefCell::new(PageRegistry::default()));
        let form = Rc::new(FormFiller::new(
            Rc::clone(&engine),
            handle,
            Rc::clone(&registry),
        ));
        LoadResult::Loaded(Document {
            engine,
            handle,
            _source: source,
            avail: Some(avail),
            form,
            registry,
            linearized,
            password_protected,
        })
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.engine.page_count(self.handle)
    }

    /// Whether the document reported itself linearized at load time.
    pub fn is_linearized(&self) -> bool {
        self.linearized
    }

    /// Whether a non-empty password was used to open the document.
    pub fn is_password_protected(&self) -> bool {
        self.password_protected
    }

    /// Kind of interactive form the document carries.
    pub fn form_type(&self) -> FormType {
        self.engine.form_type(self.handle)
    }

    /// Whether enough bytes have arrived to load the given page of a
    /// progressively loading document.
    pub fn is_page_available(&self, index: usize) -> bool {
        match self.avail {
            Some(avail) => {
                let mut hints = SegmentCollector::new();
                self.engine.is_page_available(avail, index, &mut hints)
                    == Availability::Available
            }
            None => true,
        }
    }

    /// Get a page.
    ///
    /// With `retain` the page is cached: it participates in form filling,
    /// can receive invalidation, and every later request for the same page
    /// number (retaining or not) returns the same instance until
    /// [`release_retained_page`](Document::release_retained_page). Without
    /// retention each call builds a distinct disposable instance.
    pub fn page(&self, index: usize, retain: bool) -> Result<Rc<Page>> {
        if let Some(page) = self.registry.borrow().retained.get(&index) {
            return Ok(Rc::clone(page));
        }
        let count = self.page_count();
        if index >= count {
            return Err(PdfError::PageIndexOutOfBounds { index, count });
        }
        let handle = self
            .engine
            .load_page(self.handle, index)
            .ok_or(PdfError::PageLoadFailed { index })?;
        let page = Rc::new(Page::new(
            Rc::clone(&self.engine),
            self.handle,
            handle,
            index,
            Rc::clone(&self.form),
        ));
        if retain {
            self.form.attach_page(handle);
            let mut registry = self.registry.borrow_mut();
            registry.retained.insert(index, Rc::clone(&page));
            registry.by_handle.insert(handle, index);
        }
        Ok(page)
    }

    /// Drop a retained page from the cache, ending its form-filling
    /// participation. A no-op when the page is not retained.
    pub fn release_retained_page(&self, index: usize) {
        let page = {
            let mut registry = self.registry.borrow_mut();
            let page = registry.retained.remove(&index);
            if let Some(page) = &page {
                registry.by_handle.remove(&page.handle());
            }
            page
        };
        if let Some(page) = page {
            self.form.detach_page(page.handle());
        }
    }

    /// Save the document through `writer`.
    pub fn save_as(&self, writer: &mut dyn BlockWriter) -> Result<()> {
        self.save_with_flags(writer, SaveFlags::new())
    }

    /// Save a copy of the document with its security stripped.
    pub fn clone_without_security(&self, writer: &mut dyn BlockWriter) -> Result<()> {
        self.save_with_flags(writer, SaveFlags::new().remove_security())
    }

    fn save_with_flags(&self, writer: &mut dyn BlockWriter, flags: SaveFlags) -> Result<()> {
        if self.engine.save_document(self.handle, writer, flags) {
            Ok(())
        } else {
            Err(PdfError::SaveFailed {
                reason: "engine rejected the save".to_string(),
            })
        }
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        // Retained pages stop form filling first, then the form
        // environment goes, then the engine document. Page handles close
        // in Page::drop as the registry's references die.
        let pages: Vec<Rc<Page>> = {
            let mut registry = self.registry.borrow_mut();
            registry.by_handle.clear();
            registry.retained.drain().map(|(_, p)| p).collect()
        };
        for page in &pages {
            self.form.detach_page(page.handle());
        }
        drop(pages);
        self.form.teardown();
        if let Some(avail) = self.avail.take() {
            self.engine.destroy_availability(avail);
        }
        self.engine.close_document(self.handle);
    }
}
