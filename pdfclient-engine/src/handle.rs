//! Typed handles for engine-side objects.
//!
//! The engine owns every object these handles name. A handle is only valid
//! while its owner is alive: a [`PageHandle`] dies with the document that
//! loaded it, a [`TextHandle`] with its page, and so on. Engine
//! implementations are expected to check validity at use time rather than
//! trust the caller (the scripted test engine panics on a stale handle).

macro_rules! handle_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u64);
    };
}

handle_type! {
    /// An open document.
    DocumentHandle
}

handle_type! {
    /// A loaded page. Valid until the page is closed or its document dies.
    PageHandle
}

handle_type! {
    /// A page's text layer.
    TextHandle
}

handle_type! {
    /// An annotation on a page (link or form widget).
    AnnotationHandle
}

handle_type! {
    /// An interactive-form environment bound to one document.
    FormHandle
}

handle_type! {
    /// A progressive-availability checker bound to one byte source.
    AvailabilityHandle
}
