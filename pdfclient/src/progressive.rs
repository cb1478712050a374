//! Byte-source adapters for progressive loading and saving.
//!
//! [`ProgressiveReader`] backs a document that is still downloading: the
//! caller declares the final size up front and appends bytes as they
//! arrive, typically between [`Document::load`](crate::Document::load)
//! attempts. [`FullReader`] is the everyday case of a fully materialized
//! document. On the way out, [`VecWriter`] and [`FileWriter`] receive the
//! blocks of a saved document.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use pdfclient::{ByteSource, ProgressiveReader};
//!
//! let source = Rc::new(RefCell::new(ProgressiveReader::new(1_000_000)));
//! source.borrow_mut().push(&[0u8; 4096]);
//! assert!(!source.borrow().is_complete());
//! ```

use std::fs::File;
use std::io::Write;

use tracing::debug;

use pdfclient_engine::{BlockWriter, ByteRange, ByteSource, DownloadHints};

/// Growable in-memory byte source for a document arriving over time.
///
/// Bytes are appended in order; only the contiguous prefix received so far
/// is readable.
pub struct ProgressiveReader {
    buf: Vec<u8>,
    total: u64,
}

impl ProgressiveReader {
    /// Create an empty source that will eventually hold `total` bytes.
    pub fn new(total: u64) -> Self {
        Self {
            buf: Vec::new(),
            total,
        }
    }

    /// Append the next chunk of the document.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes received so far.
    pub fn available(&self) -> u64 {
        self.buf.len() as u64
    }
}

impl ByteSource for ProgressiveReader {
    fn len(&self) -> u64 {
        self.total
    }

    fn is_complete(&self) -> bool {
        self.available() >= self.total
    }

    fn is_range_available(&self, offset: u64, len: u64) -> bool {
        offset.saturating_add(len) <= self.available()
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> bool {
        if !self.is_range_available(offset, buf.len() as u64) {
            return false;
        }
        let start = offset as usize;
        buf.copy_from_slice(&self.buf[start..start + buf.len()]);
        true
    }
}

/// A fully materialized in-memory byte source.
pub struct FullReader {
    buf: Vec<u8>,
}

impl FullReader {
    /// Wrap a complete document.
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf }
    }
}

impl ByteSource for FullReader {
    fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    fn is_complete(&self) -> bool {
        true
    }

    fn is_range_available(&self, offset: u64, len: u64) -> bool {
        offset.saturating_add(len) <= self.len()
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> bool {
        if !self.is_range_available(offset, buf.len() as u64) {
            return false;
        }
        let start = offset as usize;
        buf.copy_from_slice(&self.buf[start..start + buf.len()]);
        true
    }
}

/// Records the byte ranges the engine asks for during availability checks,
/// deduplicating repeats.
#[derive(Default)]
pub struct SegmentCollector {
    segments: Vec<ByteRange>,
}

impl SegmentCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected ranges, in request order.
    pub fn into_segments(self) -> Vec<ByteRange> {
        self.segments
    }
}

impl DownloadHints for SegmentCollector {
    fn add_segment(&mut self, offset: u64, len: u64) {
        if len == 0 {
            return;
        }
        let range = ByteRange::new(offset, len);
        if self.segments.contains(&range) {
            return;
        }
        debug!(offset, len, "engine requested byte range");
        self.segments.push(range);
    }
}

/// Collects saved-document blocks into memory.
#[derive(Default)]
pub struct VecWriter {
    buf: Vec<u8>,
}

impl VecWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bytes written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer, yielding the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl BlockWriter for VecWriter {
    fn write_block(&mut self, data: &[u8]) -> bool {
        self.buf.extend_from_slice(data);
        true
    }
}

/// Streams saved-document blocks to a file.
pub struct FileWriter {
    file: File,
}

impl FileWriter {
    /// Write into `file`, which should be positioned at the start.
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl BlockWriter for FileWriter {
    fn write_block(&mut self, data: &[u8]) -> bool {
        self.file.write_all(data).is_ok()
    }
}
