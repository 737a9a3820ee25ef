//! A bounded in-memory mirror of a response body, fed chunk-by-chunk as it
//! streams off the wire (§4.9 `max_in_memory_response_bytes`, §9 Design
//! Notes "callback-based header/body delivery"). This cap bounds only the
//! *parser input* — the copy `recurse` hands to the HTML/CSS/feed/sitemap
//! parsers — not the on-disk file, which `worker.rs` writes straight to a
//! `std::fs::File` chunk by chunk regardless of size. A response larger
//! than the cap is still saved to disk in full; the sink just silently
//! stops mirroring past `cap` rather than erroring, since the disk write
//! that matters has already succeeded by the time this would trip.
//!
//! `pipeline.rs` never touches the filesystem, and `filename::SaveWriter`
//! still owns the write — see `DESIGN.md` for why that split is kept rather
//! than folding disk I/O into the sink as well.

use bytes::Bytes;

pub trait DatumSink {
    fn on_header(&mut self, content_length: Option<u64>);
    fn on_chunk(&mut self, chunk: &[u8]);
    fn finish(self) -> Bytes;
}

/// The only `DatumSink` this crate needs today: buffer in memory up to
/// `cap`, truncating (not erroring) once the running total would exceed it.
pub struct BufferingSink {
    buf: Vec<u8>,
    cap: usize,
}

impl BufferingSink {
    pub fn new(cap: usize) -> Self {
        BufferingSink { buf: Vec::new(), cap }
    }
}

impl DatumSink for BufferingSink {
    fn on_header(&mut self, content_length: Option<u64>) {
        if let Some(len) = content_length {
            self.buf.reserve(usize::try_from(len).unwrap_or(usize::MAX).min(self.cap));
        }
    }

    fn on_chunk(&mut self, chunk: &[u8]) {
        if self.buf.len() >= self.cap {
            return;
        }
        let room = self.cap - self.buf.len();
        let take = room.min(chunk.len());
        self.buf.extend_from_slice(&chunk[..take]);
    }

    fn finish(self) -> Bytes {
        Bytes::from(self.buf)
    }
}
