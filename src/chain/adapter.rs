//! Decoder handles shared between pipeline clones.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::SourceError;
use crate::geometry::PixelRegion;
use crate::source::{ImageSource, PixelBuffer, SourceInfo};

use super::AdapterId;

/// A decoder wrapped for use by several pipeline clones.
///
/// Decode calls are serialized by a per-adapter lock: real I/O on one file
/// happens one request at a time while everything downstream runs in
/// parallel. Metadata is snapshotted at construction and read without locking.
pub struct SharedDecoder {
    id: AdapterId,
    info: SourceInfo,
    inner: Mutex<Box<dyn ImageSource>>,
    decodes: AtomicU64,
}

impl SharedDecoder {
    pub fn new(id: AdapterId, source: Box<dyn ImageSource>) -> Self {
        let info = source.info();
        Self {
            id,
            info,
            inner: Mutex::new(source),
            decodes: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> AdapterId {
        self.id
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    /// Decode a region, blocking while another clone is decoding.
    pub fn decode(
        &self,
        region: &PixelRegion,
        level: usize,
        bands: &[usize],
    ) -> Result<PixelBuffer, SourceError> {
        let mut source = self.inner.lock();
        self.decodes.fetch_add(1, Ordering::Relaxed);
        trace!(adapter = %self.id, level, x = region.x, y = region.y, "Shared decode");
        source.decode(region, level, bands)
    }

    /// Number of decode calls served so far.
    pub fn decode_count(&self) -> u64 {
        self.decodes.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SharedDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedDecoder")
            .field("id", &self.id)
            .field("source", &self.info.identifier)
            .field("decodes", &self.decode_count())
            .finish()
    }
}
