//! Viewer context.
//!
//! Identifier allocation shared by every component of one viewer. A context
//! is created once, owned by the [`crate::render::ViewportRenderer`] and passed
//! by reference wherever fresh identifiers are needed. Two renderers never
//! share one, so their identifiers are independent.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::chain::{AdapterId, StageId};
use crate::tile::RenderHandle;

/// Monotonic identifier allocator for stages, decoder adapters and render handles.
#[derive(Debug, Default)]
pub struct ViewerContext {
    stages: AtomicU64,
    adapters: AtomicU64,
    handles: AtomicU64,
}

impl ViewerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh stage identifier, never returned twice by this context.
    pub fn next_stage_id(&self) -> StageId {
        StageId(self.stages.fetch_add(1, Ordering::Relaxed))
    }

    /// Fresh shared decoder identifier.
    pub fn next_adapter_id(&self) -> AdapterId {
        AdapterId(self.adapters.fetch_add(1, Ordering::Relaxed))
    }

    /// Fresh render handle for a tile admitted to a cache.
    pub fn next_render_handle(&self) -> RenderHandle {
        RenderHandle(self.handles.fetch_add(1, Ordering::Relaxed))
    }
}
