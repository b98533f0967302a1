//! Boundary with the component that actually draws tiles.

use std::collections::HashSet;
use std::sync::Arc;

use crate::geometry::Quad;
use crate::source::PixelBuffer;
use crate::tile::RenderHandle;

use super::viewport::ViewportSnapshot;

/// One tile to draw: pixels and the viewport quad they cover.
#[derive(Debug, Clone)]
pub struct FrameTile {
    /// Index of the layer the tile belongs to, in draw order
    pub layer: usize,
    pub handle: RenderHandle,
    pub buffer: Arc<PixelBuffer>,
    pub quad: Quad,
}

/// Everything resident for one frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub viewport: ViewportSnapshot,
    pub tiles: Vec<FrameTile>,
}

/// Receives frames from a [`crate::render::ViewportRenderer`].
///
/// Handles stay valid from the first frame that contains them until they are
/// passed to [`RenderTarget::release`]; a target may keep per-handle
/// resources (textures) in between.
pub trait RenderTarget {
    fn present(&mut self, frame: &Frame);

    fn release(&mut self, handle: RenderHandle);
}

/// Render target that only keeps track of what it was given.
#[derive(Debug, Default)]
pub struct RecordingTarget {
    frames: usize,
    last: Option<Frame>,
    live: HashSet<RenderHandle>,
    released: usize,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames presented.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last.as_ref()
    }

    /// Handles presented and not released yet.
    pub fn live_handles(&self) -> usize {
        self.live.len()
    }

    /// Total number of released handles.
    pub fn released(&self) -> usize {
        self.released
    }
}

impl RenderTarget for RecordingTarget {
    fn present(&mut self, frame: &Frame) {
        self.frames += 1;
        self.live.extend(frame.tiles.iter().map(|tile| tile.handle));
        self.last = Some(frame.clone());
    }

    fn release(&mut self, handle: RenderHandle) {
        self.live.remove(&handle);
        self.released += 1;
    }
}
