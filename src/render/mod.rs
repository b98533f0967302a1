//! Frame rendering.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Caller (event loop, CLI)         │
//! └────────────────────┬────────────────────┘
//!                      │ Viewport
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           ViewportRenderer              │
//! │  ┌───────────┐ ┌───────────┐            │
//! │  │  Layer 0  │ │  Layer 1  │  ...       │
//! │  │  cache    │ │  cache    │            │
//! │  │  clones   │ │  clones   │            │
//! │  └───────────┘ └───────────┘            │
//! └────────────────────┬────────────────────┘
//!                      │ Frame (buffers + quads)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             RenderTarget                │
//! └─────────────────────────────────────────┘
//! ```
//!
//! A frame is synchronous from the caller's side: worker threads decoding
//! tiles are joined before the frame is presented.

pub mod color;
mod dispatch;
mod layer;
mod renderer;
mod target;
mod viewport;

pub use dispatch::ChainLoader;
pub use layer::{Layer, LayerRefresh};
pub use renderer::{FrameStats, ViewportRenderer};
pub use target::{Frame, FrameTile, RecordingTarget, RenderTarget};
pub use viewport::{Viewport, ViewportSnapshot};
