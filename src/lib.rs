//! # Raster Viewport
//!
//! Viewport-driven rendering of very large multi-resolution rasters.
//!
//! For every frame, the library works out which part of an image is visible,
//! picks the pyramid level whose resolution best matches the screen, splits
//! the visible area into fixed-size tiles, and decodes the tiles that are not
//! resident yet on several worker threads, each running its own clone of the
//! decode pipeline.
//!
//! ## Features
//!
//! - **Level selection**: nearest, nearest-lower or nearest-upper pyramid level
//! - **Tile cache**: visible-set eviction, idempotent ensure, render handles
//! - **Pipeline replication**: N clones of a processing chain sharing decoders
//! - **Reprojection**: viewport and image projections bridged with `proj4rs`
//! - **Color remapping**: per-band ranges, gamma and automatic stretch
//!
//! ## Architecture
//!
//! - [`geometry`] - Points, extents, quads and pixel regions
//! - [`projection`] - Spatial references and the viewport/image coordinate bridge
//! - [`source`] - Image sources, pixel buffers and file loading
//! - [`tile`] - Level selection, tile grid planning and the tile cache
//! - [`chain`] - Processing pipelines, shared decoders and replication
//! - [`render`] - Viewport, layers, worker dispatch and render targets
//! - [`config`] - CLI and renderer settings
//!
//! ## Example
//!
//! ```rust,no_run
//! use raster_viewport::{
//!     BandSelection, RasterSource, RecordingTarget, RendererSettings, Viewport, ViewportRenderer,
//! };
//!
//! let mut renderer = ViewportRenderer::new(RendererSettings {
//!     threads: 4,
//!     ..RendererSettings::default()
//! });
//! let source = RasterSource::gradient(10_000, 8_000).unwrap();
//! let layer = renderer.add_layer(Box::new(source), BandSelection::rgb(0, 1, 2)).unwrap();
//!
//! let mut viewport = Viewport::new(1024, 768);
//! if let Some(extent) = renderer.layer(layer).unwrap().extent(&viewport).unwrap() {
//!     viewport.fit(&extent);
//! }
//!
//! let mut target = RecordingTarget::new();
//! let stats = renderer.render_frame(&viewport, &mut target);
//! println!("{} tiles on screen", stats.tiles);
//! ```

pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod geometry;
pub mod projection;
pub mod render;
pub mod source;
pub mod tile;

// Re-export commonly used types
pub use chain::{
    AdapterId, BlendConfig, ChainHandle, ChainReplicator, ColorRemapConfig, Pipeline,
    PipelineBuilder, PipelineDescriptor, SharedDecoder, StageConfig, StageDescriptor, StageId,
};
pub use config::{Config, RendererSettings};
pub use context::ViewerContext;
pub use error::{LayerError, ProjectionError, ReplicationError, SourceError, TileError};
pub use geometry::{Extent, PixelRegion, Point2, Quad};
pub use projection::{CoordinateBridge, Rotation, SpatialReference};
pub use render::{
    ChainLoader, Frame, FrameStats, FrameTile, Layer, LayerRefresh, RecordingTarget,
    RenderTarget, Viewport, ViewportRenderer, ViewportSnapshot,
};
pub use source::{
    open_image_file, ImageSource, PixelBuffer, PyramidLevel, RasterSource, SourceInfo,
    DEFAULT_LEVEL_CACHE_CAPACITY,
};
pub use tile::{
    BandSelection, EnsureStats, LoadedTile, RenderHandle, ResolutionAlgorithm, ResolutionSelector,
    ScaleRatio, Tile, TileCache, TileContext, TileGridPlanner, TileKey, TileLoader,
    DEFAULT_TILE_SIZE,
};
