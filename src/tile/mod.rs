//! Viewport-driven tile management.
//!
//! Each frame, a layer turns the viewport extent into a set of resident tiles:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Viewport extent               │
//! └────────────────────┬────────────────────┘
//!                      │  CoordinateBridge + ResolutionSelector
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   Level pixel rectangle at level L      │
//! └────────────────────┬────────────────────┘
//!                      │  TileGridPlanner
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   Tile keys (region, level, bands)      │
//! └────────────────────┬────────────────────┘
//!                      │  TileCache::evict / ensure
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   Resident tiles → render target        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`ResolutionSelector`]: picks the pyramid level for the viewport scale
//! - [`TileGridPlanner`]: enumerates tile-aligned regions, cropped to the level bounds
//! - [`TileCache`]: resident tiles, evicted deterministically every frame
//! - [`TileLoader`]: seam through which the cache gets missing tiles decoded

mod cache;
mod grid;
mod resolution;

pub use cache::{
    BandSelection, EnsureStats, LoadedTile, RenderHandle, Tile, TileCache, TileContext, TileKey,
    TileLoader,
};
pub use grid::{TileGridPlanner, DEFAULT_TILE_SIZE};
pub use resolution::{ResolutionAlgorithm, ResolutionSelector, ScaleRatio};
