//! Image source abstraction layer.
//!
//! This module is the boundary with raster decoders. The viewer core only
//! talks to sources through the [`ImageSource`] trait:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Decode stages (chain)            │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │      SharedDecoder (one lock per file)  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          ImageSource Trait              │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │  RasterSource   │    │  external decoders  │
//! │ (in memory)     │    │  (GDAL, TIFF, ...)  │
//! └─────────────────┘    └─────────────────────┘
//! ```

mod buffer;
mod file;
mod raster;
mod reader;

pub use buffer::PixelBuffer;
pub use file::open_image_file;
pub use raster::{RasterSource, DEFAULT_LEVEL_CACHE_CAPACITY};
pub use reader::{ImageSource, PyramidLevel, SourceInfo};
