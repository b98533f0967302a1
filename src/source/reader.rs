//! ImageSource trait for format-agnostic raster access.
//!
//! This module defines the boundary with raster-format decoders. The viewer
//! only ever calls the methods below; parsing of actual file formats lives
//! behind implementations of [`ImageSource`].
//!
//! Decoders are single-threaded and stateful (`decode` takes `&mut self`).
//! To use one from several worker threads it is wrapped in a
//! [`crate::chain::SharedDecoder`], which serializes calls.

use std::sync::Arc;

use crate::error::SourceError;
use crate::geometry::{PixelRegion, Point2};
use crate::projection::SpatialReference;

use super::buffer::PixelBuffer;

// =============================================================================
// Pyramid Level
// =============================================================================

/// Information about a single pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyramidLevel {
    /// Level index (0 = full resolution)
    pub index: usize,

    /// Width of this level in pixels
    pub width: u32,

    /// Height of this level in pixels
    pub height: u32,

    /// Physical size of one pixel at this level
    pub spacing: (f64, f64),

    /// Decimation factor relative to level 0
    ///
    /// Level 0 has downsample 1.0, level 1 typically 2.0, etc.
    pub downsample: f64,
}

impl PyramidLevel {
    /// Full pixel bounds of this level.
    pub fn bounds(&self) -> PixelRegion {
        PixelRegion::with_size(self.width, self.height)
    }
}

// =============================================================================
// Source Info
// =============================================================================

/// Snapshot of a source's metadata.
///
/// Taken once when a layer is created so that per-frame work never has to
/// lock a shared decoder just to read its geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub identifier: Arc<str>,
    pub levels: Vec<PyramidLevel>,
    pub band_count: usize,
    /// Physical coordinate of the top-left corner of pixel (0, 0)
    pub origin: Point2,
    pub spatial_reference: SpatialReference,
}

impl SourceInfo {
    pub fn level(&self, index: usize) -> Option<&PyramidLevel> {
        self.levels.get(index)
    }

    /// Full-resolution level. Every source has at least one level.
    pub fn base_level(&self) -> Option<&PyramidLevel> {
        self.levels.first()
    }
}

// =============================================================================
// ImageSource Trait
// =============================================================================

/// Format-agnostic interface for decoding pixels from a multi-resolution raster.
///
/// Level 0 is the full-resolution image; higher levels are progressively
/// decimated overviews. Pixel coordinates are per level.
pub trait ImageSource: Send {
    /// Identifier used in logs (typically the file path).
    fn identifier(&self) -> &str;

    /// Number of pyramid levels, always at least 1.
    fn level_count(&self) -> usize;

    /// Dimensions of a level in pixels, or `None` if out of range.
    fn level_size(&self, level: usize) -> Option<(u32, u32)>;

    /// Physical size of one pixel at a level, or `None` if out of range.
    ///
    /// The y spacing is usually negative for north-up geographic rasters.
    fn level_spacing(&self, level: usize) -> Option<(f64, f64)>;

    /// Physical coordinate of the top-left corner of pixel (0, 0).
    fn origin(&self) -> Point2;

    /// Number of bands per pixel.
    fn band_count(&self) -> usize;

    /// Projection (or sensor model) of the physical coordinates.
    fn spatial_reference(&self) -> SpatialReference;

    /// Decode `region` of `level`, keeping only `bands` in the given order.
    ///
    /// The returned buffer is `region.width × region.height` pixels with
    /// `bands.len()` interleaved samples each.
    fn decode(
        &mut self,
        region: &PixelRegion,
        level: usize,
        bands: &[usize],
    ) -> Result<PixelBuffer, SourceError>;

    /// Complete information about a level.
    fn level_info(&self, level: usize) -> Option<PyramidLevel> {
        let (width, height) = self.level_size(level)?;
        let spacing = self.level_spacing(level)?;
        let base = self.level_spacing(0)?;

        let downsample = if base.0 != 0.0 {
            (spacing.0 / base.0).abs()
        } else {
            1.0
        };

        Some(PyramidLevel {
            index: level,
            width,
            height,
            spacing,
            downsample,
        })
    }

    /// Metadata snapshot of the whole source.
    fn info(&self) -> SourceInfo {
        SourceInfo {
            identifier: Arc::from(self.identifier()),
            levels: (0..self.level_count())
                .filter_map(|level| self.level_info(level))
                .collect(),
            band_count: self.band_count(),
            origin: self.origin(),
            spatial_reference: self.spatial_reference(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
