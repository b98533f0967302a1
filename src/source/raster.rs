//! In-memory multi-resolution raster.
//!
//! [`RasterSource`] holds a full-resolution interleaved raster and derives its
//! overview levels on demand by box decimation. Decimated levels are kept in
//! an LRU cache so that zooming back and forth does not recompute them, while
//! memory stays bounded to a handful of levels.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::debug;

use crate::error::SourceError;
use crate::geometry::{PixelRegion, Point2};
use crate::projection::SpatialReference;

use super::buffer::PixelBuffer;
use super::reader::ImageSource;

// =============================================================================
// Constants
// =============================================================================

/// Default number of decimated levels kept in memory.
pub const DEFAULT_LEVEL_CACHE_CAPACITY: usize = 4;

/// Overviews are generated until the smaller side drops below this size.
const MIN_OVERVIEW_SIZE: u32 = 64;

// =============================================================================
// RasterSource
// =============================================================================

/// Multi-resolution raster backed by memory.
pub struct RasterSource {
    identifier: String,
    width: u32,
    height: u32,
    bands: usize,
    /// Full-resolution samples, interleaved
    data: Arc<Vec<f32>>,
    /// Decimation factor of each level, level 0 first
    factors: Vec<u32>,
    origin: Point2,
    spacing: (f64, f64),
    spatial_reference: SpatialReference,
    /// Decimated levels indexed by level number
    levels: LruCache<usize, Arc<Vec<f32>>>,
}

impl RasterSource {
    /// Create a source from a full-resolution buffer.
    ///
    /// Overview factors default to successive powers of two down to 64 pixels.
    pub fn new(identifier: impl Into<String>, buffer: PixelBuffer) -> Result<Self, SourceError> {
        if !buffer.is_consistent() {
            return Err(SourceError::EmptyRegion);
        }

        let width = buffer.width();
        let height = buffer.height();
        let bands = buffer.bands();

        let mut factors = vec![1u32];
        let mut factor = 2u32;
        while width / factor >= MIN_OVERVIEW_SIZE && height / factor >= MIN_OVERVIEW_SIZE {
            factors.push(factor);
            factor *= 2;
        }

        Ok(Self {
            identifier: identifier.into(),
            width,
            height,
            bands,
            data: Arc::new(buffer.into_data()),
            factors,
            origin: Point2::new(0.0, 0.0),
            spacing: (1.0, 1.0),
            spatial_reference: SpatialReference::None,
            levels: LruCache::new(cache_capacity(DEFAULT_LEVEL_CACHE_CAPACITY)),
        })
    }

    /// Three-band synthetic test pattern: horizontal ramp, vertical ramp and
    /// a 32-pixel checkerboard, all in `[0, 255]`.
    pub fn gradient(width: u32, height: u32) -> Result<Self, SourceError> {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                data.push(255.0 * x as f32 / width.max(1) as f32);
                data.push(255.0 * y as f32 / height.max(1) as f32);
                data.push(if (x / 32 + y / 32) % 2 == 0 { 255.0 } else { 0.0 });
            }
        }
        Self::new(
            format!("gradient:{}x{}", width, height),
            PixelBuffer::new(width, height, 3, data),
        )
    }

    /// Replace the overview factors. Factor 1 is always kept as level 0.
    pub fn with_factors(mut self, factors: &[u32]) -> Self {
        let mut factors: Vec<u32> = factors.iter().copied().filter(|f| *f > 1).collect();
        factors.sort_unstable();
        factors.dedup();
        factors.insert(0, 1);
        self.factors = factors;
        self.levels.clear();
        self
    }

    /// Attach georeferencing: top-left corner, full-resolution pixel size and projection.
    pub fn with_georeference(
        mut self,
        origin: Point2,
        spacing: (f64, f64),
        spatial_reference: SpatialReference,
    ) -> Self {
        self.origin = origin;
        self.spacing = spacing;
        self.spatial_reference = spatial_reference;
        self
    }

    /// Set how many decimated levels are kept in memory.
    pub fn with_level_cache(mut self, capacity: usize) -> Self {
        self.levels = LruCache::new(cache_capacity(capacity));
        self
    }

    /// Number of decimated levels currently held in memory.
    pub fn cached_levels(&self) -> usize {
        self.levels.len()
    }

    /// Samples of a level, computing and caching it if necessary.
    fn level_data(&mut self, level: usize) -> Arc<Vec<f32>> {
        if level == 0 {
            return self.data.clone();
        }
        if let Some(data) = self.levels.get(&level) {
            return data.clone();
        }

        let factor = self.factors[level];
        let data = Arc::new(self.decimate(factor));
        debug!(
            source = %self.identifier,
            level,
            factor,
            "Computed decimated level"
        );
        self.levels.put(level, data.clone());
        data
    }

    /// Box-average the full-resolution raster by `factor`.
    fn decimate(&self, factor: u32) -> Vec<f32> {
        let (out_w, out_h) = (self.width.div_ceil(factor), self.height.div_ceil(factor));
        let mut out = Vec::with_capacity(out_w as usize * out_h as usize * self.bands);
        let mut sums = vec![0.0f64; self.bands];

        for oy in 0..out_h {
            let y0 = oy * factor;
            let y1 = (y0 + factor).min(self.height);
            for ox in 0..out_w {
                let x0 = ox * factor;
                let x1 = (x0 + factor).min(self.width);
                sums.iter_mut().for_each(|s| *s = 0.0);

                for y in y0..y1 {
                    for x in x0..x1 {
                        let start = (y as usize * self.width as usize + x as usize) * self.bands;
                        for (sum, v) in sums.iter_mut().zip(&self.data[start..start + self.bands]) {
                            *sum += f64::from(*v);
                        }
                    }
                }

                let count = f64::from((x1 - x0) * (y1 - y0));
                out.extend(sums.iter().map(|s| (s / count) as f32));
            }
        }
        out
    }
}

fn cache_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

impl ImageSource for RasterSource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn level_count(&self) -> usize {
        self.factors.len()
    }

    fn level_size(&self, level: usize) -> Option<(u32, u32)> {
        let factor = *self.factors.get(level)?;
        Some((self.width.div_ceil(factor), self.height.div_ceil(factor)))
    }

    fn level_spacing(&self, level: usize) -> Option<(f64, f64)> {
        let factor = f64::from(*self.factors.get(level)?);
        Some((self.spacing.0 * factor, self.spacing.1 * factor))
    }

    fn origin(&self) -> Point2 {
        self.origin
    }

    fn band_count(&self) -> usize {
        self.bands
    }

    fn spatial_reference(&self) -> SpatialReference {
        self.spatial_reference.clone()
    }

    fn decode(
        &mut self,
        region: &PixelRegion,
        level: usize,
        bands: &[usize],
    ) -> Result<PixelBuffer, SourceError> {
        let (level_width, level_height) =
            self.level_size(level)
                .ok_or(SourceError::InvalidLevel {
                    level,
                    count: self.factors.len(),
                })?;

        if region.is_empty() || bands.is_empty() {
            return Err(SourceError::EmptyRegion);
        }
        if let Some(&band) = bands.iter().find(|b| **b >= self.bands) {
            return Err(SourceError::InvalidBand {
                band,
                count: self.bands,
            });
        }
        if !PixelRegion::with_size(level_width, level_height).contains_region(region) {
            return Err(SourceError::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                level_width,
                level_height,
            });
        }

        let data = self.level_data(level);
        let mut out = Vec::with_capacity(region.pixel_count() * bands.len());
        for y in region.y..region.bottom() {
            for x in region.x..region.right() {
                let start = (y as usize * level_width as usize + x as usize) * self.bands;
                out.extend(bands.iter().map(|b| data[start + b]));
            }
        }

        Ok(PixelBuffer::new(region.width, region.height, bands.len(), out))
    }
}

// =============================================================================
// Tests
// =============================================================================
