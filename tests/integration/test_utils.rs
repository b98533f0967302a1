//! Test utilities for integration tests.
//!
//! This module provides a procedural image source that never allocates the
//! full raster, plus counters to observe how it was decoded from the outside
//! once it has been moved into a renderer or a pipeline.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use raster_viewport::error::SourceError;
use raster_viewport::geometry::{Extent, PixelRegion, Point2};
use raster_viewport::projection::SpatialReference;
use raster_viewport::source::{ImageSource, PixelBuffer};

/// Dimensions used by most scenarios.
pub const IMAGE_WIDTH: u32 = 10_000;
pub const IMAGE_HEIGHT: u32 = 8_000;

/// Pyramid used by most scenarios.
pub const FACTORS: [u32; 4] = [1, 2, 4, 8];

// =============================================================================
// Decode Counters
// =============================================================================

/// Shared counters of a [`GradientSource`].
#[derive(Clone, Default)]
pub struct DecodeCounters {
    decodes: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
    busy: Arc<AtomicBool>,
    failures: Arc<AtomicUsize>,
}

impl DecodeCounters {
    /// Number of decode calls, failed ones included.
    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    /// Number of decode calls that started while another was still running.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Make the next `count` decode calls fail.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

// =============================================================================
// Gradient Source
// =============================================================================

/// Procedural three-band source.
///
/// Band 0 holds the full-resolution x of the pixel, band 1 the
/// full-resolution y, band 2 the level index. Levels are decimated by
/// [`FACTORS`].
pub struct GradientSource {
    identifier: String,
    width: u32,
    height: u32,
    factors: Vec<u32>,
    origin: Point2,
    spacing: (f64, f64),
    spatial_reference: SpatialReference,
    delay: Option<Duration>,
    counters: DecodeCounters,
}

impl GradientSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            identifier: format!("gradient-test:{}x{}", width, height),
            width,
            height,
            factors: FACTORS.to_vec(),
            origin: Point2::new(0.0, 0.0),
            spacing: (1.0, 1.0),
            spatial_reference: SpatialReference::None,
            delay: None,
            counters: DecodeCounters::default(),
        }
    }

    /// The 10000x8000 source with four levels.
    pub fn standard() -> Self {
        Self::new(IMAGE_WIDTH, IMAGE_HEIGHT)
    }

    /// Sleep inside every decode, widening the window for overlapping calls.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

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

    pub fn counters(&self) -> DecodeCounters {
        self.counters.clone()
    }

    fn factor(&self, level: usize) -> Option<u32> {
        self.factors.get(level).copied()
    }
}

impl ImageSource for GradientSource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn level_count(&self) -> usize {
        self.factors.len()
    }

    fn level_size(&self, level: usize) -> Option<(u32, u32)> {
        let factor = self.factor(level)?;
        Some((self.width.div_ceil(factor), self.height.div_ceil(factor)))
    }

    fn level_spacing(&self, level: usize) -> Option<(f64, f64)> {
        let factor = f64::from(self.factor(level)?);
        Some((self.spacing.0 * factor, self.spacing.1 * factor))
    }

    fn origin(&self) -> Point2 {
        self.origin
    }

    fn band_count(&self) -> usize {
        3
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
        let counters = &self.counters;
        counters.decodes.fetch_add(1, Ordering::SeqCst);
        if counters.busy.swap(true, Ordering::SeqCst) {
            counters.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        let result = self.render(region, level, bands);

        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.counters.busy.store(false, Ordering::SeqCst);
        result
    }
}

impl GradientSource {
    fn render(
        &self,
        region: &PixelRegion,
        level: usize,
        bands: &[usize],
    ) -> Result<PixelBuffer, SourceError> {
        let failures = &self.counters.failures;
        if failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SourceError::Io("injected failure".to_string()));
        }

        let factor = self.factor(level).ok_or(SourceError::InvalidLevel {
            level,
            count: self.factors.len(),
        })?;
        if let Some(&band) = bands.iter().find(|b| **b >= 3) {
            return Err(SourceError::InvalidBand { band, count: 3 });
        }
        let (level_width, level_height) = self.level_size(level).unwrap_or((0, 0));
        if region.is_empty() {
            return Err(SourceError::EmptyRegion);
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

        let mut data = Vec::with_capacity(region.pixel_count() * bands.len());
        for y in region.y..region.bottom() {
            for x in region.x..region.right() {
                for band in bands {
                    data.push(match band {
                        0 => (x * i64::from(factor)) as f32,
                        1 => (y * i64::from(factor)) as f32,
                        _ => level as f32,
                    });
                }
            }
        }
        Ok(PixelBuffer::new(region.width, region.height, bands.len(), data))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Viewport extent from its top-left corner and size.
pub fn extent(x: f64, y: f64, width: f64, height: f64) -> Extent {
    Extent::from_corners(Point2::new(x, y), Point2::new(x + width, y + height))
}
