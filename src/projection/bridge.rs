//! Viewport ↔ source pixel mapping.
//!
//! The full chain for a viewport point is:
//!
//! ```text
//! viewport ──rotation──▶ unrotated view ──reprojection──▶ source physical ──affine──▶ level pixel
//! ```
//!
//! and the reverse chain for source pixels. Reprojection collapses to the
//! identity when both sides share a spatial reference or either side has none.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProjectionError;
use crate::geometry::{Extent, PixelRegion, Point2, Quad};
use crate::source::{PyramidLevel, SourceInfo};
use crate::tile::ScaleRatio;

use super::srs::{Reprojection, SpatialReference};

/// Samples taken along each edge of an extent when mapping it to the source.
/// Reprojected edges are curves, so the corners alone can miss a bulge.
const EDGE_SAMPLES: usize = 8;

/// Viewport distance (in screen pixels) used to measure the local scale.
const SCALE_DISTANCE: f64 = 100.0;

// =============================================================================
// Rotation
// =============================================================================

/// Viewport rotation around a centre point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    /// Angle in radians, counter-clockwise
    pub angle: f64,
    pub center: Point2,
}

impl Rotation {
    pub fn new(angle: f64, center: Point2) -> Self {
        Self { angle, center }
    }

    pub fn is_identity(&self) -> bool {
        self.angle == 0.0
    }

    /// Rotate from the viewport frame into the unrotated view frame.
    pub fn forward(&self, p: Point2) -> Point2 {
        self.rotate(p, self.angle)
    }

    /// Rotate from the unrotated view frame back into the viewport frame.
    pub fn backward(&self, p: Point2) -> Point2 {
        self.rotate(p, -self.angle)
    }

    fn rotate(&self, p: Point2, angle: f64) -> Point2 {
        if angle == 0.0 || !p.is_valid() {
            return p;
        }
        let (sin, cos) = angle.sin_cos();
        let dx = p.x - self.center.x;
        let dy = p.y - self.center.y;
        Point2::new(
            self.center.x + dx * cos - dy * sin,
            self.center.y + dx * sin + dy * cos,
        )
    }
}

// =============================================================================
// CoordinateBridge
// =============================================================================

enum Mapping {
    Identity,
    Reproject {
        to_source: Reprojection,
        to_viewport: Reprojection,
    },
}

/// Point mapping between a viewport and one source image.
///
/// Immutable once built; shared read-only with worker threads.
pub struct CoordinateBridge {
    rotation: Rotation,
    mapping: Mapping,
    viewport_srs: SpatialReference,
    source_srs: SpatialReference,
    /// Physical coordinate of the top-left corner of pixel (0, 0)
    origin: Point2,
}

impl CoordinateBridge {
    /// Build the bridge for a viewport projection/rotation and a source.
    pub fn new(
        viewport_srs: &SpatialReference,
        rotation: Rotation,
        source: &SourceInfo,
    ) -> Result<Self, ProjectionError> {
        let source_srs = &source.spatial_reference;

        let mapping = if viewport_srs == source_srs {
            Mapping::Identity
        } else {
            match (
                Reprojection::between(viewport_srs, source_srs)?,
                Reprojection::between(source_srs, viewport_srs)?,
            ) {
                (Some(to_source), Some(to_viewport)) => Mapping::Reproject {
                    to_source,
                    to_viewport,
                },
                _ => Mapping::Identity,
            }
        };

        debug!(
            source = %source.identifier,
            viewport_srs = %viewport_srs,
            source_srs = %source_srs,
            reprojecting = matches!(mapping, Mapping::Reproject { .. }),
            "Built coordinate bridge"
        );

        Ok(Self {
            rotation,
            mapping,
            viewport_srs: viewport_srs.clone(),
            source_srs: source_srs.clone(),
            origin: source.origin,
        })
    }

    /// Returns `true` if no reprojection happens (rotation may still apply).
    pub fn is_identity(&self) -> bool {
        matches!(self.mapping, Mapping::Identity)
    }

    pub fn rotation(&self) -> &Rotation {
        &self.rotation
    }

    pub fn viewport_srs(&self) -> &SpatialReference {
        &self.viewport_srs
    }

    pub fn source_srs(&self) -> &SpatialReference {
        &self.source_srs
    }

    /// Viewport point to source physical coordinates.
    pub fn viewport_to_physical(&self, p: Point2) -> Point2 {
        let unrotated = self.rotation.forward(p);
        match &self.mapping {
            Mapping::Identity => unrotated,
            Mapping::Reproject { to_source, .. } => to_source.transform(unrotated),
        }
    }

    /// Source physical coordinates to a viewport point.
    pub fn physical_to_viewport(&self, p: Point2) -> Point2 {
        let projected = match &self.mapping {
            Mapping::Identity => p,
            Mapping::Reproject { to_viewport, .. } => to_viewport.transform(p),
        };
        self.rotation.backward(projected)
    }

    /// Viewport point to a continuous pixel index at `level`.
    ///
    /// Yields [`Point2::INVALID`] for unprojectable points.
    pub fn to_source(&self, p: Point2, level: &PyramidLevel) -> Point2 {
        let physical = self.viewport_to_physical(p);
        let (sx, sy) = level.spacing;
        if !physical.is_valid() || sx == 0.0 || sy == 0.0 {
            return Point2::INVALID;
        }
        Point2::new(
            (physical.x - self.origin.x) / sx,
            (physical.y - self.origin.y) / sy,
        )
    }

    /// Continuous pixel index at `level` to a viewport point.
    pub fn to_viewport(&self, p: Point2, level: &PyramidLevel) -> Point2 {
        if !p.is_valid() {
            return Point2::INVALID;
        }
        let (sx, sy) = level.spacing;
        let physical = Point2::new(self.origin.x + p.x * sx, self.origin.y + p.y * sy);
        self.physical_to_viewport(physical)
    }

    /// Map the four corners of a pixel region to the viewport.
    pub fn region_to_quad(&self, region: &PixelRegion, level: &PyramidLevel) -> Quad {
        let [ul, ur, ll, lr] = region.corners().map(|c| self.to_viewport(c, level));
        Quad { ul, ur, ll, lr }
    }

    /// Pixel region at `level` covering a viewport extent, before cropping to
    /// the level bounds.
    ///
    /// Points that fail to project are left out; `None` if none project.
    pub fn extent_to_region(&self, extent: &Extent, level: &PyramidLevel) -> Option<PixelRegion> {
        let mut mapped = Vec::with_capacity(EDGE_SAMPLES * 4);
        let [ul, ur, ll, lr] = extent.corners();
        for (a, b) in [(ul, ur), (ur, lr), (lr, ll), (ll, ul)] {
            for i in 0..EDGE_SAMPLES {
                let t = i as f64 / EDGE_SAMPLES as f64;
                let p = Point2::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t);
                mapped.push(self.to_source(p, level));
            }
        }
        PixelRegion::covering(&Extent::bounding(mapped.iter())?)
    }

    /// Viewport extent covered by a pixel region (bounding box of its quad).
    pub fn region_to_extent(&self, region: &PixelRegion, level: &PyramidLevel) -> Option<Extent> {
        self.region_to_quad(region, level).bounds()
    }

    /// Output pixels per full-resolution source pixel along each viewport axis,
    /// measured around `anchor` for a viewport with `spacing` units per screen pixel.
    pub fn scale_ratio(&self, anchor: Point2, spacing: (f64, f64), base: &PyramidLevel) -> ScaleRatio {
        let a = self.to_source(anchor, base);
        let b = self.to_source(
            Point2::new(anchor.x + SCALE_DISTANCE * spacing.0, anchor.y),
            base,
        );
        let c = self.to_source(
            Point2::new(anchor.x, anchor.y + SCALE_DISTANCE * spacing.1),
            base,
        );

        if !(a.is_valid() && b.is_valid() && c.is_valid()) {
            return ScaleRatio::new(f64::NAN, f64::NAN);
        }

        ScaleRatio::new(SCALE_DISTANCE / a.distance(&b), SCALE_DISTANCE / a.distance(&c))
    }
}

impl std::fmt::Debug for CoordinateBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateBridge")
            .field("viewport_srs", &self.viewport_srs)
            .field("source_srs", &self.source_srs)
            .field("rotation", &self.rotation)
            .field("identity", &self.is_identity())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
