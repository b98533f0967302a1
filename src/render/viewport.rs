//! Viewport state.
//!
//! View coordinates are the continuous coordinates of the viewport's own
//! projection (or of the sources' physical space when it has none). A screen
//! pixel `(px, py)` maps to view coordinates as
//!
//! ```text
//! view = origin + (px * spacing.x, py * spacing.y)
//! ```
//!
//! so `spacing` is the zoom (view units per screen pixel) and its sign gives
//! the axis orientation (a negative y spacing for north-up maps).

use crate::geometry::{Extent, Point2};
use crate::projection::{Rotation, SpatialReference};

/// Mutable view state driven by the caller.
///
/// The generation counter increments whenever the mapping between viewport
/// and sources changes (projection or rotation); panning, zooming and
/// resizing only change the extent.
#[derive(Debug, Clone)]
pub struct Viewport {
    width: u32,
    height: u32,
    origin: Point2,
    spacing: (f64, f64),
    rotation: Rotation,
    spatial_reference: SpatialReference,
    generation: u64,
}

/// Read-only copy of a [`Viewport`], taken once per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportSnapshot {
    pub width: u32,
    pub height: u32,
    pub extent: Extent,
    pub spacing: (f64, f64),
    pub rotation: Rotation,
    pub spatial_reference: SpatialReference,
    pub generation: u64,
}

impl ViewportSnapshot {
    pub fn center(&self) -> Point2 {
        self.extent.center()
    }
}

impl Viewport {
    /// Viewport of `width × height` screen pixels at unit spacing, origin at 0.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            origin: Point2::new(0.0, 0.0),
            spacing: (1.0, 1.0),
            rotation: Rotation::default(),
            spatial_reference: SpatialReference::None,
            generation: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn origin(&self) -> Point2 {
        self.origin
    }

    pub fn spacing(&self) -> (f64, f64) {
        self.spacing
    }

    pub fn rotation(&self) -> &Rotation {
        &self.rotation
    }

    pub fn spatial_reference(&self) -> &SpatialReference {
        &self.spatial_reference
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// View-space extent covered by the screen.
    pub fn extent(&self) -> Extent {
        let far = self.screen_to_view(f64::from(self.width), f64::from(self.height));
        Extent::from_corners(self.origin, far)
    }

    pub fn center(&self) -> Point2 {
        self.extent().center()
    }

    pub fn screen_to_view(&self, px: f64, py: f64) -> Point2 {
        Point2::new(
            self.origin.x + px * self.spacing.0,
            self.origin.y + py * self.spacing.1,
        )
    }

    pub fn view_to_screen(&self, p: Point2) -> Point2 {
        Point2::new(
            (p.x - self.origin.x) / self.spacing.0,
            (p.y - self.origin.y) / self.spacing.1,
        )
    }

    /// Set the view units per screen pixel. Zero or non-finite values are ignored.
    pub fn set_spacing(&mut self, spacing: (f64, f64)) {
        if is_usable(spacing.0) && is_usable(spacing.1) {
            self.spacing = spacing;
        }
    }

    /// Move by a number of screen pixels.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.origin = self.screen_to_view(dx, dy);
    }

    /// Put `center` in the middle of the screen.
    pub fn center_on(&mut self, center: Point2) {
        let half_w = f64::from(self.width) * 0.5 * self.spacing.0;
        let half_h = f64::from(self.height) * 0.5 * self.spacing.1;
        self.origin = Point2::new(center.x - half_w, center.y - half_h);
    }

    /// Zoom around the screen center; `factor > 1` zooms in.
    pub fn zoom(&mut self, factor: f64) {
        if !is_usable(factor) || factor < 0.0 {
            return;
        }
        let center = self.center();
        self.spacing = (self.spacing.0 / factor, self.spacing.1 / factor);
        self.center_on(center);
    }

    /// Change the screen size, keeping the top-left corner.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    /// Zoom and center so that `extent` is fully visible, keeping the sign
    /// of each spacing axis.
    pub fn fit(&mut self, extent: &Extent) {
        let sx = extent.width() / f64::from(self.width);
        let sy = extent.height() / f64::from(self.height);
        let scale = sx.max(sy);
        if !is_usable(scale) {
            return;
        }
        self.spacing = (
            scale.copysign(self.spacing.0),
            scale.copysign(self.spacing.1),
        );
        self.center_on(extent.center());
    }

    /// Rotate the view around a center given in view coordinates.
    pub fn set_rotation(&mut self, angle: f64, center: Point2) {
        let rotation = Rotation::new(angle, center);
        if rotation != self.rotation {
            self.rotation = rotation;
            self.generation += 1;
        }
    }

    /// Change the output projection.
    pub fn set_spatial_reference(&mut self, spatial_reference: SpatialReference) {
        if spatial_reference != self.spatial_reference {
            self.spatial_reference = spatial_reference;
            self.generation += 1;
        }
    }

    pub fn snapshot(&self) -> ViewportSnapshot {
        ViewportSnapshot {
            width: self.width,
            height: self.height,
            extent: self.extent(),
            spacing: self.spacing,
            rotation: self.rotation,
            spatial_reference: self.spatial_reference.clone(),
            generation: self.generation,
        }
    }
}

fn is_usable(v: f64) -> bool {
    v.is_finite() && v != 0.0
}
