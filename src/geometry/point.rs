//! Continuous points, extents and quads.

use serde::{Deserialize, Serialize};

// =============================================================================
// Point2
// =============================================================================

/// A point in any of the crate's continuous coordinate spaces.
///
/// Transform failures are signalled with [`Point2::INVALID`] rather than an
/// error; callers exclude invalid points instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    /// Sentinel for a point that could not be transformed.
    pub const INVALID: Point2 = Point2 {
        x: f64::NAN,
        y: f64::NAN,
    };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns `true` when both coordinates are finite.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point2) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

// =============================================================================
// Extent
// =============================================================================

/// Immutable axis-aligned rectangle, `min` inclusive and `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    /// Create an extent from two opposite corners in any order.
    pub fn from_corners(a: Point2, b: Point2) -> Self {
        Self {
            min_x: a.x.min(b.x),
            min_y: a.y.min(b.y),
            max_x: a.x.max(b.x),
            max_y: a.y.max(b.y),
        }
    }

    /// Bounding box of the valid points, or `None` when no point is valid.
    pub fn bounding<'a>(points: impl IntoIterator<Item = &'a Point2>) -> Option<Self> {
        let mut extent: Option<Extent> = None;
        for p in points.into_iter().filter(|p| p.is_valid()) {
            extent = Some(match extent {
                None => Extent {
                    min_x: p.x,
                    min_y: p.y,
                    max_x: p.x,
                    max_y: p.y,
                },
                Some(e) => Extent {
                    min_x: e.min_x.min(p.x),
                    min_y: e.min_y.min(p.y),
                    max_x: e.max_x.max(p.x),
                    max_y: e.max_y.max(p.y),
                },
            });
        }
        extent
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point2 {
        Point2::new(
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }

    /// Corners in upper-left, upper-right, lower-left, lower-right order
    /// (with y growing downwards).
    pub fn corners(&self) -> [Point2; 4] {
        [
            Point2::new(self.min_x, self.min_y),
            Point2::new(self.max_x, self.min_y),
            Point2::new(self.min_x, self.max_y),
            Point2::new(self.max_x, self.max_y),
        ]
    }

    pub fn contains(&self, p: &Point2) -> bool {
        p.x >= self.min_x && p.x < self.max_x && p.y >= self.min_y && p.y < self.max_y
    }

    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }
}

// =============================================================================
// Quad
// =============================================================================

/// Four mapped corners of a tile, in viewport space.
///
/// After reprojection or rotation the quad is generally not axis-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub ul: Point2,
    pub ur: Point2,
    pub ll: Point2,
    pub lr: Point2,
}

impl Quad {
    pub fn points(&self) -> [Point2; 4] {
        [self.ul, self.ur, self.ll, self.lr]
    }

    /// Returns `true` when all four corners are valid.
    pub fn is_valid(&self) -> bool {
        self.points().iter().all(Point2::is_valid)
    }

    /// Axis-aligned bounding box of the quad.
    pub fn bounds(&self) -> Option<Extent> {
        Extent::bounding(self.points().iter())
    }
}
