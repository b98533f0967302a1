//! Spatial references and point reprojection.
//!
//! Projection math is delegated to `proj4rs`, with EPSG codes resolved to
//! PROJ.4 strings through the `crs-definitions` database. Point failures are
//! reported as [`Point2::INVALID`], never as errors.

use std::fmt;

use proj4rs::proj::Proj;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProjectionError;
use crate::geometry::Point2;

// =============================================================================
// SpatialReference
// =============================================================================

/// Coordinate reference system attached to a viewport or a source image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpatialReference {
    /// No georeferencing: coordinates are used as they are
    #[default]
    None,

    /// An EPSG code resolved through `crs-definitions`
    Epsg(u16),

    /// A raw PROJ.4 definition string
    Proj4(String),
}

impl SpatialReference {
    /// Returns the PROJ.4 definition, or `None` when there is no georeferencing.
    pub fn proj_string(&self) -> Result<Option<String>, ProjectionError> {
        match self {
            SpatialReference::None => Ok(None),
            SpatialReference::Epsg(code) => crs_definitions::from_code(*code)
                .map(|def| Some(def.proj4.to_string()))
                .ok_or(ProjectionError::UnknownEpsg(*code)),
            SpatialReference::Proj4(definition) => Ok(Some(definition.clone())),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, SpatialReference::None)
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialReference::None => write!(f, "none"),
            SpatialReference::Epsg(code) => write!(f, "EPSG:{}", code),
            SpatialReference::Proj4(definition) => write!(f, "{}", definition),
        }
    }
}

// =============================================================================
// Projector
// =============================================================================

/// A parsed projection ready for point transforms.
pub struct Projector {
    proj: Proj,
    geographic: bool,
    definition: String,
}

impl Projector {
    /// Parse the projection for `srs`.
    ///
    /// Returns `Ok(None)` for [`SpatialReference::None`].
    pub fn new(srs: &SpatialReference) -> Result<Option<Self>, ProjectionError> {
        let Some(definition) = srs.proj_string()? else {
            return Ok(None);
        };

        let proj = Proj::from_proj_string(&definition)
            .map_err(|e| ProjectionError::InvalidDefinition(format!("{}: {:?}", definition, e)))?;

        // proj4rs works in radians for geographic systems
        let geographic = definition.contains("+proj=longlat") || definition.contains("+proj=latlong");

        Ok(Some(Self {
            proj,
            geographic,
            definition,
        }))
    }

    pub fn is_geographic(&self) -> bool {
        self.geographic
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projector")
            .field("definition", &self.definition)
            .field("geographic", &self.geographic)
            .finish()
    }
}

// =============================================================================
// Reprojection
// =============================================================================

/// One-way transform between two projections.
#[derive(Debug)]
pub struct Reprojection {
    from: Projector,
    to: Projector,
}

impl Reprojection {
    pub fn new(from: Projector, to: Projector) -> Self {
        Self { from, to }
    }

    /// Build a transform between two spatial references.
    ///
    /// Returns `Ok(None)` when either side has no georeferencing, in which
    /// case points pass through unchanged.
    pub fn between(
        from: &SpatialReference,
        to: &SpatialReference,
    ) -> Result<Option<Self>, ProjectionError> {
        match (Projector::new(from)?, Projector::new(to)?) {
            (Some(from), Some(to)) => Ok(Some(Self::new(from, to))),
            _ => Ok(None),
        }
    }

    /// Transform a point, yielding [`Point2::INVALID`] when it cannot be projected.
    pub fn transform(&self, p: Point2) -> Point2 {
        if !p.is_valid() {
            return Point2::INVALID;
        }

        let (x, y) = if self.from.geographic {
            (p.x.to_radians(), p.y.to_radians())
        } else {
            (p.x, p.y)
        };

        let mut point = (x, y, 0.0);
        if let Err(e) = proj4rs::transform::transform(&self.from.proj, &self.to.proj, &mut point) {
            debug!(x = p.x, y = p.y, error = ?e, "Point could not be reprojected");
            return Point2::INVALID;
        }

        let out = if self.to.geographic {
            Point2::new(point.0.to_degrees(), point.1.to_degrees())
        } else {
            Point2::new(point.0, point.1)
        };

        if out.is_valid() {
            out
        } else {
            Point2::INVALID
        }
    }
}
