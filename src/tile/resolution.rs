//! Pyramid level selection.
//!
//! The selector compares the viewport's scale, expressed as output pixels per
//! full-resolution source pixel, with the reciprocal decimation factor of each
//! level:
//!
//! ```text
//!   level        0     1     2     3
//!   factor       1     2     4     8
//!   1/factor   1.0   0.5  0.25 0.125
//!                        ▲
//!              ratio 0.4 ┘  → Nearest picks level 1
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::source::PyramidLevel;

// =============================================================================
// Scale Ratio
// =============================================================================

/// Output pixels per full-resolution source pixel, per viewport axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleRatio {
    pub x: f64,
    pub y: f64,
}

impl ScaleRatio {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Same ratio on both axes.
    pub const fn uniform(ratio: f64) -> Self {
        Self::new(ratio, ratio)
    }

    /// Ratio used for selection: the smaller magnitude of the two axes, so
    /// that neither axis is oversampled.
    pub fn effective(&self) -> f64 {
        self.x.abs().min(self.y.abs())
    }
}

// =============================================================================
// Algorithm
// =============================================================================

/// How a level is chosen relative to the viewport scale.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionAlgorithm {
    /// Level whose reciprocal factor is closest to the ratio
    #[default]
    Nearest,

    /// Closest level that is coarser than the ratio (less memory, some blur)
    NearestLower,

    /// Closest level that is finer than the ratio (sharper, more decoding)
    NearestUpper,
}

// =============================================================================
// Selector
// =============================================================================

/// Chooses the pyramid level for a viewport scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionSelector {
    algorithm: ResolutionAlgorithm,
}

impl ResolutionSelector {
    pub fn new(algorithm: ResolutionAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> ResolutionAlgorithm {
        self.algorithm
    }

    /// Select a level index from `levels`.
    ///
    /// The result is always the index of an entry of `levels` (0 when the
    /// list is empty). Degenerate ratios fall back to `previous` when it is
    /// still a valid index, otherwise to level 0. Ties go to the lowest index.
    ///
    /// When no level qualifies, `NearestLower` takes the coarsest level and
    /// `NearestUpper` the finest (level 0), rather than capping both at the
    /// coarsest level.
    pub fn select(&self, ratio: ScaleRatio, levels: &[PyramidLevel], previous: Option<usize>) -> usize {
        if levels.is_empty() {
            return 0;
        }

        let r = ratio.effective();
        if !r.is_finite() || r <= 0.0 {
            let fallback = previous.filter(|p| *p < levels.len()).unwrap_or(0);
            debug!(ratio = r, level = fallback, "Degenerate scale ratio, keeping level");
            return fallback;
        }

        let mut best: Option<(usize, f64)> = None;
        for (index, level) in levels.iter().enumerate() {
            let reciprocal = if level.downsample > 0.0 {
                1.0 / level.downsample
            } else {
                1.0
            };
            let diff = reciprocal - r;

            let eligible = match self.algorithm {
                ResolutionAlgorithm::Nearest => true,
                ResolutionAlgorithm::NearestLower => diff < 0.0,
                ResolutionAlgorithm::NearestUpper => diff > 0.0,
            };
            if !eligible {
                continue;
            }

            if best.map_or(true, |(_, d)| diff.abs() < d) {
                best = Some((index, diff.abs()));
            }
        }

        match best {
            Some((index, _)) => index,
            None => match self.algorithm {
                ResolutionAlgorithm::NearestLower => levels.len() - 1,
                _ => 0,
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
