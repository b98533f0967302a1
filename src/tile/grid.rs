//! Tile grid planning.
//!
//! Tiles are aligned on multiples of the tile edge in level pixel space. For a
//! requested rectangle the planner enumerates every aligned tile touching it,
//! then crops each tile to the level bounds:
//!
//! ```text
//!   0       T       2T      3T
//!   ┌───────┬───────┬───────┬──
//!   │   ┌───┼───────┼────┐  │      requested rectangle R
//!   ├───┼───┼───────┼────┼──┼──
//!   │   └───┼───────┼────┘  │      → 3 × 2 tiles
//!   └───────┴───────┴───────┴──
//! ```

use crate::geometry::PixelRegion;

/// Default tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Enumerates tile-aligned regions covering a pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGridPlanner {
    tile_size: u32,
}

impl Default for TileGridPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_SIZE)
    }
}

impl TileGridPlanner {
    /// Create a planner. A zero tile size is treated as 1.
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size: tile_size.max(1),
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Tiles covering `requested`, cropped to `bounds`, in row-major order.
    ///
    /// No tile in the result is empty, and together the tiles cover the
    /// cropped request exactly once.
    pub fn plan(&self, requested: &PixelRegion, bounds: &PixelRegion) -> Vec<PixelRegion> {
        let Some(region) = requested.crop(bounds) else {
            return Vec::new();
        };

        let t = i64::from(self.tile_size);
        let first_col = region.x.div_euclid(t);
        let first_row = region.y.div_euclid(t);
        let end_col = (region.right() + t - 1).div_euclid(t);
        let end_row = (region.bottom() + t - 1).div_euclid(t);

        let mut tiles = Vec::with_capacity(((end_col - first_col) * (end_row - first_row)) as usize);
        for row in first_row..end_row {
            for col in first_col..end_col {
                let tile = PixelRegion::new(col * t, row * t, self.tile_size, self.tile_size);
                if let Some(cropped) = tile.crop(bounds) {
                    tiles.push(cropped);
                }
            }
        }
        tiles
    }
}

// =============================================================================
// Tests
// =============================================================================
