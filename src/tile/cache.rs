//! Resident tile store.
//!
//! The cache holds the decoded tiles of one layer for the current view. It is
//! not pressure-driven: every frame first evicts what left the view (or was
//! decoded with other settings), then ensures that every planned tile is
//! resident.
//!
//! # Tile Identity
//!
//! A tile is resident only under an exact [`TileKey`] match:
//! - Level pixel region
//! - Pyramid level
//! - Ordered band selection
//!
//! Any difference forces a reload, so a band remap or level change never shows
//! stale pixels.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::ViewerContext;
use crate::error::TileError;
use crate::geometry::{Extent, PixelRegion, Quad};
use crate::projection::CoordinateBridge;
use crate::source::{PixelBuffer, PyramidLevel};

use super::grid::TileGridPlanner;

// =============================================================================
// Keys and Handles
// =============================================================================

/// Ordered list of source bands to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BandSelection(Vec<usize>);

impl BandSelection {
    pub fn new(bands: Vec<usize>) -> Self {
        Self(bands)
    }

    /// Red, green and blue channels from three source bands.
    pub fn rgb(red: usize, green: usize, blue: usize) -> Self {
        Self(vec![red, green, blue])
    }

    /// A single band shown as grayscale.
    pub fn gray(band: usize) -> Self {
        Self(vec![band])
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identity of a resident tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Pixel region at `level`, already cropped to the level bounds
    pub region: PixelRegion,
    pub level: usize,
    pub bands: BandSelection,
}

impl TileKey {
    pub fn new(region: PixelRegion, level: usize, bands: BandSelection) -> Self {
        Self {
            region,
            level,
            bands,
        }
    }
}

/// Opaque handle a render target associates with an uploaded tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderHandle(pub u64);

// =============================================================================
// Tile
// =============================================================================

/// A decoded tile resident in a cache.
#[derive(Debug, Clone)]
pub struct Tile {
    pub key: TileKey,
    pub buffer: Arc<PixelBuffer>,
    /// Tile corners mapped to the viewport
    pub quad: Quad,
    pub handle: RenderHandle,
}

impl Tile {
    /// Samples at level pixel `(x, y)`, if the tile contains it.
    pub fn pixel(&self, x: i64, y: i64) -> Option<&[f32]> {
        if !self.key.region.contains(x, y) {
            return None;
        }
        let local_x = u32::try_from(x - self.key.region.x).ok()?;
        let local_y = u32::try_from(y - self.key.region.y).ok()?;
        self.buffer.pixel(local_x, local_y)
    }
}

/// Output of a tile load, before admission.
#[derive(Debug, Clone)]
pub struct LoadedTile {
    pub buffer: PixelBuffer,
    pub quad: Quad,
}

// =============================================================================
// Loading
// =============================================================================

/// Per-frame settings under which tiles are planned, loaded and kept.
pub struct TileContext<'a> {
    pub bridge: &'a CoordinateBridge,
    pub level: &'a PyramidLevel,
    pub bands: &'a BandSelection,
    pub viewer: &'a ViewerContext,
}

impl TileContext<'_> {
    /// Build the key of a planned region under these settings.
    pub fn key(&self, region: PixelRegion) -> TileKey {
        TileKey::new(region, self.level.index, self.bands.clone())
    }

    /// Returns `true` if `key` was produced under these settings.
    pub fn matches(&self, key: &TileKey) -> bool {
        key.level == self.level.index && key.bands == *self.bands
    }
}

/// Turns tile keys into decoded tiles.
///
/// Implementations decide where decoding runs; the cache only hands over the
/// keys it is missing and admits whatever comes back. Results may arrive in
/// any order.
pub trait TileLoader {
    fn load(
        &mut self,
        keys: Vec<TileKey>,
        ctx: &TileContext<'_>,
    ) -> Vec<(TileKey, Result<LoadedTile, TileError>)>;
}

/// Counters from one [`TileCache::ensure`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnsureStats {
    /// Tiles in the plan for the extent
    pub planned: usize,
    /// Planned tiles that were already resident
    pub resident: usize,
    /// Tiles decoded and admitted
    pub loaded: usize,
    /// Tiles whose load failed or was rejected
    pub failed: usize,
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Store of the tiles resident for one layer.
///
/// Tile counts are bounded by what fits in a viewport, so lookups scan the
/// resident list linearly.
pub struct TileCache {
    planner: TileGridPlanner,
    tiles: Vec<Tile>,
}

impl TileCache {
    pub fn new(tile_size: u32) -> Self {
        Self {
            planner: TileGridPlanner::new(tile_size),
            tiles: Vec::new(),
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.planner.tile_size()
    }

    /// Level pixel rectangle needed to cover a viewport extent, before cropping.
    pub fn requested_region(&self, extent: &Extent, ctx: &TileContext<'_>) -> Option<PixelRegion> {
        ctx.bridge.extent_to_region(extent, ctx.level)
    }

    /// Keys of every tile needed for `extent`.
    pub fn plan(&self, extent: &Extent, ctx: &TileContext<'_>) -> Vec<TileKey> {
        let Some(region) = self.requested_region(extent, ctx) else {
            return Vec::new();
        };
        self.planner
            .plan(&region, &ctx.level.bounds())
            .into_iter()
            .map(|tile| ctx.key(tile))
            .collect()
    }

    pub fn is_resident(&self, key: &TileKey) -> bool {
        self.tiles.iter().any(|tile| tile.key == *key)
    }

    /// Planned keys that are not resident yet.
    pub fn missing(&self, extent: &Extent, ctx: &TileContext<'_>) -> Vec<TileKey> {
        self.plan(extent, ctx)
            .into_iter()
            .filter(|key| !self.is_resident(key))
            .collect()
    }

    /// Load and admit every planned tile that is not resident.
    ///
    /// Failed tiles are logged and skipped; they are requested again by the
    /// next call if still planned. Calling this twice with the same extent
    /// loads nothing the second time.
    pub fn ensure(
        &mut self,
        extent: &Extent,
        ctx: &TileContext<'_>,
        loader: &mut dyn TileLoader,
    ) -> EnsureStats {
        let planned = self.plan(extent, ctx);
        let mut stats = EnsureStats {
            planned: planned.len(),
            ..EnsureStats::default()
        };

        let missing: Vec<TileKey> = planned
            .into_iter()
            .filter(|key| !self.is_resident(key))
            .collect();
        stats.resident = stats.planned - missing.len();

        if missing.is_empty() {
            return stats;
        }

        for (key, result) in loader.load(missing, ctx) {
            match result {
                Ok(loaded) => match self.admit(key, loaded, ctx.viewer) {
                    Some(_) => stats.loaded += 1,
                    None => stats.failed += 1,
                },
                Err(e) => {
                    warn!(
                        level = key.level,
                        x = key.region.x,
                        y = key.region.y,
                        error = %e,
                        "Tile load failed, skipping"
                    );
                    stats.failed += 1;
                }
            }
        }

        debug!(
            planned = stats.planned,
            resident = stats.resident,
            loaded = stats.loaded,
            failed = stats.failed,
            "Ensured tiles"
        );
        stats
    }

    /// Insert a loaded tile and assign it a render handle.
    ///
    /// Returns `None` without inserting if a tile with the same key is already
    /// resident, or if the tile is degenerate (buffer not matching its region,
    /// corners not projectable).
    pub fn admit(
        &mut self,
        key: TileKey,
        loaded: LoadedTile,
        viewer: &ViewerContext,
    ) -> Option<RenderHandle> {
        if self.is_resident(&key) {
            debug!(level = key.level, x = key.region.x, y = key.region.y, "Tile already resident");
            return None;
        }

        if let Err(e) = validate(&key, &loaded) {
            warn!(
                level = key.level,
                x = key.region.x,
                y = key.region.y,
                error = %e,
                "Rejected degenerate tile"
            );
            return None;
        }

        let handle = viewer.next_render_handle();
        self.tiles.push(Tile {
            key,
            buffer: Arc::new(loaded.buffer),
            quad: loaded.quad,
            handle,
        });
        Some(handle)
    }

    /// Remove tiles that no longer belong to the view.
    ///
    /// A tile is evicted when its region does not intersect the region
    /// requested for `extent`, or when it was decoded at another level or with
    /// another band selection. Evicted tiles are returned so their render
    /// handles can be released.
    pub fn evict(&mut self, extent: &Extent, ctx: &TileContext<'_>) -> Vec<Tile> {
        let requested = self.requested_region(extent, ctx);

        let (kept, evicted): (Vec<Tile>, Vec<Tile>) =
            std::mem::take(&mut self.tiles).into_iter().partition(|tile| {
                ctx.matches(&tile.key)
                    && requested.is_some_and(|region| region.intersects(&tile.key.region))
            });
        self.tiles = kept;

        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), resident = self.tiles.len(), "Evicted tiles");
        }
        evicted
    }

    /// Resident tile at `level` containing level pixel `(x, y)`.
    pub fn lookup(&self, level: usize, x: i64, y: i64) -> Option<&Tile> {
        self.tiles
            .iter()
            .find(|tile| tile.key.level == level && tile.key.region.contains(x, y))
    }

    /// Resident tiles in admission order.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Remove every tile, returning them for handle release.
    pub fn clear(&mut self) -> Vec<Tile> {
        std::mem::take(&mut self.tiles)
    }
}

fn validate(key: &TileKey, loaded: &LoadedTile) -> Result<(), TileError> {
    let buffer = &loaded.buffer;
    let expected = key.region.pixel_count() * buffer.bands().max(1);
    if !buffer.is_consistent()
        || buffer.width() != key.region.width
        || buffer.height() != key.region.height
    {
        return Err(TileError::Degenerate {
            expected,
            actual: buffer.data().len(),
        });
    }
    if !loaded.quad.is_valid() {
        return Err(TileError::Unprojectable);
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
