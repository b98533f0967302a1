//! Tile cache integration tests.
//!
//! Tests verify:
//! - The tile grid planned for a region at a level
//! - Ensure is idempotent and only loads missing tiles
//! - Evict followed by ensure leaves exactly the planned set resident
//! - Failed tiles are skipped and retried on the next call

use std::collections::HashSet;

use proptest::prelude::*;

use raster_viewport::chain::{ChainReplicator, PipelineBuilder};
use raster_viewport::context::ViewerContext;
use raster_viewport::geometry::{Extent, PixelRegion};
use raster_viewport::projection::{CoordinateBridge, Rotation, SpatialReference};
use raster_viewport::render::ChainLoader;
use raster_viewport::source::{ImageSource, SourceInfo};
use raster_viewport::tile::{BandSelection, EnsureStats, TileCache, TileContext, TileKey};

use super::test_utils::{extent, DecodeCounters, GradientSource};

// =============================================================================
// Fixture
// =============================================================================

/// A decode-only pipeline over the standard gradient, plus the cache inputs.
struct Fixture {
    ctx: ViewerContext,
    info: SourceInfo,
    bridge: CoordinateBridge,
    replicator: ChainReplicator,
    bands: BandSelection,
    counters: DecodeCounters,
}

impl Fixture {
    fn new(threads: usize) -> Self {
        let source = GradientSource::standard();
        let counters = source.counters();
        let info = source.info();
        let ctx = ViewerContext::new();
        let bridge =
            CoordinateBridge::new(&SpatialReference::None, Rotation::default(), &info).unwrap();

        let mut builder = PipelineBuilder::new(&ctx);
        builder.decode(Box::new(source));
        let mut replicator = ChainReplicator::new();
        replicator.set_original(builder.build().unwrap());
        replicator.set_thread_count(threads, &ctx).unwrap();

        Self {
            ctx,
            info,
            bridge,
            replicator,
            bands: BandSelection::rgb(0, 1, 2),
            counters,
        }
    }

    fn plan(&self, cache: &TileCache, level: usize, view: &Extent) -> Vec<TileKey> {
        let tiles = TileContext {
            bridge: &self.bridge,
            level: &self.info.levels[level],
            bands: &self.bands,
            viewer: &self.ctx,
        };
        cache.plan(view, &tiles)
    }

    fn ensure(&mut self, cache: &mut TileCache, level: usize, view: &Extent) -> EnsureStats {
        let tiles = TileContext {
            bridge: &self.bridge,
            level: &self.info.levels[level],
            bands: &self.bands,
            viewer: &self.ctx,
        };
        let mut loader = ChainLoader::new(&mut self.replicator);
        cache.ensure(view, &tiles, &mut loader)
    }

    fn evict(&self, cache: &mut TileCache, level: usize, view: &Extent) -> usize {
        let tiles = TileContext {
            bridge: &self.bridge,
            level: &self.info.levels[level],
            bands: &self.bands,
            viewer: &self.ctx,
        };
        cache.evict(view, &tiles).len()
    }
}

fn resident_keys(cache: &TileCache) -> HashSet<TileKey> {
    cache.tiles().iter().map(|tile| tile.key.clone()).collect()
}

// =============================================================================
// Planning
// =============================================================================

#[test]
fn test_grid_at_level_one() {
    let fixture = Fixture::new(1);
    let cache = TileCache::new(256);

    // Full-resolution [0, 4096) is [0, 2048) at level 1
    let keys = fixture.plan(&cache, 1, &extent(0.0, 0.0, 4096.0, 4096.0));
    assert_eq!(keys.len(), 64);

    for (i, key) in keys.iter().enumerate() {
        let (col, row) = ((i % 8) as i64, (i / 8) as i64);
        assert_eq!(key.level, 1);
        assert_eq!(key.region, PixelRegion::new(col * 256, row * 256, 256, 256));
    }
}

#[test]
fn test_plan_is_cropped_to_level_bounds() {
    let fixture = Fixture::new(1);
    let cache = TileCache::new(256);

    // Level 3 is 1250x1000; the view reaches past its right and bottom edges
    let keys = fixture.plan(&cache, 3, &extent(-4000.0, -4000.0, 20_000.0, 20_000.0));
    assert_eq!(keys.len(), 5 * 4);

    let last = keys.last().unwrap();
    assert_eq!(last.region, PixelRegion::new(1024, 768, 226, 232));
    assert!(keys.iter().all(|key| key.region.x >= 0 && key.region.y >= 0));
}

#[test]
fn test_plan_outside_image_is_empty() {
    let fixture = Fixture::new(1);
    let cache = TileCache::new(256);

    let keys = fixture.plan(&cache, 0, &extent(20_000.0, 20_000.0, 500.0, 500.0));
    assert!(keys.is_empty());
}

// =============================================================================
// Ensure
// =============================================================================

#[test]
fn test_ensure_is_idempotent() {
    let mut fixture = Fixture::new(1);
    let mut cache = TileCache::new(256);
    let view = extent(0.0, 0.0, 4096.0, 4096.0);

    let first = fixture.ensure(&mut cache, 1, &view);
    assert_eq!(first.planned, 64);
    assert_eq!(first.loaded, 64);
    assert_eq!(first.failed, 0);
    assert_eq!(fixture.counters.decodes(), 64);

    let second = fixture.ensure(&mut cache, 1, &view);
    assert_eq!(second.planned, 64);
    assert_eq!(second.resident, 64);
    assert_eq!(second.loaded, 0);
    assert_eq!(fixture.counters.decodes(), 64);
    assert_eq!(cache.len(), 64);
}

#[test]
fn test_ensure_decodes_requested_bands() {
    let mut fixture = Fixture::new(1);
    let mut cache = TileCache::new(256);
    fixture.ensure(&mut cache, 1, &extent(0.0, 0.0, 1024.0, 1024.0));

    let tile = cache.lookup(1, 300, 20).unwrap();
    assert_eq!(tile.key.region, PixelRegion::new(256, 0, 256, 256));
    // Band 0 is the full-resolution x, band 1 the full-resolution y, band 2 the level
    assert_eq!(tile.pixel(300, 20).unwrap(), &[600.0, 40.0, 1.0]);
}

#[test]
fn test_handles_are_unique() {
    let mut fixture = Fixture::new(4);
    let mut cache = TileCache::new(256);
    fixture.ensure(&mut cache, 2, &extent(0.0, 0.0, 8000.0, 8000.0));

    let handles: HashSet<_> = cache.tiles().iter().map(|tile| tile.handle).collect();
    assert_eq!(handles.len(), cache.len());
}

#[test]
fn test_failed_tiles_are_retried() {
    let mut fixture = Fixture::new(1);
    let mut cache = TileCache::new(256);
    let view = extent(0.0, 0.0, 4096.0, 4096.0);

    fixture.counters.fail_next(3);
    let first = fixture.ensure(&mut cache, 1, &view);
    assert_eq!(first.failed, 3);
    assert_eq!(first.loaded, 61);
    assert_eq!(cache.len(), 61);

    let second = fixture.ensure(&mut cache, 1, &view);
    assert_eq!(second.resident, 61);
    assert_eq!(second.loaded, 3);
    assert_eq!(cache.len(), 64);
}

#[test]
fn test_parallel_and_sequential_load_the_same_tiles() {
    let view = extent(1234.0, 567.0, 3000.0, 2500.0);

    let mut sequential = Fixture::new(1);
    let mut sequential_cache = TileCache::new(256);
    sequential.ensure(&mut sequential_cache, 1, &view);

    let mut parallel = Fixture::new(4);
    let mut parallel_cache = TileCache::new(256);
    let stats = parallel.ensure(&mut parallel_cache, 1, &view);

    assert_eq!(stats.failed, 0);
    assert_eq!(resident_keys(&sequential_cache), resident_keys(&parallel_cache));
}

// =============================================================================
// Eviction
// =============================================================================

#[test]
fn test_pan_evicts_tiles_out_of_view() {
    let mut fixture = Fixture::new(2);
    let mut cache = TileCache::new(256);

    fixture.ensure(&mut cache, 1, &extent(0.0, 0.0, 4096.0, 4096.0));
    let moved = extent(2048.0, 0.0, 4096.0, 4096.0);
    let evicted = fixture.evict(&mut cache, 1, &moved);

    // Level-1 columns 0..4 left the view
    assert_eq!(evicted, 4 * 8);
    let stats = fixture.ensure(&mut cache, 1, &moved);
    assert_eq!(stats.resident, 32);
    assert_eq!(stats.loaded, 32);
}

#[test]
fn test_level_change_evicts_everything() {
    let mut fixture = Fixture::new(1);
    let mut cache = TileCache::new(256);
    let view = extent(0.0, 0.0, 4096.0, 4096.0);

    fixture.ensure(&mut cache, 1, &view);
    assert_eq!(fixture.evict(&mut cache, 2, &view), 64);
    assert!(cache.is_empty());
}

#[test]
fn test_band_change_evicts_everything() {
    let mut fixture = Fixture::new(1);
    let mut cache = TileCache::new(256);
    let view = extent(0.0, 0.0, 2048.0, 2048.0);

    fixture.ensure(&mut cache, 2, &view);
    let resident = cache.len();
    fixture.bands = BandSelection::gray(2);
    assert_eq!(fixture.evict(&mut cache, 2, &view), resident);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_evict_then_ensure_matches_plan(
        (x0, y0, w0, h0, level0) in (0.0..9000.0f64, 0.0..7000.0f64, 1.0..4000.0f64, 1.0..4000.0f64, 1usize..4),
        (x1, y1, w1, h1, level1) in (0.0..9000.0f64, 0.0..7000.0f64, 1.0..4000.0f64, 1.0..4000.0f64, 1usize..4),
    ) {
        let mut fixture = Fixture::new(2);
        let mut cache = TileCache::new(256);

        fixture.ensure(&mut cache, level0, &extent(x0, y0, w0, h0));

        let view = extent(x1, y1, w1, h1);
        fixture.evict(&mut cache, level1, &view);
        let stats = fixture.ensure(&mut cache, level1, &view);
        prop_assert_eq!(stats.failed, 0);

        let planned: HashSet<TileKey> = fixture.plan(&cache, level1, &view).into_iter().collect();
        prop_assert_eq!(resident_keys(&cache), planned);
    }
}
