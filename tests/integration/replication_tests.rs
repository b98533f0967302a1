//! Pipeline replication integration tests.
//!
//! Tests verify:
//! - Clone handles for every thread and nothing past the count
//! - Shrinking to one clone and growing back reuses the same decoders
//! - Concurrent clones never run a shared decoder re-entrantly
//! - Stage configuration reaches every clone

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use raster_viewport::chain::{
    BlendConfig, ChainReplicator, ColorRemapConfig, PipelineBuilder, SharedDecoder, StageConfig,
};
use raster_viewport::context::ViewerContext;
use raster_viewport::error::ReplicationError;
use raster_viewport::geometry::PixelRegion;
use raster_viewport::projection::{CoordinateBridge, Rotation, SpatialReference};
use raster_viewport::render::ChainLoader;
use raster_viewport::source::ImageSource;
use raster_viewport::tile::{BandSelection, TileContext, TileKey, TileLoader};

use super::test_utils::{DecodeCounters, GradientSource};

/// Decode then color remap over the standard gradient, not yet replicated.
fn remap_chain(ctx: &ViewerContext, source: GradientSource) -> ChainReplicator {
    let mut builder = PipelineBuilder::new(ctx);
    let decode = builder.decode(Box::new(source));
    builder.color_remap(ColorRemapConfig::default(), decode).unwrap();

    let mut replicator = ChainReplicator::new();
    replicator.set_original(builder.build().unwrap());
    replicator
}

fn key(x: i64, y: i64) -> TileKey {
    TileKey::new(PixelRegion::new(x, y, 64, 64), 2, BandSelection::rgb(0, 1, 2))
}

// =============================================================================
// Clone Handles
// =============================================================================

#[test]
fn test_clone_handles_for_four_threads() {
    let ctx = ViewerContext::new();
    let mut replicator = remap_chain(&ctx, GradientSource::standard());
    replicator.set_thread_count(4, &ctx).unwrap();

    let handles: Vec<_> = (0..4).map(|i| replicator.get_clone(i).unwrap()).collect();
    assert!(replicator.get_clone(4).is_none());

    let terminals: HashSet<_> = handles.iter().map(|h| h.terminal).collect();
    assert_eq!(terminals.len(), 4);
    for (i, handle) in handles.iter().enumerate() {
        assert_eq!(handle.clone, i);
    }
}

#[test]
fn test_decode_only_pipeline_four_clones() {
    let ctx = ViewerContext::new();
    let mut builder = PipelineBuilder::new(&ctx);
    builder.decode(Box::new(GradientSource::standard()));
    let mut replicator = ChainReplicator::new();
    replicator.set_original(builder.build().unwrap());

    replicator.replicate(4, &ctx).unwrap();

    let terminals: HashSet<_> = (0..4)
        .map(|i| replicator.get_clone(i).unwrap().terminal)
        .collect();
    assert_eq!(terminals.len(), 4);
    assert!(replicator.get_clone(4).is_none());
    assert_eq!(replicator.adapters().len(), 1);
}

#[test]
fn test_without_original() {
    let ctx = ViewerContext::new();
    let mut replicator = ChainReplicator::new();

    assert!(!replicator.has_original());
    assert_eq!(replicator.thread_count(), 0);
    assert!(replicator.get_clone(0).is_none());
    assert!(matches!(
        replicator.set_thread_count(2, &ctx),
        Err(ReplicationError::NoOriginal)
    ));
}

#[test]
fn test_zero_threads_is_rejected() {
    let ctx = ViewerContext::new();
    let mut replicator = remap_chain(&ctx, GradientSource::standard());
    replicator.set_thread_count(3, &ctx).unwrap();

    assert!(matches!(
        replicator.set_thread_count(0, &ctx),
        Err(ReplicationError::InvalidThreadCount(0))
    ));
    assert_eq!(replicator.thread_count(), 3);
}

#[test]
fn test_failed_replication_keeps_previous_state() {
    let ctx = ViewerContext::new();
    let adapter = Arc::new(SharedDecoder::new(
        ctx.next_adapter_id(),
        Box::new(GradientSource::standard()),
    ));
    let mut builder = PipelineBuilder::new(&ctx);
    let decode = builder.shared_decode(&adapter);
    builder.color_remap(ColorRemapConfig::default(), decode).unwrap();
    let pipeline = builder.build().unwrap();
    drop(adapter);

    let mut replicator = ChainReplicator::new();
    replicator.set_original(pipeline);
    let original = replicator.get_clone(0).unwrap();

    assert!(matches!(
        replicator.set_thread_count(4, &ctx),
        Err(ReplicationError::UnknownAdapter(_))
    ));
    assert_eq!(replicator.thread_count(), 1);
    assert_eq!(replicator.get_clone(0), Some(original));
    assert!(replicator.get_clone(1).is_none());
    assert!(replicator.adapters().is_empty());
}

// =============================================================================
// Resizing
// =============================================================================

#[test]
fn test_shrink_and_grow_reuse_adapters() {
    let ctx = ViewerContext::new();
    let mut replicator = remap_chain(&ctx, GradientSource::standard());

    replicator.set_thread_count(4, &ctx).unwrap();
    let adapters: Vec<_> = replicator.adapters().to_vec();
    assert_eq!(adapters.len(), 1);
    let original_terminal = replicator.get_clone(0).unwrap().terminal;

    replicator.set_thread_count(1, &ctx).unwrap();
    assert_eq!(replicator.thread_count(), 1);
    assert_eq!(replicator.get_clone(0).unwrap().terminal, original_terminal);

    replicator.set_thread_count(4, &ctx).unwrap();
    assert_eq!(replicator.thread_count(), 4);
    assert_eq!(replicator.adapters().len(), 1);
    assert!(Arc::ptr_eq(&replicator.adapters()[0], &adapters[0]));

    for i in 0..4 {
        let pipeline = replicator.pipeline(i).unwrap();
        let shared = pipeline.shared_adapters();
        assert_eq!(shared.len(), 1);
        assert!(Arc::ptr_eq(&shared[0], &adapters[0]));
    }
}

#[test]
fn test_same_count_is_a_no_op() {
    let ctx = ViewerContext::new();
    let mut replicator = remap_chain(&ctx, GradientSource::standard());
    replicator.set_thread_count(3, &ctx).unwrap();
    let before: Vec<_> = (0..3).map(|i| replicator.get_clone(i).unwrap()).collect();

    replicator.set_thread_count(3, &ctx).unwrap();
    let after: Vec<_> = (0..3).map(|i| replicator.get_clone(i).unwrap()).collect();
    assert_eq!(before, after);
}

#[test]
fn test_replicas_produce_identical_tiles() {
    let ctx = ViewerContext::new();
    let mut replicator = remap_chain(&ctx, GradientSource::standard());
    replicator.set_thread_count(3, &ctx).unwrap();

    let key = key(128, 64);
    let buffers: Vec<_> = replicator
        .clones_mut()
        .iter_mut()
        .map(|pipeline| pipeline.process(&key).unwrap())
        .collect();

    assert_eq!(buffers[0].bands(), 4);
    assert_eq!(buffers[0], buffers[1]);
    assert_eq!(buffers[1], buffers[2]);
}

#[test]
fn test_blend_of_two_sources_replicates() {
    let ctx = ViewerContext::new();
    let first = GradientSource::standard();
    let second = GradientSource::standard();

    let mut builder = PipelineBuilder::new(&ctx);
    let a = builder.decode(Box::new(first));
    let b = builder.decode(Box::new(second));
    builder
        .blend(BlendConfig { weights: vec![3.0, 1.0] }, &[a, b])
        .unwrap();

    let mut replicator = ChainReplicator::new();
    replicator.set_original(builder.build().unwrap());
    replicator.set_thread_count(2, &ctx).unwrap();

    assert_eq!(replicator.adapters().len(), 2);
    let key = key(0, 0);
    let expected = replicator.pipeline_mut(0).unwrap().process(&key).unwrap();
    let actual = replicator.pipeline_mut(1).unwrap().process(&key).unwrap();
    assert_eq!(expected, actual);
    // Both inputs are identical, so the blend equals either input
    let pixel = expected.pixel(3, 5).unwrap();
    for (actual, wanted) in pixel.iter().zip([12.0f32, 20.0, 2.0]) {
        assert!((actual - wanted).abs() < 1e-4, "{} != {}", actual, wanted);
    }
}

// =============================================================================
// Stage Configuration
// =============================================================================

#[test]
fn test_stage_config_reaches_every_clone() {
    let ctx = ViewerContext::new();
    let mut replicator = remap_chain(&ctx, GradientSource::standard());
    replicator.set_thread_count(3, &ctx).unwrap();

    let config = ColorRemapConfig {
        ranges: vec![(0.0, 1000.0); 3],
        gamma: 2.0,
        no_data: None,
    };
    replicator
        .set_stage_config(1, StageConfig::ColorRemap(config.clone()))
        .unwrap();
    replicator.initialize();

    for i in 0..3 {
        assert_eq!(
            replicator.pipeline(i).unwrap().stage_config(1),
            Some(StageConfig::ColorRemap(config.clone()))
        );
    }
}

#[test]
fn test_replicas_match_original_before_initialize() {
    let ctx = ViewerContext::new();
    let mut replicator = remap_chain(&ctx, GradientSource::standard());

    let stretched = ColorRemapConfig {
        ranges: vec![(0.0, 2000.0); 3],
        ..ColorRemapConfig::default()
    };
    replicator
        .set_stage_config(1, StageConfig::ColorRemap(stretched.clone()))
        .unwrap();
    replicator.set_thread_count(3, &ctx).unwrap();

    let key = key(128, 64);
    let stale: Vec<_> = replicator
        .clones_mut()
        .iter_mut()
        .map(|pipeline| pipeline.process(&key).unwrap())
        .collect();
    assert_eq!(stale[0], stale[1]);
    assert_eq!(stale[1], stale[2]);
    for i in 0..3 {
        assert_eq!(
            replicator.pipeline(i).unwrap().stage_config(1),
            Some(StageConfig::ColorRemap(stretched.clone()))
        );
    }

    replicator.initialize();
    let fresh: Vec<_> = replicator
        .clones_mut()
        .iter_mut()
        .map(|pipeline| pipeline.process(&key).unwrap())
        .collect();
    assert_eq!(fresh[0], fresh[1]);
    assert_eq!(fresh[1], fresh[2]);
    assert_ne!(fresh[0], stale[0]);
}

#[test]
fn test_mismatched_stage_config_changes_nothing() {
    let ctx = ViewerContext::new();
    let mut replicator = remap_chain(&ctx, GradientSource::standard());
    replicator.set_thread_count(2, &ctx).unwrap();

    let result = replicator.set_stage_config(1, StageConfig::Blend(BlendConfig::default()));
    assert!(matches!(result, Err(ReplicationError::StageKindMismatch { .. })));

    let result = replicator.set_stage_config(7, StageConfig::ColorRemap(ColorRemapConfig::default()));
    assert!(matches!(result, Err(ReplicationError::StageOutOfRange(7))));

    for i in 0..2 {
        assert_eq!(
            replicator.pipeline(i).unwrap().stage_config(1),
            Some(StageConfig::ColorRemap(ColorRemapConfig::default()))
        );
    }
}

// =============================================================================
// Concurrency
// =============================================================================

fn load_on_threads(threads: usize, tiles: i64) -> (DecodeCounters, ChainReplicator) {
    let source = GradientSource::standard().with_delay(Duration::from_millis(2));
    let counters = source.counters();
    let info = source.info();
    let ctx = ViewerContext::new();
    let bridge = CoordinateBridge::new(&SpatialReference::None, Rotation::default(), &info).unwrap();

    let mut replicator = remap_chain(&ctx, source);
    replicator.set_thread_count(threads, &ctx).unwrap();

    let bands = BandSelection::rgb(0, 1, 2);
    let tiles_ctx = TileContext {
        bridge: &bridge,
        level: &info.levels[2],
        bands: &bands,
        viewer: &ctx,
    };
    let keys: Vec<_> = (0..tiles).map(|i| key(i * 64, 0)).collect();

    let mut loader = ChainLoader::new(&mut replicator);
    let results = loader.load(keys, &tiles_ctx);
    assert_eq!(results.len(), tiles as usize);
    assert!(results.iter().all(|(_, result)| result.is_ok()));

    (counters, replicator)
}

#[test]
fn test_shared_decoder_is_never_reentered() {
    let (counters, replicator) = load_on_threads(4, 32);

    assert_eq!(counters.decodes(), 32);
    assert_eq!(counters.overlaps(), 0);
    assert_eq!(replicator.adapters()[0].decode_count(), 32);
}

#[test]
fn test_every_key_is_loaded_once() {
    let source = GradientSource::standard();
    let info = source.info();
    let ctx = ViewerContext::new();
    let bridge = CoordinateBridge::new(&SpatialReference::None, Rotation::default(), &info).unwrap();
    let mut replicator = remap_chain(&ctx, source);
    replicator.set_thread_count(3, &ctx).unwrap();

    let bands = BandSelection::rgb(0, 1, 2);
    let tiles_ctx = TileContext {
        bridge: &bridge,
        level: &info.levels[2],
        bands: &bands,
        viewer: &ctx,
    };
    let keys: Vec<_> = (0..10).map(|i| key(i * 64, 64)).collect();

    let mut loader = ChainLoader::new(&mut replicator);
    let loaded: HashSet<_> = loader
        .load(keys.clone(), &tiles_ctx)
        .into_iter()
        .map(|(key, _)| key)
        .collect();
    let expected: HashSet<_> = keys.into_iter().collect();
    assert_eq!(loaded, expected);
}
