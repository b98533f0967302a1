//! Viewport renderer integration tests.
//!
//! Tests verify:
//! - Level selection follows zoom
//! - Render handles of evicted and cleared tiles are released
//! - Thread count, band and color changes on live layers
//! - Reprojected layers still produce valid tiles

use std::collections::HashSet;

use raster_viewport::config::RendererSettings;
use raster_viewport::error::{LayerError, ReplicationError};
use raster_viewport::geometry::Point2;
use raster_viewport::projection::SpatialReference;
use raster_viewport::render::{RecordingTarget, Viewport, ViewportRenderer};
use raster_viewport::tile::{BandSelection, ResolutionAlgorithm};

use super::test_utils::{GradientSource, IMAGE_HEIGHT, IMAGE_WIDTH};

fn renderer(threads: usize) -> (ViewportRenderer, usize) {
    let mut renderer = ViewportRenderer::new(RendererSettings {
        threads,
        ..RendererSettings::default()
    });
    let layer = renderer
        .add_layer(Box::new(GradientSource::standard()), BandSelection::rgb(0, 1, 2))
        .unwrap();
    (renderer, layer)
}

/// 1024x768 viewport showing the whole standard image.
fn fitted_viewport(renderer: &ViewportRenderer, layer: usize) -> Viewport {
    let mut viewport = Viewport::new(1024, 768);
    let extent = renderer.layer(layer).unwrap().extent(&viewport).unwrap().unwrap();
    viewport.fit(&extent);
    viewport
}

// =============================================================================
// Frames
// =============================================================================

#[test]
fn test_first_frame_shows_coarsest_fitting_level() {
    let (mut renderer, layer) = renderer(1);
    let viewport = fitted_viewport(&renderer, layer);
    let mut target = RecordingTarget::new();

    // 10.4 full-resolution pixels per screen pixel is closest to level 3 (1/8)
    let stats = renderer.render_frame(&viewport, &mut target);
    assert_eq!(stats.levels, vec![Some(3)]);

    // Level 3 is 1250x1000, i.e. 5x4 tiles
    assert_eq!(stats.tiles, 20);
    assert_eq!(stats.loaded, 20);
    assert_eq!(stats.failed, 0);
    assert_eq!(target.frames(), 1);
    assert_eq!(target.live_handles(), 20);
}

#[test]
fn test_unchanged_view_loads_nothing() {
    let (mut renderer, layer) = renderer(2);
    let viewport = fitted_viewport(&renderer, layer);
    let mut target = RecordingTarget::new();

    renderer.render_frame(&viewport, &mut target);
    let stats = renderer.render_frame(&viewport, &mut target);

    assert_eq!(stats.loaded, 0);
    assert_eq!(stats.evicted, 0);
    assert_eq!(stats.tiles, 20);
    assert_eq!(target.released(), 0);
}

#[test]
fn test_zoom_changes_level_and_releases_handles() {
    let (mut renderer, layer) = renderer(4);
    let mut viewport = fitted_viewport(&renderer, layer);
    let mut target = RecordingTarget::new();

    renderer.render_frame(&viewport, &mut target);
    let first: HashSet<_> = target
        .last_frame()
        .unwrap()
        .tiles
        .iter()
        .map(|tile| tile.handle)
        .collect();

    viewport.zoom(8.0);
    let stats = renderer.render_frame(&viewport, &mut target);

    assert_eq!(stats.levels, vec![Some(0)]);
    assert_eq!(stats.evicted, first.len());
    assert_eq!(target.released(), first.len());

    let frame = target.last_frame().unwrap();
    assert_eq!(target.live_handles(), frame.tiles.len());
    assert!(frame.tiles.iter().all(|tile| !first.contains(&tile.handle)));
    assert!(frame.tiles.iter().all(|tile| tile.quad.is_valid()));
}

#[test]
fn test_nearest_lower_falls_back_to_coarsest_level() {
    let mut renderer = ViewportRenderer::new(RendererSettings {
        resolution: ResolutionAlgorithm::NearestLower,
        ..RendererSettings::default()
    });
    let layer = renderer
        .add_layer(Box::new(GradientSource::standard()), BandSelection::rgb(0, 1, 2))
        .unwrap();
    let viewport = fitted_viewport(&renderer, layer);
    let mut target = RecordingTarget::new();

    // No level is coarser than the screen needs, so the coarsest one is used
    let stats = renderer.render_frame(&viewport, &mut target);
    assert_eq!(stats.levels, vec![Some(3)]);
}

#[test]
fn test_hidden_layer_is_not_rendered() {
    let (mut renderer, layer) = renderer(1);
    let viewport = fitted_viewport(&renderer, layer);
    let mut target = RecordingTarget::new();

    renderer.layer_mut(layer).unwrap().set_visible(false);
    let stats = renderer.render_frame(&viewport, &mut target);

    assert_eq!(stats.levels, vec![None]);
    assert_eq!(stats.tiles, 0);
    assert_eq!(target.frames(), 1);
}

#[test]
fn test_two_layers_are_drawn_in_order() {
    let (mut renderer, first) = renderer(1);
    let second = renderer
        .add_layer(
            Box::new(GradientSource::new(IMAGE_WIDTH / 2, IMAGE_HEIGHT / 2)),
            BandSelection::gray(1),
        )
        .unwrap();
    assert_eq!(second, 1);

    let viewport = fitted_viewport(&renderer, first);
    let mut target = RecordingTarget::new();
    let stats = renderer.render_frame(&viewport, &mut target);
    assert_eq!(stats.levels.len(), 2);

    let layers: Vec<usize> = target
        .last_frame()
        .unwrap()
        .tiles
        .iter()
        .map(|tile| tile.layer)
        .collect();
    let boundary = layers.iter().position(|l| *l == 1).unwrap();
    assert!(layers[..boundary].iter().all(|l| *l == 0));
    assert!(layers[boundary..].iter().all(|l| *l == 1));

    renderer.remove_layer(second, &mut target).unwrap();
    assert_eq!(renderer.layers().len(), 1);
    assert_eq!(target.released(), layers.len() - boundary);
    assert!(matches!(
        renderer.remove_layer(5, &mut target),
        Err(LayerError::UnknownLayer(5))
    ));
}

// =============================================================================
// Layer Settings
// =============================================================================

#[test]
fn test_invalid_bands_are_rejected() {
    let mut renderer = ViewportRenderer::default();
    let result = renderer.add_layer(Box::new(GradientSource::standard()), BandSelection::rgb(0, 1, 5));
    assert!(matches!(result, Err(LayerError::InvalidBand { band: 5, count: 3 })));

    let result = renderer.add_layer(Box::new(GradientSource::standard()), BandSelection::new(vec![]));
    assert!(matches!(result, Err(LayerError::NoBands)));
    assert!(renderer.layers().is_empty());
}

#[test]
fn test_band_change_reloads_tiles() {
    let (mut renderer, layer) = renderer(2);
    let viewport = fitted_viewport(&renderer, layer);
    let mut target = RecordingTarget::new();
    renderer.render_frame(&viewport, &mut target);

    renderer.set_bands(layer, BandSelection::gray(2)).unwrap();
    let stats = renderer.render_frame(&viewport, &mut target);
    assert_eq!(stats.evicted, 20);
    assert_eq!(stats.loaded, 20);

    let tile = &target.last_frame().unwrap().tiles[0];
    // One band plus alpha
    assert_eq!(tile.buffer.bands(), 2);
}

#[test]
fn test_thread_count_changes() {
    let (mut renderer, layer) = renderer(1);

    assert!(matches!(
        renderer.set_thread_count(0),
        Err(ReplicationError::InvalidThreadCount(0))
    ));

    renderer.set_thread_count(3).unwrap();
    assert_eq!(renderer.settings().threads, 3);
    assert_eq!(renderer.layer(layer).unwrap().replicator().thread_count(), 3);

    let viewport = fitted_viewport(&renderer, layer);
    let mut target = RecordingTarget::new();
    let stats = renderer.render_frame(&viewport, &mut target);
    assert_eq!(stats.loaded, 20);

    renderer.set_thread_count(1).unwrap();
    assert_eq!(renderer.layer(layer).unwrap().replicator().thread_count(), 1);
}

#[test]
fn test_pixel_at_reads_resident_tile() {
    let (mut renderer, layer) = renderer(1);
    let viewport = fitted_viewport(&renderer, layer);
    let mut target = RecordingTarget::new();

    assert!(renderer.pixel_at(layer, Point2::new(84.0, 84.0)).is_none());
    renderer.render_frame(&viewport, &mut target);

    // Level 3 pixel (10, 10): full-resolution (80, 80), level 3, opaque
    let pixel = renderer.pixel_at(layer, Point2::new(84.0, 84.0)).unwrap();
    for (actual, wanted) in pixel.iter().zip([80.0f32, 80.0, 3.0, 255.0]) {
        assert!((actual - wanted).abs() < 1e-3, "{} != {}", actual, wanted);
    }
    assert!(renderer.pixel_at(layer, Point2::new(-50.0, 10.0)).is_none());
}

#[test]
fn test_auto_color_adjust_clears_tiles() {
    let (mut renderer, layer) = renderer(2);
    let viewport = fitted_viewport(&renderer, layer);
    let mut target = RecordingTarget::new();

    let ranges = renderer.auto_color_adjust(layer, 0.02, 0.02, &mut target).unwrap();
    assert!(ranges.is_empty());

    renderer.render_frame(&viewport, &mut target);
    let ranges = renderer.auto_color_adjust(layer, 0.02, 0.02, &mut target).unwrap();

    assert_eq!(ranges.len(), 3);
    assert!(ranges.iter().all(|(low, high)| low <= high));
    assert_eq!(renderer.layer(layer).unwrap().color().ranges, ranges);
    assert_eq!(target.live_handles(), 0);
    assert_eq!(target.released(), 20);

    let stats = renderer.render_frame(&viewport, &mut target);
    assert_eq!(stats.loaded, 20);
}

#[test]
fn test_auto_color_adjust_reaches_source_range() {
    let mut renderer = ViewportRenderer::new(RendererSettings {
        threads: 2,
        ..RendererSettings::default()
    });
    let layer = renderer
        .add_layer(Box::new(GradientSource::standard()), BandSelection::gray(0))
        .unwrap();
    let viewport = fitted_viewport(&renderer, layer);
    let mut target = RecordingTarget::new();
    renderer.render_frame(&viewport, &mut target);

    // Band 0 holds the full-resolution x: level 3 covers 0..=9992, far past
    // the default [0, 255] display range
    let first = renderer.auto_color_adjust(layer, 0.0, 0.0, &mut target).unwrap();
    assert_eq!(first, vec![(0.0, 9992.0)]);

    renderer.render_frame(&viewport, &mut target);
    let second = renderer.auto_color_adjust(layer, 0.0, 0.0, &mut target).unwrap();
    assert_eq!(second, first);
}

// =============================================================================
// Projection
// =============================================================================

#[test]
fn test_reprojected_layer() {
    let mut renderer = ViewportRenderer::new(RendererSettings {
        threads: 2,
        ..RendererSettings::default()
    });
    let source = GradientSource::new(3600, 1600).with_georeference(
        Point2::new(-180.0, 80.0),
        (0.1, -0.1),
        SpatialReference::Epsg(4326),
    );
    let layer = renderer.add_layer(Box::new(source), BandSelection::rgb(0, 1, 2)).unwrap();

    let mut viewport = Viewport::new(800, 600);
    viewport.set_spacing((1.0, -1.0));
    viewport.set_spatial_reference(SpatialReference::Epsg(3857));
    let extent = renderer.layer(layer).unwrap().extent(&viewport).unwrap().unwrap();
    // Web Mercator spans about +/-20037508 m in x
    assert!(extent.min_x < -2.0e7 && extent.max_x > 2.0e7);
    viewport.fit(&extent);

    let mut target = RecordingTarget::new();
    let stats = renderer.render_frame(&viewport, &mut target);
    assert!(stats.loaded > 0);
    assert_eq!(stats.failed, 0);
    assert!(target
        .last_frame()
        .unwrap()
        .tiles
        .iter()
        .all(|tile| tile.quad.is_valid()));
}
