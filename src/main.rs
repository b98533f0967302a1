//! Raster Viewport - replays a pan/zoom session over a large raster.
//!
//! This binary opens an image (or synthesises one), attaches it to a
//! renderer and logs what every frame loaded, evicted and presented.

use clap::Parser;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use raster_viewport::{
    config::Config,
    geometry::Point2,
    projection::SpatialReference,
    render::{RecordingTarget, Viewport, ViewportRenderer},
    source::{open_image_file, ImageSource, RasterSource},
    tile::BandSelection,
};

/// Fraction of the histogram cut at each end by the automatic color stretch.
const AUTO_ADJUST_CUT: f64 = 0.02;

/// Latitude covered by the synthetic image when a projection is requested.
const SYNTHETIC_MAX_LATITUDE: f64 = 80.0;

fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match open_source(&config) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to open source: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let bands = select_bands(&config.bands, source.band_count());

    let settings = config.renderer_settings();
    info!("Configuration:");
    info!("  Source: {}", source.identifier());
    info!("  Bands: {:?}", bands.as_slice());
    info!("  Tile size: {}", settings.tile_size);
    info!("  Threads: {}", settings.threads);
    info!("  Resolution: {:?}", settings.resolution);
    info!(
        "  Viewport: {}x{}, {} frame(s)",
        config.viewport_width, config.viewport_height, config.frames
    );

    let mut renderer = ViewportRenderer::new(settings);
    let layer = match renderer.add_layer(Box::new(source), bands) {
        Ok(layer) => layer,
        Err(e) => {
            error!("Failed to create layer: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut viewport = Viewport::new(config.viewport_width, config.viewport_height);
    if let Some(code) = config.projection {
        viewport.set_spatial_reference(SpatialReference::Epsg(code));
        info!("  Projection: EPSG:{}", code);
    }

    match renderer.layer(layer).map(|l| l.extent(&viewport)) {
        Some(Ok(Some(extent))) => viewport.fit(&extent),
        Some(Ok(None)) => warn!("Source extent cannot be projected, keeping the default view"),
        Some(Err(e)) => {
            error!("Projection error: {}", e);
            return ExitCode::FAILURE;
        }
        None => {}
    }

    run_session(&config, &mut renderer, layer, &mut viewport);
    ExitCode::SUCCESS
}

/// Open the input file, or build the synthetic gradient.
fn open_source(config: &Config) -> Result<RasterSource, raster_viewport::SourceError> {
    let source = match &config.input {
        Some(path) => open_image_file(path, config.level_cache)?,
        None => {
            let source = RasterSource::gradient(config.synthetic_width, config.synthetic_height)?
                .with_level_cache(config.level_cache);
            if config.projection.is_some() {
                // Geographic grid so that reprojection has something to do
                let width = f64::from(config.synthetic_width);
                let height = f64::from(config.synthetic_height);
                source.with_georeference(
                    Point2::new(-180.0, SYNTHETIC_MAX_LATITUDE),
                    (360.0 / width, -2.0 * SYNTHETIC_MAX_LATITUDE / height),
                    SpatialReference::Epsg(4326),
                )
            } else {
                source
            }
        }
    };
    Ok(source)
}

/// Requested bands, or the first band alone when the source has too few.
fn select_bands(requested: &[usize], count: usize) -> BandSelection {
    if requested.iter().all(|band| *band < count) {
        BandSelection::new(requested.to_vec())
    } else {
        warn!(
            "Source has {} band(s), showing band 0 instead of {:?}",
            count, requested
        );
        BandSelection::gray(0)
    }
}

/// Render the scripted session: zoom in on the center, then pan right.
fn run_session(
    config: &Config,
    renderer: &mut ViewportRenderer,
    layer: usize,
    viewport: &mut Viewport,
) {
    let mut target = RecordingTarget::new();
    let zoom_frames = config.frames / 2;
    let started = Instant::now();

    for frame in 0..config.frames {
        if frame > 0 && frame <= zoom_frames {
            viewport.zoom(2.0);
        } else if frame > zoom_frames {
            viewport.pan(f64::from(viewport.width()) / 4.0, 0.0);
        }

        let frame_started = Instant::now();
        let stats = renderer.render_frame(viewport, &mut target);
        info!(
            "Frame {}: level {:?}, {} tiles ({} loaded, {} failed, {} evicted) in {:?}",
            frame,
            stats.levels.get(layer).copied().flatten(),
            stats.tiles,
            stats.loaded,
            stats.failed,
            stats.evicted,
            frame_started.elapsed()
        );

        if frame == 0 {
            match renderer.auto_color_adjust(layer, AUTO_ADJUST_CUT, AUTO_ADJUST_CUT, &mut target) {
                Ok(ranges) => info!("Color ranges: {:?}", ranges),
                Err(e) => warn!("Automatic color adjustment failed: {}", e),
            }
        }
    }

    info!(
        "Session done: {} frame(s) in {:?}, {} handle(s) live, {} released",
        target.frames(),
        started.elapsed(),
        target.live_handles(),
        target.released()
    );
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "raster_viewport=debug"
    } else {
        "raster_viewport=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
