//! Configuration management for the raster viewport.
//!
//! Two layers of configuration exist:
//! - [`Config`]: command-line arguments of the `raster-viewport` binary, via clap
//! - [`RendererSettings`]: the library-side settings a [`crate::render::ViewportRenderer`] is built with
//!
//! # Environment Variables
//!
//! Every CLI option can also be set through an environment variable with the `RVIEW_` prefix:
//!
//! - `RVIEW_INPUT` - Image file to display (PNG, JPEG or TIFF)
//! - `RVIEW_SYNTHETIC_WIDTH` - Width of the synthetic image used without input (default: 10000)
//! - `RVIEW_SYNTHETIC_HEIGHT` - Height of the synthetic image (default: 8000)
//! - `RVIEW_TILE_SIZE` - Tile edge in pixels (default: 256)
//! - `RVIEW_THREADS` - Number of pipeline clones / worker threads (default: 1)
//! - `RVIEW_RESOLUTION` - Level selection: nearest, nearest-lower, nearest-upper (default: nearest)
//! - `RVIEW_VIEWPORT_WIDTH` / `RVIEW_VIEWPORT_HEIGHT` - Screen size (default: 1024x768)
//! - `RVIEW_FRAMES` - Number of frames in the scripted session (default: 8)
//! - `RVIEW_BANDS` - Comma-separated band list (default: 0,1,2)
//! - `RVIEW_PROJECTION` - EPSG code of the viewport projection
//! - `RVIEW_LEVEL_CACHE` - Decimated levels kept in memory (default: 4)

use std::path::PathBuf;

use clap::Parser;

use crate::source::DEFAULT_LEVEL_CACHE_CAPACITY;
use crate::tile::{ResolutionAlgorithm, DEFAULT_TILE_SIZE};

// =============================================================================
// Default Values
// =============================================================================

/// Default synthetic image width.
pub const DEFAULT_SYNTHETIC_WIDTH: u32 = 10_000;

/// Default synthetic image height.
pub const DEFAULT_SYNTHETIC_HEIGHT: u32 = 8_000;

/// Default number of worker threads.
pub const DEFAULT_THREADS: usize = 1;

/// Default viewport width in screen pixels.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1024;

/// Default viewport height in screen pixels.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 768;

/// Default number of frames rendered by the CLI session.
pub const DEFAULT_FRAMES: usize = 8;

/// Largest accepted tile edge.
pub const MAX_TILE_SIZE: u32 = 8192;

/// Largest accepted thread count.
pub const MAX_THREADS: usize = 256;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Raster Viewport - interactive-style rendering of very large rasters.
///
/// Opens an image (or synthesises a large test pattern), then replays a
/// scripted pan/zoom session through the tile cache and logs per-frame
/// statistics.
#[derive(Parser, Debug, Clone)]
#[command(name = "raster-viewport")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Source Configuration
    // =========================================================================
    /// Image file to display. Without it a synthetic gradient is used.
    #[arg(short, long, env = "RVIEW_INPUT")]
    pub input: Option<PathBuf>,

    /// Width of the synthetic image.
    #[arg(long, default_value_t = DEFAULT_SYNTHETIC_WIDTH, env = "RVIEW_SYNTHETIC_WIDTH")]
    pub synthetic_width: u32,

    /// Height of the synthetic image.
    #[arg(long, default_value_t = DEFAULT_SYNTHETIC_HEIGHT, env = "RVIEW_SYNTHETIC_HEIGHT")]
    pub synthetic_height: u32,

    /// Number of decimated levels kept in memory by the source.
    #[arg(long, default_value_t = DEFAULT_LEVEL_CACHE_CAPACITY, env = "RVIEW_LEVEL_CACHE")]
    pub level_cache: usize,

    /// Source bands shown as red, green, blue (or a single gray band).
    #[arg(long, default_values_t = vec![0, 1, 2], value_delimiter = ',', env = "RVIEW_BANDS")]
    pub bands: Vec<usize>,

    // =========================================================================
    // Renderer Configuration
    // =========================================================================
    /// Tile edge in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "RVIEW_TILE_SIZE")]
    pub tile_size: u32,

    /// Number of pipeline clones, one worker thread each.
    #[arg(short, long, default_value_t = DEFAULT_THREADS, env = "RVIEW_THREADS")]
    pub threads: usize,

    /// Pyramid level selection algorithm.
    #[arg(long, value_enum, default_value_t = ResolutionAlgorithm::Nearest, env = "RVIEW_RESOLUTION")]
    pub resolution: ResolutionAlgorithm,

    /// EPSG code of the viewport projection. Defaults to the source's own.
    #[arg(long, env = "RVIEW_PROJECTION")]
    pub projection: Option<u16>,

    // =========================================================================
    // Session Configuration
    // =========================================================================
    /// Viewport width in screen pixels.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_WIDTH, env = "RVIEW_VIEWPORT_WIDTH")]
    pub viewport_width: u32,

    /// Viewport height in screen pixels.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_HEIGHT, env = "RVIEW_VIEWPORT_HEIGHT")]
    pub viewport_height: u32,

    /// Number of frames to render.
    #[arg(long, default_value_t = DEFAULT_FRAMES, env = "RVIEW_FRAMES")]
    pub frames: usize,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 || self.tile_size > MAX_TILE_SIZE {
            return Err(format!("tile_size must be between 1 and {}", MAX_TILE_SIZE));
        }

        if self.threads == 0 || self.threads > MAX_THREADS {
            return Err(format!("threads must be between 1 and {}", MAX_THREADS));
        }

        if self.bands.is_empty() {
            return Err("At least one band must be selected. Set --bands or RVIEW_BANDS".to_string());
        }

        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err("Viewport dimensions must be greater than 0".to_string());
        }

        if self.level_cache == 0 {
            return Err("level_cache must be greater than 0".to_string());
        }

        if self.input.is_none() && (self.synthetic_width == 0 || self.synthetic_height == 0) {
            return Err("Synthetic image dimensions must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Renderer settings derived from the CLI arguments.
    pub fn renderer_settings(&self) -> RendererSettings {
        RendererSettings::from(self)
    }
}

// =============================================================================
// Renderer Settings
// =============================================================================

/// Settings shared by every layer of a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererSettings {
    /// Tile edge in pixels
    pub tile_size: u32,

    /// Pipeline clones per layer
    pub threads: usize,

    /// Level selection algorithm
    pub resolution: ResolutionAlgorithm,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            threads: DEFAULT_THREADS,
            resolution: ResolutionAlgorithm::default(),
        }
    }
}

impl From<&Config> for RendererSettings {
    fn from(config: &Config) -> Self {
        Self {
            tile_size: config.tile_size,
            threads: config.threads,
            resolution: config.resolution,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
