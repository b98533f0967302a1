//! Per-frame orchestration of layers.

use tracing::{debug, debug_span, info, warn};

use crate::chain::ColorRemapConfig;
use crate::config::RendererSettings;
use crate::context::ViewerContext;
use crate::error::{LayerError, ReplicationError};
use crate::geometry::Point2;
use crate::source::ImageSource;
use crate::tile::BandSelection;

use super::layer::Layer;
use super::target::{Frame, FrameTile, RenderTarget};
use super::viewport::Viewport;

/// Counters for one rendered frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub generation: u64,
    /// Level selected per layer (`None` for hidden or failed layers)
    pub levels: Vec<Option<usize>>,
    /// Tiles presented
    pub tiles: usize,
    /// Tiles decoded this frame
    pub loaded: usize,
    /// Tiles whose decode failed this frame
    pub failed: usize,
    /// Tiles evicted this frame
    pub evicted: usize,
}

/// Draws a stack of layers into a viewport.
///
/// Owns the [`ViewerContext`] all layers allocate identifiers from.
#[derive(Debug)]
pub struct ViewportRenderer {
    ctx: ViewerContext,
    settings: RendererSettings,
    layers: Vec<Layer>,
}

impl Default for ViewportRenderer {
    fn default() -> Self {
        Self::new(RendererSettings::default())
    }
}

impl ViewportRenderer {
    pub fn new(settings: RendererSettings) -> Self {
        Self {
            ctx: ViewerContext::new(),
            settings,
            layers: Vec::new(),
        }
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn context(&self) -> &ViewerContext {
        &self.ctx
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// Add a layer on top of the stack and return its index.
    pub fn add_layer(
        &mut self,
        source: Box<dyn ImageSource>,
        bands: BandSelection,
    ) -> Result<usize, LayerError> {
        self.add_layer_with_color(source, bands, ColorRemapConfig::default())
    }

    pub fn add_layer_with_color(
        &mut self,
        source: Box<dyn ImageSource>,
        bands: BandSelection,
        color: ColorRemapConfig,
    ) -> Result<usize, LayerError> {
        let layer = Layer::new(source, bands, color, &self.settings, &self.ctx)?;
        self.layers.push(layer);
        Ok(self.layers.len() - 1)
    }

    /// Remove a layer, releasing the render handles of its tiles.
    pub fn remove_layer(&mut self, index: usize, target: &mut dyn RenderTarget) -> Result<(), LayerError> {
        if index >= self.layers.len() {
            return Err(LayerError::UnknownLayer(index));
        }
        let mut layer = self.layers.remove(index);
        for tile in layer.clear() {
            target.release(tile.handle);
        }
        Ok(())
    }

    /// Render one frame.
    ///
    /// Every visible layer evicts tiles that left the view (their handles are
    /// released first), loads the missing ones, and the resident set of all
    /// layers is presented. Tiles that fail to load leave gaps in this frame.
    pub fn render_frame(&mut self, viewport: &Viewport, target: &mut dyn RenderTarget) -> FrameStats {
        let span = debug_span!("frame", generation = viewport.generation());
        let _enter = span.enter();

        let snapshot = viewport.snapshot();
        let mut stats = FrameStats {
            generation: snapshot.generation,
            ..FrameStats::default()
        };

        for layer in self.layers.iter_mut() {
            if !layer.is_visible() {
                stats.levels.push(None);
                continue;
            }
            match layer.refresh(&snapshot, &self.ctx) {
                Ok(refresh) => {
                    stats.evicted += refresh.evicted.len();
                    for tile in refresh.evicted {
                        target.release(tile.handle);
                    }
                    stats.loaded += refresh.ensure.loaded;
                    stats.failed += refresh.ensure.failed;
                    stats.levels.push(Some(refresh.level));
                }
                Err(e) => {
                    warn!(source = %layer.info().identifier, error = %e, "Layer cannot be projected, skipping");
                    stats.levels.push(None);
                }
            }
        }

        let tiles: Vec<FrameTile> = self
            .layers
            .iter()
            .enumerate()
            .filter(|(_, layer)| layer.is_visible())
            .flat_map(|(index, layer)| {
                layer.cache().tiles().iter().map(move |tile| FrameTile {
                    layer: index,
                    handle: tile.handle,
                    buffer: tile.buffer.clone(),
                    quad: tile.quad,
                })
            })
            .collect();
        stats.tiles = tiles.len();

        target.present(&Frame {
            viewport: snapshot,
            tiles,
        });

        debug!(
            tiles = stats.tiles,
            loaded = stats.loaded,
            failed = stats.failed,
            evicted = stats.evicted,
            "Rendered frame"
        );
        stats
    }

    /// Change the number of worker threads of every layer.
    ///
    /// Layers whose replication fails fall back to one thread; the first such
    /// error is returned after all layers were updated.
    pub fn set_thread_count(&mut self, count: usize) -> Result<(), ReplicationError> {
        if count == 0 {
            return Err(ReplicationError::InvalidThreadCount(count));
        }
        self.settings.threads = count;

        let mut first_error = None;
        for layer in self.layers.iter_mut() {
            if let Err(e) = layer.set_thread_count(count, &self.ctx) {
                first_error.get_or_insert(e);
            }
        }
        info!(threads = count, layers = self.layers.len(), "Set thread count");
        first_error.map_or(Ok(()), Err)
    }

    pub fn set_bands(&mut self, index: usize, bands: BandSelection) -> Result<(), LayerError> {
        self.layers
            .get_mut(index)
            .ok_or(LayerError::UnknownLayer(index))?
            .set_bands(bands)
    }

    /// Replace a layer's color mapping on every clone and drop its tiles.
    pub fn set_color_settings(
        &mut self,
        index: usize,
        config: ColorRemapConfig,
        target: &mut dyn RenderTarget,
    ) -> Result<(), LayerError> {
        let layer = self
            .layers
            .get_mut(index)
            .ok_or(LayerError::UnknownLayer(index))?;
        for tile in layer.set_color(config)? {
            target.release(tile.handle);
        }
        Ok(())
    }

    /// Stretch a layer's colors to the quantiles of its resident pixels.
    ///
    /// Returns the new per-band ranges, or an empty list (and no change) when
    /// nothing is resident yet.
    pub fn auto_color_adjust(
        &mut self,
        index: usize,
        low_cut: f64,
        high_cut: f64,
        target: &mut dyn RenderTarget,
    ) -> Result<Vec<(f64, f64)>, LayerError> {
        let layer = self.layers.get_mut(index).ok_or(LayerError::UnknownLayer(index))?;
        let ranges = layer.color_statistics(low_cut, high_cut);
        if ranges.is_empty() {
            return Ok(ranges);
        }

        let config = ColorRemapConfig {
            ranges: ranges.clone(),
            ..layer.color().clone()
        };
        self.set_color_settings(index, config, target)?;
        info!(layer = index, ranges = ?ranges, "Adjusted colors");
        Ok(ranges)
    }

    /// Band values of a layer at a viewport point, if a resident tile covers it.
    pub fn pixel_at(&self, index: usize, point: Point2) -> Option<Vec<f32>> {
        self.layers.get(index)?.pixel_at(point)
    }
}
