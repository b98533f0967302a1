//! One displayed image: its pipeline clones, tile cache and current level.

use tracing::{debug, info, warn};

use crate::chain::{ChainReplicator, ColorRemapConfig, PipelineBuilder, StageConfig};
use crate::config::RendererSettings;
use crate::context::ViewerContext;
use crate::error::{LayerError, ProjectionError, ReplicationError};
use crate::geometry::{Extent, Point2};
use crate::projection::CoordinateBridge;
use crate::source::{ImageSource, SourceInfo};
use crate::tile::{
    BandSelection, EnsureStats, ResolutionSelector, Tile, TileCache, TileContext,
};

use super::color;
use super::dispatch::ChainLoader;
use super::viewport::{Viewport, ViewportSnapshot};

/// Position of the decode stage in every layer pipeline.
const DECODE_STAGE: usize = 0;

/// Position of the color remap stage in every layer pipeline (after decode).
const COLOR_STAGE: usize = 1;

/// Result of bringing a layer up to date with a viewport.
#[derive(Debug, Default)]
pub struct LayerRefresh {
    pub level: usize,
    /// Tiles removed from the cache, whose render handles must be released
    pub evicted: Vec<Tile>,
    pub ensure: EnsureStats,
}

/// A source displayed in a viewport.
///
/// Owns the replicated decode pipeline (decode then color remap) and the
/// tile cache for the source.
pub struct Layer {
    info: SourceInfo,
    bands: BandSelection,
    color: ColorRemapConfig,
    selector: ResolutionSelector,
    cache: TileCache,
    replicator: ChainReplicator,
    bridge: Option<CoordinateBridge>,
    bridge_generation: Option<u64>,
    level: Option<usize>,
    visible: bool,
}

impl Layer {
    /// Build the layer pipeline around `source` and replicate it to
    /// `settings.threads` clones.
    ///
    /// If replication fails the layer keeps working on a single clone.
    pub fn new(
        source: Box<dyn ImageSource>,
        bands: BandSelection,
        color: ColorRemapConfig,
        settings: &RendererSettings,
        ctx: &ViewerContext,
    ) -> Result<Self, LayerError> {
        let info = source.info();
        if info.levels.is_empty() {
            return Err(LayerError::NoLevels);
        }
        check_bands(&bands, info.band_count)?;

        let mut builder = PipelineBuilder::new(ctx);
        let decode = builder.decode(source);
        builder.color_remap(color.clone(), decode)?;

        let mut replicator = ChainReplicator::new();
        replicator.set_original(builder.build()?);

        if let Err(e) = replicator.set_thread_count(settings.threads, ctx) {
            warn!(
                source = %info.identifier,
                threads = settings.threads,
                error = %e,
                "Pipeline replication failed, decoding on a single thread"
            );
        }

        info!(
            source = %info.identifier,
            levels = info.levels.len(),
            bands = ?bands.as_slice(),
            clones = replicator.thread_count(),
            "Added layer"
        );

        Ok(Self {
            info,
            bands,
            color,
            selector: ResolutionSelector::new(settings.resolution),
            cache: TileCache::new(settings.tile_size),
            replicator,
            bridge: None,
            bridge_generation: None,
            level: None,
            visible: true,
        })
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn bands(&self) -> &BandSelection {
        &self.bands
    }

    pub fn color(&self) -> &ColorRemapConfig {
        &self.color
    }

    /// Level selected by the last refresh.
    pub fn level(&self) -> Option<usize> {
        self.level
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn replicator(&self) -> &ChainReplicator {
        &self.replicator
    }

    pub fn bridge(&self) -> Option<&CoordinateBridge> {
        self.bridge.as_ref()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Bring the cache up to date with a viewport snapshot.
    ///
    /// Rebuilds the coordinate bridge when the viewport generation changed,
    /// selects the level, evicts and then ensures tiles.
    pub fn refresh(
        &mut self,
        viewport: &ViewportSnapshot,
        ctx: &ViewerContext,
    ) -> Result<LayerRefresh, ProjectionError> {
        if self.bridge.is_none() || self.bridge_generation != Some(viewport.generation) {
            self.bridge = Some(CoordinateBridge::new(
                &viewport.spatial_reference,
                viewport.rotation,
                &self.info,
            )?);
            self.bridge_generation = Some(viewport.generation);
            debug!(source = %self.info.identifier, generation = viewport.generation, "Rebuilt bridge");
        }
        let Some(bridge) = self.bridge.as_ref() else {
            return Ok(LayerRefresh::default());
        };

        let base = &self.info.levels[0];
        let ratio = bridge.scale_ratio(viewport.center(), viewport.spacing, base);
        let level = self.selector.select(ratio, &self.info.levels, self.level);
        if self.level != Some(level) {
            debug!(
                source = %self.info.identifier,
                level,
                ratio = ratio.effective(),
                "Selected level"
            );
            self.level = Some(level);
        }

        let tiles = TileContext {
            bridge,
            level: &self.info.levels[level],
            bands: &self.bands,
            viewer: ctx,
        };

        let evicted = self.cache.evict(&viewport.extent, &tiles);
        let mut loader = ChainLoader::new(&mut self.replicator);
        let ensure = self.cache.ensure(&viewport.extent, &tiles, &mut loader);

        Ok(LayerRefresh {
            level,
            evicted,
            ensure,
        })
    }

    /// Change the decoded bands. Resident tiles are evicted on the next refresh.
    pub fn set_bands(&mut self, bands: BandSelection) -> Result<(), LayerError> {
        check_bands(&bands, self.info.band_count)?;
        self.bands = bands;
        Ok(())
    }

    /// Resize the pipeline clone set.
    ///
    /// When replication itself fails, the layer falls back to one clone and
    /// the error is returned.
    pub fn set_thread_count(&mut self, count: usize, ctx: &ViewerContext) -> Result<(), ReplicationError> {
        match self.replicator.set_thread_count(count, ctx) {
            Err(e @ (ReplicationError::InvalidThreadCount(_) | ReplicationError::NoOriginal)) => Err(e),
            Err(e) => {
                warn!(source = %self.info.identifier, error = %e, "Replication failed, falling back to one thread");
                self.replicator.set_thread_count(1, ctx)?;
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    /// Apply a new color mapping to every clone.
    ///
    /// Resident tiles were produced with the previous mapping, so they are
    /// all removed and returned for handle release.
    pub fn set_color(&mut self, config: ColorRemapConfig) -> Result<Vec<Tile>, LayerError> {
        self.replicator
            .set_stage_config(COLOR_STAGE, StageConfig::ColorRemap(config.clone()))?;
        self.replicator.initialize();
        self.color = config;
        Ok(self.cache.clear())
    }

    /// Per-band source ranges cutting `low_cut`/`high_cut` of the resident
    /// pixels at each end.
    ///
    /// Resident tiles hold display values, so their keys are decoded again
    /// through clone 0 to sample source values. Tiles that fail to decode
    /// are skipped. Returns an empty list when nothing is resident.
    pub fn color_statistics(&mut self, low_cut: f64, high_cut: f64) -> Vec<(f64, f64)> {
        let Some(pipeline) = self.replicator.pipeline_mut(0) else {
            return Vec::new();
        };

        let mut samples = Vec::with_capacity(self.cache.len());
        for tile in self.cache.tiles() {
            match pipeline.process_stage(DECODE_STAGE, &tile.key) {
                Ok(buffer) => samples.push(buffer),
                Err(e) => debug!(
                    source = %self.info.identifier,
                    x = tile.key.region.x,
                    y = tile.key.region.y,
                    error = %e,
                    "Skipping tile in color statistics"
                ),
            }
        }
        color::auto_adjust(&samples, self.bands.len(), low_cut, high_cut)
    }

    /// Band values at a viewport point, from the resident tile containing it.
    pub fn pixel_at(&self, point: Point2) -> Option<Vec<f32>> {
        let bridge = self.bridge.as_ref()?;
        let level = self.info.level(self.level?)?;
        let p = bridge.to_source(point, level);
        if !p.is_valid() {
            return None;
        }
        let (x, y) = (p.x.floor() as i64, p.y.floor() as i64);
        let tile = self.cache.lookup(level.index, x, y)?;
        tile.pixel(x, y).map(<[f32]>::to_vec)
    }

    /// Full-resolution bounds of the source mapped to the viewport.
    pub fn extent(&self, viewport: &Viewport) -> Result<Option<Extent>, ProjectionError> {
        let bridge = CoordinateBridge::new(
            viewport.spatial_reference(),
            *viewport.rotation(),
            &self.info,
        )?;
        let base = &self.info.levels[0];
        Ok(bridge.region_to_extent(&base.bounds(), base))
    }

    /// Remove every resident tile, returning them for handle release.
    pub fn clear(&mut self) -> Vec<Tile> {
        self.cache.clear()
    }
}

fn check_bands(bands: &BandSelection, count: usize) -> Result<(), LayerError> {
    if bands.is_empty() {
        return Err(LayerError::NoBands);
    }
    if let Some(&band) = bands.as_slice().iter().find(|b| **b >= count) {
        return Err(LayerError::InvalidBand { band, count });
    }
    Ok(())
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("source", &self.info.identifier)
            .field("bands", &self.bands)
            .field("level", &self.level)
            .field("resident", &self.cache.len())
            .field("clones", &self.replicator.thread_count())
            .finish()
    }
}
