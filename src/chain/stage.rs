//! Stage kinds.
//!
//! The set of stages is closed: a decoder leaf, a per-band color remap and a
//! weighted blend of several inputs. Each stage keeps two copies of its
//! settings. Setters only touch the pending configuration; `initialize`
//! recomputes the active, derived state from it. Until a pipeline is
//! initialized again, tiles are produced with the previous settings.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use crate::context::ViewerContext;
use crate::error::TileError;
use crate::source::{ImageSource, PixelBuffer};
use crate::tile::TileKey;

use super::adapter::SharedDecoder;
use super::{AdapterId, StageId};

// =============================================================================
// Configuration
// =============================================================================

/// Serializable configuration of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageConfig {
    /// Decoder leaf reading through a shared adapter
    Decode { adapter: AdapterId },

    /// Per-band linear stretch with gamma and a no-data alpha band
    ColorRemap(ColorRemapConfig),

    /// Weighted per-pixel sum of two or more inputs
    Blend(BlendConfig),
}

impl StageConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StageConfig::Decode { .. } => "decode",
            StageConfig::ColorRemap(_) => "color_remap",
            StageConfig::Blend(_) => "blend",
        }
    }
}

/// Color remap settings.
///
/// Band `i` is mapped from `ranges[i]` to `[0, 255]`. Bands without a range
/// use `[0, 255]`, which leaves 8-bit imagery unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRemapConfig {
    pub ranges: Vec<(f64, f64)>,
    pub gamma: f64,
    pub no_data: Option<f64>,
}

impl Default for ColorRemapConfig {
    fn default() -> Self {
        Self {
            ranges: Vec::new(),
            gamma: 1.0,
            no_data: None,
        }
    }
}

/// Blend settings. Inputs without a weight get weight 1; weights are
/// normalized to sum to 1.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlendConfig {
    pub weights: Vec<f32>,
}

// =============================================================================
// Decoder Slot
// =============================================================================

/// Where a decode stage gets its pixels from.
pub(crate) enum DecoderSlot {
    /// Decoder owned by this pipeline alone
    Owned(Box<dyn ImageSource>),

    /// Decoder owned by the replicator and shared with sibling clones
    Shared {
        id: AdapterId,
        adapter: Weak<SharedDecoder>,
    },
}

impl DecoderSlot {
    pub(crate) fn shared(adapter: &Arc<SharedDecoder>) -> Self {
        DecoderSlot::Shared {
            id: adapter.id(),
            adapter: Arc::downgrade(adapter),
        }
    }

    pub(crate) fn adapter(&self) -> Option<Arc<SharedDecoder>> {
        match self {
            DecoderSlot::Owned(_) => None,
            DecoderSlot::Shared { adapter, .. } => adapter.upgrade(),
        }
    }

    pub(crate) fn adapter_id(&self) -> Option<AdapterId> {
        match self {
            DecoderSlot::Owned(_) => None,
            DecoderSlot::Shared { id, .. } => Some(*id),
        }
    }

    /// Move an owned decoder into a new shared adapter.
    ///
    /// Returns the adapter this slot now points at, which is the existing one
    /// for an already shared slot (if it is still alive).
    pub(crate) fn share(&mut self, ctx: &ViewerContext) -> Option<Arc<SharedDecoder>> {
        if let DecoderSlot::Shared { adapter, .. } = self {
            return adapter.upgrade();
        }

        let id = ctx.next_adapter_id();
        let previous = std::mem::replace(
            self,
            DecoderSlot::Shared {
                id,
                adapter: Weak::new(),
            },
        );
        match previous {
            DecoderSlot::Owned(source) => {
                let shared = Arc::new(SharedDecoder::new(id, source));
                *self = DecoderSlot::shared(&shared);
                Some(shared)
            }
            slot @ DecoderSlot::Shared { .. } => {
                *self = slot;
                None
            }
        }
    }

    fn decode(&mut self, key: &TileKey) -> Result<PixelBuffer, TileError> {
        let bands = key.bands.as_slice();
        match self {
            DecoderSlot::Owned(source) => Ok(source.decode(&key.region, key.level, bands)?),
            DecoderSlot::Shared { id, adapter } => {
                let adapter = adapter.upgrade().ok_or(TileError::AdapterReleased(*id))?;
                Ok(adapter.decode(&key.region, key.level, bands)?)
            }
        }
    }
}

// =============================================================================
// Derived State
// =============================================================================

/// Remap coefficients derived from a [`ColorRemapConfig`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RemapTable {
    /// `(offset, scale)` per band: `t = (v - offset) * scale`
    bands: Vec<(f64, f64)>,
    inverse_gamma: f64,
    no_data: Option<f64>,
}

impl RemapTable {
    fn derive(config: &ColorRemapConfig) -> Self {
        let bands = config
            .ranges
            .iter()
            .map(|(min, max)| {
                let span = max - min;
                let scale = if span.abs() > f64::EPSILON { 1.0 / span } else { 0.0 };
                (*min, scale)
            })
            .collect();
        let inverse_gamma = if config.gamma > 0.0 && config.gamma.is_finite() {
            1.0 / config.gamma
        } else {
            1.0
        };
        Self {
            bands,
            inverse_gamma,
            no_data: config.no_data,
        }
    }

    fn coefficients(&self, band: usize) -> (f64, f64) {
        self.bands.get(band).copied().unwrap_or((0.0, 1.0 / 255.0))
    }

    fn apply(&self, input: &PixelBuffer) -> PixelBuffer {
        let bands = input.bands();
        let mut out = Vec::with_capacity(input.width() as usize * input.height() as usize * (bands + 1));

        for pixel in input.pixels() {
            let mut valid = true;
            for (band, value) in pixel.iter().enumerate() {
                let v = f64::from(*value);
                if v.is_nan() || self.no_data.is_some_and(|nd| v == nd) {
                    valid = false;
                }
                let (offset, scale) = self.coefficients(band);
                let t = ((v - offset) * scale).clamp(0.0, 1.0);
                let t = if t.is_nan() { 0.0 } else { t };
                out.push((255.0 * t.powf(self.inverse_gamma)) as f32);
            }
            out.push(if valid { 255.0 } else { 0.0 });
        }

        PixelBuffer::new(input.width(), input.height(), bands + 1, out)
    }
}

// =============================================================================
// Stage
// =============================================================================

/// Runtime state of one stage.
pub(crate) enum Stage {
    Decode(DecoderSlot),
    ColorRemap {
        pending: ColorRemapConfig,
        /// Configuration `active` was derived from
        applied: ColorRemapConfig,
        active: RemapTable,
    },
    Blend {
        pending: BlendConfig,
        active: Vec<f32>,
    },
}

impl Stage {
    pub(crate) fn color_remap(config: ColorRemapConfig) -> Self {
        Stage::ColorRemap {
            active: RemapTable::derive(&config),
            applied: config.clone(),
            pending: config,
        }
    }

    pub(crate) fn blend(config: BlendConfig) -> Self {
        Stage::Blend {
            active: config.weights.clone(),
            pending: config,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Stage::Decode(_) => "decode",
            Stage::ColorRemap { .. } => "color_remap",
            Stage::Blend { .. } => "blend",
        }
    }

    /// Pending configuration, or `None` for a decoder that is still owned.
    pub(crate) fn config(&self) -> Option<StageConfig> {
        match self {
            Stage::Decode(slot) => slot
                .adapter_id()
                .map(|adapter| StageConfig::Decode { adapter }),
            Stage::ColorRemap { pending, .. } => Some(StageConfig::ColorRemap(pending.clone())),
            Stage::Blend { pending, .. } => Some(StageConfig::Blend(pending.clone())),
        }
    }

    /// Configuration the active state was derived from.
    ///
    /// Differs from [`Stage::config`] between a setter and the next
    /// `initialize`.
    pub(crate) fn active_config(&self) -> Option<StageConfig> {
        match self {
            Stage::Decode(_) => self.config(),
            Stage::ColorRemap { applied, .. } => Some(StageConfig::ColorRemap(applied.clone())),
            Stage::Blend { active, .. } => Some(StageConfig::Blend(BlendConfig {
                weights: active.clone(),
            })),
        }
    }

    /// Returns `true` if `config` may replace this stage's configuration.
    pub(crate) fn accepts(&self, config: &StageConfig) -> bool {
        match (self, config) {
            (Stage::Decode(slot), StageConfig::Decode { adapter }) => {
                slot.adapter_id() == Some(*adapter)
            }
            (Stage::ColorRemap { .. }, StageConfig::ColorRemap(_)) => true,
            (Stage::Blend { .. }, StageConfig::Blend(_)) => true,
            _ => false,
        }
    }

    /// Replace the pending configuration. Callers check [`Stage::accepts`] first.
    pub(crate) fn configure(&mut self, config: StageConfig) {
        match (self, config) {
            (Stage::ColorRemap { pending, .. }, StageConfig::ColorRemap(config)) => *pending = config,
            (Stage::Blend { pending, .. }, StageConfig::Blend(config)) => *pending = config,
            _ => {}
        }
    }

    /// Recompute the active state from the pending configuration.
    pub(crate) fn initialize(&mut self) {
        match self {
            Stage::Decode(_) => {}
            Stage::ColorRemap {
                pending,
                applied,
                active,
            } => {
                *active = RemapTable::derive(pending);
                *applied = pending.clone();
            }
            Stage::Blend { pending, active } => *active = pending.weights.clone(),
        }
    }

    pub(crate) fn process(
        &mut self,
        id: StageId,
        key: &TileKey,
        mut inputs: Vec<PixelBuffer>,
    ) -> Result<PixelBuffer, TileError> {
        match self {
            Stage::Decode(slot) => slot.decode(key),
            Stage::ColorRemap { active, .. } => {
                let input = inputs.pop().ok_or(TileError::MissingInput(id))?;
                Ok(active.apply(&input))
            }
            Stage::Blend { active, .. } => blend(id, active, &inputs),
        }
    }

    pub(crate) fn decoder_mut(&mut self) -> Option<&mut DecoderSlot> {
        match self {
            Stage::Decode(slot) => Some(slot),
            _ => None,
        }
    }

    pub(crate) fn decoder(&self) -> Option<&DecoderSlot> {
        match self {
            Stage::Decode(slot) => Some(slot),
            _ => None,
        }
    }
}

fn blend(id: StageId, weights: &[f32], inputs: &[PixelBuffer]) -> Result<PixelBuffer, TileError> {
    let first = inputs.first().ok_or(TileError::MissingInput(id))?;
    let expected = first.expected_len();

    if let Some(mismatch) = inputs.iter().find(|b| {
        b.width() != first.width() || b.height() != first.height() || b.bands() != first.bands()
    }) {
        return Err(TileError::Degenerate {
            expected,
            actual: mismatch.data().len(),
        });
    }

    let weight = |i: usize| weights.get(i).copied().unwrap_or(1.0);
    let total: f32 = (0..inputs.len()).map(weight).sum();
    let norm = if total.abs() > f32::EPSILON { 1.0 / total } else { 0.0 };

    let mut out = vec![0.0f32; expected];
    for (i, input) in inputs.iter().enumerate() {
        let w = weight(i) * norm;
        for (acc, v) in out.iter_mut().zip(input.data()) {
            *acc += w * v;
        }
    }

    Ok(PixelBuffer::new(first.width(), first.height(), first.bands(), out))
}

// =============================================================================
// Tests
// =============================================================================
