//! Stage graphs evaluated per tile.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::context::ViewerContext;
use crate::error::{ReplicationError, TileError};
use crate::source::{ImageSource, PixelBuffer};
use crate::tile::TileKey;

use super::adapter::SharedDecoder;
use super::descriptor::{PipelineDescriptor, StageDescriptor};
use super::stage::{BlendConfig, ColorRemapConfig, DecoderSlot, Stage, StageConfig};
use super::{AdapterId, StageId};

struct StageNode {
    id: StageId,
    stage: Stage,
    /// Positions of the input stages; always lower than this node's position
    inputs: Vec<usize>,
}

// =============================================================================
// Pipeline
// =============================================================================

/// A stage graph producing one pixel buffer per tile key.
///
/// Stages are stored in evaluation order. A pipeline is used by a single
/// thread at a time; parallelism comes from independent clones built by the
/// [`crate::chain::ChainReplicator`].
pub struct Pipeline {
    nodes: Vec<StageNode>,
    terminal: usize,
}

impl Pipeline {
    /// Produce the terminal stage's output for `key`.
    pub fn process(&mut self, key: &TileKey) -> Result<PixelBuffer, TileError> {
        evaluate(&mut self.nodes, self.terminal, key)
    }

    /// Produce the output of the stage at `position` for `key`, evaluating
    /// only the stages feeding it.
    pub fn process_stage(&mut self, position: usize, key: &TileKey) -> Result<PixelBuffer, TileError> {
        if position >= self.nodes.len() {
            return Err(TileError::UnknownStage(position));
        }
        evaluate(&mut self.nodes, position, key)
    }

    pub fn stage_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn stage_ids(&self) -> Vec<StageId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    pub fn terminal_id(&self) -> StageId {
        self.nodes[self.terminal].id
    }

    /// Pending configuration of the stage at `position`, if it can be described.
    pub fn stage_config(&self, position: usize) -> Option<StageConfig> {
        self.nodes.get(position)?.stage.config()
    }

    /// Recompute every stage's active state from its pending configuration.
    pub fn initialize(&mut self) {
        for node in &mut self.nodes {
            node.stage.initialize();
        }
    }

    /// Check that `config` may replace the stage at `position`.
    pub fn check_stage_config(&self, position: usize, config: &StageConfig) -> Result<(), ReplicationError> {
        let node = self
            .nodes
            .get(position)
            .ok_or(ReplicationError::StageOutOfRange(position))?;
        if !node.stage.accepts(config) {
            return Err(ReplicationError::StageKindMismatch {
                existing: node.stage.kind(),
                replacement: config.kind(),
            });
        }
        Ok(())
    }

    /// Replace the pending configuration of the stage at `position`.
    ///
    /// Takes effect at the next [`Pipeline::initialize`].
    pub fn set_stage_config(&mut self, position: usize, config: StageConfig) -> Result<(), ReplicationError> {
        self.check_stage_config(position, &config)?;
        self.nodes[position].stage.configure(config);
        Ok(())
    }

    /// Move every owned decoder into a shared adapter.
    ///
    /// Returns all adapters this pipeline reads from, including ones that were
    /// already shared. The pipeline keeps only weak references, so the caller
    /// must hold on to the returned adapters.
    pub fn detach_decoders(&mut self, ctx: &ViewerContext) -> Vec<Arc<SharedDecoder>> {
        self.nodes
            .iter_mut()
            .filter_map(|node| node.stage.decoder_mut())
            .filter_map(|slot| slot.share(ctx))
            .collect()
    }

    /// Live adapters referenced by shared decode stages.
    pub fn shared_adapters(&self) -> Vec<Arc<SharedDecoder>> {
        self.decoders().filter_map(DecoderSlot::adapter).collect()
    }

    /// Adapter referenced by this pipeline under `id`, if still alive.
    pub fn adapter(&self, id: AdapterId) -> Option<Arc<SharedDecoder>> {
        self.decoders()
            .find(|slot| slot.adapter_id() == Some(id))
            .and_then(DecoderSlot::adapter)
    }

    /// Ids of the shared adapters this pipeline reads from.
    pub fn adapter_ids(&self) -> Vec<AdapterId> {
        self.decoders().filter_map(DecoderSlot::adapter_id).collect()
    }

    /// Returns `true` if some decode stage still owns its decoder.
    pub fn has_owned_decoders(&self) -> bool {
        self.decoders().any(|slot| slot.adapter_id().is_none())
    }

    fn decoders(&self) -> impl Iterator<Item = &DecoderSlot> {
        self.nodes.iter().filter_map(|node| node.stage.decoder())
    }

    /// Describe configuration and connections.
    ///
    /// Fails while a decode stage still owns its decoder, since an owned
    /// decoder cannot be referenced from another pipeline.
    pub fn describe(&self) -> Result<PipelineDescriptor, ReplicationError> {
        let stages = self
            .nodes
            .iter()
            .map(|node| {
                let config = node.stage.config().ok_or_else(|| {
                    ReplicationError::Descriptor(format!("{} owns its decoder", node.id))
                })?;
                let active = node.stage.active_config().filter(|active| *active != config);
                Ok(StageDescriptor {
                    id: node.id,
                    config,
                    active,
                    inputs: node.inputs.iter().map(|i| self.nodes[*i].id).collect(),
                })
            })
            .collect::<Result<Vec<_>, ReplicationError>>()?;

        Ok(PipelineDescriptor {
            stages,
            terminal: self.terminal_id(),
        })
    }

    /// Build a fresh pipeline from a descriptor.
    ///
    /// Decode stages point at the given shared adapters; every stage gets a
    /// new identifier from `ctx`. Stages start from their active
    /// configuration with the pending one staged on top, so the result
    /// produces the same tiles as the described pipeline until both are
    /// initialized.
    pub fn build_from(
        descriptor: &PipelineDescriptor,
        adapters: &HashMap<AdapterId, Arc<SharedDecoder>>,
        ctx: &ViewerContext,
    ) -> Result<Self, ReplicationError> {
        let mut positions: HashMap<StageId, usize> = HashMap::with_capacity(descriptor.stages.len());
        let mut nodes = Vec::with_capacity(descriptor.stages.len());

        for (position, entry) in descriptor.stages.iter().enumerate() {
            let inputs = entry
                .inputs
                .iter()
                .map(|input| {
                    positions
                        .get(input)
                        .copied()
                        .ok_or(ReplicationError::UnknownInput {
                            stage: entry.id,
                            input: *input,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut stage = match entry.active.as_ref().unwrap_or(&entry.config) {
                StageConfig::Decode { adapter } => {
                    let shared = adapters
                        .get(adapter)
                        .ok_or(ReplicationError::UnknownAdapter(*adapter))?;
                    Stage::Decode(DecoderSlot::shared(shared))
                }
                StageConfig::ColorRemap(config) => Stage::color_remap(config.clone()),
                StageConfig::Blend(config) => Stage::blend(config.clone()),
            };
            if entry.active.is_some() {
                if !stage.accepts(&entry.config) {
                    return Err(ReplicationError::Descriptor(format!(
                        "{} runs as {} but is configured as {}",
                        entry.id,
                        stage.kind(),
                        entry.config.kind()
                    )));
                }
                stage.configure(entry.config.clone());
            }

            positions.insert(entry.id, position);
            nodes.push(StageNode {
                id: ctx.next_stage_id(),
                stage,
                inputs,
            });
        }

        let terminal = positions
            .get(&descriptor.terminal)
            .copied()
            .ok_or(ReplicationError::NoTerminalStage)?;

        Ok(Self { nodes, terminal })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "stages",
                &self
                    .nodes
                    .iter()
                    .map(|node| (node.id, node.stage.kind()))
                    .collect::<Vec<_>>(),
            )
            .field("terminal", &self.terminal_id())
            .finish()
    }
}

fn evaluate(nodes: &mut [StageNode], index: usize, key: &TileKey) -> Result<PixelBuffer, TileError> {
    let (earlier, rest) = nodes.split_at_mut(index);
    let node = &mut rest[0];

    let mut inputs = Vec::with_capacity(node.inputs.len());
    for &input in &node.inputs {
        inputs.push(evaluate(earlier, input, key)?);
    }
    node.stage.process(node.id, key, inputs)
}

// =============================================================================
// Builder
// =============================================================================

/// Incremental construction of a canonical pipeline.
///
/// ```text
/// let mut builder = PipelineBuilder::new(&ctx);
/// let decode = builder.decode(Box::new(source));
/// builder.color_remap(ColorRemapConfig::default(), decode)?;
/// let pipeline = builder.build()?;
/// ```
pub struct PipelineBuilder<'a> {
    ctx: &'a ViewerContext,
    nodes: Vec<StageNode>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(ctx: &'a ViewerContext) -> Self {
        Self {
            ctx,
            nodes: Vec::new(),
        }
    }

    /// Add a decoder leaf owning `source`.
    pub fn decode(&mut self, source: Box<dyn ImageSource>) -> StageId {
        self.push(Stage::Decode(DecoderSlot::Owned(source)), Vec::new())
    }

    /// Add a decoder leaf reading through an existing shared adapter.
    pub fn shared_decode(&mut self, adapter: &Arc<SharedDecoder>) -> StageId {
        self.push(Stage::Decode(DecoderSlot::shared(adapter)), Vec::new())
    }

    pub fn color_remap(&mut self, config: ColorRemapConfig, input: StageId) -> Result<StageId, ReplicationError> {
        let id = self.ctx.next_stage_id();
        let inputs = self.positions(id, &[input])?;
        self.nodes.push(StageNode {
            id,
            stage: Stage::color_remap(config),
            inputs,
        });
        Ok(id)
    }

    pub fn blend(&mut self, config: BlendConfig, inputs: &[StageId]) -> Result<StageId, ReplicationError> {
        let id = self.ctx.next_stage_id();
        let inputs = self.positions(id, inputs)?;
        self.nodes.push(StageNode {
            id,
            stage: Stage::blend(config),
            inputs,
        });
        Ok(id)
    }

    /// Finish the pipeline.
    ///
    /// The terminal stage is the last stage that feeds no other stage.
    pub fn build(self) -> Result<Pipeline, ReplicationError> {
        let consumed: Vec<usize> = self.nodes.iter().flat_map(|n| n.inputs.iter().copied()).collect();
        let terminal = (0..self.nodes.len())
            .rev()
            .find(|i| !consumed.contains(i))
            .ok_or(ReplicationError::NoTerminalStage)?;

        let mut pipeline = Pipeline {
            nodes: self.nodes,
            terminal,
        };
        pipeline.initialize();
        debug!(stages = pipeline.stage_count(), terminal = %pipeline.terminal_id(), "Built pipeline");
        Ok(pipeline)
    }

    fn push(&mut self, stage: Stage, inputs: Vec<usize>) -> StageId {
        let id = self.ctx.next_stage_id();
        self.nodes.push(StageNode { id, stage, inputs });
        id
    }

    fn positions(&self, stage: StageId, inputs: &[StageId]) -> Result<Vec<usize>, ReplicationError> {
        inputs
            .iter()
            .map(|input| {
                self.nodes
                    .iter()
                    .position(|node| node.id == *input)
                    .ok_or(ReplicationError::UnknownInput {
                        stage,
                        input: *input,
                    })
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
