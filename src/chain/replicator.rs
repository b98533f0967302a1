//! Replication of a canonical pipeline across worker threads.
//!
//! # States
//!
//! ```text
//! EMPTY ──set_original──▶ ORIGINAL (1 clone) ──set_thread_count(n > 1)──▶ REPLICATED(n)
//!                                  ▲                                          │
//!                                  └──────────── set_thread_count(1) ◀────────┘
//! ```
//!
//! Every failing operation leaves the replicator in its previous state.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::context::ViewerContext;
use crate::error::ReplicationError;

use super::adapter::SharedDecoder;
use super::descriptor::PipelineDescriptor;
use super::pipeline::Pipeline;
use super::stage::StageConfig;
use super::StageId;

/// Reference to one clone's terminal stage.
///
/// Handles only name a clone; the clones themselves stay owned by the
/// replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainHandle {
    pub clone: usize,
    pub terminal: StageId,
}

/// Owns a canonical pipeline (clone 0) and its replicas.
///
/// The replicator holds the only strong references to shared decoder
/// adapters; clones reach them through weak references.
#[derive(Debug, Default)]
pub struct ChainReplicator {
    clones: Vec<Pipeline>,
    adapters: Vec<Arc<SharedDecoder>>,
}

impl ChainReplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the canonical pipeline, discarding any previous clones.
    pub fn set_original(&mut self, pipeline: Pipeline) {
        // Adapters the new original already shares stay alive; the rest go.
        self.adapters = pipeline.shared_adapters();
        self.clones = vec![pipeline];
        debug!(adapters = self.adapters.len(), "Set original pipeline");
    }

    pub fn has_original(&self) -> bool {
        !self.clones.is_empty()
    }

    /// Number of clones, 0 before an original is set.
    pub fn thread_count(&self) -> usize {
        self.clones.len()
    }

    /// Resize to `count` clones.
    ///
    /// Does nothing if `count` is the current count. A count of 1 drops every
    /// clone but the original; anything else rebuilds all replicas from the
    /// original.
    pub fn set_thread_count(&mut self, count: usize, ctx: &ViewerContext) -> Result<(), ReplicationError> {
        if count == 0 {
            return Err(ReplicationError::InvalidThreadCount(count));
        }
        if self.clones.is_empty() {
            return Err(ReplicationError::NoOriginal);
        }
        if count == self.clones.len() {
            return Ok(());
        }
        if count == 1 {
            self.clones.truncate(1);
            info!("Pipeline replication disabled");
            return Ok(());
        }
        self.replicate(count, ctx)
    }

    /// Rebuild `count - 1` replicas of the original.
    ///
    /// Decoders of the original are moved into shared adapters first. The
    /// original is then described, the description round-tripped through
    /// JSON, and each replica built from it against the same adapters.
    pub fn replicate(&mut self, count: usize, ctx: &ViewerContext) -> Result<(), ReplicationError> {
        if count == 0 {
            return Err(ReplicationError::InvalidThreadCount(count));
        }
        let original = self.clones.first_mut().ok_or(ReplicationError::NoOriginal)?;

        // Keep adapters alive even if a later step fails, the original now
        // reads through them.
        for adapter in original.detach_decoders(ctx) {
            if !self.adapters.iter().any(|a| Arc::ptr_eq(a, &adapter)) {
                self.adapters.push(adapter);
            }
        }

        let json = original.describe()?.to_json()?;
        let descriptor = PipelineDescriptor::from_json(&json)?;

        let shared: HashMap<_, _> = self
            .adapters
            .iter()
            .map(|adapter| (adapter.id(), adapter.clone()))
            .collect();

        let replicas = (1..count)
            .map(|_| Pipeline::build_from(&descriptor, &shared, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        self.clones.truncate(1);
        self.clones.extend(replicas);

        info!(
            clones = self.clones.len(),
            adapters = self.adapters.len(),
            stages = descriptor.stages.len(),
            "Replicated pipeline"
        );
        Ok(())
    }

    /// Handle to clone `index`, or `None` if out of range.
    pub fn get_clone(&self, index: usize) -> Option<ChainHandle> {
        self.clones.get(index).map(|pipeline| ChainHandle {
            clone: index,
            terminal: pipeline.terminal_id(),
        })
    }

    pub fn pipeline(&self, index: usize) -> Option<&Pipeline> {
        self.clones.get(index)
    }

    pub fn pipeline_mut(&mut self, index: usize) -> Option<&mut Pipeline> {
        self.clones.get_mut(index)
    }

    /// All clones, for dispatching work one clone per thread.
    pub fn clones_mut(&mut self) -> &mut [Pipeline] {
        &mut self.clones
    }

    /// Shared adapters owned by the replicator.
    pub fn adapters(&self) -> &[Arc<SharedDecoder>] {
        &self.adapters
    }

    /// Update the pending configuration of the stage at `position` in every clone.
    ///
    /// Clones keep producing tiles with their previous settings until
    /// [`ChainReplicator::initialize`] is called.
    pub fn set_stage_config(&mut self, position: usize, config: StageConfig) -> Result<(), ReplicationError> {
        let original = self.clones.first().ok_or(ReplicationError::NoOriginal)?;
        original.check_stage_config(position, &config)?;
        for pipeline in &mut self.clones {
            pipeline.set_stage_config(position, config.clone())?;
        }
        Ok(())
    }

    /// Re-initialize every clone from its pending configuration.
    pub fn initialize(&mut self) {
        for pipeline in &mut self.clones {
            pipeline.initialize();
        }
        debug!(clones = self.clones.len(), "Initialized pipeline clones");
    }
}

// =============================================================================
// Tests
// =============================================================================
