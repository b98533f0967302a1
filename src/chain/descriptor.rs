//! Transferable description of a pipeline.
//!
//! A descriptor is the full stage configuration plus the connection graph of
//! a pipeline, with decoders referenced by adapter id. It carries no runtime
//! state, so any number of independent pipelines can be built from it.

use serde::{Deserialize, Serialize};

use crate::error::ReplicationError;

use super::stage::StageConfig;
use super::{AdapterId, StageId};

/// One stage of a [`PipelineDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub id: StageId,
    /// Pending configuration
    pub config: StageConfig,
    /// Configuration the stage currently runs with, when it differs from
    /// `config` because the stage was not initialized since its last change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<StageConfig>,
    /// Stages feeding this one, in input order
    #[serde(default)]
    pub inputs: Vec<StageId>,
}

/// Stage list in evaluation order (inputs before consumers) and the stage
/// whose output is the pipeline's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    pub stages: Vec<StageDescriptor>,
    pub terminal: StageId,
}

impl PipelineDescriptor {
    pub fn to_json(&self) -> Result<String, ReplicationError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ReplicationError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Adapter ids referenced by decode stages, in stage order.
    pub fn adapters(&self) -> Vec<AdapterId> {
        self.stages
            .iter()
            .filter_map(|stage| match stage.config {
                StageConfig::Decode { adapter } => Some(adapter),
                _ => None,
            })
            .collect()
    }
}
