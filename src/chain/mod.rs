//! Tile processing pipelines and their replication across worker threads.
//!
//! A [`Pipeline`] is a small graph of stages evaluated once per tile. Stages
//! are stateful and not reentrant, so a pipeline is used by one thread at a
//! time. To decode on N threads the [`ChainReplicator`] builds N independent
//! clones of a canonical pipeline:
//!
//! ```text
//!                 canonical pipeline (clone 0)
//!                            │
//!            detach decoders │ describe
//!                            ▼
//! ┌──────────────────┐   ┌──────────────────────┐
//! │  SharedDecoder   │   │  PipelineDescriptor  │──── JSON round trip
//! │  (Arc + Mutex)   │   │  (configs + graph)   │
//! └────────┬─────────┘   └──────────┬───────────┘
//!          │   Weak                 │ build_from
//!          ├────────────────────────┼──────────────────┐
//!          ▼                        ▼                  ▼
//!      clone 0                   clone 1     ...    clone N-1
//! ```
//!
//! Clones share nothing but the decoder adapters; every other stage is built
//! fresh with new identifiers, so per-clone state is never aliased.

mod adapter;
mod descriptor;
mod pipeline;
mod replicator;
mod stage;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use adapter::SharedDecoder;
pub use descriptor::{PipelineDescriptor, StageDescriptor};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use replicator::{ChainHandle, ChainReplicator};
pub use stage::{BlendConfig, ColorRemapConfig, StageConfig};

/// Identifier of a stage, unique within a [`crate::context::ViewerContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(pub u64);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

/// Identifier of a shared decoder adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterId(pub u64);

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "adapter#{}", self.0)
    }
}
