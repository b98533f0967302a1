use thiserror::Error;

use crate::chain::{AdapterId, StageId};

/// Errors raised by an image source while decoding pixels
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Underlying file or storage failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Requested pyramid level does not exist
    #[error("Invalid level {level}: source has {count} level(s)")]
    InvalidLevel { level: usize, count: usize },

    /// Requested band index does not exist
    #[error("Invalid band {band}: source has {count} band(s)")]
    InvalidBand { band: usize, count: usize },

    /// Requested region lies (partly) outside the level bounds
    #[error("Region {x},{y} {width}x{height} exceeds level bounds {level_width}x{level_height}")]
    RegionOutOfBounds {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        level_width: u32,
        level_height: u32,
    },

    /// Requested region has no pixels
    #[error("Empty region requested")]
    EmptyRegion,

    /// Image container could not be decoded
    #[error("Image decode error: {0}")]
    Image(String),
}

/// Errors produced while loading a single tile.
///
/// These never abort a frame: the tile is skipped and naturally retried
/// on the next frame if it is still in view.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// The decoder failed
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The decoded buffer does not match the requested region
    #[error("Degenerate tile buffer: expected {expected} samples, got {actual}")]
    Degenerate { expected: usize, actual: usize },

    /// The shared decoder backing a clone has been dropped
    #[error("Decoder adapter {0} is no longer available")]
    AdapterReleased(AdapterId),

    /// No stage exists at the requested pipeline position
    #[error("No stage at position {0}")]
    UnknownStage(usize),

    /// A stage was evaluated without one of its inputs connected
    #[error("Stage {0} is missing an input")]
    MissingInput(StageId),

    /// The tile corners could not be mapped to the viewport
    #[error("Tile corners could not be projected to the viewport")]
    Unprojectable,
}

/// Errors raised while building a coordinate bridge
#[derive(Debug, Clone, Error)]
pub enum ProjectionError {
    /// EPSG code is not in the bundled definitions
    #[error("EPSG:{0} is not a known coordinate reference system")]
    UnknownEpsg(u16),

    /// Projection definition could not be parsed
    #[error("Invalid projection definition: {0}")]
    InvalidDefinition(String),
}

/// Configuration and replication errors from the chain replicator.
///
/// The replicator keeps its previous valid state whenever one of these is returned.
#[derive(Debug, Clone, Error)]
pub enum ReplicationError {
    /// An operation needs the canonical pipeline but none was set
    #[error("No original pipeline has been set")]
    NoOriginal,

    /// Thread counts must be at least 1
    #[error("Invalid thread count: {0}")]
    InvalidThreadCount(usize),

    /// The pipeline descriptor could not be serialized or deserialized
    #[error("Pipeline descriptor error: {0}")]
    Descriptor(String),

    /// No stage in the descriptor is free of consumers
    #[error("Pipeline has no terminal stage")]
    NoTerminalStage,

    /// A decode stage references an adapter that was never shared
    #[error("Unknown decoder adapter {0}")]
    UnknownAdapter(AdapterId),

    /// A connection references a stage that does not exist
    #[error("Stage {stage} references unknown input {input}")]
    UnknownInput { stage: StageId, input: StageId },

    /// A positional stage index is out of range
    #[error("Stage position {0} is out of range")]
    StageOutOfRange(usize),

    /// A stage configuration cannot replace a stage of another kind
    #[error("Stage kind mismatch: cannot replace {existing} with {replacement}")]
    StageKindMismatch {
        existing: &'static str,
        replacement: &'static str,
    },
}

impl From<serde_json::Error> for ReplicationError {
    fn from(err: serde_json::Error) -> Self {
        ReplicationError::Descriptor(err.to_string())
    }
}

/// Errors from adding or reconfiguring a layer of a viewport renderer
#[derive(Debug, Clone, Error)]
pub enum LayerError {
    /// The source reports no pyramid level
    #[error("Source has no pyramid levels")]
    NoLevels,

    /// A selected band does not exist in the source
    #[error("Invalid band {band}: source has {count} band(s)")]
    InvalidBand { band: usize, count: usize },

    /// The band selection is empty
    #[error("Band selection is empty")]
    NoBands,

    /// No layer at this index
    #[error("Layer {0} does not exist")]
    UnknownLayer(usize),

    #[error(transparent)]
    Replication(#[from] ReplicationError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}
