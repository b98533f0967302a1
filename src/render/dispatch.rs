//! Tile loading on pipeline clones.
//!
//! With a single clone, tiles are decoded on the calling thread. With N
//! clones, the missing keys are dealt round-robin into N buckets and each
//! bucket is processed on its own scoped OS thread by its own clone:
//!
//! ```text
//!   keys  k0 k1 k2 k3 k4 k5 k6
//!          │  │  │  │  │  │  │
//!          ▼  ▼  ▼  ▼  ▼  ▼  ▼
//!   clone  0  1  2  0  1  2  0      (N = 3)
//!                │
//!                ▼
//!   crossbeam channel ──▶ join ──▶ TileCache::admit
//! ```
//!
//! The scope joins every worker before `load` returns, so clones are only
//! borrowed for the duration of one frame. Workers only decode; tile corners
//! are mapped to the viewport on the calling thread after the join.

use std::thread;

use tracing::{trace, warn};

use crate::chain::{ChainReplicator, Pipeline};
use crate::error::TileError;
use crate::projection::CoordinateBridge;
use crate::source::{PixelBuffer, PyramidLevel};
use crate::tile::{LoadedTile, TileContext, TileKey, TileLoader};

type LoadResult = (TileKey, Result<LoadedTile, TileError>);
type DecodeResult = (TileKey, Result<PixelBuffer, TileError>);

/// [`TileLoader`] running the clones of a [`ChainReplicator`].
pub struct ChainLoader<'r> {
    replicator: &'r mut ChainReplicator,
}

impl<'r> ChainLoader<'r> {
    pub fn new(replicator: &'r mut ChainReplicator) -> Self {
        Self { replicator }
    }
}

impl TileLoader for ChainLoader<'_> {
    fn load(&mut self, keys: Vec<TileKey>, ctx: &TileContext<'_>) -> Vec<LoadResult> {
        let clones = self.replicator.clones_mut();

        let decoded: Vec<DecodeResult> = if clones.len() <= 1 || keys.len() <= 1 {
            let Some(pipeline) = clones.first_mut() else {
                return Vec::new();
            };
            keys.into_iter()
                .map(|key| {
                    let result = pipeline.process(&key);
                    (key, result)
                })
                .collect()
        } else {
            decode_parallel(clones, keys)
        };

        decoded
            .into_iter()
            .map(|(key, result)| {
                let loaded = result.and_then(|buffer| finish_tile(&key, buffer, ctx.bridge, ctx.level));
                (key, loaded)
            })
            .collect()
    }
}

/// Decode `keys` round-robin across `clones`, one scoped thread per clone.
fn decode_parallel(clones: &mut [Pipeline], keys: Vec<TileKey>) -> Vec<DecodeResult> {
    let mut buckets: Vec<Vec<TileKey>> = vec![Vec::new(); clones.len()];
    let count = buckets.len();
    for (i, key) in keys.into_iter().enumerate() {
        buckets[i % count].push(key);
    }

    let (sender, receiver) = crossbeam_channel::unbounded::<DecodeResult>();

    thread::scope(|scope| {
        for (index, (pipeline, bucket)) in clones.iter_mut().zip(buckets).enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let sender = sender.clone();
            let size = bucket.len();
            let spawned = thread::Builder::new()
                .name(format!("tile-worker-{}", index))
                .spawn_scoped(scope, move || {
                    for key in bucket {
                        let result = pipeline.process(&key);
                        if sender.send((key, result)).is_err() {
                            break;
                        }
                    }
                });
            if let Err(e) = spawned {
                // Tiles of this bucket stay missing and are planned again next frame
                warn!(worker = index, tiles = size, error = %e, "Failed to spawn tile worker");
            }
        }
    });
    drop(sender);

    receiver.try_iter().collect()
}

/// Map the corners of a decoded tile to the viewport.
fn finish_tile(
    key: &TileKey,
    buffer: PixelBuffer,
    bridge: &CoordinateBridge,
    level: &PyramidLevel,
) -> Result<LoadedTile, TileError> {
    let quad = bridge.region_to_quad(&key.region, level);
    if !quad.is_valid() {
        return Err(TileError::Unprojectable);
    }
    trace!(level = key.level, x = key.region.x, y = key.region.y, "Loaded tile");
    Ok(LoadedTile { buffer, quad })
}
