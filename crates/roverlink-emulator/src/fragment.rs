//! Scan fragmentation.

use roverlink_types::wire::MAX_POINTS_PER_CHUNK;
use roverlink_types::{LidarChunk, LidarPoint};

/// Split a scan into chunks of at most [`MAX_POINTS_PER_CHUNK`] points.
///
/// Point order is preserved, `total_chunks = ceil(n / 100)` and chunk
/// indices run `0..total_chunks`.  An empty scan yields no chunks.
pub fn fragment_scan(timestamp: f64, points: &[LidarPoint]) -> Vec<LidarChunk> {
    let total = points.len().div_ceil(MAX_POINTS_PER_CHUNK) as u32;
    points
        .chunks(MAX_POINTS_PER_CHUNK)
        .enumerate()
        .map(|(index, slice)| LidarChunk::new(timestamp, index as u32, total, slice.to_vec()))
        .collect()
}
