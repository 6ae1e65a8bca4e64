//! LiDAR scan reassembly.
//!
//! The emulator splits every scan into chunks of at most 100 points and
//! sends them as independent UDP datagrams.  [`ScanAssembler`] groups the
//! chunks it is handed by their scan timestamp, detects when every chunk of
//! a scan has arrived, and queues the rebuilt [`CompleteScan`] for a
//! consumer.
//!
//! # Delivery model
//!
//! - **Loss** – a scan missing a chunk never completes.  Its partial state is
//!   reclaimed by [`ScanAssembler::cleanup_stale_scans`] once it has not
//!   been touched for longer than the given age.
//! - **Duplication** – a repeated chunk index replaces the earlier copy and
//!   never counts twice toward completion.
//! - **Reordering** – points are concatenated by ascending chunk index, not
//!   by arrival order.
//!
//! Timestamps are the correlation key and are matched exactly, bit for bit,
//! as transmitted.  There is no memory of already-completed scans: a chunk
//! arriving after its scan completed starts a fresh partial scan, which goes
//! stale like any other.
//!
//! # Example
//!
//! ```rust
//! use roverlink_perception::assembler::ScanAssembler;
//! use roverlink_types::{LidarChunk, LidarPoint};
//!
//! let assembler = ScanAssembler::new();
//! let chunk = |i| LidarChunk::new(0.1, i, 2, vec![LidarPoint::new(i as f32, 0.0, 0.0)]);
//!
//! assert!(!assembler.add_packet(chunk(1)));
//! assert!(assembler.add_packet(chunk(0)));
//!
//! let scan = assembler.get_complete_scan().unwrap();
//! assert_eq!(scan.points.len(), 2);
//! assert_eq!(scan.points[0].x, 0.0);
//! assert!(assembler.get_complete_scan().is_none());
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use roverlink_types::{LidarChunk, LidarPoint};
use tracing::{debug, info, warn};

/// Default inactivity threshold after which a partial scan is evicted.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(2);

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// A scan for which every expected chunk arrived, points ordered by chunk
/// index.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteScan {
    pub timestamp: f64,
    pub total_chunks: u32,
    pub points: Vec<LidarPoint>,
}

/// Lifetime counters of an assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssemblerStats {
    pub chunks_received: u64,
    pub scans_completed: u64,
    pub scans_evicted: u64,
    /// Chunks whose index was not below their declared total.
    pub out_of_range_chunks: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Internal state
// ────────────────────────────────────────────────────────────────────────────

struct PartialScan {
    timestamp: f64,
    total_chunks: u32,
    /// `chunk_index -> points`; ordered so assembly walks indices ascending.
    chunks: BTreeMap<u32, Vec<LidarPoint>>,
    last_update: Instant,
}

impl PartialScan {
    fn into_complete(self) -> CompleteScan {
        let len = self.chunks.values().map(Vec::len).sum();
        let mut points = Vec::with_capacity(len);
        for chunk in self.chunks.into_values() {
            points.extend(chunk);
        }
        CompleteScan {
            timestamp: self.timestamp,
            total_chunks: self.total_chunks,
            points,
        }
    }
}

#[derive(Default)]
struct Inner {
    /// Keyed by the bit pattern of the transmitted timestamp.
    partial: HashMap<u64, PartialScan>,
    complete: VecDeque<CompleteScan>,
    stats: AssemblerStats,
}

// ────────────────────────────────────────────────────────────────────────────
// ScanAssembler
// ────────────────────────────────────────────────────────────────────────────

/// Thread-safe LiDAR chunk reassembler.
///
/// One mutex guards all internal state for the duration of each call, so a
/// receive task, a consumer and a sweep timer can share the assembler
/// through an `Arc` without further coordination.
#[derive(Default)]
pub struct ScanAssembler {
    inner: Mutex<Inner>,
}

impl ScanAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a received chunk.
    ///
    /// Returns `true` when this chunk completed its scan; the scan is then
    /// available from [`ScanAssembler::get_complete_scan`].
    pub fn add_packet(&self, chunk: LidarChunk) -> bool {
        self.add_packet_at(chunk, Instant::now())
    }

    fn add_packet_at(&self, chunk: LidarChunk, now: Instant) -> bool {
        let mut inner = self.lock();
        inner.stats.chunks_received += 1;

        let header = chunk.header;
        if header.chunk_index >= header.total_chunks {
            inner.stats.out_of_range_chunks += 1;
            warn!(
                timestamp = header.timestamp,
                chunk_index = header.chunk_index,
                total_chunks = header.total_chunks,
                "chunk index out of range; storing as-is"
            );
        }

        let key = header.timestamp.to_bits();
        let partial = inner.partial.entry(key).or_insert_with(|| PartialScan {
            timestamp: header.timestamp,
            total_chunks: header.total_chunks,
            chunks: BTreeMap::new(),
            last_update: now,
        });
        partial.total_chunks = header.total_chunks;
        partial.last_update = now;
        partial.chunks.insert(header.chunk_index, chunk.points);

        if partial.chunks.len() != partial.total_chunks as usize {
            return false;
        }

        let Some(done) = inner.partial.remove(&key) else {
            return false;
        };
        let scan = done.into_complete();
        debug!(
            timestamp = scan.timestamp,
            total_chunks = scan.total_chunks,
            points = scan.points.len(),
            "scan complete"
        );
        inner.complete.push_back(scan);
        inner.stats.scans_completed += 1;
        true
    }

    /// Whether a completed scan is waiting to be retrieved.
    pub fn has_complete_scan(&self) -> bool {
        !self.lock().complete.is_empty()
    }

    /// Pop the oldest completed scan (in completion order, not timestamp
    /// order).  Each scan is returned exactly once.
    pub fn get_complete_scan(&self) -> Option<CompleteScan> {
        self.lock().complete.pop_front()
    }

    /// Evict every partial scan that has not received a chunk for longer
    /// than `max_age`.  Returns the number of scans evicted.
    pub fn cleanup_stale_scans(&self, max_age: Duration) -> usize {
        self.cleanup_stale_scans_at(max_age, Instant::now())
    }

    fn cleanup_stale_scans_at(&self, max_age: Duration, now: Instant) -> usize {
        let mut inner = self.lock();
        let before = inner.partial.len();
        inner.partial.retain(|_, p| {
            let stale = now.saturating_duration_since(p.last_update) > max_age;
            if stale {
                info!(
                    timestamp = p.timestamp,
                    received = p.chunks.len(),
                    expected = p.total_chunks,
                    "evicting stale partial scan"
                );
            }
            !stale
        });
        let evicted = before - inner.partial.len();
        inner.stats.scans_evicted += evicted as u64;
        evicted
    }

    /// Number of scans still waiting for chunks.
    pub fn partial_scan_count(&self) -> usize {
        self.lock().partial.len()
    }

    /// Number of completed scans not yet retrieved.
    pub fn complete_scan_count(&self) -> usize {
        self.lock().complete.len()
    }

    pub fn stats(&self) -> AssemblerStats {
        self.lock().stats
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
