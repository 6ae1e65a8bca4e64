//! `roverlink-perception` – receiver-side interpretation of the rover streams.
//!
//! # Modules
//!
//! - [`assembler`] – [`ScanAssembler`][assembler::ScanAssembler]: rebuilds
//!   complete LiDAR scans from a lossy, reorderable, duplicable stream of
//!   chunks and exposes them through a FIFO queue.
//! - [`transform`] – [`pose_to_matrix`][transform::pose_to_matrix]: turns a
//!   pose record into the 4×4 rigid-body transform that maps sensor-frame
//!   points into the world frame.

pub mod assembler;
pub mod transform;

pub use assembler::{AssemblerStats, CompleteScan, DEFAULT_MAX_AGE, ScanAssembler};
pub use transform::{Mat4, pose_to_matrix, transform_point, transform_points};
