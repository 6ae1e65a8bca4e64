//! `roverlink-types` – shared vocabulary of the rover streaming stack.
//!
//! - [`wire`] – the fixed-layout binary records exchanged over UDP (pose,
//!   LiDAR chunks, telemetry, commands) and their codecs.
//! - [`RoverProfile`] – the port assignment and data file of one logical
//!   rover, plus the built-in profile table.
//! - [`RoverError`] – the error type shared by every crate in the workspace.

pub mod wire;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use wire::{
    ButtonState, LidarChunk, LidarChunkHeader, LidarPoint, PosePacket, Stream, TelemetryPacket,
};

/// Per-rover UDP port assignment and trajectory file.
///
/// Pose, LiDAR and telemetry ports are outbound from the emulator; the
/// command port is the one the emulator binds to receive button commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoverProfile {
    pub data_file: String,
    pub pose_port: u16,
    pub lidar_port: u16,
    pub telem_port: u16,
    pub cmd_port: u16,
}

impl RoverProfile {
    /// The destination port of an outbound [`Stream`].
    pub fn port_for(&self, stream: Stream) -> u16 {
        match stream {
            Stream::Pose => self.pose_port,
            Stream::Lidar => self.lidar_port,
            Stream::Telemetry => self.telem_port,
        }
    }
}

/// The built-in rover table: rover `N` (1..=5) streams pose on `9000+N`,
/// LiDAR on `10000+N`, telemetry on `11000+N` and listens for commands on
/// `8000+N`.
pub fn default_profiles() -> BTreeMap<String, RoverProfile> {
    (1u16..=5)
        .map(|n| {
            (
                n.to_string(),
                RoverProfile {
                    data_file: format!("data/rover{n}.dat"),
                    pose_port: 9000 + n,
                    lidar_port: 10000 + n,
                    telem_port: 11000 + n,
                    cmd_port: 8000 + n,
                },
            )
        })
        .collect()
}

/// Error type spanning wire decoding, source parsing, sockets and
/// configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoverError {
    #[error("Malformed {record} datagram: expected {expected} bytes, got {actual}")]
    MalformedDatagram {
        record: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("LiDAR chunk declares {0} points (maximum is {max})", max = wire::MAX_POINTS_PER_CHUNK)]
    TooManyPoints(u32),

    #[error("Malformed source record ({reason}): {line}")]
    MalformedRecord { line: String, reason: String },

    #[error("No profile found for rover ID: {0}")]
    UnknownRover(String),

    #[error("I/O Error: {0}")]
    Io(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl From<std::io::Error> for RoverError {
    fn from(e: std::io::Error) -> Self {
        RoverError::Io(e.to_string())
    }
}
