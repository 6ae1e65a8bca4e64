//! Fixed-layout binary records carried as UDP payloads.
//!
//! Every record is packed without alignment padding and encodes its
//! multi-byte fields in host byte order (emulator and listener share one
//! loopback host):
//!
//! | Record | Layout (offset:type) | Size |
//! |---|---|---|
//! | [`PosePacket`] | 0:f64 timestamp, 8:f32 x,y,z, 20:f32 rot x,y,z (deg) | 32 B |
//! | [`LidarChunkHeader`] | 0:f64 timestamp, 8:u32 index, 12:u32 total, 16:u32 points | 20 B |
//! | [`LidarPoint`] | f32 x, y, z | 12 B |
//! | [`LidarChunk`] | header + `points` × point | 20 + 12n B |
//! | [`TelemetryPacket`] | 0:f64 timestamp, 8:u8 buttons | 9 B |
//! | command | 1 byte, new button state | 1 B |
//!
//! Only the points actually present in a chunk are transmitted, so a chunk
//! datagram is always exactly `20 + 12 × points` bytes long.

use serde::{Deserialize, Serialize};

use crate::RoverError;

/// Maximum number of LiDAR points carried by one chunk datagram.
pub const MAX_POINTS_PER_CHUNK: usize = 100;

pub const POSE_PACKET_SIZE: usize = 32;
pub const CHUNK_HEADER_SIZE: usize = 20;
pub const POINT_SIZE: usize = 12;
pub const TELEMETRY_PACKET_SIZE: usize = 9;
pub const COMMAND_PACKET_SIZE: usize = 1;

/// Largest possible chunk datagram (header + 100 points = 1220 bytes).
pub const MAX_CHUNK_DATAGRAM_SIZE: usize = CHUNK_HEADER_SIZE + MAX_POINTS_PER_CHUNK * POINT_SIZE;

/// The three outbound streams of a rover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Pose,
    Lidar,
    Telemetry,
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stream::Pose => write!(f, "pose"),
            Stream::Lidar => write!(f, "lidar"),
            Stream::Telemetry => write!(f, "telemetry"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Field readers
// ────────────────────────────────────────────────────────────────────────────

fn read_f64(buf: &[u8], at: usize) -> f64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    f64::from_ne_bytes(b)
}

fn read_f32(buf: &[u8], at: usize) -> f32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    f32::from_ne_bytes(b)
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_ne_bytes(b)
}

fn expect_len(record: &'static str, buf: &[u8], expected: usize) -> Result<(), RoverError> {
    if buf.len() != expected {
        return Err(RoverError::MalformedDatagram {
            record,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// Rover position and orientation at one sampling instant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PosePacket {
    /// Seconds since the emulator started (monotonic).
    pub timestamp: f64,
    pub pos_x: f32,
    pub pos_y: f32,
    pub pos_z: f32,
    /// Roll in degrees.
    pub rot_x_deg: f32,
    /// Pitch in degrees.
    pub rot_y_deg: f32,
    /// Yaw in degrees.
    pub rot_z_deg: f32,
}

impl PosePacket {
    pub fn encode(&self) -> [u8; POSE_PACKET_SIZE] {
        let mut buf = [0u8; POSE_PACKET_SIZE];
        buf[0..8].copy_from_slice(&self.timestamp.to_ne_bytes());
        let fields = [
            self.pos_x,
            self.pos_y,
            self.pos_z,
            self.rot_x_deg,
            self.rot_y_deg,
            self.rot_z_deg,
        ];
        for (i, v) in fields.iter().enumerate() {
            let at = 8 + i * 4;
            buf[at..at + 4].copy_from_slice(&v.to_ne_bytes());
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, RoverError> {
        expect_len("pose", buf, POSE_PACKET_SIZE)?;
        Ok(Self {
            timestamp: read_f64(buf, 0),
            pos_x: read_f32(buf, 8),
            pos_y: read_f32(buf, 12),
            pos_z: read_f32(buf, 16),
            rot_x_deg: read_f32(buf, 20),
            rot_y_deg: read_f32(buf, 24),
            rot_z_deg: read_f32(buf, 28),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LiDAR
// ────────────────────────────────────────────────────────────────────────────

/// A single LiDAR return in the sensor's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LidarPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl LidarPoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Positional metadata of one chunk within its scan.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LidarChunkHeader {
    /// Same timestamp as the pose of the cycle; the scan's correlation key.
    pub timestamp: f64,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub points_in_chunk: u32,
}

/// One fragment of a LiDAR scan: a header plus at most
/// [`MAX_POINTS_PER_CHUNK`] points.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LidarChunk {
    pub header: LidarChunkHeader,
    pub points: Vec<LidarPoint>,
}

impl LidarChunk {
    /// Build a chunk; `points_in_chunk` is taken from `points.len()`.
    pub fn new(timestamp: f64, chunk_index: u32, total_chunks: u32, points: Vec<LidarPoint>) -> Self {
        Self {
            header: LidarChunkHeader {
                timestamp,
                chunk_index,
                total_chunks,
                points_in_chunk: points.len() as u32,
            },
            points,
        }
    }

    /// Size in bytes of this chunk on the wire.
    pub fn wire_size(&self) -> usize {
        CHUNK_HEADER_SIZE + self.points.len() * POINT_SIZE
    }

    /// Encode header + points. Only the points present are written.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::TooManyPoints`] for chunks holding more than
    /// [`MAX_POINTS_PER_CHUNK`] points.
    pub fn encode(&self) -> Result<Vec<u8>, RoverError> {
        if self.points.len() > MAX_POINTS_PER_CHUNK {
            return Err(RoverError::TooManyPoints(self.points.len() as u32));
        }
        let mut buf = Vec::with_capacity(self.wire_size());
        buf.extend_from_slice(&self.header.timestamp.to_ne_bytes());
        buf.extend_from_slice(&self.header.chunk_index.to_ne_bytes());
        buf.extend_from_slice(&self.header.total_chunks.to_ne_bytes());
        buf.extend_from_slice(&(self.points.len() as u32).to_ne_bytes());
        for p in &self.points {
            buf.extend_from_slice(&p.x.to_ne_bytes());
            buf.extend_from_slice(&p.y.to_ne_bytes());
            buf.extend_from_slice(&p.z.to_ne_bytes());
        }
        Ok(buf)
    }

    /// Decode a chunk datagram.
    ///
    /// The datagram must be exactly `20 + 12 × points_in_chunk` bytes and
    /// declare at most [`MAX_POINTS_PER_CHUNK`] points. `chunk_index` is not
    /// checked against `total_chunks`.
    pub fn decode(buf: &[u8]) -> Result<Self, RoverError> {
        if buf.len() < CHUNK_HEADER_SIZE {
            return Err(RoverError::MalformedDatagram {
                record: "lidar chunk",
                expected: CHUNK_HEADER_SIZE,
                actual: buf.len(),
            });
        }
        let header = LidarChunkHeader {
            timestamp: read_f64(buf, 0),
            chunk_index: read_u32(buf, 8),
            total_chunks: read_u32(buf, 12),
            points_in_chunk: read_u32(buf, 16),
        };
        if header.points_in_chunk as usize > MAX_POINTS_PER_CHUNK {
            return Err(RoverError::TooManyPoints(header.points_in_chunk));
        }
        let n = header.points_in_chunk as usize;
        expect_len("lidar chunk", buf, CHUNK_HEADER_SIZE + n * POINT_SIZE)?;

        let points = buf[CHUNK_HEADER_SIZE..]
            .chunks_exact(POINT_SIZE)
            .map(|p| LidarPoint::new(read_f32(p, 0), read_f32(p, 4), read_f32(p, 8)))
            .collect();
        Ok(Self { header, points })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Telemetry & commands
// ────────────────────────────────────────────────────────────────────────────

/// Bitfield of the rover's four buttons (bit `i` = button `i` pressed).
///
/// The register is sticky: it keeps its value across cycles until a new
/// command byte replaces it wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ButtonState(pub u8);

impl ButtonState {
    pub const BUTTON_COUNT: u8 = 4;

    /// Whether button `index` (0..=3) is pressed.
    pub fn is_pressed(self, index: u8) -> bool {
        index < Self::BUTTON_COUNT && self.0 & (1 << index) != 0
    }

    /// Replace the whole register with a command byte (no bit merging).
    pub fn overwrite(&mut self, command: u8) {
        self.0 = command;
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Button-state snapshot emitted once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryPacket {
    pub timestamp: f64,
    pub buttons: ButtonState,
}

impl TelemetryPacket {
    pub fn encode(&self) -> [u8; TELEMETRY_PACKET_SIZE] {
        let mut buf = [0u8; TELEMETRY_PACKET_SIZE];
        buf[0..8].copy_from_slice(&self.timestamp.to_ne_bytes());
        buf[8] = self.buttons.bits();
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, RoverError> {
        expect_len("telemetry", buf, TELEMETRY_PACKET_SIZE)?;
        Ok(Self {
            timestamp: read_f64(buf, 0),
            buttons: ButtonState(buf[8]),
        })
    }
}

/// Decode an inbound command datagram (exactly one byte).
pub fn decode_command(buf: &[u8]) -> Result<u8, RoverError> {
    expect_len("command", buf, COMMAND_PACKET_SIZE)?;
    Ok(buf[0])
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(n: usize) -> Vec<LidarPoint> {
        (0..n)
            .map(|i| LidarPoint::new(i as f32, i as f32 * 0.5, -(i as f32)))
            .collect()
    }

    // ── Sizes ───────────────────────────────────────────────────────────────

    #[test]
    fn pose_encodes_to_32_bytes_with_fixed_offsets() {
        let pose = PosePacket {
            timestamp: 1.25,
            pos_x: 1.0,
            pos_y: 2.0,
            pos_z: 3.0,
            rot_x_deg: 10.0,
            rot_y_deg: 20.0,
            rot_z_deg: 30.0,
        };
        let buf = pose.encode();
        assert_eq!(buf.len(), 32);
        assert_eq!(&buf[0..8], &1.25f64.to_ne_bytes());
        assert_eq!(&buf[8..12], &1.0f32.to_ne_bytes());
        assert_eq!(&buf[20..24], &10.0f32.to_ne_bytes());
        assert_eq!(&buf[28..32], &30.0f32.to_ne_bytes());
        assert_eq!(PosePacket::decode(&buf).unwrap(), pose);
    }

    #[test]
    fn telemetry_encodes_to_9_bytes() {
        let t = TelemetryPacket {
            timestamp: 0.5,
            buttons: ButtonState(0b1010),
        };
        let buf = t.encode();
        assert_eq!(buf.len(), 9);
        assert_eq!(buf[8], 0b1010);
        assert_eq!(TelemetryPacket::decode(&buf).unwrap(), t);
    }

    #[test]
    fn chunk_size_is_header_plus_points() {
        for n in [0usize, 1, 50, 100] {
            let chunk = LidarChunk::new(2.0, 0, 1, pts(n));
            let buf = chunk.encode().unwrap();
            assert_eq!(buf.len(), 20 + 12 * n, "n={n}");
            assert_eq!(buf.len(), chunk.wire_size());
        }
        assert_eq!(MAX_CHUNK_DATAGRAM_SIZE, 1220);
    }

    #[test]
    fn chunk_header_layout() {
        let chunk = LidarChunk::new(3.5, 2, 3, pts(50));
        let buf = chunk.encode().unwrap();
        assert_eq!(&buf[0..8], &3.5f64.to_ne_bytes());
        assert_eq!(&buf[8..12], &2u32.to_ne_bytes());
        assert_eq!(&buf[12..16], &3u32.to_ne_bytes());
        assert_eq!(&buf[16..20], &50u32.to_ne_bytes());

        let back = LidarChunk::decode(&buf).unwrap();
        assert_eq!(back, chunk);
    }

    // ── Strict decoding ─────────────────────────────────────────────────────

    #[test]
    fn encode_rejects_oversized_chunk() {
        let chunk = LidarChunk::new(0.0, 0, 1, pts(101));
        assert_eq!(chunk.encode(), Err(RoverError::TooManyPoints(101)));
    }

    #[test]
    fn decode_rejects_short_header() {
        let err = LidarChunk::decode(&[0u8; 12]).unwrap_err();
        assert!(matches!(err, RoverError::MalformedDatagram { actual: 12, .. }));
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let mut buf = LidarChunk::new(1.0, 0, 1, pts(10)).encode().unwrap();
        buf.truncate(buf.len() - 12);
        let err = LidarChunk::decode(&buf).unwrap_err();
        assert_eq!(
            err,
            RoverError::MalformedDatagram {
                record: "lidar chunk",
                expected: 140,
                actual: 128,
            }
        );
    }

    #[test]
    fn decode_rejects_full_size_padding_for_short_chunk() {
        // A zero-padded 1220-byte datagram declaring 50 points is rejected.
        let mut buf = LidarChunk::new(1.0, 0, 1, pts(50)).encode().unwrap();
        buf.resize(MAX_CHUNK_DATAGRAM_SIZE, 0);
        assert!(LidarChunk::decode(&buf).is_err());
    }

    #[test]
    fn decode_rejects_too_many_points() {
        let mut buf = LidarChunk::new(1.0, 0, 1, Vec::new()).encode().unwrap();
        buf[16..20].copy_from_slice(&101u32.to_ne_bytes());
        assert_eq!(LidarChunk::decode(&buf), Err(RoverError::TooManyPoints(101)));
    }

    #[test]
    fn decode_keeps_out_of_range_index() {
        let buf = LidarChunk::new(1.0, 7, 2, pts(1)).encode().unwrap();
        let chunk = LidarChunk::decode(&buf).unwrap();
        assert_eq!(chunk.header.chunk_index, 7);
        assert_eq!(chunk.header.total_chunks, 2);
    }

    #[test]
    fn pose_and_telemetry_reject_wrong_sizes() {
        assert!(PosePacket::decode(&[0u8; 28]).is_err());
        assert!(TelemetryPacket::decode(&[0u8; 16]).is_err());
        assert_eq!(decode_command(&[0x5]), Ok(0x5));
        assert!(decode_command(&[1, 2]).is_err());
        assert!(decode_command(&[]).is_err());
    }

    // ── Button register ─────────────────────────────────────────────────────

    #[test]
    fn button_state_overwrite_is_wholesale() {
        let mut b = ButtonState(0b0011);
        b.overwrite(0b0100);
        assert_eq!(b.bits(), 0b0100);
        assert!(!b.is_pressed(0));
        assert!(!b.is_pressed(1));
        assert!(b.is_pressed(2));
        assert!(!b.is_pressed(7));
    }

    #[test]
    fn timestamp_bits_survive_roundtrip() {
        let ts = 0.1f64 + 0.2f64;
        let chunk = LidarChunk::new(ts, 0, 1, pts(1));
        let back = LidarChunk::decode(&chunk.encode().unwrap()).unwrap();
        assert_eq!(back.header.timestamp.to_bits(), ts.to_bits());
    }
}
