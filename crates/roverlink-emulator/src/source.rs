//! Trajectory sample sources.
//!
//! A [`SampleSource`] yields one [`Sample`] (pose + point cloud) per emulator
//! cycle.  [`DatFileSource`] reads the recorded `.dat` format, one sample per
//! line:
//!
//! ```text
//! posX,posY,posZ,rotX,rotY,rotZ; x1,y1,z1; x2,y2,z2; ...
//! ```
//!
//! Blank lines are skipped.  A line without a `;`, with fewer than six pose
//! fields, or with a field that is not a number is reported as
//! [`RoverError::MalformedRecord`]; the caller decides whether to skip it.
//! Point tokens holding fewer than three coordinates (such as the empty
//! token after a trailing `;`) are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use roverlink_types::{LidarPoint, RoverError};
use tracing::warn;

/// One recorded instant: rover pose and the LiDAR cloud seen from it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sample {
    pub position: [f32; 3],
    /// Roll, pitch, yaw in degrees.
    pub rotation_deg: [f32; 3],
    pub points: Vec<LidarPoint>,
}

/// Anything that can feed samples to the emulator.
pub trait SampleSource {
    /// Next sample.
    ///
    /// * `None` – the source is exhausted.
    /// * `Some(Err(_))` – this record is malformed; later records may still
    ///   be valid.
    fn next_sample(&mut self) -> Option<Result<Sample, RoverError>>;
}

/// Replays samples from an in-memory list.  Handy for tests and scripted
/// scenarios.
impl SampleSource for std::vec::IntoIter<Sample> {
    fn next_sample(&mut self) -> Option<Result<Sample, RoverError>> {
        self.next().map(Ok)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DatFileSource
// ────────────────────────────────────────────────────────────────────────────

/// Line-oriented `.dat` trajectory reader.
pub struct DatFileSource<R> {
    reader: R,
    buf: Vec<u8>,
}

impl DatFileSource<BufReader<File>> {
    /// Open a trajectory file.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Io`] when the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RoverError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| RoverError::Io(format!("cannot open data file {}: {e}", path.display())))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> DatFileSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> SampleSource for DatFileSource<R> {
    fn next_sample(&mut self) -> Option<Result<Sample, RoverError>> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "read error in data file; treating as end of data");
                    return None;
                }
            }
            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(RoverError::MalformedRecord {
                        line: String::from_utf8_lossy(&self.buf).trim_end().to_string(),
                        reason: format!("not valid UTF-8: {e}"),
                    }));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(parse_line(line.trim_end_matches(['\n', '\r'])));
        }
    }
}

fn parse_field(token: &str, line: &str) -> Result<f32, RoverError> {
    token.trim().parse::<f32>().map_err(|e| RoverError::MalformedRecord {
        line: line.to_string(),
        reason: format!("invalid number {:?}: {e}", token.trim()),
    })
}

/// Parse one `.dat` line into a [`Sample`].
pub fn parse_line(line: &str) -> Result<Sample, RoverError> {
    let Some((pose_part, points_part)) = line.split_once(';') else {
        return Err(RoverError::MalformedRecord {
            line: line.to_string(),
            reason: "no ';' separating pose from points".to_string(),
        });
    };

    let pose_tokens: Vec<&str> = pose_part.split(',').collect();
    if pose_tokens.len() < 6 {
        return Err(RoverError::MalformedRecord {
            line: line.to_string(),
            reason: format!("pose has {} fields, expected 6", pose_tokens.len()),
        });
    }
    let mut pose = [0.0f32; 6];
    for (slot, token) in pose.iter_mut().zip(&pose_tokens) {
        *slot = parse_field(token, line)?;
    }

    let mut points = Vec::new();
    for token in points_part.split(';') {
        let coords: Vec<&str> = token.split(',').collect();
        if coords.len() < 3 {
            continue;
        }
        points.push(LidarPoint::new(
            parse_field(coords[0], line)?,
            parse_field(coords[1], line)?,
            parse_field(coords[2], line)?,
        ));
    }

    Ok(Sample {
        position: [pose[0], pose[1], pose[2]],
        rotation_deg: [pose[3], pose[4], pose[5]],
        points,
    })
}
