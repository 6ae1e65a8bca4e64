//! Pose → world transform.
//!
//! A [`PosePacket`] carries a position and three Euler angles in degrees.
//! [`pose_to_matrix`] turns it into a 4×4 homogeneous rigid-body transform
//! `T · R` where `R = Ry(rot_y) · Rx(rot_x) · Rz(rot_z)` (yaw about Y, then
//! pitch about X, then roll about Z, all intrinsic).  Applying the matrix to
//! a sensor-frame [`LidarPoint`] yields its world-frame coordinates.
//!
//! Matrices are stored column-major (`m[column][row]`), the translation
//! living in column 3.
//!
//! # Example
//!
//! ```rust
//! use roverlink_perception::transform::{pose_to_matrix, transform_point};
//! use roverlink_types::{LidarPoint, PosePacket};
//!
//! let pose = PosePacket { pos_x: 10.0, ..Default::default() };
//! let m = pose_to_matrix(&pose);
//! let p = transform_point(&m, LidarPoint::new(1.0, 2.0, 3.0));
//! assert!((p.x - 11.0).abs() < 1e-5);
//! ```

use roverlink_types::{LidarPoint, PosePacket};

/// Column-major 4×4 matrix.
pub type Mat4 = [[f32; 4]; 4];

type Mat3 = [[f32; 3]; 3];

/// The 4×4 identity.
pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

// Row-major 3×3 helpers; only used to build the rotation block.

fn rot_x(rad: f32) -> Mat3 {
    let (s, c) = rad.sin_cos();
    [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]]
}

fn rot_y(rad: f32) -> Mat3 {
    let (s, c) = rad.sin_cos();
    [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]]
}

fn rot_z(rad: f32) -> Mat3 {
    let (s, c) = rad.sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

fn mul3(a: Mat3, b: Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[r][k] * b[k][c]).sum();
        }
    }
    out
}

/// Build the transform for a position and Euler angles in degrees.
pub fn create_transform(position: [f32; 3], rotation_deg: [f32; 3]) -> Mat4 {
    let [rx, ry, rz] = rotation_deg.map(f32::to_radians);
    let r = mul3(mul3(rot_y(ry), rot_x(rx)), rot_z(rz));

    let mut m = IDENTITY;
    for (col, column) in m.iter_mut().take(3).enumerate() {
        for (row, cell) in column.iter_mut().take(3).enumerate() {
            *cell = r[row][col];
        }
    }
    m[3][0] = position[0];
    m[3][1] = position[1];
    m[3][2] = position[2];
    m
}

/// Transform mapping the rover's sensor frame into the world frame.
pub fn pose_to_matrix(pose: &PosePacket) -> Mat4 {
    create_transform(
        [pose.pos_x, pose.pos_y, pose.pos_z],
        [pose.rot_x_deg, pose.rot_y_deg, pose.rot_z_deg],
    )
}

/// Apply `m` to a point (w = 1).
pub fn transform_point(m: &Mat4, p: LidarPoint) -> LidarPoint {
    let v = [p.x, p.y, p.z, 1.0];
    let row = |r: usize| (0..4).map(|c| m[c][r] * v[c]).sum::<f32>();
    LidarPoint::new(row(0), row(1), row(2))
}

pub fn transform_points(m: &Mat4, points: &[LidarPoint]) -> Vec<LidarPoint> {
    points.iter().map(|p| transform_point(m, *p)).collect()
}

/// Translation part of `m`.
pub fn position_of(m: &Mat4) -> [f32; 3] {
    [m[3][0], m[3][1], m[3][2]]
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_point(p: LidarPoint, x: f32, y: f32, z: f32) {
        assert!((p.x - x).abs() < 1e-5, "x: expected {x}, got {}", p.x);
        assert!((p.y - y).abs() < 1e-5, "y: expected {y}, got {}", p.y);
        assert!((p.z - z).abs() < 1e-5, "z: expected {z}, got {}", p.z);
    }

    #[test]
    fn zero_pose_is_identity() {
        let m = pose_to_matrix(&PosePacket::default());
        for (col, expected) in m.iter().zip(IDENTITY.iter()) {
            for (a, b) in col.iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-6);
            }
        }
        assert_point(transform_point(&m, LidarPoint::new(1.0, 2.0, 3.0)), 1.0, 2.0, 3.0);
    }

    #[test]
    fn translation_only() {
        let m = create_transform([10.0, 20.0, 30.0], [0.0; 3]);
        assert_point(transform_point(&m, LidarPoint::new(1.0, 2.0, 3.0)), 11.0, 22.0, 33.0);
        assert_eq!(position_of(&m), [10.0, 20.0, 30.0]);
    }

    #[test]
    fn ninety_degrees_about_y() {
        let m = create_transform([0.0; 3], [0.0, 90.0, 0.0]);
        assert_point(transform_point(&m, LidarPoint::new(1.0, 0.0, 0.0)), 0.0, 0.0, -1.0);
    }

    #[test]
    fn ninety_degrees_about_z() {
        let m = create_transform([0.0; 3], [0.0, 0.0, 90.0]);
        assert_point(transform_point(&m, LidarPoint::new(1.0, 0.0, 0.0)), 0.0, 1.0, 0.0);
    }

    #[test]
    fn yaw_is_applied_after_pitch() {
        // Ry(90) · Rx(90) takes +Z to -Y; the reverse order would give +X.
        let m = create_transform([0.0; 3], [90.0, 90.0, 0.0]);
        assert_point(transform_point(&m, LidarPoint::new(0.0, 0.0, 1.0)), 0.0, -1.0, 0.0);
    }

    #[test]
    fn rotation_then_translation() {
        let pose = PosePacket {
            pos_x: 5.0,
            rot_z_deg: 90.0,
            ..Default::default()
        };
        let m = pose_to_matrix(&pose);
        let world = transform_points(&m, &[LidarPoint::new(1.0, 0.0, 0.0), LidarPoint::new(0.0, 0.0, 2.0)]);
        assert_point(world[0], 5.0, 1.0, 0.0);
        assert_point(world[1], 5.0, 0.0, 2.0);
    }
}
