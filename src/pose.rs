//! Vector and quaternion primitives used to build controller orientations.
//!
//! Conventions:
//! - Quaternions are stored as `[x, y, z, w]` (the order used on the wire).
//! - `a * b` is the Hamilton product: rotating a vector by `a * b` applies `b`
//!   first, then `a`. Mounting offsets are applied as `raw * offset`, i.e. in
//!   the controller's local frame.
//! - Euler angles are radians; `from_euler` composes yaw (Y), then pitch (X),
//!   then roll (Z): `q = yaw * pitch * roll`.

use std::ops::{Add, Mul, Neg, Sub};

/// Below this squared length a vector is treated as zero.
const EPSILON_SQ: f32 = 1e-12;

/// Above this cosine two quaternions are close enough to lerp instead of slerp.
const SLERP_LINEAR_THRESHOLD: f32 = 0.9995;

/// A point or direction in tracking space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const ORIGIN: Position = Position::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Position) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Position) -> Position {
        Position::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a zero-length vector.
    pub fn try_normalize(self) -> Option<Position> {
        let len_sq = self.dot(self);
        if len_sq <= EPSILON_SQ || !len_sq.is_finite() {
            return None;
        }
        Some(self * (1.0 / len_sq.sqrt()))
    }

    /// Linear interpolation; `t` is expected in `[0, 1]`.
    pub fn lerp(self, other: Position, t: f32) -> Position {
        self + (other - self) * t
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Position {
    type Output = Position;

    fn mul(self, rhs: f32) -> Position {
        Position::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Position {
    type Output = Position;

    fn neg(self) -> Position {
        Position::new(-self.x, -self.y, -self.z)
    }
}

/// A rotation stored as a unit quaternion `[x, y, z, w]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Orientation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Orientation {
    pub const IDENTITY: Orientation = Orientation::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn dot(self, other: Orientation) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    pub fn norm(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Rescale to unit length. A zero quaternion maps to the identity.
    pub fn normalized(self) -> Orientation {
        let len_sq = self.dot(self);
        if len_sq <= EPSILON_SQ || !len_sq.is_finite() {
            return Orientation::IDENTITY;
        }
        let inv = 1.0 / len_sq.sqrt();
        Orientation::new(self.x * inv, self.y * inv, self.z * inv, self.w * inv)
    }

    /// Inverse of a unit quaternion.
    pub fn conjugate(self) -> Orientation {
        Orientation::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Build from a 3x3 matrix whose rows are the basis axes `[x, y, z]`.
    pub fn from_rotation_matrix(m: &[[f32; 3]; 3]) -> Orientation {
        let trace = m[0][0] + m[1][1] + m[2][2];

        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Orientation::new(
                (m[2][1] - m[1][2]) / s,
                (m[0][2] - m[2][0]) / s,
                (m[1][0] - m[0][1]) / s,
                0.25 * s,
            )
        } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
            let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
            Orientation::new(
                0.25 * s,
                (m[0][1] + m[1][0]) / s,
                (m[0][2] + m[2][0]) / s,
                (m[2][1] - m[1][2]) / s,
            )
        } else if m[1][1] > m[2][2] {
            let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
            Orientation::new(
                (m[0][1] + m[1][0]) / s,
                0.25 * s,
                (m[1][2] + m[2][1]) / s,
                (m[0][2] - m[2][0]) / s,
            )
        } else {
            let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
            Orientation::new(
                (m[0][2] + m[2][0]) / s,
                (m[1][2] + m[2][1]) / s,
                0.25 * s,
                (m[1][0] - m[0][1]) / s,
            )
        };

        q.normalized()
    }

    /// Orientation of the frame spanned by three tracked points.
    ///
    /// `y` points from `p1` to `p2`, `z` is normal to the triangle and `x`
    /// completes the right-handed basis. `flip` negates `x` and `z`, which
    /// mirrors the frame between left and right hands.
    ///
    /// Returns `None` when the points are coincident or collinear.
    pub fn from_triangle(p1: Position, p2: Position, p3: Position, flip: bool) -> Option<Orientation> {
        let y_axis = (p2 - p1).try_normalize()?;
        let z_axis = (p3 - p1).cross(p2 - p1).try_normalize()?;
        let x_axis = y_axis.cross(z_axis).try_normalize()?;

        let (x_axis, z_axis) = if flip {
            (-x_axis, -z_axis)
        } else {
            (x_axis, z_axis)
        };

        let m = [
            [x_axis.x, x_axis.y, x_axis.z],
            [y_axis.x, y_axis.y, y_axis.z],
            [z_axis.x, z_axis.y, z_axis.z],
        ];
        Some(Orientation::from_rotation_matrix(&m))
    }

    /// Compose pitch (X), yaw (Y) and roll (Z), all in radians.
    pub fn from_euler(pitch: f32, yaw: f32, roll: f32) -> Orientation {
        let (sp, cp) = (0.5 * pitch).sin_cos();
        let (sy, cy) = (0.5 * yaw).sin_cos();
        let (sr, cr) = (0.5 * roll).sin_cos();

        let q_pitch = Orientation::new(sp, 0.0, 0.0, cp);
        let q_yaw = Orientation::new(0.0, sy, 0.0, cy);
        let q_roll = Orientation::new(0.0, 0.0, sr, cr);

        (q_yaw * q_pitch * q_roll).normalized()
    }

    /// Spherical interpolation along the shortest arc; `t` is expected in `[0, 1]`.
    pub fn slerp(self, other: Orientation, t: f32) -> Orientation {
        let mut end = other;
        let mut cos_theta = self.dot(other);

        if cos_theta < 0.0 {
            end = Orientation::new(-other.x, -other.y, -other.z, -other.w);
            cos_theta = -cos_theta;
        }

        if cos_theta > SLERP_LINEAR_THRESHOLD {
            return Orientation::new(
                self.x + t * (end.x - self.x),
                self.y + t * (end.y - self.y),
                self.z + t * (end.z - self.z),
                self.w + t * (end.w - self.w),
            )
            .normalized();
        }

        let theta_0 = cos_theta.clamp(-1.0, 1.0).acos();
        let theta = theta_0 * t;
        let sin_theta_0 = theta_0.sin();
        let s0 = theta.cos() - cos_theta * theta.sin() / sin_theta_0;
        let s1 = theta.sin() / sin_theta_0;

        Orientation::new(
            s0 * self.x + s1 * end.x,
            s0 * self.y + s1 * end.y,
            s0 * self.z + s1 * end.z,
            s0 * self.w + s1 * end.w,
        )
        .normalized()
    }

    /// Geodesic angle in radians between two orientations, in `[0, π]`.
    pub fn angle_to(self, other: Orientation) -> f32 {
        let d = self.conjugate() * other;
        let vector_len = (d.x * d.x + d.y * d.y + d.z * d.z).sqrt();
        2.0 * vector_len.atan2(d.w.abs())
    }

    /// Rotate a vector by this orientation.
    pub fn rotate(self, v: Position) -> Position {
        let p = Orientation::new(v.x, v.y, v.z, 0.0);
        let r = self * p * self.conjugate();
        Position::new(r.x, r.y, r.z)
    }
}

impl Mul for Orientation {
    type Output = Orientation;

    fn mul(self, b: Orientation) -> Orientation {
        let a = self;
        Orientation::new(
            a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
            a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        )
    }
}
