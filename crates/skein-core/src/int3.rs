//! Fixed-point geometry: [`Int3`].
//!
//! All positions and costs in the engine live on an integer lattice with
//! [`PRECISION`] units per world unit. Integer arithmetic keeps search costs
//! bit-for-bit reproducible across platforms; floats appear only at the
//! world-space conversion boundary.

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

/// Lattice units per world unit.
pub const PRECISION: i32 = 1000;

/// A 3D fixed-point lattice coordinate.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Int3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Int3 {
    /// Origin (0, 0, 0).
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    /// Create a new coordinate from raw lattice units.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Convert from world-space floats, rounding to the nearest lattice point.
    #[inline]
    pub fn from_world(x: f32, y: f32, z: f32) -> Self {
        Self {
            x: (x * PRECISION as f32).round() as i32,
            y: (y * PRECISION as f32).round() as i32,
            z: (z * PRECISION as f32).round() as i32,
        }
    }

    /// Convert back to world-space floats.
    #[inline]
    pub fn to_world(self) -> (f32, f32, f32) {
        let p = PRECISION as f32;
        (self.x as f32 / p, self.y as f32 / p, self.z as f32 / p)
    }

    /// Squared Euclidean magnitude, exact in `u64`.
    #[inline]
    pub fn magnitude_sq(self) -> u64 {
        let x = self.x as i64;
        let y = self.y as i64;
        let z = self.z as i64;
        (x * x + y * y + z * z) as u64
    }

    /// Euclidean magnitude, rounded down to lattice units.
    ///
    /// Uses an integer square root so the result is deterministic.
    #[inline]
    pub fn magnitude(self) -> u32 {
        isqrt(self.magnitude_sq()) as u32
    }

    /// Euclidean distance between two coordinates in lattice units.
    #[inline]
    pub fn distance(a: Int3, b: Int3) -> u32 {
        (a - b).magnitude()
    }

    /// Manhattan distance (|dx| + |dy| + |dz|) in lattice units.
    #[inline]
    pub fn manhattan(a: Int3, b: Int3) -> u32 {
        let d = a - b;
        (d.x.unsigned_abs() + d.y.unsigned_abs() + d.z.unsigned_abs()) as u32
    }

    /// Chebyshev distance (max of axis deltas) in lattice units.
    #[inline]
    pub fn chebyshev(a: Int3, b: Int3) -> u32 {
        let d = a - b;
        d.x.unsigned_abs()
            .max(d.y.unsigned_abs())
            .max(d.z.unsigned_abs())
    }
}

/// Twice the signed area of triangle `(o, a, b)` projected onto the XZ plane.
///
/// Positive when `b` lies to the left of the directed line `o -> a` (with X
/// right and Z up), negative to the right, zero when collinear. Computed in
/// `i128` so it is exact for any `i32` inputs; the funnel's side tests never
/// suffer float instability.
#[inline]
pub fn cross_xz(o: Int3, a: Int3, b: Int3) -> i128 {
    let ax = (a.x as i64 - o.x as i64) as i128;
    let az = (a.z as i64 - o.z as i64) as i128;
    let bx = (b.x as i64 - o.x as i64) as i128;
    let bz = (b.z as i64 - o.z as i64) as i128;
    ax * bz - bx * az
}

/// Integer square root: largest `r` with `r * r <= v`.
pub(crate) fn isqrt(v: u64) -> u64 {
    if v == 0 {
        return 0;
    }
    // Newton's method seeded from the float estimate converges in a couple
    // of iterations for 64-bit inputs.
    let mut r = (v as f64).sqrt() as u64;
    loop {
        let next = (r + v / r) / 2;
        if next >= r {
            break;
        }
        r = next;
    }
    while (r + 1).checked_mul(r + 1).is_some_and(|sq| sq <= v) {
        r += 1;
    }
    r
}

// --- trait impls ---

impl fmt::Display for Int3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Add for Int3 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Int3 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<i32> for Int3 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: i32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<i32> for Int3 {
    type Output = Self;
    #[inline]
    fn div(self, rhs: i32) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}
