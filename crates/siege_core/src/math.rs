//! Fixed-point math utilities for deterministic simulation.
//!
//! All simulation uses fixed-point arithmetic so that identical inputs
//! produce identical states on every platform. Floats only appear at the
//! edges (scenario files, JSON status output).

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from whole-number coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x.saturating_sub(other.x);
        let dy = self.y.saturating_sub(other.y);
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Whether `other` lies within `range` of this point (inclusive).
    #[must_use]
    pub fn within(self, other: Self, range: Fixed) -> bool {
        self.distance_squared(other) <= range.saturating_mul(range)
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x
            .saturating_mul(other.x)
            .saturating_add(self.y.saturating_mul(other.y))
    }

    /// Normalize vector using fixed-point math.
    ///
    /// The vector is first divided by its largest component so the squared
    /// length stays within `[1, 2]` for any magnitude.
    #[must_use]
    pub fn normalize(self) -> Self {
        let largest = self.x.saturating_abs().max(self.y.saturating_abs());
        if largest == Fixed::ZERO {
            return Self::ZERO;
        }

        let unit = Self::new(self.x / largest, self.y / largest);
        let len = fixed_sqrt(unit.dot(unit));
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(unit.x / len, unit.y / len)
    }

    /// Scale both components.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(
            self.x.saturating_mul(factor),
            self.y.saturating_mul(factor),
        )
    }

    /// Step from this point toward `target` by at most `max_step`.
    ///
    /// Lands exactly on `target` when it is closer than one step, so units
    /// never overshoot their destination.
    #[must_use]
    pub fn step_towards(self, target: Self, max_step: Fixed) -> Self {
        if self.within(target, max_step) {
            return target;
        }
        self + (target - self).normalize().scale(max_step)
    }
}

/// Scale `value` by a whole-number percentage (150 = 150%).
///
/// Saturates instead of overflowing when the product leaves the `Fixed` range.
#[must_use]
pub fn percent_of(value: Fixed, percent: u32) -> Fixed {
    let hundred = Fixed::from_num(100);
    let percent = Fixed::saturating_from_num(percent);
    match value.checked_mul(percent) {
        Some(scaled) => scaled / hundred,
        None => (value / hundred).saturating_mul(percent),
    }
}

/// Computes the square root of a fixed-point number using binary search.
///
/// Deterministic and free of overflow for the full `I32F32` range.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::from_num(1) {
        value
    } else {
        Fixed::from_num(1)
    };

    // 64 halvings exhaust the fractional precision of I32F32
    for _ in 0..64 {
        let mid = low + (high - low) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x.saturating_add(rhs.x),
            y: self.y.saturating_add(rhs.y),
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x.saturating_sub(rhs.x),
            y: self.y.saturating_sub(rhs.y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec2_distance() {
        let a = Vec2Fixed::from_ints(3, 0);
        let b = Vec2Fixed::from_ints(0, 4);
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));

        let dist = a.distance(b);
        let epsilon = Fixed::from_num(1) / Fixed::from_num(10000);
        assert!((dist - Fixed::from_num(5)).abs() < epsilon);
    }

    #[test]
    fn test_within_is_inclusive() {
        let a = Vec2Fixed::ZERO;
        let b = Vec2Fixed::from_ints(100, 0);
        assert!(a.within(b, Fixed::from_num(100)));
        assert!(!a.within(b, Fixed::from_num(99)));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(Fixed::from_num(100), 150), Fixed::from_num(150));
        assert_eq!(percent_of(Fixed::from_num(40), 50), Fixed::from_num(20));
    }

    #[test]
    fn test_step_towards_does_not_overshoot() {
        let start = Vec2Fixed::ZERO;
        let target = Vec2Fixed::from_ints(3, 0);

        let step = start.step_towards(target, Fixed::from_num(2));
        assert_eq!(step, Vec2Fixed::from_ints(2, 0));

        let arrived = step.step_towards(target, Fixed::from_num(2));
        assert_eq!(arrived, target);
    }

    #[test]
    fn test_vec2_normalize() {
        let v = Vec2Fixed::from_ints(3, 4);
        let norm = v.normalize();

        let len_sq = norm.dot(norm);
        let one = Fixed::from_num(1);
        let epsilon = one / Fixed::from_num(10000);
        assert!(
            (len_sq - one).abs() < epsilon,
            "normalized vector length² should be ~1, got {:?}",
            len_sq
        );
    }

    #[test]
    fn test_normalize_far_vector() {
        let v = Vec2Fixed::from_ints(50_000, -50_000);
        let norm = v.normalize();

        let half = Fixed::from_num(1) / Fixed::from_num(2);
        let epsilon = Fixed::from_num(1) / Fixed::from_num(10000);
        assert!((norm.dot(norm) - Fixed::from_num(1)).abs() < epsilon);
        assert!((norm.x.saturating_mul(norm.x) - half).abs() < epsilon);
        assert!(norm.y < Fixed::ZERO);
    }

    #[test]
    fn test_step_towards_across_the_whole_range() {
        let start = Vec2Fixed::from_ints(i32::MAX, 0);
        let target = Vec2Fixed::from_ints(i32::MIN, 0);

        let step = start.step_towards(target, Fixed::from_num(2));
        let expected = Fixed::from_num(i32::MAX - 2);
        let epsilon = Fixed::from_num(1) / Fixed::from_num(10000);
        assert!((step.x - expected).abs() < epsilon);
        assert_eq!(step.y, Fixed::ZERO);
    }

    #[test]
    fn test_percent_of_saturates() {
        let huge = percent_of(Fixed::from_num(1000), u32::MAX);
        assert_eq!(huge, Fixed::MAX);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(Vec2Fixed::ZERO.normalize(), Vec2Fixed::ZERO);
    }
}
