//! Geometry primitives shared by the page and row caches.
//!
//! Sizes are expressed in device-independent pixels as `f64`. Layout sums many page sizes
//! together (and multiplies them by a zoom factor), so comparisons go through the tolerant
//! helpers in this module rather than `==`.

/// Size of a page or a row (device-independent pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Size {
    /// The "not present" sentinel returned for pages outside the cache.
    pub const ZERO: Size = Size {
        width: 0.0,
        height: 0.0,
    };

    /// Create a new size.
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either dimension is zero (or negative).
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Returns `true` if both dimensions are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.width.is_finite() && self.height.is_finite()
    }

    /// Returns `true` if both dimensions are within floating point tolerance of `other`.
    pub fn is_close(&self, other: &Size) -> bool {
        are_close(self.width, other.width) && are_close(self.height, other.height)
    }
}

// Relative tolerance used by `are_close`; matches the precision of accumulated page sums.
const EPSILON: f64 = 2.220_446_049_250_313e-16 * 10.0;

/// Compare two floats with a tolerance relative to their magnitude.
pub fn are_close(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    let tolerance = (a.abs() + b.abs() + 10.0) * EPSILON;
    let delta = a - b;
    -tolerance < delta && tolerance > delta
}

/// `a > b` and not within tolerance of `b`.
pub fn greater_than(a: f64, b: f64) -> bool {
    a > b && !are_close(a, b)
}

/// Round `value` to `digits` decimal places (half away from zero).
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_size_is_empty() {
        assert!(Size::ZERO.is_empty());
        assert!(Size::new(10.0, 0.0).is_empty());
        assert!(!Size::new(816.0, 1056.0).is_empty());
    }

    #[test]
    fn test_are_close_absorbs_summation_error() {
        let sum: f64 = (0..10).map(|_| 0.1).sum();
        assert!(sum != 1.0);
        assert!(are_close(sum, 1.0));
        assert!(!are_close(1.0, 1.001));
        assert!(!greater_than(sum, 1.0));
        assert!(greater_than(1.01, 1.0));
    }

    #[test]
    fn test_round_to_two_digits() {
        assert_eq!(round_to(1.234_9, 2), 1.23);
        assert_eq!(round_to(1.235_1, 2), 1.24);
        assert_eq!(round_to(-0.004, 2), -0.0);
    }
}
