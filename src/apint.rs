//! Fixed-width two's-complement integers.
//!
//! [`ApInt`] pairs a bit width with an arbitrary-precision magnitude that is always
//! kept reduced modulo `2^width`. Every operation therefore wraps exactly like machine
//! arithmetic of that width, and there is no upper limit on the width itself: the
//! double-width products used by range multiplication are just wider `ApInt`s.
//!
//! The value has no signedness of its own. Operations that care about it come in
//! pairs (`ult`/`slt`, `udiv`/`sdiv`, `lshr`/`ashr`, `zext`/`sext`), mirroring the
//! instructions that consume them.
//!
//! # Examples
//!
//! ```
//! use intrange_rs::apint::ApInt;
//!
//! let x = ApInt::new(8, 250);
//! let y = ApInt::new(8, 10);
//! assert_eq!(x.add(&y), ApInt::new(8, 4)); // wraps at 256
//! assert!(x.ugt(&y));
//! assert!(x.slt(&y)); // 250 is -6 when read as signed
//! ```

use std::cmp::Ordering;
use std::fmt;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, ToPrimitive, Zero};

/// An integer of a fixed bit width.
///
/// # Invariants
///
/// - `width >= 1`
/// - `value < 2^width`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApInt {
    width: u32,
    value: BigUint,
}

/// `2^width - 1`
fn mask(width: u32) -> BigUint {
    (BigUint::one() << width as usize) - BigUint::one()
}

impl ApInt {
    /// Creates a value from an unbounded magnitude, keeping the low `width` bits.
    ///
    /// # Panics
    ///
    /// Panics if `width == 0`.
    pub fn from_biguint(width: u32, value: BigUint) -> Self {
        assert!(width > 0, "Bit width must be >= 1");
        let value = value & mask(width);
        Self { width, value }
    }

    /// Creates a value from a signed integer, wrapping it into `width` bits.
    pub fn from_bigint(width: u32, value: &BigInt) -> Self {
        assert!(width > 0, "Bit width must be >= 1");
        let modulus = BigInt::one() << width as usize;
        let mut v = value % &modulus;
        if v.sign() == Sign::Minus {
            v += &modulus;
        }
        Self::from_biguint(width, v.magnitude().clone())
    }

    pub fn new(width: u32, value: u64) -> Self {
        Self::from_biguint(width, BigUint::from(value))
    }

    pub fn from_i64(width: u32, value: i64) -> Self {
        Self::from_bigint(width, &BigInt::from(value))
    }

    pub fn zero(width: u32) -> Self {
        Self::new(width, 0)
    }

    pub fn one(width: u32) -> Self {
        Self::new(width, 1)
    }

    /// The unsigned maximum, `2^width - 1` (all bits set).
    pub fn all_ones(width: u32) -> Self {
        Self::from_biguint(width, mask(width))
    }

    /// The signed minimum, `-2^(width-1)` (only the sign bit set).
    pub fn signed_min(width: u32) -> Self {
        Self::one_bit_set(width, width - 1)
    }

    /// The signed maximum, `2^(width-1) - 1`.
    pub fn signed_max(width: u32) -> Self {
        Self::from_biguint(width, mask(width - 1))
    }

    pub fn one_bit_set(width: u32, bit: u32) -> Self {
        assert!(bit < width, "Bit {} is out of range for width {}", bit, width);
        Self::from_biguint(width, BigUint::one() << bit as usize)
    }

    /// Value with the `count` least significant bits set.
    pub fn low_bits_set(width: u32, count: u32) -> Self {
        Self::from_biguint(width, mask(count.min(width)))
    }

    /// Value with the `count` most significant bits set.
    pub fn high_bits_set(width: u32, count: u32) -> Self {
        assert!(count <= width);
        Self::all_ones(width).shl(width - count)
    }

    /// Value with every bit at position `lo` and above set.
    pub fn bits_set_from(width: u32, lo: u32) -> Self {
        Self::all_ones(width).shl(lo)
    }
}

impl ApInt {
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The unsigned magnitude.
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// The value read as a two's-complement signed integer.
    pub fn to_bigint(&self) -> BigInt {
        let v = BigInt::from(self.value.clone());
        if self.is_negative() {
            v - (BigInt::one() << self.width as usize)
        } else {
            v
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.value.to_u64()
    }

    pub fn to_i64(&self) -> Option<i64> {
        self.to_bigint().to_i64()
    }

    /// The unsigned value, saturated to `u64::MAX`.
    pub fn limited_value(&self) -> u64 {
        self.to_u64().unwrap_or(u64::MAX)
    }

    /// Interprets the unsigned value as a shift amount, saturated to `u32::MAX`.
    pub fn shift_amount(&self) -> u32 {
        self.to_u64().map_or(u32::MAX, |v| v.min(u32::MAX as u64) as u32)
    }

    pub fn bit(&self, index: u32) -> bool {
        index < self.width && self.value.bit(index as u64)
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }
    pub fn is_one(&self) -> bool {
        self.value.is_one()
    }
    pub fn is_all_ones(&self) -> bool {
        self.value == mask(self.width)
    }
    pub fn is_max_value(&self) -> bool {
        self.is_all_ones()
    }
    pub fn is_min_value(&self) -> bool {
        self.is_zero()
    }
    pub fn is_negative(&self) -> bool {
        self.value.bit((self.width - 1) as u64)
    }
    pub fn is_non_negative(&self) -> bool {
        !self.is_negative()
    }
    pub fn is_strictly_positive(&self) -> bool {
        self.is_non_negative() && !self.is_zero()
    }
    pub fn is_signed_min(&self) -> bool {
        *self == Self::signed_min(self.width)
    }
    pub fn is_signed_max(&self) -> bool {
        *self == Self::signed_max(self.width)
    }

    fn check_width(&self, other: &ApInt) {
        assert_eq!(
            self.width, other.width,
            "Bit width mismatch: {} vs {}",
            self.width, other.width
        );
    }
}

// Comparisons.
impl ApInt {
    pub fn ucmp(&self, other: &ApInt) -> Ordering {
        self.check_width(other);
        self.value.cmp(&other.value)
    }

    pub fn scmp(&self, other: &ApInt) -> Ordering {
        self.check_width(other);
        self.to_bigint().cmp(&other.to_bigint())
    }

    pub fn ult(&self, other: &ApInt) -> bool {
        self.ucmp(other) == Ordering::Less
    }
    pub fn ule(&self, other: &ApInt) -> bool {
        self.ucmp(other) != Ordering::Greater
    }
    pub fn ugt(&self, other: &ApInt) -> bool {
        self.ucmp(other) == Ordering::Greater
    }
    pub fn uge(&self, other: &ApInt) -> bool {
        self.ucmp(other) != Ordering::Less
    }
    pub fn slt(&self, other: &ApInt) -> bool {
        self.scmp(other) == Ordering::Less
    }
    pub fn sle(&self, other: &ApInt) -> bool {
        self.scmp(other) != Ordering::Greater
    }
    pub fn sgt(&self, other: &ApInt) -> bool {
        self.scmp(other) == Ordering::Greater
    }
    pub fn sge(&self, other: &ApInt) -> bool {
        self.scmp(other) != Ordering::Less
    }

    pub fn umin(&self, other: &ApInt) -> ApInt {
        if self.ult(other) {
            self.clone()
        } else {
            other.clone()
        }
    }
    pub fn umax(&self, other: &ApInt) -> ApInt {
        if self.ugt(other) {
            self.clone()
        } else {
            other.clone()
        }
    }
    pub fn smin(&self, other: &ApInt) -> ApInt {
        if self.slt(other) {
            self.clone()
        } else {
            other.clone()
        }
    }
    pub fn smax(&self, other: &ApInt) -> ApInt {
        if self.sgt(other) {
            self.clone()
        } else {
            other.clone()
        }
    }
}

// Wrapping arithmetic.
impl ApInt {
    pub fn add(&self, other: &ApInt) -> ApInt {
        self.check_width(other);
        Self::from_biguint(self.width, &self.value + &other.value)
    }

    pub fn sub(&self, other: &ApInt) -> ApInt {
        self.check_width(other);
        let modulus = BigUint::one() << self.width as usize;
        Self::from_biguint(self.width, &self.value + modulus - &other.value)
    }

    pub fn mul(&self, other: &ApInt) -> ApInt {
        self.check_width(other);
        Self::from_biguint(self.width, &self.value * &other.value)
    }

    pub fn neg(&self) -> ApInt {
        Self::zero(self.width).sub(self)
    }

    /// `self + 1`, wrapping.
    pub fn inc(&self) -> ApInt {
        self.add(&Self::one(self.width))
    }

    /// `self - 1`, wrapping.
    pub fn dec(&self) -> ApInt {
        self.sub(&Self::one(self.width))
    }

    /// Unsigned division.
    ///
    /// # Panics
    ///
    /// Panics if `other` is zero.
    pub fn udiv(&self, other: &ApInt) -> ApInt {
        self.check_width(other);
        assert!(!other.is_zero(), "Division by zero");
        Self::from_biguint(self.width, &self.value / &other.value)
    }

    pub fn urem(&self, other: &ApInt) -> ApInt {
        self.check_width(other);
        assert!(!other.is_zero(), "Division by zero");
        Self::from_biguint(self.width, &self.value % &other.value)
    }

    /// Signed division, rounding toward zero. `MIN / -1` wraps to `MIN`.
    pub fn sdiv(&self, other: &ApInt) -> ApInt {
        self.check_width(other);
        assert!(!other.is_zero(), "Division by zero");
        Self::from_bigint(self.width, &(self.to_bigint() / other.to_bigint()))
    }

    /// Signed remainder; the result takes the sign of `self`.
    pub fn srem(&self, other: &ApInt) -> ApInt {
        self.check_width(other);
        assert!(!other.is_zero(), "Division by zero");
        Self::from_bigint(self.width, &(self.to_bigint() % other.to_bigint()))
    }
}

// Shifts and bitwise logic.
impl ApInt {
    /// Shift left. Shifting by `width` or more yields zero.
    pub fn shl(&self, amount: u32) -> ApInt {
        if amount >= self.width {
            return Self::zero(self.width);
        }
        Self::from_biguint(self.width, &self.value << amount as usize)
    }

    /// Logical shift right. Shifting by `width` or more yields zero.
    pub fn lshr(&self, amount: u32) -> ApInt {
        if amount >= self.width {
            return Self::zero(self.width);
        }
        Self::from_biguint(self.width, &self.value >> amount as usize)
    }

    /// Arithmetic shift right. Shifting by `width` or more fills with the sign bit.
    pub fn ashr(&self, amount: u32) -> ApInt {
        let amount = amount.min(self.width);
        // BigInt shifts round toward negative infinity.
        Self::from_bigint(self.width, &(self.to_bigint() >> amount as usize))
    }

    pub fn and(&self, other: &ApInt) -> ApInt {
        self.check_width(other);
        Self::from_biguint(self.width, &self.value & &other.value)
    }

    pub fn or(&self, other: &ApInt) -> ApInt {
        self.check_width(other);
        Self::from_biguint(self.width, &self.value | &other.value)
    }

    pub fn xor(&self, other: &ApInt) -> ApInt {
        self.check_width(other);
        Self::from_biguint(self.width, &self.value ^ &other.value)
    }

    pub fn not(&self) -> ApInt {
        self.xor(&Self::all_ones(self.width))
    }

    pub fn set_bit(&self, index: u32) -> ApInt {
        self.or(&Self::one_bit_set(self.width, index))
    }

    pub fn clear_bit(&self, index: u32) -> ApInt {
        self.and(&Self::one_bit_set(self.width, index).not())
    }
}

// Width changes.
impl ApInt {
    pub fn zext(&self, width: u32) -> ApInt {
        assert!(width >= self.width, "zext to a narrower width");
        Self::from_biguint(width, self.value.clone())
    }

    pub fn sext(&self, width: u32) -> ApInt {
        assert!(width >= self.width, "sext to a narrower width");
        Self::from_bigint(width, &self.to_bigint())
    }

    pub fn trunc(&self, width: u32) -> ApInt {
        assert!(width <= self.width, "trunc to a wider width");
        Self::from_biguint(width, self.value.clone())
    }
}

// Bit counting.
impl ApInt {
    /// Number of bits needed to hold the unsigned value.
    pub fn active_bits(&self) -> u32 {
        self.value.bits() as u32
    }

    pub fn leading_zeros(&self) -> u32 {
        self.width - self.active_bits()
    }

    pub fn leading_ones(&self) -> u32 {
        self.not().leading_zeros()
    }

    pub fn trailing_zeros(&self) -> u32 {
        self.value.trailing_zeros().map_or(self.width, |n| n as u32)
    }

    pub fn trailing_ones(&self) -> u32 {
        self.not().trailing_zeros()
    }

    /// Index of the most significant bit where `self` and `other` differ.
    pub fn most_significant_different_bit(&self, other: &ApInt) -> Option<u32> {
        let diff = self.xor(other);
        if diff.is_zero() {
            None
        } else {
            Some(diff.active_bits() - 1)
        }
    }
}

/// Prints the value as a signed decimal.
impl fmt::Display for ApInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bigint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapping_arithmetic() {
        let a = ApInt::new(8, 200);
        let b = ApInt::new(8, 100);
        assert_eq!(a.add(&b), ApInt::new(8, 44));
        assert_eq!(b.sub(&a), ApInt::new(8, 156));
        assert_eq!(a.mul(&b), ApInt::new(8, (200 * 100) % 256));
        assert_eq!(ApInt::zero(8).dec(), ApInt::all_ones(8));
        assert_eq!(ApInt::all_ones(8).inc(), ApInt::zero(8));
        assert_eq!(ApInt::new(8, 1).neg(), ApInt::all_ones(8));
    }

    #[test]
    fn test_signed_view() {
        let x = ApInt::from_i64(8, -6);
        assert_eq!(x, ApInt::new(8, 250));
        assert_eq!(x.to_i64(), Some(-6));
        assert!(x.is_negative());
        assert!(ApInt::signed_min(8).is_signed_min());
        assert!(ApInt::signed_max(8).is_signed_max());
        assert_eq!(ApInt::signed_max(8).to_i64(), Some(127));
        assert_eq!(ApInt::signed_min(1).to_i64(), Some(-1));
        assert_eq!(ApInt::signed_max(1).to_i64(), Some(0));
        assert_eq!(format!("{}", x), "-6");
    }

    #[test]
    fn test_comparisons() {
        let minus_one = ApInt::from_i64(16, -1);
        let one = ApInt::one(16);
        assert!(minus_one.ugt(&one));
        assert!(minus_one.slt(&one));
        assert_eq!(minus_one.umin(&one), one);
        assert_eq!(minus_one.smin(&one), minus_one);
    }

    #[test]
    fn test_division() {
        let a = ApInt::from_i64(8, -7);
        let b = ApInt::from_i64(8, 2);
        assert_eq!(a.sdiv(&b).to_i64(), Some(-3));
        assert_eq!(a.srem(&b).to_i64(), Some(-1));
        assert_eq!(a.udiv(&b), ApInt::new(8, 249 / 2));
        assert_eq!(a.urem(&b), ApInt::new(8, 1));
        // MIN / -1 wraps back to MIN.
        let min = ApInt::signed_min(8);
        assert_eq!(min.sdiv(&ApInt::from_i64(8, -1)), min);
    }

    #[test]
    #[should_panic(expected = "Division by zero")]
    fn test_division_by_zero_panics() {
        ApInt::new(8, 1).udiv(&ApInt::zero(8));
    }

    #[test]
    fn test_shifts() {
        let x = ApInt::new(8, 0b1001_0110);
        assert_eq!(x.shl(1), ApInt::new(8, 0b0010_1100));
        assert_eq!(x.lshr(2), ApInt::new(8, 0b0010_0101));
        assert_eq!(x.ashr(2), ApInt::new(8, 0b1110_0101));
        assert_eq!(x.shl(8), ApInt::zero(8));
        assert_eq!(x.lshr(9), ApInt::zero(8));
        assert_eq!(x.ashr(100), ApInt::all_ones(8));
        assert_eq!(ApInt::new(8, 5).ashr(8), ApInt::zero(8));
    }

    #[test]
    fn test_width_changes() {
        let x = ApInt::from_i64(8, -2);
        assert_eq!(x.zext(16), ApInt::new(16, 254));
        assert_eq!(x.sext(16), ApInt::from_i64(16, -2));
        assert_eq!(ApInt::new(16, 0x1234).trunc(8), ApInt::new(8, 0x34));
    }

    #[test]
    fn test_bit_counting() {
        let x = ApInt::new(8, 0b0001_0111);
        assert_eq!(x.active_bits(), 5);
        assert_eq!(x.leading_zeros(), 3);
        assert_eq!(x.trailing_ones(), 3);
        assert_eq!(x.trailing_zeros(), 0);
        assert_eq!(ApInt::zero(8).trailing_zeros(), 8);
        assert_eq!(ApInt::all_ones(8).leading_ones(), 8);
        assert_eq!(
            ApInt::new(8, 0b0100).most_significant_different_bit(&ApInt::new(8, 0b0111)),
            Some(1)
        );
        assert_eq!(ApInt::high_bits_set(8, 3), ApInt::new(8, 0b1110_0000));
        assert_eq!(ApInt::low_bits_set(8, 3), ApInt::new(8, 0b0000_0111));
        assert_eq!(ApInt::bits_set_from(8, 6), ApInt::new(8, 0b1100_0000));
    }

    #[test]
    fn test_wide_values() {
        let x = ApInt::all_ones(128);
        assert_eq!(x.inc(), ApInt::zero(128));
        let wide = ApInt::all_ones(64).zext(128).mul(&ApInt::all_ones(64).zext(128));
        assert_eq!(wide.trunc(64), ApInt::one(64));
        assert_eq!(wide.lshr(64).trunc(64), ApInt::all_ones(64).dec());
    }
}
