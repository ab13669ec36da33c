//! Shift and bitwise transfer functions.

use crate::apint::ApInt;
use crate::range::IntRange;

/// Bits known to be zero or one in every element of a range.
#[derive(Debug, Clone)]
struct KnownBits {
    zero: ApInt,
    one: ApInt,
}

impl KnownBits {
    fn unknown(width: u32) -> Self {
        Self {
            zero: ApInt::zero(width),
            one: ApInt::zero(width),
        }
    }

    fn and(&self, other: &KnownBits) -> KnownBits {
        KnownBits {
            zero: self.zero.or(&other.zero),
            one: self.one.and(&other.one),
        }
    }

    fn or(&self, other: &KnownBits) -> KnownBits {
        KnownBits {
            zero: self.zero.and(&other.zero),
            one: self.one.or(&other.one),
        }
    }

    fn xor(&self, other: &KnownBits) -> KnownBits {
        KnownBits {
            zero: self.zero.and(&other.zero).or(&self.one.and(&other.one)),
            one: self.zero.and(&other.one).or(&self.one.and(&other.zero)),
        }
    }

    fn is_unknown(&self) -> bool {
        self.zero.is_zero() && self.one.is_zero()
    }

    fn has_conflict(&self) -> bool {
        !self.zero.and(&self.one).is_zero()
    }
}

impl IntRange {
    /// Only the leading bits shared by the unsigned bounds are known.
    fn to_known_bits(&self) -> KnownBits {
        let width = self.width();
        if self.is_empty() {
            return KnownBits::unknown(width);
        }
        let min = self.unsigned_min();
        let max = self.unsigned_max();
        let mut known = KnownBits {
            zero: min.not(),
            one: min.clone(),
        };
        if let Some(bit) = min.most_significant_different_bit(&max) {
            let keep = ApInt::bits_set_from(width, bit + 1);
            known.zero = known.zero.and(&keep);
            known.one = known.one.and(&keep);
        }
        known
    }

    fn from_known_bits(known: &KnownBits) -> IntRange {
        let width = known.zero.width();
        if known.has_conflict() {
            return Self::empty(width);
        }
        if known.is_unknown() {
            return Self::full(width);
        }
        Self::new(known.one.clone(), known.zero.not().inc())
    }

    /// Range of `x << y`.
    pub fn shl(&self, other: &IntRange) -> IntRange {
        self.check_width(other);
        let width = self.width();
        if self.is_empty() || other.is_empty() {
            return Self::empty(width);
        }

        let mut min = self.unsigned_min();
        let mut max = self.unsigned_max();

        if let Some(amount) = other.single_element() {
            if amount.uge(&ApInt::new(width, width as u64)) {
                return Self::full(width);
            }
            let amount = amount.shift_amount();
            let equal_leading_bits = min.xor(&max).leading_zeros();
            if amount <= equal_leading_bits {
                return Self::non_empty(min.shl(amount), max.shl(amount).inc());
            }
            return Self::non_empty(ApInt::zero(width), ApInt::bits_set_from(width, amount).inc());
        }

        let other_max = other.unsigned_max().shift_amount();
        let other_min = other.unsigned_min().shift_amount();

        // A shift of a negative number that does not overflow makes it smaller.
        if !self.is_full() && self.signed_max().is_negative() && other_max <= min.leading_ones() {
            max = max.shl(other_min);
            min = min.shl(other_max);
            return Self::non_empty(min, max.inc());
        }

        // Bits would be shifted out.
        if other_max > max.leading_zeros() {
            return Self::full(width);
        }

        min = min.shl(other_min);
        max = max.shl(other_max);
        Self::non_empty(min, max.inc())
    }

    /// Range of `x >> y` (logical).
    pub fn lshr(&self, other: &IntRange) -> IntRange {
        self.check_width(other);
        if self.is_empty() || other.is_empty() {
            return Self::empty(self.width());
        }
        let max = self.unsigned_max().lshr(other.unsigned_min().shift_amount()).inc();
        let min = self.unsigned_min().lshr(other.unsigned_max().shift_amount());
        Self::non_empty(min, max)
    }

    /// Range of `x >> y` (arithmetic).
    pub fn ashr(&self, other: &IntRange) -> IntRange {
        self.check_width(other);
        if self.is_empty() || other.is_empty() {
            return Self::empty(self.width());
        }

        let smin = self.signed_min();
        let smax = self.signed_max();
        let shift_min = other.unsigned_min().shift_amount();
        let shift_max = other.unsigned_max().shift_amount();

        // Non-negative values shrink toward zero from above, negative ones from below.
        let pos_max = smax.ashr(shift_min).inc();
        let pos_min = smin.ashr(shift_max);
        let neg_max = smax.ashr(shift_max).inc();
        let neg_min = smin.ashr(shift_min);

        let (min, max) = if smin.is_non_negative() {
            (pos_min, pos_max)
        } else if smax.is_negative() {
            (neg_min, neg_max)
        } else {
            (neg_min, pos_max)
        };
        Self::non_empty(min, max)
    }

    /// Range of `x & y`.
    pub fn binary_and(&self, other: &IntRange) -> IntRange {
        self.check_width(other);
        if self.is_empty() || other.is_empty() {
            return Self::empty(self.width());
        }
        let known = Self::from_known_bits(&self.to_known_bits().and(&other.to_known_bits()));
        let bounded = Self::non_empty(
            ApInt::zero(self.width()),
            self.unsigned_max().umin(&other.unsigned_max()).inc(),
        );
        known.intersect(&bounded)
    }

    /// Range of `x | y`.
    pub fn binary_or(&self, other: &IntRange) -> IntRange {
        self.check_width(other);
        if self.is_empty() || other.is_empty() {
            return Self::empty(self.width());
        }
        let known = Self::from_known_bits(&self.to_known_bits().or(&other.to_known_bits()));
        let bounded = Self::non_empty(
            self.unsigned_min().umax(&other.unsigned_min()),
            ApInt::zero(self.width()),
        );
        known.intersect(&bounded)
    }

    /// Range of `x ^ y`.
    pub fn binary_xor(&self, other: &IntRange) -> IntRange {
        self.check_width(other);
        if self.is_empty() || other.is_empty() {
            return Self::empty(self.width());
        }
        if let (Some(a), Some(b)) = (self.single_element(), other.single_element()) {
            return Self::single(a.xor(b));
        }
        if other.single_element().is_some_and(ApInt::is_all_ones) {
            return self.binary_not();
        }
        if self.single_element().is_some_and(ApInt::is_all_ones) {
            return other.binary_not();
        }
        Self::from_known_bits(&self.to_known_bits().xor(&other.to_known_bits()))
    }

    /// Range of `!x`.
    pub fn binary_not(&self) -> IntRange {
        Self::single(ApInt::all_ones(self.width())).sub(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::apint::ApInt;
    use crate::range::tests::{all_ranges, elements};
    use crate::range::IntRange;

    fn check_sound(
        name: &str,
        width: u32,
        abstract_op: fn(&IntRange, &IntRange) -> IntRange,
        concrete_op: fn(&ApInt, &ApInt) -> Option<ApInt>,
    ) {
        let ranges = all_ranges(width);
        for a in &ranges {
            for b in &ranges {
                let result = abstract_op(a, b);
                for x in elements(a) {
                    for y in elements(b) {
                        if let Some(z) = concrete_op(&x, &y) {
                            assert!(result.contains(&z), "{}({}, {}) = {} misses {}", name, a, b, result, z);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_shifts() {
        let r = IntRange::from_u64(16, 1, 5);
        assert_eq!(r.shl(&IntRange::constant(16, 2)), IntRange::from_u64(16, 4, 17));
        assert_eq!(r.lshr(&IntRange::constant(16, 1)), IntRange::from_u64(16, 0, 3));
        let neg = IntRange::from_i64(16, -8, -3);
        assert_eq!(neg.ashr(&IntRange::constant(16, 1)), IntRange::from_i64(16, -4, -1));
        assert!(r.shl(&IntRange::constant(16, 16)).is_full());
    }

    #[test]
    fn test_shifts_sound() {
        check_sound("shl", 3, IntRange::shl, |x, y| {
            let amount = y.limited_value() as u32;
            (amount < x.width()).then(|| x.shl(amount))
        });
        check_sound("lshr", 3, IntRange::lshr, |x, y| {
            let amount = y.limited_value() as u32;
            (amount < x.width()).then(|| x.lshr(amount))
        });
        check_sound("ashr", 3, IntRange::ashr, |x, y| {
            let amount = y.limited_value() as u32;
            (amount < x.width()).then(|| x.ashr(amount))
        });
    }

    #[test]
    fn test_bitwise() {
        let r = IntRange::from_u64(8, 0, 100);
        assert_eq!(r.binary_and(&IntRange::constant(8, 0x0F)), IntRange::from_u64(8, 0, 16));
        assert_eq!(
            IntRange::from_u64(8, 0x10, 0x14).binary_or(&IntRange::constant(8, 0x01)),
            IntRange::from_u64(8, 0x11, 0x14)
        );
        assert_eq!(IntRange::constant(8, 0b1100).binary_xor(&IntRange::constant(8, 0b1010)), IntRange::constant(8, 0b0110));
        assert_eq!(r.binary_not(), IntRange::from_i64(8, -100, 0));
        assert_eq!(r.binary_xor(&IntRange::constant(8, 0xFF)), r.binary_not());
    }

    #[test]
    fn test_bitwise_sound() {
        check_sound("and", 3, IntRange::binary_and, |x, y| Some(x.and(y)));
        check_sound("or", 3, IntRange::binary_or, |x, y| Some(x.or(y)));
        check_sound("xor", 3, IntRange::binary_xor, |x, y| Some(x.xor(y)));
    }
}
