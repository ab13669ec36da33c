//! Wrapping integer ranges.
//!
//! An [`IntRange`] is a half-open interval `[lower, upper)` over integers of a fixed bit
//! width. The interval may wrap around the end of the unsigned number line, so
//! `[250, 5)` over 8 bits is the set `{250, ..., 255, 0, ..., 4}`. Two degenerate
//! encodings with `lower == upper` stand for the sentinels:
//!
//! - **full set** (`lower == upper == 2^w - 1`): every value, the "unknown" range;
//! - **empty set** (`lower == upper == 0`): no value, an infeasible path.
//!
//! Because the interval wraps, it is sign-agnostic: the same range can be read as an
//! unsigned or a signed set, and every transfer function returns the exact abstraction
//! of the corresponding machine operation (see the [`arith`] and [`bitwise`] impls).
//!
//! # Lattice
//!
//! [`IntRange::union`] is the join and [`IntRange::intersect`] the meet. Since a union
//! of two wrapped intervals is not always an interval, the join picks the smallest
//! interval covering both (or, with [`PreferredRange`], the one that avoids wrapping in
//! a given signedness).
//!
//! # Examples
//!
//! ```
//! use intrange_rs::predicate::IntPredicate;
//! use intrange_rs::range::IntRange;
//!
//! let x = IntRange::from_u64(32, 0, 100);
//! let ten = IntRange::constant(32, 10);
//!
//! // Values of `x` for which `x < 10` can hold.
//! let allowed = IntRange::make_allowed_icmp_region(IntPredicate::Ult, &ten);
//! assert_eq!(x.intersect(&allowed), IntRange::from_u64(32, 0, 10));
//! ```

use std::fmt;

use num_bigint::BigUint;
use num_traits::One;

use crate::apint::ApInt;
use crate::predicate::IntPredicate;

mod arith;
mod bitwise;

/// Tie-breaking policy for [`IntRange::union_with`] and [`IntRange::intersect_with`]
/// when the exact result is not an interval.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum PreferredRange {
    /// Pick the candidate with fewer elements.
    #[default]
    Smallest,
    /// Prefer a candidate that does not wrap as an unsigned interval.
    Unsigned,
    /// Prefer a candidate that does not wrap as a signed interval.
    Signed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntRange {
    lower: ApInt,
    upper: ApInt,
}

impl IntRange {
    pub fn full(width: u32) -> Self {
        let max = ApInt::all_ones(width);
        Self {
            lower: max.clone(),
            upper: max,
        }
    }

    pub fn empty(width: u32) -> Self {
        let min = ApInt::zero(width);
        Self {
            lower: min.clone(),
            upper: min,
        }
    }

    /// Creates `[lower, upper)`.
    ///
    /// # Panics
    ///
    /// Panics if the widths differ, or if `lower == upper` without being one of the
    /// full/empty encodings.
    pub fn new(lower: ApInt, upper: ApInt) -> Self {
        assert_eq!(lower.width(), upper.width(), "Bit width mismatch");
        assert!(
            lower != upper || lower.is_max_value() || lower.is_min_value(),
            "Lower == Upper, but they aren't min or max value"
        );
        Self { lower, upper }
    }

    /// Creates `[lower, upper)`, turning `lower == upper` into the full set.
    pub fn non_empty(lower: ApInt, upper: ApInt) -> Self {
        if lower == upper {
            return Self::full(lower.width());
        }
        Self::new(lower, upper)
    }

    /// The range containing exactly `value`.
    pub fn single(value: ApInt) -> Self {
        let upper = value.inc();
        Self { lower: value, upper }
    }

    pub fn constant(width: u32, value: u64) -> Self {
        Self::single(ApInt::new(width, value))
    }

    /// `[lo, hi)` from unsigned bounds.
    pub fn from_u64(width: u32, lo: u64, hi: u64) -> Self {
        Self::new(ApInt::new(width, lo), ApInt::new(width, hi))
    }

    /// `[lo, hi)` from signed bounds.
    pub fn from_i64(width: u32, lo: i64, hi: i64) -> Self {
        Self::new(ApInt::from_i64(width, lo), ApInt::from_i64(width, hi))
    }

    /// Full or empty set of the given width.
    pub fn with_width(width: u32, is_full: bool) -> Self {
        if is_full {
            Self::full(width)
        } else {
            Self::empty(width)
        }
    }

    pub fn width(&self) -> u32 {
        self.lower.width()
    }
    pub fn lower(&self) -> &ApInt {
        &self.lower
    }
    pub fn upper(&self) -> &ApInt {
        &self.upper
    }

    fn check_width(&self, other: &IntRange) {
        assert_eq!(
            self.width(),
            other.width(),
            "Ranges of different bit widths: {} vs {}",
            self.width(),
            other.width()
        );
    }
}

// Shape queries.
impl IntRange {
    pub fn is_full(&self) -> bool {
        self.lower == self.upper && self.lower.is_max_value()
    }

    pub fn is_empty(&self) -> bool {
        self.lower == self.upper && self.lower.is_min_value()
    }

    /// Wraps around the unsigned end, not counting ranges of the form `[x, 0)`.
    pub fn is_wrapped(&self) -> bool {
        self.lower.ugt(&self.upper) && !self.upper.is_zero()
    }

    /// Wraps around the unsigned end, counting ranges of the form `[x, 0)`.
    pub fn is_upper_wrapped(&self) -> bool {
        self.lower.ugt(&self.upper)
    }

    /// Wraps around the signed end, not counting ranges of the form `[x, SMIN)`.
    pub fn is_sign_wrapped(&self) -> bool {
        self.lower.sgt(&self.upper) && !self.upper.is_signed_min()
    }

    /// Wraps around the signed end, counting ranges of the form `[x, SMIN)`.
    pub fn is_upper_sign_wrapped(&self) -> bool {
        self.lower.sgt(&self.upper)
    }

    pub fn single_element(&self) -> Option<&ApInt> {
        if self.upper == self.lower.inc() {
            Some(&self.lower)
        } else {
            None
        }
    }

    pub fn is_single_element(&self) -> bool {
        self.single_element().is_some()
    }

    /// Number of elements; `2^width` for the full set.
    pub fn size(&self) -> BigUint {
        if self.is_full() {
            return BigUint::one() << self.width() as usize;
        }
        self.upper.sub(&self.lower).value().clone()
    }

    pub fn is_size_strictly_smaller_than(&self, other: &IntRange) -> bool {
        self.check_width(other);
        if self.is_full() {
            return false;
        }
        if other.is_full() {
            return true;
        }
        self.upper.sub(&self.lower).ult(&other.upper.sub(&other.lower))
    }

    /// Whether the range holds more than `max_size` elements.
    pub fn is_size_larger_than(&self, max_size: u64) -> bool {
        self.size() > BigUint::from(max_size)
    }

    pub fn contains(&self, value: &ApInt) -> bool {
        if self.lower == self.upper {
            return self.is_full();
        }
        if !self.is_upper_wrapped() {
            self.lower.ule(value) && value.ult(&self.upper)
        } else {
            self.lower.ule(value) || value.ult(&self.upper)
        }
    }

    /// Whether every element of `other` is in `self`.
    pub fn contains_range(&self, other: &IntRange) -> bool {
        self.check_width(other);
        if self.is_full() || other.is_empty() {
            return true;
        }
        if self.is_empty() || other.is_full() {
            return false;
        }
        if !self.is_upper_wrapped() {
            if other.is_upper_wrapped() {
                return false;
            }
            return self.lower.ule(&other.lower) && other.upper.ule(&self.upper);
        }
        if !other.is_upper_wrapped() {
            return other.upper.ule(&self.upper) || self.lower.ule(&other.lower);
        }
        other.upper.ule(&self.upper) && self.lower.ule(&other.lower)
    }
}

// Bounds.
impl IntRange {
    pub fn unsigned_max(&self) -> ApInt {
        if self.is_full() || self.is_upper_wrapped() {
            return ApInt::all_ones(self.width());
        }
        self.upper.dec()
    }

    pub fn unsigned_min(&self) -> ApInt {
        if self.is_full() || self.is_wrapped() {
            return ApInt::zero(self.width());
        }
        self.lower.clone()
    }

    pub fn signed_max(&self) -> ApInt {
        if self.is_full() || self.is_upper_sign_wrapped() {
            return ApInt::signed_max(self.width());
        }
        self.upper.dec()
    }

    pub fn signed_min(&self) -> ApInt {
        if self.is_full() || self.is_sign_wrapped() {
            return ApInt::signed_min(self.width());
        }
        self.lower.clone()
    }
}

fn preferred_range(a: IntRange, b: IntRange, preference: PreferredRange) -> IntRange {
    match preference {
        PreferredRange::Unsigned => {
            if !a.is_wrapped() && b.is_wrapped() {
                return a;
            }
            if a.is_wrapped() && !b.is_wrapped() {
                return b;
            }
        }
        PreferredRange::Signed => {
            if !a.is_sign_wrapped() && b.is_sign_wrapped() {
                return a;
            }
            if a.is_sign_wrapped() && !b.is_sign_wrapped() {
                return b;
            }
        }
        PreferredRange::Smallest => {}
    }
    if a.is_size_strictly_smaller_than(&b) {
        return a;
    }
    if b.is_size_strictly_smaller_than(&a) {
        return b;
    }
    // Equal sizes: the lower start wins, so the choice does not depend on operand order.
    if a.lower.ule(&b.lower) {
        a
    } else {
        b
    }
}

// Lattice operations.
impl IntRange {
    /// The complement of this range.
    pub fn inverse(&self) -> IntRange {
        if self.is_full() {
            return Self::empty(self.width());
        }
        if self.is_empty() {
            return Self::full(self.width());
        }
        Self::new(self.upper.clone(), self.lower.clone())
    }

    /// Join: the smallest range containing both operands.
    pub fn union(&self, other: &IntRange) -> IntRange {
        self.union_with(other, PreferredRange::Smallest)
    }

    pub fn union_with(&self, other: &IntRange, preference: PreferredRange) -> IntRange {
        self.check_width(other);
        if self.is_full() || other.is_empty() {
            return self.clone();
        }
        if other.is_full() || self.is_empty() {
            return other.clone();
        }

        if !self.is_upper_wrapped() && other.is_upper_wrapped() {
            return other.union_with(self, preference);
        }

        let (l, u) = (&self.lower, &self.upper);
        let (ol, ou) = (&other.lower, &other.upper);

        if !self.is_upper_wrapped() && !other.is_upper_wrapped() {
            // Disjoint: bridge the gap on one side or the other.
            if ou.ult(l) || u.ult(ol) {
                return preferred_range(
                    Self::new(l.clone(), ou.clone()),
                    Self::new(ol.clone(), u.clone()),
                    preference,
                );
            }

            let new_lower = if ol.ult(l) { ol.clone() } else { l.clone() };
            let new_upper = if ou.dec().ugt(&u.dec()) {
                ou.clone()
            } else {
                u.clone()
            };
            if new_lower.is_zero() && new_upper.is_zero() {
                return Self::full(self.width());
            }
            return Self::new(new_lower, new_upper);
        }

        if !other.is_upper_wrapped() {
            // `other` sits inside one of the two arms of `self`.
            if ou.ule(u) || ol.uge(l) {
                return self.clone();
            }
            // `other` bridges the hole of `self`.
            if ol.ule(u) && l.ule(ou) {
                return Self::full(self.width());
            }
            // `other` sits strictly inside the hole.
            if u.ult(ol) && ou.ult(l) {
                return preferred_range(
                    Self::new(l.clone(), ou.clone()),
                    Self::new(ol.clone(), u.clone()),
                    preference,
                );
            }
            // `other` overlaps the lower arm's end.
            if u.ult(ol) && l.ule(ou) {
                return Self::new(ol.clone(), u.clone());
            }
            // `other` overlaps the upper arm's start.
            return Self::new(l.clone(), ou.clone());
        }

        // Both wrap.
        if ol.ule(u) || l.ule(ou) {
            return Self::full(self.width());
        }
        let new_lower = if ol.ult(l) { ol.clone() } else { l.clone() };
        let new_upper = if ou.ugt(u) { ou.clone() } else { u.clone() };
        Self::new(new_lower, new_upper)
    }

    /// Meet: the largest range contained in both operands.
    pub fn intersect(&self, other: &IntRange) -> IntRange {
        self.intersect_with(other, PreferredRange::Smallest)
    }

    pub fn intersect_with(&self, other: &IntRange, preference: PreferredRange) -> IntRange {
        self.check_width(other);
        if self.is_empty() || other.is_full() {
            return self.clone();
        }
        if other.is_empty() || self.is_full() {
            return other.clone();
        }

        if !self.is_upper_wrapped() && other.is_upper_wrapped() {
            return other.intersect_with(self, preference);
        }

        let (l, u) = (&self.lower, &self.upper);
        let (ol, ou) = (&other.lower, &other.upper);

        if !self.is_upper_wrapped() && !other.is_upper_wrapped() {
            if l.ult(ol) {
                if u.ule(ol) {
                    return Self::empty(self.width());
                }
                if u.ult(ou) {
                    return Self::new(ol.clone(), u.clone());
                }
                return other.clone();
            }
            if u.ult(ou) {
                return self.clone();
            }
            if l.ult(ou) {
                return Self::new(l.clone(), ou.clone());
            }
            return Self::empty(self.width());
        }

        if self.is_upper_wrapped() && !other.is_upper_wrapped() {
            if ol.ult(u) {
                if ou.ult(u) {
                    return other.clone();
                }
                if ou.ule(l) {
                    return Self::new(ol.clone(), u.clone());
                }
                // `other` covers the hole of `self` and pokes into both arms.
                return preferred_range(self.clone(), other.clone(), preference);
            }
            if ol.ult(l) {
                if ou.ule(l) {
                    return Self::empty(self.width());
                }
                return Self::new(l.clone(), ou.clone());
            }
            return other.clone();
        }

        // Both wrap.
        if ou.ult(u) {
            if ol.ult(u) {
                return preferred_range(self.clone(), other.clone(), preference);
            }
            if ol.ult(l) {
                return Self::new(l.clone(), ou.clone());
            }
            return other.clone();
        }
        if ou.ule(l) {
            if ol.ult(l) {
                return self.clone();
            }
            return Self::new(ol.clone(), u.clone());
        }
        preferred_range(self.clone(), other.clone(), preference)
    }
}

// Width changes.
impl IntRange {
    /// Range of `trunc` to `width` bits.
    pub fn truncate(&self, width: u32) -> IntRange {
        assert!(self.width() > width, "Not a value truncation");
        if self.is_empty() {
            return Self::empty(width);
        }
        if self.is_full() {
            return Self::full(width);
        }

        let mut lower_div = self.lower.clone();
        let mut upper_div = self.upper.clone();
        let mut wrapped_part = Self::empty(width);

        // A wrapped range is split into [lower, MAX] and [0, upper); the second arm is
        // handled up front and joined at the end.
        if self.is_upper_wrapped() {
            if self.upper.active_bits() > width || self.upper.trailing_ones() == width {
                return Self::full(width);
            }
            wrapped_part = Self::new(ApInt::all_ones(width), self.upper.trunc(width));
            upper_div = ApInt::all_ones(self.width());
            if lower_div == upper_div {
                return wrapped_part;
            }
        }

        // Drop the bits above the destination width.
        if lower_div.active_bits() > width {
            let adjust = lower_div.and(&ApInt::bits_set_from(self.width(), width));
            lower_div = lower_div.sub(&adjust);
            upper_div = upper_div.sub(&adjust);
        }

        let upper_div_width = upper_div.active_bits();
        if upper_div_width <= width {
            return Self::new(lower_div.trunc(width), upper_div.trunc(width)).union(&wrapped_part);
        }

        // The truncated interval wraps once; it is still precise if it does not overlap itself.
        if upper_div_width == width + 1 {
            upper_div = upper_div.clear_bit(width);
            if upper_div.ult(&lower_div) {
                return Self::new(lower_div.trunc(width), upper_div.trunc(width)).union(&wrapped_part);
            }
        }

        Self::full(width)
    }

    /// Range of `zext` to `width` bits.
    pub fn zero_extend(&self, width: u32) -> IntRange {
        if self.is_empty() {
            return Self::empty(width);
        }
        let src_width = self.width();
        assert!(src_width < width, "Not a value extension");
        if self.is_full() || self.is_upper_wrapped() {
            // [x, 0) does not really wrap.
            let lower = if self.upper.is_zero() {
                self.lower.zext(width)
            } else {
                ApInt::zero(width)
            };
            return Self::new(lower, ApInt::one_bit_set(width, src_width));
        }
        Self::new(self.lower.zext(width), self.upper.zext(width))
    }

    /// Range of `sext` to `width` bits.
    pub fn sign_extend(&self, width: u32) -> IntRange {
        if self.is_empty() {
            return Self::empty(width);
        }
        let src_width = self.width();
        assert!(src_width < width, "Not a value extension");
        // [x, SMIN) does not really wrap.
        if self.upper.is_signed_min() {
            return Self::new(self.lower.sext(width), self.upper.zext(width));
        }
        if self.is_full() || self.is_sign_wrapped() {
            return Self::new(
                ApInt::high_bits_set(width, width - src_width + 1),
                ApInt::low_bits_set(width, src_width - 1).inc(),
            );
        }
        Self::new(self.lower.sext(width), self.upper.sext(width))
    }

    /// Truncates or zero-extends to `width`, whichever applies.
    pub fn zext_or_trunc(&self, width: u32) -> IntRange {
        use std::cmp::Ordering::*;
        match self.width().cmp(&width) {
            Less => self.zero_extend(width),
            Greater => self.truncate(width),
            Equal => self.clone(),
        }
    }
}

// Comparison regions.
impl IntRange {
    /// The smallest range containing every `x` for which `x <pred> y` holds for at
    /// least one `y` in `other`.
    pub fn make_allowed_icmp_region(pred: IntPredicate, other: &IntRange) -> IntRange {
        if other.is_empty() {
            return other.clone();
        }
        let w = other.width();
        match pred {
            IntPredicate::Eq => other.clone(),
            IntPredicate::Ne => {
                if other.is_single_element() {
                    Self::new(other.upper.clone(), other.lower.clone())
                } else {
                    Self::full(w)
                }
            }
            IntPredicate::Ult => {
                let umax = other.unsigned_max();
                if umax.is_min_value() {
                    return Self::empty(w);
                }
                Self::new(ApInt::zero(w), umax)
            }
            IntPredicate::Slt => {
                let smax = other.signed_max();
                if smax.is_signed_min() {
                    return Self::empty(w);
                }
                Self::new(ApInt::signed_min(w), smax)
            }
            IntPredicate::Ule => Self::non_empty(ApInt::zero(w), other.unsigned_max().inc()),
            IntPredicate::Sle => Self::non_empty(ApInt::signed_min(w), other.signed_max().inc()),
            IntPredicate::Ugt => {
                let umin = other.unsigned_min();
                if umin.is_max_value() {
                    return Self::empty(w);
                }
                Self::new(umin.inc(), ApInt::zero(w))
            }
            IntPredicate::Sgt => {
                let smin = other.signed_min();
                if smin.is_signed_max() {
                    return Self::empty(w);
                }
                Self::new(smin.inc(), ApInt::signed_min(w))
            }
            IntPredicate::Uge => Self::non_empty(other.unsigned_min(), ApInt::zero(w)),
            IntPredicate::Sge => Self::non_empty(other.signed_min(), ApInt::signed_min(w)),
        }
    }

    /// The largest range such that every `x` in it satisfies `x <pred> y` for every
    /// `y` in `other`.
    pub fn make_satisfying_icmp_region(pred: IntPredicate, other: &IntRange) -> IntRange {
        Self::make_allowed_icmp_region(pred.inverse(), other).inverse()
    }

    /// Whether `x <pred> y` holds for every `x` in `self` and `y` in `other`.
    pub fn icmp(&self, pred: IntPredicate, other: &IntRange) -> bool {
        Self::make_satisfying_icmp_region(pred, other).contains_range(self)
    }
}

impl fmt::Display for IntRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_full() {
            write!(f, "full-set")
        } else if self.is_empty() {
            write!(f, "empty-set")
        } else {
            write!(f, "[{},{})", self.lower, self.upper)
        }
    }
}

impl From<ApInt> for IntRange {
    fn from(value: ApInt) -> Self {
        IntRange::single(value)
    }
}
