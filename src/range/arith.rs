//! Arithmetic transfer functions.

use crate::apint::ApInt;
use crate::range::{IntRange, PreferredRange};

impl IntRange {
    /// Range of `x + y`, wrapping.
    pub fn add(&self, other: &IntRange) -> IntRange {
        self.check_width(other);
        if self.is_empty() || other.is_empty() {
            return Self::empty(self.width());
        }
        if self.is_full() || other.is_full() {
            return Self::full(self.width());
        }

        let new_lower = self.lower.add(&other.lower);
        let new_upper = self.upper.add(&other.upper).dec();
        if new_lower == new_upper {
            return Self::full(self.width());
        }

        let x = Self::new(new_lower, new_upper);
        // The sum covered the number line more than once.
        if x.is_size_strictly_smaller_than(self) || x.is_size_strictly_smaller_than(other) {
            return Self::full(self.width());
        }
        x
    }

    /// Range of `x - y`, wrapping.
    pub fn sub(&self, other: &IntRange) -> IntRange {
        self.check_width(other);
        if self.is_empty() || other.is_empty() {
            return Self::empty(self.width());
        }
        if self.is_full() || other.is_full() {
            return Self::full(self.width());
        }

        let new_lower = self.lower.sub(&other.upper).inc();
        let new_upper = self.upper.sub(&other.lower);
        if new_lower == new_upper {
            return Self::full(self.width());
        }

        let x = Self::new(new_lower, new_upper);
        if x.is_size_strictly_smaller_than(self) || x.is_size_strictly_smaller_than(other) {
            return Self::full(self.width());
        }
        x
    }

    /// Range of `x * y`, wrapping.
    ///
    /// The product is computed twice at double width, once with the operands read
    /// as unsigned and once as signed, and the smaller truncation wins.
    pub fn multiply(&self, other: &IntRange) -> IntRange {
        self.check_width(other);
        if self.is_empty() || other.is_empty() {
            return Self::empty(self.width());
        }
        if let (Some(a), Some(b)) = (self.single_element(), other.single_element()) {
            return Self::single(a.mul(b));
        }

        let width = self.width();
        let wide = width * 2;

        let this_min = self.unsigned_min().zext(wide);
        let this_max = self.unsigned_max().zext(wide);
        let other_min = other.unsigned_min().zext(wide);
        let other_max = other.unsigned_max().zext(wide);
        let result_zext = Self::new(this_min.mul(&other_min), this_max.mul(&other_max).inc());
        let ur = result_zext.truncate(width);

        // A non-wrapping unsigned result that stays within the signed positives is
        // never beaten by the signed computation.
        if !ur.is_upper_wrapped() && (ur.upper.is_non_negative() || ur.upper.is_signed_min()) {
            return ur;
        }

        let this_min = self.signed_min().sext(wide);
        let this_max = self.signed_max().sext(wide);
        let other_min = other.signed_min().sext(wide);
        let other_max = other.signed_max().sext(wide);
        let corners = [
            this_min.mul(&other_min),
            this_min.mul(&other_max),
            this_max.mul(&other_min),
            this_max.mul(&other_max),
        ];
        let lo = corners.iter().skip(1).fold(corners[0].clone(), |acc, c| acc.smin(c));
        let hi = corners.iter().skip(1).fold(corners[0].clone(), |acc, c| acc.smax(c));
        let result_sext = Self::new(lo, hi.inc());
        let sr = result_sext.truncate(width);

        if ur.is_size_strictly_smaller_than(&sr) {
            ur
        } else {
            sr
        }
    }

    /// Range of `x udiv y`. Division by zero contributes nothing; a divisor that can
    /// only be zero yields the empty set.
    pub fn udiv(&self, rhs: &IntRange) -> IntRange {
        self.check_width(rhs);
        if self.is_empty() || rhs.is_empty() || rhs.unsigned_max().is_zero() {
            return Self::empty(self.width());
        }

        let lower = self.unsigned_min().udiv(&rhs.unsigned_max());

        // Smallest non-zero divisor: 1, unless the range is `[x, 1)`.
        let mut rhs_umin = rhs.unsigned_min();
        if rhs_umin.is_zero() {
            rhs_umin = if rhs.upper.is_one() {
                rhs.lower.clone()
            } else {
                ApInt::one(self.width())
            };
        }

        let upper = self.unsigned_max().udiv(&rhs_umin).inc();
        Self::non_empty(lower, upper)
    }

    /// Range of `x sdiv y`, rounding toward zero. `MIN / -1` is undefined and not covered.
    ///
    /// Both operands are split into their negative and non-negative parts, each
    /// quadrant is divided separately and the results are joined.
    pub fn sdiv(&self, rhs: &IntRange) -> IntRange {
        self.check_width(rhs);
        let width = self.width();
        let zero = ApInt::zero(width);
        let signed_min = ApInt::signed_min(width);

        let pos_filter = Self::new(ApInt::one(width), signed_min.clone());
        let non_neg_filter = Self::new(zero.clone(), signed_min.clone());
        let neg_filter = Self::new(signed_min.clone(), zero.clone());

        let pos_l = self.intersect(&non_neg_filter);
        let neg_l = self.intersect(&neg_filter);
        let pos_r = rhs.intersect(&pos_filter);
        let neg_r = rhs.intersect(&neg_filter);

        let mut pos_res = Self::empty(width);
        if !pos_l.is_empty() && !pos_r.is_empty() {
            // pos / pos = pos
            pos_res = Self::new(
                pos_l.lower.sdiv(&pos_r.upper.dec()),
                pos_l.upper.dec().sdiv(&pos_r.lower).inc(),
            );
        }

        if !neg_l.is_empty() && !neg_r.is_empty() {
            // neg / neg = pos
            let lo = neg_l.upper.dec().sdiv(&neg_r.lower);
            if neg_l.lower.is_signed_min() && neg_r.upper.is_zero() {
                // `MIN / -1` overflows: handle the LHS without MIN and the RHS without -1.
                if !neg_r.lower.is_all_ones() {
                    let adj_neg_r_upper = if rhs.lower.is_all_ones() {
                        rhs.upper.clone()
                    } else {
                        neg_r.upper.dec()
                    };
                    pos_res = pos_res.union(&Self::new(
                        lo.clone(),
                        neg_l.lower.sdiv(&adj_neg_r_upper.dec()).inc(),
                    ));
                }
                if neg_l.upper != signed_min.inc() {
                    let adj_neg_l_lower = if self.upper == signed_min.inc() {
                        self.lower.clone()
                    } else {
                        neg_l.lower.inc()
                    };
                    pos_res = pos_res.union(&Self::new(
                        lo,
                        adj_neg_l_lower.sdiv(&neg_r.upper.dec()).inc(),
                    ));
                }
            } else {
                pos_res = pos_res.union(&Self::new(lo, neg_l.lower.sdiv(&neg_r.upper.dec()).inc()));
            }
        }

        let mut neg_res = Self::empty(width);
        if !pos_l.is_empty() && !neg_r.is_empty() {
            // pos / neg = neg
            neg_res = Self::new(
                pos_l.upper.dec().sdiv(&neg_r.upper.dec()),
                pos_l.lower.sdiv(&neg_r.lower).inc(),
            );
        }
        if !neg_l.is_empty() && !pos_r.is_empty() {
            // neg / pos = neg
            neg_res = neg_res.union(&Self::new(
                neg_l.lower.sdiv(&pos_r.lower),
                neg_l.upper.dec().sdiv(&pos_r.upper.dec()).inc(),
            ));
        }

        let mut res = neg_res.union_with(&pos_res, PreferredRange::Signed);

        // Zero was dropped when splitting the LHS by sign.
        if self.contains(&zero) && (!pos_r.is_empty() || !neg_r.is_empty()) {
            res = res.union(&Self::single(zero));
        }
        res
    }

    /// Range of `x urem y`.
    pub fn urem(&self, rhs: &IntRange) -> IntRange {
        self.check_width(rhs);
        if self.is_empty() || rhs.is_empty() || rhs.unsigned_max().is_zero() {
            return Self::empty(self.width());
        }
        if let (Some(a), Some(b)) = (self.single_element(), rhs.single_element()) {
            return Self::single(a.urem(b));
        }

        // L % R for L < R is L.
        if self.unsigned_max().ult(&rhs.unsigned_min()) {
            return self.clone();
        }

        // L % R is <= L and < R.
        let upper = self.unsigned_max().umin(&rhs.unsigned_max().dec()).inc();
        Self::non_empty(ApInt::zero(self.width()), upper)
    }

    /// Range of `x srem y`; the result takes the sign of `x`.
    pub fn srem(&self, rhs: &IntRange) -> IntRange {
        self.check_width(rhs);
        let width = self.width();
        if self.is_empty() || rhs.is_empty() {
            return Self::empty(width);
        }

        let abs_rhs = rhs.abs();
        let mut min_abs_rhs = abs_rhs.unsigned_min();
        let max_abs_rhs = abs_rhs.unsigned_max();
        if max_abs_rhs.is_zero() {
            return Self::empty(width);
        }
        if min_abs_rhs.is_zero() {
            min_abs_rhs = min_abs_rhs.inc();
        }

        let zero = ApInt::zero(width);
        let min_lhs = self.signed_min();
        let max_lhs = self.signed_max();

        if min_lhs.is_non_negative() {
            if max_lhs.ult(&min_abs_rhs) {
                return self.clone();
            }
            let upper = max_lhs.umin(&max_abs_rhs.dec()).inc();
            return Self::non_empty(zero, upper);
        }

        if max_lhs.is_negative() {
            if min_lhs.ugt(&min_abs_rhs.neg()) {
                return self.clone();
            }
            let lower = min_lhs.umax(&max_abs_rhs.neg().inc());
            return Self::non_empty(lower, zero.inc());
        }

        let lower = min_lhs.umax(&max_abs_rhs.neg().inc());
        let upper = max_lhs.umin(&max_abs_rhs.dec()).inc();
        Self::non_empty(lower, upper)
    }

    /// Range of `|x|`, where `|MIN|` wraps to `MIN`.
    pub fn abs(&self) -> IntRange {
        let width = self.width();
        if self.is_empty() {
            return Self::empty(width);
        }

        if self.is_sign_wrapped() {
            let lo = if self.upper.is_strictly_positive() || !self.lower.is_strictly_positive() {
                ApInt::zero(width)
            } else {
                self.lower.umin(&self.upper.neg().inc())
            };
            return Self::new(lo, ApInt::signed_min(width).inc());
        }

        let smin = self.signed_min();
        let smax = self.signed_max();
        if smin.is_non_negative() {
            return self.clone();
        }
        if smax.is_negative() {
            return Self::new(smax.neg(), smin.neg().inc());
        }
        Self::new(ApInt::zero(width), smin.neg().umax(&smax).inc())
    }

    /// Range of `-x`.
    pub fn negate(&self) -> IntRange {
        Self::single(ApInt::zero(self.width())).sub(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::apint::ApInt;
    use crate::range::tests::{all_ranges, elements};
    use crate::range::IntRange;

    type BinOp = fn(&IntRange, &IntRange) -> IntRange;
    type ConcreteOp = fn(&ApInt, &ApInt) -> Option<ApInt>;

    /// Every concrete result of `op` over the operand ranges must lie in the abstract result.
    fn check_sound(name: &str, width: u32, abstract_op: BinOp, concrete_op: ConcreteOp) {
        let ranges = all_ranges(width);
        for a in &ranges {
            let a_elems = elements(a);
            for b in &ranges {
                let result = abstract_op(a, b);
                for x in &a_elems {
                    for y in elements(b) {
                        if let Some(z) = concrete_op(x, &y) {
                            assert!(
                                result.contains(&z),
                                "{}({}, {}) = {} misses {} ({} op {})",
                                name,
                                a,
                                b,
                                result,
                                z,
                                x,
                                y
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_add_sub_examples() {
        let a = IntRange::from_u64(32, 0, 50);
        let b = IntRange::from_u64(32, 25, 100);
        assert_eq!(a.add(&b), IntRange::from_u64(32, 25, 149));
        assert_eq!(b.sub(&a), IntRange::from_i64(32, -24, 100));
        assert!(IntRange::from_u64(8, 0, 200).add(&IntRange::from_u64(8, 0, 100)).is_full());
        assert!(a.add(&IntRange::empty(32)).is_empty());
    }

    #[test]
    fn test_add_sub_sound() {
        check_sound("add", 3, IntRange::add, |x, y| Some(x.add(y)));
        check_sound("sub", 3, IntRange::sub, |x, y| Some(x.sub(y)));
    }

    #[test]
    fn test_multiply() {
        let a = IntRange::from_u64(16, 2, 5);
        let b = IntRange::from_u64(16, 3, 4);
        assert_eq!(a.multiply(&b), IntRange::from_u64(16, 6, 13));
        let neg = IntRange::from_i64(16, -2, 3);
        assert_eq!(neg.multiply(&b), IntRange::from_i64(16, -6, 7));
        check_sound("mul", 3, IntRange::multiply, |x, y| Some(x.mul(y)));
    }

    #[test]
    fn test_udiv() {
        let a = IntRange::from_u64(32, 10, 101);
        let b = IntRange::from_u64(32, 0, 6);
        // Zero divisors are ignored.
        assert_eq!(a.udiv(&b), IntRange::from_u64(32, 2, 101));
        assert!(a.udiv(&IntRange::constant(32, 0)).is_empty());
        check_sound("udiv", 3, IntRange::udiv, |x, y| (!y.is_zero()).then(|| x.udiv(y)));
    }

    #[test]
    fn test_sdiv() {
        let a = IntRange::from_i64(8, -10, 11);
        let b = IntRange::constant(8, 2);
        assert_eq!(a.sdiv(&b), IntRange::from_i64(8, -5, 6));
        // `MIN / -1` overflows and is undefined, so it is not required to be covered.
        check_sound("sdiv", 3, IntRange::sdiv, |x, y| {
            (!y.is_zero() && !(x.is_signed_min() && y.is_all_ones())).then(|| x.sdiv(y))
        });
    }

    #[test]
    fn test_remainders() {
        let a = IntRange::from_u64(32, 0, 100);
        assert_eq!(a.urem(&IntRange::constant(32, 8)), IntRange::from_u64(32, 0, 8));
        assert_eq!(IntRange::from_u64(32, 1, 5).urem(&IntRange::constant(32, 8)), IntRange::from_u64(32, 1, 5));
        let s = IntRange::from_i64(32, -20, 21);
        assert_eq!(s.srem(&IntRange::constant(32, 8)), IntRange::from_i64(32, -7, 8));
        check_sound("urem", 3, IntRange::urem, |x, y| (!y.is_zero()).then(|| x.urem(y)));
        check_sound("srem", 3, IntRange::srem, |x, y| (!y.is_zero()).then(|| x.srem(y)));
    }

    #[test]
    fn test_abs() {
        assert_eq!(IntRange::from_i64(8, -5, 3).abs(), IntRange::from_u64(8, 0, 6));
        assert_eq!(IntRange::from_i64(8, -5, -1).abs(), IntRange::from_u64(8, 2, 6));
        for r in all_ranges(3) {
            let abs = r.abs();
            for v in elements(&r) {
                let expected = if v.is_negative() { v.neg() } else { v.clone() };
                assert!(abs.contains(&expected), "abs({}) = {} misses {}", r, abs, expected);
            }
        }
    }
}
