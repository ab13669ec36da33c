//! Integer comparison predicates.

use std::fmt;

use crate::apint::ApInt;

/// Predicate of an integer comparison `lhs <pred> rhs`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

impl IntPredicate {
    /// The predicate that holds exactly when `self` does not.
    pub fn inverse(self) -> Self {
        use IntPredicate::*;
        match self {
            Eq => Ne,
            Ne => Eq,
            Ugt => Ule,
            Uge => Ult,
            Ult => Uge,
            Ule => Ugt,
            Sgt => Sle,
            Sge => Slt,
            Slt => Sge,
            Sle => Sgt,
        }
    }

    /// The predicate obtained by exchanging the operands: `a < b` iff `b > a`.
    pub fn swapped(self) -> Self {
        use IntPredicate::*;
        match self {
            Eq => Eq,
            Ne => Ne,
            Ugt => Ult,
            Uge => Ule,
            Ult => Ugt,
            Ule => Uge,
            Sgt => Slt,
            Sge => Sle,
            Slt => Sgt,
            Sle => Sge,
        }
    }

    pub fn is_signed(self) -> bool {
        use IntPredicate::*;
        matches!(self, Sgt | Sge | Slt | Sle)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, IntPredicate::Eq | IntPredicate::Ne)
    }

    /// Evaluates the predicate on two concrete values.
    pub fn evaluate(self, lhs: &ApInt, rhs: &ApInt) -> bool {
        use IntPredicate::*;
        match self {
            Eq => lhs == rhs,
            Ne => lhs != rhs,
            Ugt => lhs.ugt(rhs),
            Uge => lhs.uge(rhs),
            Ult => lhs.ult(rhs),
            Ule => lhs.ule(rhs),
            Sgt => lhs.sgt(rhs),
            Sge => lhs.sge(rhs),
            Slt => lhs.slt(rhs),
            Sle => lhs.sle(rhs),
        }
    }

    pub fn all() -> [IntPredicate; 10] {
        use IntPredicate::*;
        [Eq, Ne, Ugt, Uge, Ult, Ule, Sgt, Sge, Slt, Sle]
    }
}

impl fmt::Display for IntPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Ugt => "ugt",
            IntPredicate::Uge => "uge",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_and_swapped_agree_with_evaluation() {
        let values = [0i64, 1, 5, -1, -128, 127];
        for pred in IntPredicate::all() {
            assert_eq!(pred.inverse().inverse(), pred);
            assert_eq!(pred.swapped().swapped(), pred);
            for &a in &values {
                for &b in &values {
                    let a = ApInt::from_i64(8, a);
                    let b = ApInt::from_i64(8, b);
                    assert_eq!(pred.evaluate(&a, &b), !pred.inverse().evaluate(&a, &b));
                    assert_eq!(pred.evaluate(&a, &b), pred.swapped().evaluate(&b, &a));
                }
            }
        }
    }
}
