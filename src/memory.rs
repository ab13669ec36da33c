//! Global array accesses.
//!
//! Only one addressing shape is modeled: `&array[0][index]`, an element pointer into
//! a global array with exactly two indices, the first a constant zero. The element
//! index is read as unsigned; any value that may reach the declared length makes the
//! access out of range.

use std::fmt;
use std::ops::RangeInclusive;

use crate::ir::{GlobalId, GlobalShape, InstKind, Module, ValueId};
use crate::range::IntRange;

/// A resolved `&array[0][index]` access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayAccess {
    /// The element pointer instruction.
    pub ptr: ValueId,
    pub global: GlobalId,
    pub len: u64,
    pub index: ValueId,
}

impl ArrayAccess {
    /// Resolves `ptr` to an access into a global array, if it has the modeled shape.
    pub fn resolve(module: &Module, ptr: ValueId) -> Option<Self> {
        let Some(InstKind::ElementPtr { base, indices }) = module.inst(ptr) else {
            return None;
        };
        let global = module.as_global(*base)?;
        let GlobalShape::Array { len } = module.global(global).shape else {
            return None;
        };
        let [first, index] = indices.as_slice() else {
            return None;
        };
        if !module.as_const(*first).is_some_and(|c| c.is_zero()) {
            return None;
        }
        Some(Self {
            ptr,
            global,
            len,
            index: *index,
        })
    }
}

/// Outcome of checking an index range against an array length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCheck {
    /// Indices of the range that fall inside the array, if any.
    pub in_bounds: Option<RangeInclusive<u64>>,
    /// Whether some index of the range is at or past the end.
    pub out_of_range: bool,
}

pub fn check_index(index: &IntRange, len: u64) -> IndexCheck {
    if index.is_empty() {
        return IndexCheck {
            in_bounds: None,
            out_of_range: false,
        };
    }
    let min = index.unsigned_min().limited_value();
    let max = index.unsigned_max().limited_value();
    let out_of_range = max >= len;
    let in_bounds = (min < len).then(|| min..=max.min(len - 1));
    IndexCheck { in_bounds, out_of_range }
}

/// An element access whose index may fall outside its array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfRangeAccess {
    /// The element pointer instruction.
    pub access: ValueId,
    pub global: GlobalId,
    /// Index range at the time of the access.
    pub index: IntRange,
    pub len: u64,
}

impl fmt::Display for OutOfRangeAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: index {} into {} of length {}", self.access, self.index, self.global, self.len)
    }
}
