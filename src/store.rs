//! Range maps.
//!
//! [`RangeMap`] is the per-block view: one range per value, rebuilt on every block
//! visit. [`SharedRanges`] holds the process-wide maps that outlive a single function:
//! global variables, array elements, function returns, parameters, and sink sources.
//! Shared entries only ever grow (every write is a union), so visiting functions
//! repeatedly or out of order can only make them more conservative.

use std::collections::HashMap;

use log::debug;

use crate::config::AnalysisConfig;
use crate::ir::{FuncId, GlobalId, GlobalShape, Module, ValueId};
use crate::range::IntRange;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeMap {
    ranges: HashMap<ValueId, IntRange>,
}

impl RangeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, value: ValueId) -> Option<&IntRange> {
        self.ranges.get(&value)
    }

    pub fn insert(&mut self, value: ValueId, range: IntRange) -> Option<IntRange> {
        self.ranges.insert(value, range)
    }

    pub fn contains(&self, value: ValueId) -> bool {
        self.ranges.contains_key(&value)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValueId, &IntRange)> {
        self.ranges.iter().map(|(&v, r)| (v, r))
    }

    /// Joins `range` into the entry of `value`. Returns whether the entry grew.
    pub fn widen(&mut self, value: ValueId, range: &IntRange) -> bool {
        widen_entry(&mut self.ranges, value, range)
    }

    /// Joins `other` into this map.
    ///
    /// A value mentioned by only one side is joined with `unnarrowed(side, value)`,
    /// evaluated on the side that lacks it. A `None` there keeps the mentioned range.
    pub fn join_with<F>(&mut self, other: &RangeMap, unnarrowed: F)
    where
        F: Fn(&RangeMap, ValueId) -> Option<IntRange>,
    {
        let only_here: Vec<ValueId> = self.ranges.keys().copied().filter(|&v| !other.contains(v)).collect();
        let only_there: Vec<(ValueId, IntRange)> = other
            .iter()
            .filter(|&(v, _)| !self.contains(v))
            .map(|(v, r)| match unnarrowed(self, v) {
                Some(u) => (v, u.union(r)),
                None => (v, r.clone()),
            })
            .collect();

        for value in only_here {
            if let Some(range) = unnarrowed(other, value) {
                self.widen(value, &range);
            }
        }
        for (value, range) in other.iter() {
            if self.contains(value) {
                self.widen(value, range);
            }
        }
        for (value, range) in only_there {
            self.insert(value, range);
        }
    }
}

fn widen_entry<K: std::hash::Hash + Eq>(map: &mut HashMap<K, IntRange>, key: K, range: &IntRange) -> bool {
    match map.get_mut(&key) {
        Some(old) => {
            let joined = old.union(range);
            if joined == *old {
                false
            } else {
                *old = joined;
                true
            }
        }
        None => {
            map.insert(key, range.clone());
            true
        }
    }
}

/// Element ranges of a global array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementRanges {
    PerElement(Vec<IntRange>),
    /// One range standing for every element of an array too long to track individually.
    Summary(IntRange),
}

impl ElementRanges {
    /// Join of the element ranges at indices `lo..=hi`.
    pub fn join(&self, lo: u64, hi: u64) -> IntRange {
        match self {
            ElementRanges::PerElement(elements) => {
                let width = elements[0].width();
                elements[lo as usize..=hi as usize]
                    .iter()
                    .fold(IntRange::empty(width), |acc, r| acc.union(r))
            }
            ElementRanges::Summary(range) => range.clone(),
        }
    }

    /// Joins `range` into the elements at indices `lo..=hi`. Returns whether any grew.
    pub fn widen(&mut self, lo: u64, hi: u64, range: &IntRange) -> bool {
        match self {
            ElementRanges::PerElement(elements) => {
                let mut grew = false;
                for element in &mut elements[lo as usize..=hi as usize] {
                    let joined = element.union(range);
                    if joined != *element {
                        *element = joined;
                        grew = true;
                    }
                }
                grew
            }
            ElementRanges::Summary(summary) => {
                let joined = summary.union(range);
                let grew = joined != *summary;
                *summary = joined;
                grew
            }
        }
    }
}

/// Ranges shared by every function of a module.
#[derive(Debug, Clone, Default)]
pub struct SharedRanges {
    globals: HashMap<GlobalId, IntRange>,
    arrays: HashMap<GlobalId, ElementRanges>,
    returns: HashMap<FuncId, IntRange>,
    arguments: HashMap<(FuncId, usize), IntRange>,
    taint_sources: HashMap<String, IntRange>,
    changed: bool,
}

impl SharedRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds every global from its initializer; globals without one start unconstrained.
    pub fn seed_globals(&mut self, module: &Module, config: &AnalysisConfig) {
        for g in module.globals() {
            let global = module.global(g);
            let initial = |index: usize| match &global.init {
                Some(values) => IntRange::single(values[index].clone()),
                None => IntRange::full(global.width),
            };
            match global.shape {
                GlobalShape::Scalar => {
                    self.globals.insert(g, initial(0));
                }
                GlobalShape::Array { len } if len == 0 => {
                    self.arrays.insert(g, ElementRanges::Summary(IntRange::empty(global.width)));
                }
                GlobalShape::Array { len } if len <= config.max_tracked_elements => {
                    let elements = (0..len as usize).map(initial).collect();
                    self.arrays.insert(g, ElementRanges::PerElement(elements));
                }
                GlobalShape::Array { len } => {
                    let summary = (0..len as usize)
                        .map(initial)
                        .fold(IntRange::empty(global.width), |acc, r| acc.union(&r));
                    self.arrays.insert(g, ElementRanges::Summary(summary));
                }
            }
            debug!("seed global {} = {}", global.name, self.describe_global(g));
        }
    }

    fn describe_global(&self, g: GlobalId) -> String {
        match (self.globals.get(&g), self.arrays.get(&g)) {
            (Some(range), _) => range.to_string(),
            (None, Some(ElementRanges::PerElement(elements))) => format!("{} elements", elements.len()),
            (None, Some(ElementRanges::Summary(range))) => format!("summary {}", range),
            (None, None) => "?".to_string(),
        }
    }

    fn note(&mut self, grew: bool) {
        self.changed |= grew;
    }

    /// Returns whether any shared entry grew since the last call, and resets the flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    pub fn global(&self, global: GlobalId) -> Option<&IntRange> {
        self.globals.get(&global)
    }

    pub fn widen_global(&mut self, global: GlobalId, range: &IntRange) {
        let grew = widen_entry(&mut self.globals, global, range);
        self.note(grew);
    }

    pub fn elements(&self, global: GlobalId) -> Option<&ElementRanges> {
        self.arrays.get(&global)
    }

    pub fn widen_elements(&mut self, global: GlobalId, lo: u64, hi: u64, range: &IntRange) {
        if let Some(elements) = self.arrays.get_mut(&global) {
            let grew = elements.widen(lo, hi, range);
            self.note(grew);
        }
    }

    pub fn return_range(&self, func: FuncId) -> Option<&IntRange> {
        self.returns.get(&func)
    }

    pub fn widen_return(&mut self, func: FuncId, range: &IntRange) {
        let grew = widen_entry(&mut self.returns, func, range);
        self.note(grew);
    }

    pub fn argument(&self, func: FuncId, index: usize) -> Option<&IntRange> {
        self.arguments.get(&(func, index))
    }

    pub fn widen_argument(&mut self, func: FuncId, index: usize, range: &IntRange) {
        let grew = widen_entry(&mut self.arguments, (func, index), range);
        self.note(grew);
    }

    pub fn taint_source(&self, source: &str) -> Option<&IntRange> {
        self.taint_sources.get(source)
    }

    pub fn widen_taint_source(&mut self, source: &str, range: &IntRange) {
        let grew = match self.taint_sources.get_mut(source) {
            Some(old) => {
                let joined = old.union(range);
                let grew = joined != *old;
                *old = joined;
                grew
            }
            None => {
                self.taint_sources.insert(source.to_string(), range.clone());
                true
            }
        };
        self.note(grew);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apint::ApInt;

    #[test]
    fn test_range_map_widen() {
        let mut map = RangeMap::new();
        let v = ValueId(0);
        assert!(map.widen(v, &IntRange::from_u64(8, 0, 10)));
        assert!(!map.widen(v, &IntRange::from_u64(8, 2, 5)));
        assert!(map.widen(v, &IntRange::from_u64(8, 5, 20)));
        assert_eq!(map.get(v), Some(&IntRange::from_u64(8, 0, 20)));

        let mut other = RangeMap::new();
        other.insert(v, IntRange::from_u64(8, 30, 40));
        other.insert(ValueId(1), IntRange::constant(8, 1));
        map.join_with(&other, |_, _| None);
        assert_eq!(map.get(v), Some(&IntRange::from_u64(8, 0, 40)));
        assert_eq!(map.get(ValueId(1)), Some(&IntRange::constant(8, 1)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_range_map_join_one_sided() {
        let (narrowed, other) = (ValueId(0), ValueId(1));
        let unnarrowed = |_: &RangeMap, _: ValueId| Some(IntRange::from_u64(8, 0, 100));

        // Narrowed only on the incoming side.
        let mut map = RangeMap::new();
        let mut edge = RangeMap::new();
        edge.insert(narrowed, IntRange::from_u64(8, 0, 10));
        map.join_with(&edge, unnarrowed);
        assert_eq!(map.get(narrowed), Some(&IntRange::from_u64(8, 0, 100)));

        // Narrowed only on the accumulated side.
        let mut map = RangeMap::new();
        map.insert(other, IntRange::from_u64(8, 50, 60));
        map.join_with(&RangeMap::new(), unnarrowed);
        assert_eq!(map.get(other), Some(&IntRange::from_u64(8, 0, 100)));
    }

    #[test]
    fn test_shared_ranges_only_grow() {
        let mut shared = SharedRanges::new();
        let f = FuncId(0);
        shared.widen_return(f, &IntRange::from_u64(32, 0, 10));
        assert!(shared.take_changed());
        shared.widen_return(f, &IntRange::from_u64(32, 3, 4));
        assert!(!shared.take_changed());
        assert_eq!(shared.return_range(f), Some(&IntRange::from_u64(32, 0, 10)));

        shared.widen_taint_source("read_len", &IntRange::constant(32, 7));
        shared.widen_taint_source("read_len", &IntRange::constant(32, 9));
        assert!(shared.take_changed());
        assert_eq!(shared.taint_source("read_len"), Some(&IntRange::from_u64(32, 7, 10)));
    }

    #[test]
    fn test_seed_globals() {
        let mut module = Module::new();
        let counter = module.add_global("counter", 32, GlobalShape::Scalar, Some(vec![ApInt::new(32, 5)]));
        let unknown = module.add_global("unknown", 16, GlobalShape::Scalar, None);
        let table = module.add_global(
            "table",
            8,
            GlobalShape::Array { len: 3 },
            Some(vec![ApInt::new(8, 1), ApInt::new(8, 2), ApInt::new(8, 9)]),
        );
        let big = module.add_global("big", 8, GlobalShape::Array { len: 4 }, None);

        let config = AnalysisConfig {
            max_tracked_elements: 3,
            ..AnalysisConfig::default()
        };
        let mut shared = SharedRanges::new();
        shared.seed_globals(&module, &config);
        assert!(!shared.take_changed());

        assert_eq!(shared.global(counter), Some(&IntRange::constant(32, 5)));
        assert_eq!(shared.global(unknown), Some(&IntRange::full(16)));
        let elements = shared.elements(table).unwrap();
        assert_eq!(elements.join(0, 1), IntRange::from_u64(8, 1, 3));
        assert_eq!(elements.join(2, 2), IntRange::constant(8, 9));
        assert_eq!(shared.elements(big), Some(&ElementRanges::Summary(IntRange::full(8))));

        shared.widen_elements(table, 1, 2, &IntRange::constant(8, 0));
        assert!(shared.take_changed());
        assert_eq!(shared.elements(table).unwrap().join(0, 0), IntRange::constant(8, 1));
        assert_eq!(shared.elements(table).unwrap().join(1, 1), IntRange::from_u64(8, 0, 3));
    }
}
