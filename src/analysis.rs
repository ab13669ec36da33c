//! Whole-module driver and query interface.

use std::collections::HashMap;

use log::{debug, warn};

use crate::cfg::{BackEdges, Cfg};
use crate::config::AnalysisConfig;
use crate::ir::{BlockId, FuncId, GlobalId, GlobalShape, Module, ValueId, ValueKind};
use crate::memory::OutOfRangeAccess;
use crate::propagate::{propagate, BlockState, FunctionRanges, ImpossibleBranch};
use crate::range::IntRange;
use crate::store::{RangeMap, SharedRanges};
use crate::transfer::value_range;

/// Range analysis of a [`Module`].
///
/// Functions can be analyzed one at a time with [`analyze_function`], in any order, or
/// all together with [`analyze_module`]. Either way the process-wide state (globals,
/// returns, parameters, sink sources) only grows, and the per-function results always
/// reflect the latest visit.
///
/// [`analyze_function`]: RangeAnalysis::analyze_function
/// [`analyze_module`]: RangeAnalysis::analyze_module
///
/// ```
/// use intrange_rs::analysis::RangeAnalysis;
/// use intrange_rs::config::AnalysisConfig;
/// use intrange_rs::ir::{BinaryOp, Linkage, Module, Type};
/// use intrange_rs::range::IntRange;
///
/// let mut module = Module::new();
/// let f = module.add_function("low_bits", &[Type::Int(32)], Type::Int(32), Linkage::External);
/// let mut b = module.build(f);
/// b.block("entry");
/// let x = b.param(0);
/// let mask = b.const_int(32, 15);
/// let low = b.binary(BinaryOp::And, x, mask);
/// b.ret(Some(low));
///
/// let mut analysis = RangeAnalysis::new(&module, AnalysisConfig::default());
/// analysis.analyze_module();
/// assert_eq!(analysis.return_range(f), Some(IntRange::from_u64(32, 0, 16)));
/// ```
pub struct RangeAnalysis<'m> {
    module: &'m Module,
    config: AnalysisConfig,
    shared: SharedRanges,
    back_edges: HashMap<FuncId, BackEdges>,
    functions: HashMap<FuncId, FunctionRanges>,
}

impl<'m> RangeAnalysis<'m> {
    pub fn new(module: &'m Module, config: AnalysisConfig) -> Self {
        let mut shared = SharedRanges::new();
        shared.seed_globals(module, &config);
        Self {
            module,
            config,
            shared,
            back_edges: HashMap::new(),
            functions: HashMap::new(),
        }
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn shared(&self) -> &SharedRanges {
        &self.shared
    }

    /// Supplies the back-edges of `func`. Functions without supplied back-edges get
    /// them from [`BackEdges::compute`].
    pub fn set_back_edges(&mut self, func: FuncId, back_edges: BackEdges) {
        self.back_edges.insert(func, back_edges);
    }

    /// Analyzes one function, replacing its previous results.
    pub fn analyze_function(&mut self, func: FuncId) -> &FunctionRanges {
        let module = self.module;
        debug!("analyze function {}", module.function(func).name);
        let cfg = Cfg::new(module, func);
        let back_edges = match self.back_edges.get(&func) {
            Some(back_edges) => back_edges.clone(),
            None => BackEdges::compute(&cfg),
        };
        let ranges = propagate(module, &self.config, &mut self.shared, func, &cfg, &back_edges);
        self.functions.insert(func, ranges);
        &self.functions[&func]
    }

    /// Analyzes every defined function in module order, repeating the round while any
    /// shared range widened, at most `max_passes` times. Returns the number of rounds.
    pub fn analyze_module(&mut self) -> usize {
        let module = self.module;
        self.shared.take_changed();
        for pass in 1..=self.config.max_passes {
            debug!("pass {}", pass);
            for func in module.functions() {
                if !module.function(func).is_declaration() {
                    self.analyze_function(func);
                }
            }
            if !self.shared.take_changed() {
                return pass;
            }
        }
        warn!("shared ranges still changing after {} passes", self.config.max_passes);
        self.config.max_passes
    }

    pub fn function_ranges(&self, func: FuncId) -> Option<&FunctionRanges> {
        self.functions.get(&func)
    }

    fn lookup(&self, map: &RangeMap, value: ValueId) -> Option<IntRange> {
        value_range(self.module, &self.config, &self.shared, map, value)
    }

    /// Range of `value` over the whole of `func`.
    ///
    /// For an instruction this is the join over every emitted block that has a range
    /// for it (empty if none does); for constants and parameters it is their range on
    /// entry. `None` for non-integer values.
    pub fn range_of(&self, func: FuncId, value: ValueId) -> Option<IntRange> {
        let width = self.module.int_width(value)?;
        match self.module.value(value).kind {
            ValueKind::Inst { .. } => {
                let Some(ranges) = self.functions.get(&func) else {
                    return Some(IntRange::full(width));
                };
                let joined = ranges
                    .block_maps()
                    .filter_map(|(_, map)| map.get(value))
                    .fold(IntRange::empty(width), |acc, r| acc.union(r));
                Some(joined)
            }
            _ => self.lookup(&RangeMap::new(), value),
        }
    }

    /// Range of `value` at the end of `block`. Empty if the block was never emitted.
    pub fn range_at(&self, func: FuncId, block: BlockId, value: ValueId) -> Option<IntRange> {
        let width = self.module.int_width(value)?;
        match self.functions.get(&func).and_then(|r| r.block_map(block)) {
            Some(map) => self.lookup(map, value),
            None => Some(IntRange::empty(width)),
        }
    }

    pub fn block_state(&self, func: FuncId, block: BlockId) -> BlockState {
        self.functions
            .get(&func)
            .map_or(BlockState::Unvisited, |r| r.state(block))
    }

    /// Join of every value returned by `func` so far.
    pub fn return_range(&self, func: FuncId) -> Option<IntRange> {
        self.shared.return_range(func).cloned()
    }

    pub fn global_range(&self, global: GlobalId) -> Option<IntRange> {
        self.shared.global(global).cloned()
    }

    /// Range of element `index` of a global array; `None` for scalars and indices past the end.
    pub fn element_range(&self, global: GlobalId, index: u64) -> Option<IntRange> {
        match self.module.global(global).shape {
            GlobalShape::Array { len } if index < len => {}
            _ => return None,
        }
        self.shared.elements(global).map(|elements| elements.join(index, index))
    }

    /// Join of the call-site arguments passed at position `index` of `func`.
    pub fn argument_range(&self, func: FuncId, index: usize) -> Option<IntRange> {
        self.shared.argument(func, index).cloned()
    }

    /// Join of the sink arguments attributed to the taint source `source`.
    pub fn taint_source_range(&self, source: &str) -> Option<IntRange> {
        self.shared.taint_source(source).cloned()
    }

    /// Impossible branches of every analyzed function, in function order.
    pub fn impossible_branches(&self) -> Vec<ImpossibleBranch> {
        self.module
            .functions()
            .filter_map(|f| self.functions.get(&f))
            .flat_map(|r| r.impossible_branches().iter().copied())
            .collect()
    }

    /// Out-of-range array accesses of every analyzed function, in function order.
    pub fn out_of_range_accesses(&self) -> Vec<OutOfRangeAccess> {
        self.module
            .functions()
            .filter_map(|f| self.functions.get(&f))
            .flat_map(|r| r.out_of_range().values().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Linkage, Type};
    use test_log::test;

    /// `callee(x) = x + 1`, called from `caller` with 3 and 7.
    fn build_call_chain(caller_first: bool) -> (Module, FuncId, FuncId) {
        let mut module = Module::new();
        let (callee, caller) = if caller_first {
            let caller = module.add_function("caller", &[], Type::Int(32), Linkage::External);
            let callee = module.add_function("callee", &[Type::Int(32)], Type::Int(32), Linkage::Internal);
            (callee, caller)
        } else {
            let callee = module.add_function("callee", &[Type::Int(32)], Type::Int(32), Linkage::Internal);
            let caller = module.add_function("caller", &[], Type::Int(32), Linkage::External);
            (callee, caller)
        };

        let mut b = module.build(callee);
        b.block("entry");
        let x = b.param(0);
        let one = b.const_int(32, 1);
        let y = b.binary(BinaryOp::Add, x, one);
        b.ret(Some(y));

        let mut b = module.build(caller);
        b.block("entry");
        let three = b.const_int(32, 3);
        let seven = b.const_int(32, 7);
        let a = b.call(callee, &[three]);
        let c = b.call(callee, &[seven]);
        let sum = b.binary(BinaryOp::Add, a, c);
        b.ret(Some(sum));

        (module, callee, caller)
    }

    #[test]
    fn test_interprocedural() {
        let (module, callee, caller) = build_call_chain(true);
        let mut analysis = RangeAnalysis::new(&module, AnalysisConfig::default());
        let passes = analysis.analyze_module();
        assert!(passes >= 2);
        assert_eq!(analysis.argument_range(callee, 0), Some(IntRange::from_u64(32, 3, 8)));
        assert_eq!(analysis.return_range(callee), Some(IntRange::from_u64(32, 4, 9)));
        // The caller's first pass saw an unknown callee, and shared ranges never shrink.
        assert_eq!(analysis.return_range(caller), Some(IntRange::full(32)));
    }

    #[test]
    fn test_callee_before_its_call_sites() {
        let (module, callee, caller) = build_call_chain(false);
        let mut analysis = RangeAnalysis::new(&module, AnalysisConfig::default());
        analysis.analyze_module();
        // On the first pass the callee has no call sites yet, so its return is full.
        assert_eq!(analysis.return_range(callee), Some(IntRange::full(32)));
        assert_eq!(analysis.argument_range(callee, 0), Some(IntRange::from_u64(32, 3, 8)));
        assert!(analysis.return_range(caller).is_some());
    }

    #[test]
    fn test_untrusted_arguments() {
        let (module, callee, _) = build_call_chain(false);
        let config = AnalysisConfig {
            trust_internal_arguments: false,
            ..AnalysisConfig::default()
        };
        let mut analysis = RangeAnalysis::new(&module, config);
        analysis.analyze_module();
        let x = module.function(callee).params[0];
        assert_eq!(analysis.range_of(callee, x), Some(IntRange::full(32)));
        assert_eq!(analysis.argument_range(callee, 0), Some(IntRange::from_u64(32, 3, 8)));
    }

    #[test]
    fn test_explicit_back_edges_and_queries() {
        let mut module = Module::new();
        let f = module.add_function("f", &[Type::Int(8)], Type::Void, Linkage::External);
        let mut b = module.build(f);
        let entry = b.block("entry");
        let exit = b.block("exit");
        let x = b.param(0);
        let mask = b.const_int(8, 3);
        let low = b.binary(BinaryOp::And, x, mask);
        b.br(exit);
        b.switch_to(exit);
        b.ret(None);

        let mut analysis = RangeAnalysis::new(&module, AnalysisConfig::default());
        analysis.set_back_edges(f, BackEdges::new());
        let ranges = analysis.analyze_function(f);
        assert_eq!(ranges.state(exit), BlockState::Emitted);
        assert_eq!(analysis.range_at(f, entry, low), Some(IntRange::from_u64(8, 0, 4)));
        assert_eq!(analysis.range_at(f, exit, low), Some(IntRange::from_u64(8, 0, 4)));
        assert_eq!(analysis.range_of(f, low), Some(IntRange::from_u64(8, 0, 4)));
        assert_eq!(analysis.range_of(f, mask), Some(IntRange::constant(8, 3)));
        assert_eq!(analysis.block_state(f, exit), BlockState::Emitted);
        assert_eq!(analysis.range_of(f, module.function(f).params[0]), Some(IntRange::full(8)));
    }
}
