//! Per-instruction transfer functions.
//!
//! [`Transfer::apply`] is the single dispatch point: one arm per [`InstKind`], each
//! either computing the range of the instruction's result or widening shared state
//! (stores, calls, returns). Missing operand data degrades to the full range.

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use crate::apint::ApInt;
use crate::config::AnalysisConfig;
use crate::ir::{BinaryOp, BlockId, CastOp, Callee, FuncId, InstKind, Linkage, Module, ValueId, ValueKind};
use crate::memory::{check_index, ArrayAccess, OutOfRangeAccess};
use crate::predicate::IntPredicate;
use crate::range::IntRange;
use crate::store::{RangeMap, SharedRanges};

/// Narrowed range maps of the feasible forward edges into a block, keyed by predecessor.
pub type IncomingMaps = HashMap<BlockId, RangeMap>;

/// Range of `value` as seen through `map`.
///
/// Returns `None` for values that are not integers. Values absent from `map` fall back
/// to: the exact value of a constant; the accumulated call-site range of a parameter of
/// an internal function (when trusted and called at least once); the full range
/// otherwise.
pub fn value_range(
    module: &Module,
    config: &AnalysisConfig,
    shared: &SharedRanges,
    map: &RangeMap,
    value: ValueId,
) -> Option<IntRange> {
    let width = module.int_width(value)?;
    if let Some(range) = map.get(value) {
        return Some(range.clone());
    }
    let range = match &module.value(value).kind {
        ValueKind::Const(c) => IntRange::single(c.clone()),
        ValueKind::Argument { func, index } => {
            let trusted = config.trust_internal_arguments && module.function(*func).linkage == Linkage::Internal;
            match shared.argument(*func, *index) {
                Some(range) if trusted => range.clone(),
                _ => IntRange::full(width),
            }
        }
        ValueKind::Global(_) => IntRange::full(width),
        ValueKind::Inst { .. } => {
            debug!("no range for {}, assuming full", module.label(value));
            IntRange::full(width)
        }
    };
    Some(range)
}

/// Transfer functions of one function's instructions.
pub struct Transfer<'a> {
    module: &'a Module,
    config: &'a AnalysisConfig,
    shared: &'a mut SharedRanges,
    func: FuncId,
    out_of_range: &'a mut BTreeMap<ValueId, OutOfRangeAccess>,
}

impl<'a> Transfer<'a> {
    pub fn new(
        module: &'a Module,
        config: &'a AnalysisConfig,
        shared: &'a mut SharedRanges,
        func: FuncId,
        out_of_range: &'a mut BTreeMap<ValueId, OutOfRangeAccess>,
    ) -> Self {
        Self {
            module,
            config,
            shared,
            func,
            out_of_range,
        }
    }

    fn operand(&self, map: &RangeMap, value: ValueId) -> Option<IntRange> {
        value_range(self.module, self.config, self.shared, map, value)
    }

    /// Runs the transfer function of `inst`, recording its result range (if any) in `map`.
    ///
    /// `incoming` holds the maps of the edges into the current block; phi nodes read
    /// their operands from there.
    pub fn apply(&mut self, map: &mut RangeMap, inst: ValueId, incoming: &IncomingMaps) -> Option<IntRange> {
        let module = self.module;
        let Some(kind) = module.inst(inst) else {
            panic!("{} is not an instruction", inst);
        };
        let result = match kind {
            InstKind::Binary { op, lhs, rhs } => self.binary(map, *op, *lhs, *rhs),
            InstKind::Cast { op, value } => self.cast(map, inst, *op, *value),
            InstKind::ICmp { pred, lhs, rhs } => self.icmp(map, *pred, *lhs, *rhs),
            InstKind::Select { on_true, on_false, .. } => self.select(map, inst, *on_true, *on_false),
            InstKind::Phi { incoming: pairs } => self.phi(inst, pairs, incoming),
            InstKind::Load { ptr } => self.load(map, inst, *ptr),
            InstKind::Store { value, ptr } => {
                self.store(map, *value, *ptr);
                None
            }
            InstKind::Call { callee, args } => self.call(map, inst, callee, args),
            InstKind::Ret { value } => {
                if let Some(value) = value {
                    self.ret(map, *value);
                }
                None
            }
            InstKind::ElementPtr { .. }
            | InstKind::Alloca
            | InstKind::Br { .. }
            | InstKind::CondBr { .. }
            | InstKind::Switch { .. }
            | InstKind::Unreachable => None,
        };
        if let Some(range) = &result {
            debug!("{} {} = {}", kind.name(), module.label(inst), range);
            map.insert(inst, range.clone());
        }
        result
    }

    fn binary(&self, map: &RangeMap, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> Option<IntRange> {
        if !op.is_integer() {
            warn!("unsupported binary operator {}", op);
            return self.operand(map, rhs);
        }
        let l = self.operand(map, lhs)?;
        let r = self.operand(map, rhs)?;
        let range = match op {
            BinaryOp::Add => l.add(&r),
            BinaryOp::Sub => l.sub(&r),
            BinaryOp::Mul => l.multiply(&r),
            BinaryOp::UDiv => l.udiv(&r),
            BinaryOp::SDiv => l.sdiv(&r),
            BinaryOp::URem => l.urem(&r),
            BinaryOp::SRem => l.srem(&r),
            BinaryOp::Shl => l.shl(&r),
            BinaryOp::LShr => l.lshr(&r),
            BinaryOp::AShr => l.ashr(&r),
            BinaryOp::And => l.binary_and(&r),
            BinaryOp::Or => l.binary_or(&r),
            BinaryOp::Xor => l.binary_xor(&r),
            BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul | BinaryOp::FDiv | BinaryOp::FRem => {
                unreachable!("float operator {}", op)
            }
        };
        Some(range)
    }

    fn cast(&self, map: &RangeMap, inst: ValueId, op: CastOp, value: ValueId) -> Option<IntRange> {
        let width = self.module.int_width(inst)?;
        let Some(src) = self.operand(map, value) else {
            return Some(IntRange::full(width));
        };
        let src_width = src.width();
        let range = match op {
            _ if src_width == width && matches!(op, CastOp::Trunc | CastOp::ZExt | CastOp::SExt) => src,
            CastOp::Trunc if src_width > width => src.truncate(width),
            CastOp::ZExt if src_width < width => src.zero_extend(width),
            CastOp::SExt if src_width < width => src.sign_extend(width),
            CastOp::Trunc | CastOp::ZExt | CastOp::SExt => {
                warn!("{} from i{} to i{} changes width the wrong way", op, src_width, width);
                IntRange::full(width)
            }
            _ if src_width == width => {
                warn!("unsupported cast {}, passing the source range through", op);
                src
            }
            _ => {
                warn!("unsupported cast {} from i{} to i{}", op, src_width, width);
                IntRange::full(width)
            }
        };
        Some(range)
    }

    fn icmp(&self, map: &RangeMap, pred: IntPredicate, lhs: ValueId, rhs: ValueId) -> Option<IntRange> {
        let (Some(l), Some(r)) = (self.operand(map, lhs), self.operand(map, rhs)) else {
            return Some(IntRange::full(1));
        };
        let range = if l.is_empty() || r.is_empty() {
            IntRange::empty(1)
        } else if l.icmp(pred, &r) {
            IntRange::constant(1, 1)
        } else if l.icmp(pred.inverse(), &r) {
            IntRange::constant(1, 0)
        } else {
            IntRange::full(1)
        };
        Some(range)
    }

    fn select(&self, map: &mut RangeMap, inst: ValueId, on_true: ValueId, on_false: ValueId) -> Option<IntRange> {
        let width = self.module.int_width(inst)?;
        map.insert(inst, IntRange::full(width));
        let t = self.operand(map, on_true)?;
        let f = self.operand(map, on_false)?;
        Some(t.union(&f))
    }

    fn phi(&self, inst: ValueId, pairs: &[(BlockId, ValueId)], incoming: &IncomingMaps) -> Option<IntRange> {
        let width = self.module.int_width(inst)?;
        let mut range = IntRange::empty(width);
        for &(pred, value) in pairs {
            // Back-edges and infeasible edges have no map.
            let Some(edge_map) = incoming.get(&pred) else {
                continue;
            };
            if let Some(r) = self.operand(edge_map, value) {
                range = range.union(&r);
            }
        }
        Some(range)
    }

    fn load(&mut self, map: &RangeMap, inst: ValueId, ptr: ValueId) -> Option<IntRange> {
        let width = self.module.int_width(inst)?;
        if let Some(g) = self.module.as_global(ptr) {
            return match self.shared.global(g) {
                Some(range) if range.width() == width => Some(range.clone()),
                _ => {
                    warn!("load of i{} from {} does not match its type", width, self.module.global(g).name);
                    Some(IntRange::full(width))
                }
            };
        }
        if let Some(access) = ArrayAccess::resolve(self.module, ptr) {
            if self.module.global(access.global).width != width {
                warn!("load of i{} from {} does not match its element type", width, self.module.global(access.global).name);
                return Some(IntRange::full(width));
            }
            let Some((lo, hi)) = self.check_access(map, &access) else {
                return Some(IntRange::full(width));
            };
            return self.shared.elements(access.global).map(|elements| elements.join(lo, hi));
        }
        warn!("unhandled load address {}", self.module.label(ptr));
        None
    }

    fn store(&mut self, map: &RangeMap, value: ValueId, ptr: ValueId) {
        let Some(range) = self.operand(map, value) else {
            return;
        };
        if let Some(g) = self.module.as_global(ptr) {
            self.shared.widen_global(g, &range);
            debug!("store {} into {} = {:?}", range, self.module.global(g).name, self.shared.global(g));
            return;
        }
        if let Some(access) = ArrayAccess::resolve(self.module, ptr) {
            if let Some((lo, hi)) = self.check_access(map, &access) {
                self.shared.widen_elements(access.global, lo, hi, &range);
            }
            return;
        }
        debug!("store to {} is not tracked", self.module.label(ptr));
    }

    /// Checks the index of `access`, recording it when it may be out of range. Returns
    /// the in-bounds part of the index range.
    fn check_access(&mut self, map: &RangeMap, access: &ArrayAccess) -> Option<(u64, u64)> {
        let Some(index) = self.operand(map, access.index) else {
            warn!("non-integer index {}", self.module.label(access.index));
            return None;
        };
        let check = check_index(&index, access.len);
        if check.out_of_range {
            let finding = OutOfRangeAccess {
                access: access.ptr,
                global: access.global,
                index: index.clone(),
                len: access.len,
            };
            debug!("out of range: {}", finding);
            self.out_of_range.insert(access.ptr, finding);
        }
        match check.in_bounds {
            Some(bounds) => Some((*bounds.start(), *bounds.end())),
            None => {
                if !index.is_empty() {
                    warn!(
                        "index {} is entirely outside {}",
                        index,
                        self.module.global(access.global).name
                    );
                }
                None
            }
        }
    }

    fn call(&mut self, map: &RangeMap, inst: ValueId, callee: &Callee, args: &[ValueId]) -> Option<IntRange> {
        let module = self.module;
        let width = module.int_width(inst);
        let callee = match callee {
            Callee::Direct(callee) => *callee,
            Callee::Indirect(target) => {
                debug!("indirect call through {}", module.label(*target));
                return width.map(IntRange::full);
            }
        };
        let function = module.function(callee);

        let ranges: Vec<Option<IntRange>> = args.iter().map(|&arg| self.operand(map, arg)).collect();
        for (index, range) in ranges.iter().enumerate() {
            if let Some(range) = range {
                self.shared.widen_argument(callee, index, range);
            }
        }
        if let Some(sink) = self.config.sink(&function.name) {
            for (&index, source) in &sink.sources {
                match ranges.get(index) {
                    Some(Some(range)) => self.shared.widen_taint_source(source, range),
                    _ => warn!("sink {} has no integer argument {}", function.name, index),
                }
            }
        }

        let width = width?;
        let range = if function.is_declaration() {
            self.shared.taint_source(&function.name).cloned()
        } else {
            self.shared.return_range(callee).cloned()
        };
        Some(range.unwrap_or_else(|| IntRange::full(width)))
    }

    fn ret(&mut self, map: &RangeMap, value: ValueId) {
        if !self.module.function(self.func).ret.is_int() {
            return;
        }
        if let Some(range) = self.operand(map, value) {
            self.shared.widen_return(self.func, &range);
        }
    }
}

/// The i1 constant for a branch outcome.
pub(crate) fn outcome_range(outcome: bool) -> IntRange {
    IntRange::single(ApInt::new(1, outcome as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GlobalShape, Type};
    use test_log::test;

    struct Harness {
        module: Module,
        config: AnalysisConfig,
        shared: SharedRanges,
        out_of_range: BTreeMap<ValueId, OutOfRangeAccess>,
    }

    impl Harness {
        fn new(module: Module) -> Self {
            Self::with_config(module, AnalysisConfig::default())
        }

        fn with_config(module: Module, config: AnalysisConfig) -> Self {
            let mut shared = SharedRanges::new();
            shared.seed_globals(&module, &config);
            Self {
                module,
                config,
                shared,
                out_of_range: BTreeMap::new(),
            }
        }

        /// Runs every instruction of `func`'s entry block against `map`.
        fn run(&mut self, func: FuncId, map: &mut RangeMap) {
            let entry = self.module.function(func).blocks[0];
            let insts = self.module.block(entry).insts.clone();
            let mut transfer = Transfer::new(&self.module, &self.config, &mut self.shared, func, &mut self.out_of_range);
            for inst in insts {
                transfer.apply(map, inst, &IncomingMaps::new());
            }
        }
    }

    #[test]
    fn test_binary_and_casts() {
        let mut module = Module::new();
        let f = module.add_function("f", &[Type::Int(32)], Type::Void, Linkage::External);
        let mut b = module.build(f);
        b.block("entry");
        let x = b.param(0);
        let hundred = b.const_int(32, 100);
        let r = b.binary(BinaryOp::URem, x, hundred);
        let one = b.const_int(32, 1);
        let s = b.binary(BinaryOp::Add, r, one);
        let t = b.cast(CastOp::Trunc, s, Type::Int(8));
        let z = b.cast(CastOp::ZExt, t, Type::Int(64));
        let p = b.cast(CastOp::IntToPtr, z, Type::Ptr);
        let q = b.cast(CastOp::PtrToInt, p, Type::Int(16));
        b.ret(None);

        let mut h = Harness::new(module);
        let mut map = RangeMap::new();
        h.run(f, &mut map);
        assert_eq!(map.get(r), Some(&IntRange::from_u64(32, 0, 100)));
        assert_eq!(map.get(s), Some(&IntRange::from_u64(32, 1, 101)));
        assert_eq!(map.get(t), Some(&IntRange::from_u64(8, 1, 101)));
        assert_eq!(map.get(z), Some(&IntRange::from_u64(64, 1, 101)));
        assert_eq!(map.get(p), None);
        assert_eq!(map.get(q), Some(&IntRange::full(16)));
    }

    #[test]
    fn test_unsupported_binary_returns_rhs() {
        let mut module = Module::new();
        let f = module.add_function("f", &[Type::Float, Type::Float], Type::Void, Linkage::External);
        let mut b = module.build(f);
        b.block("entry");
        let (x, y) = (b.param(0), b.param(1));
        let sum = b.binary(BinaryOp::FAdd, x, y);
        b.ret(None);

        let mut h = Harness::new(module);
        let mut map = RangeMap::new();
        h.run(f, &mut map);
        assert_eq!(map.get(sum), None);
    }

    #[test]
    fn test_icmp_and_select() {
        let mut module = Module::new();
        let f = module.add_function("f", &[Type::Int(8)], Type::Void, Linkage::External);
        let mut b = module.build(f);
        b.block("entry");
        let x = b.param(0);
        let mask = b.const_int(8, 7);
        let small = b.binary(BinaryOp::And, x, mask);
        let ten = b.const_int(8, 10);
        let always = b.icmp(IntPredicate::Ult, small, ten);
        let never = b.icmp(IntPredicate::Ugt, small, ten);
        let maybe = b.icmp(IntPredicate::Ult, x, ten);
        let twenty = b.const_int(8, 20);
        let sel = b.select(maybe, small, twenty);
        b.ret(None);

        let mut h = Harness::new(module);
        let mut map = RangeMap::new();
        h.run(f, &mut map);
        assert_eq!(map.get(small), Some(&IntRange::from_u64(8, 0, 8)));
        assert_eq!(map.get(always), Some(&IntRange::constant(1, 1)));
        assert_eq!(map.get(never), Some(&IntRange::constant(1, 0)));
        assert_eq!(map.get(maybe), Some(&IntRange::full(1)));
        assert_eq!(map.get(sel), Some(&IntRange::from_u64(8, 0, 21)));
    }

    #[test]
    fn test_phi_reads_edge_maps() {
        let mut module = Module::new();
        let f = module.add_function("f", &[Type::Int(32)], Type::Void, Linkage::External);
        let mut b = module.build(f);
        let entry = b.block("entry");
        let latch = b.block("latch");
        let x = b.param(0);
        let phi = b.phi(Type::Int(32), &[(entry, x), (latch, x)]);
        b.ret(None);

        let mut h = Harness::new(module);
        let mut edge = RangeMap::new();
        edge.insert(x, IntRange::from_u64(32, 3, 7));
        // Only the entry edge is present; the latch edge is a back-edge.
        let incoming: IncomingMaps = [(entry, edge)].into_iter().collect();
        let mut map = RangeMap::new();
        let mut transfer = Transfer::new(&h.module, &h.config, &mut h.shared, f, &mut h.out_of_range);
        let range = transfer.apply(&mut map, phi, &incoming);
        assert_eq!(range, Some(IntRange::from_u64(32, 3, 7)));
    }

    #[test]
    fn test_global_scalar_accumulates() {
        let mut module = Module::new();
        let g = module.add_global("limit", 32, GlobalShape::Scalar, Some(vec![ApInt::new(32, 10)]));
        let addr = module.global(g).addr;
        let f = module.add_function("f", &[], Type::Void, Linkage::External);
        let mut b = module.build(f);
        b.block("entry");
        let before = b.load(Type::Int(32), addr);
        let twenty = b.const_int(32, 20);
        b.store(twenty, addr);
        let after = b.load(Type::Int(32), addr);
        b.ret(None);

        let mut h = Harness::new(module);
        let mut map = RangeMap::new();
        h.run(f, &mut map);
        assert_eq!(map.get(before), Some(&IntRange::constant(32, 10)));
        assert_eq!(map.get(after), Some(&IntRange::from_u64(32, 10, 21)));
        assert_eq!(h.shared.global(g), Some(&IntRange::from_u64(32, 10, 21)));
    }

    #[test]
    fn test_array_access() {
        let mut module = Module::new();
        let init = (1..=4).map(|v| ApInt::new(8, v)).collect();
        let g = module.add_global("table", 8, GlobalShape::Array { len: 4 }, Some(init));
        let addr = module.global(g).addr;
        let f = module.add_function("f", &[Type::Int(32)], Type::Void, Linkage::External);
        let mut b = module.build(f);
        b.block("entry");
        let x = b.param(0);
        let zero = b.const_int(32, 0);
        let three = b.const_int(32, 3);
        let six = b.const_int(32, 6);
        let small = b.binary(BinaryOp::URem, x, three);
        let wide = b.binary(BinaryOp::URem, x, six);
        let ok_ptr = b.element_ptr(addr, &[zero, small]);
        let bad_ptr = b.element_ptr(addr, &[zero, wide]);
        let ok = b.load(Type::Int(8), ok_ptr);
        let bad = b.load(Type::Int(8), bad_ptr);
        let nine = b.const_int(8, 9);
        b.store(nine, bad_ptr);
        b.ret(None);

        let mut h = Harness::new(module);
        let mut map = RangeMap::new();
        h.run(f, &mut map);
        assert_eq!(map.get(ok), Some(&IntRange::from_u64(8, 1, 4)));
        assert_eq!(map.get(bad), Some(&IntRange::from_u64(8, 1, 5)));
        assert_eq!(h.out_of_range.len(), 1);
        let finding = &h.out_of_range[&bad_ptr];
        assert_eq!(finding.index, IntRange::from_u64(32, 0, 6));
        assert_eq!(finding.len, 4);
        let elements = h.shared.elements(g).unwrap();
        assert_eq!(elements.join(0, 0), IntRange::from_u64(8, 1, 10));
        assert_eq!(elements.join(3, 3), IntRange::from_u64(8, 4, 10));
    }

    #[test]
    fn test_unhandled_load_is_unresolved() {
        let mut module = Module::new();
        let f = module.add_function("f", &[], Type::Void, Linkage::External);
        let mut b = module.build(f);
        b.block("entry");
        let slot = b.alloca();
        let v = b.load(Type::Int(32), slot);
        b.ret(None);

        let mut h = Harness::new(module);
        let mut map = RangeMap::new();
        h.run(f, &mut map);
        assert_eq!(map.get(v), None);
        assert_eq!(value_range(&h.module, &h.config, &h.shared, &map, v), Some(IntRange::full(32)));
    }

    #[test]
    fn test_call_widens_arguments_and_sinks() {
        let mut module = Module::new();
        let read_len = module.add_function("read_len", &[], Type::Int(32), Linkage::External);
        let copy = module.add_function("copy", &[Type::Ptr, Type::Int(32)], Type::Void, Linkage::External);
        let helper = module.add_function("helper", &[Type::Int(32)], Type::Int(32), Linkage::Internal);
        let f = module.add_function("f", &[], Type::Void, Linkage::External);
        let mut b = module.build(f);
        b.block("entry");
        let five = b.const_int(32, 5);
        let nine = b.const_int(32, 9);
        let r1 = b.call(helper, &[five]);
        let r2 = b.call(helper, &[nine]);
        let buf = b.alloca();
        b.call(copy, &[buf, nine]);
        let n = b.call(read_len, &[]);
        b.ret(None);

        let config = AnalysisConfig {
            sinks: vec!["copy:1=read_len".parse().unwrap()],
            ..AnalysisConfig::default()
        };
        let mut h = Harness::with_config(module, config);
        let mut map = RangeMap::new();
        h.run(f, &mut map);

        assert_eq!(h.shared.argument(helper, 0), Some(&IntRange::from_u64(32, 5, 10)));
        // No return range is known for `helper` yet.
        assert_eq!(map.get(r1), Some(&IntRange::full(32)));
        assert_eq!(map.get(r2), Some(&IntRange::full(32)));
        assert_eq!(h.shared.taint_source("read_len"), Some(&IntRange::constant(32, 9)));
        assert_eq!(map.get(n), Some(&IntRange::constant(32, 9)));

        let param = h.module.function(helper).params[0];
        let empty = RangeMap::new();
        assert_eq!(
            value_range(&h.module, &h.config, &h.shared, &empty, param),
            Some(IntRange::from_u64(32, 5, 10))
        );
    }

    #[test]
    fn test_ret_widens_return_range() {
        let mut module = Module::new();
        let f = module.add_function("f", &[Type::Int(32)], Type::Int(32), Linkage::External);
        let mut b = module.build(f);
        b.block("entry");
        let x = b.param(0);
        let seven = b.const_int(32, 7);
        let r = b.binary(BinaryOp::And, x, seven);
        b.ret(Some(r));

        let mut h = Harness::new(module);
        let mut map = RangeMap::new();
        h.run(f, &mut map);
        assert_eq!(h.shared.return_range(f), Some(&IntRange::from_u64(32, 0, 8)));

        // Running again with a narrower operand does not shrink the recorded range.
        let mut narrow = RangeMap::new();
        narrow.insert(x, IntRange::constant(32, 1));
        h.run(f, &mut narrow);
        assert_eq!(h.shared.return_range(f), Some(&IntRange::from_u64(32, 0, 8)));
    }
}
