use crate::apint::ApInt;
use crate::ir::*;
use crate::predicate::IntPredicate;

/// Appends blocks and instructions to one function of a [`Module`].
///
/// Instructions go to the end of the current block, which is the first block created
/// until [`FunctionBuilder::switch_to`] selects another one.
///
/// ```
/// use intrange_rs::ir::{BinaryOp, Linkage, Module, Type};
///
/// let mut module = Module::new();
/// let f = module.add_function("inc", &[Type::Int(32)], Type::Int(32), Linkage::External);
/// let mut b = module.build(f);
/// b.block("entry");
/// let one = b.const_int(32, 1);
/// let x = b.param(0);
/// let sum = b.binary(BinaryOp::Add, x, one);
/// b.ret(Some(sum));
/// assert!(!module.function(f).is_declaration());
/// ```
pub struct FunctionBuilder<'m> {
    module: &'m mut Module,
    func: FuncId,
    current: Option<BlockId>,
}

impl<'m> FunctionBuilder<'m> {
    pub(crate) fn new(module: &'m mut Module, func: FuncId) -> Self {
        let current = module.function(func).blocks.last().copied();
        Self { module, func, current }
    }

    pub fn func(&self) -> FuncId {
        self.func
    }

    pub fn module(&mut self) -> &mut Module {
        self.module
    }

    pub fn param(&self, index: usize) -> ValueId {
        self.module.function(self.func).params[index]
    }

    pub fn const_int(&mut self, width: u32, value: i64) -> ValueId {
        self.module.const_int(width, value)
    }

    /// Appends a new block to the function. The first block becomes the entry and the
    /// insertion point.
    pub fn block(&mut self, name: impl Into<String>) -> BlockId {
        let block = self.module.push_block(BlockData {
            func: self.func,
            name: name.into(),
            insts: Vec::new(),
        });
        self.module.function_mut(self.func).blocks.push(block);
        if self.current.is_none() {
            self.current = Some(block);
        }
        block
    }

    pub fn switch_to(&mut self, block: BlockId) {
        assert_eq!(
            self.module.block(block).func,
            self.func,
            "Block {} belongs to another function",
            block
        );
        self.current = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current
    }

    fn push(&mut self, ty: Type, kind: InstKind) -> ValueId {
        let Some(block) = self.current else {
            panic!("No block to insert into");
        };
        assert!(
            self.module.terminator(block).is_none(),
            "Block {} already has a terminator",
            self.module.block_label(block)
        );
        let value = self.module.push_value(ValueData {
            ty,
            kind: ValueKind::Inst { block, kind },
            name: None,
        });
        self.module.block_mut(block).insts.push(value);
        value
    }

    /// Names the value for traces and returns it.
    pub fn named(&mut self, value: ValueId, name: impl Into<String>) -> ValueId {
        self.module.set_name(value, name);
        value
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = self.module.ty(lhs);
        assert_eq!(ty, self.module.ty(rhs), "Operands of {} have different types", op);
        self.push(ty, InstKind::Binary { op, lhs, rhs })
    }

    pub fn cast(&mut self, op: CastOp, value: ValueId, ty: Type) -> ValueId {
        self.push(ty, InstKind::Cast { op, value })
    }

    pub fn icmp(&mut self, pred: IntPredicate, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Type::Int(1), InstKind::ICmp { pred, lhs, rhs })
    }

    pub fn select(&mut self, cond: ValueId, on_true: ValueId, on_false: ValueId) -> ValueId {
        let ty = self.module.ty(on_true);
        self.push(ty, InstKind::Select { cond, on_true, on_false })
    }

    pub fn phi(&mut self, ty: Type, incoming: &[(BlockId, ValueId)]) -> ValueId {
        self.push(
            ty,
            InstKind::Phi {
                incoming: incoming.to_vec(),
            },
        )
    }

    /// Adds an incoming pair to an existing phi, for values defined after it (loops).
    pub fn add_incoming(&mut self, phi: ValueId, block: BlockId, value: ValueId) {
        match &mut self.module.value_mut(phi).kind {
            ValueKind::Inst {
                kind: InstKind::Phi { incoming },
                ..
            } => incoming.push((block, value)),
            _ => panic!("{} is not a phi", phi),
        }
    }

    pub fn load(&mut self, ty: Type, ptr: ValueId) -> ValueId {
        self.push(ty, InstKind::Load { ptr })
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId) -> ValueId {
        self.push(Type::Void, InstKind::Store { value, ptr })
    }

    pub fn element_ptr(&mut self, base: ValueId, indices: &[ValueId]) -> ValueId {
        self.push(
            Type::Ptr,
            InstKind::ElementPtr {
                base,
                indices: indices.to_vec(),
            },
        )
    }

    pub fn call(&mut self, callee: FuncId, args: &[ValueId]) -> ValueId {
        let function = self.module.function(callee);
        assert_eq!(
            function.params.len(),
            args.len(),
            "Call to '{}' has the wrong number of arguments",
            function.name
        );
        let ty = function.ret;
        self.push(
            ty,
            InstKind::Call {
                callee: Callee::Direct(callee),
                args: args.to_vec(),
            },
        )
    }

    pub fn call_indirect(&mut self, target: ValueId, ret: Type, args: &[ValueId]) -> ValueId {
        self.push(
            ret,
            InstKind::Call {
                callee: Callee::Indirect(target),
                args: args.to_vec(),
            },
        )
    }

    pub fn alloca(&mut self) -> ValueId {
        self.push(Type::Ptr, InstKind::Alloca)
    }

    pub fn ret(&mut self, value: Option<ValueId>) -> ValueId {
        self.push(Type::Void, InstKind::Ret { value })
    }

    pub fn br(&mut self, dest: BlockId) -> ValueId {
        self.push(Type::Void, InstKind::Br { dest })
    }

    pub fn cond_br(&mut self, cond: ValueId, on_true: BlockId, on_false: BlockId) -> ValueId {
        self.push(Type::Void, InstKind::CondBr { cond, on_true, on_false })
    }

    /// A switch over `cond`, with case values given as signed integers of the condition's width.
    pub fn switch(&mut self, cond: ValueId, default: BlockId, cases: &[(i64, BlockId)]) -> ValueId {
        let Some(width) = self.module.int_width(cond) else {
            panic!("Switch condition must be an integer");
        };
        let cases = cases
            .iter()
            .map(|&(value, dest)| (ApInt::from_i64(width, value), dest))
            .collect();
        self.push(Type::Void, InstKind::Switch { cond, default, cases })
    }

    pub fn unreachable(&mut self) -> ValueId {
        self.push(Type::Void, InstKind::Unreachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_diamond() {
        let mut module = Module::new();
        let f = module.add_function("max", &[Type::Int(8), Type::Int(8)], Type::Int(8), Linkage::Internal);
        let mut b = module.build(f);
        let entry = b.block("entry");
        let left = b.block("left");
        let right = b.block("right");
        let join = b.block("join");
        let (x, y) = (b.param(0), b.param(1));
        let cmp = b.icmp(IntPredicate::Sgt, x, y);
        b.cond_br(cmp, left, right);
        b.switch_to(left);
        b.br(join);
        b.switch_to(right);
        b.br(join);
        b.switch_to(join);
        let phi = b.phi(Type::Int(8), &[(left, x), (right, y)]);
        b.ret(Some(phi));

        assert_eq!(module.function(f).entry(), Some(entry));
        assert_eq!(module.successors(entry), vec![left, right]);
        assert_eq!(module.successors(join), vec![]);
        assert_eq!(module.ty(cmp), Type::Int(1));
        assert!(matches!(module.terminator(join), Some(InstKind::Ret { value: Some(_) })));
    }

    #[test]
    fn test_add_incoming() {
        let mut module = Module::new();
        let f = module.add_function("f", &[], Type::Void, Linkage::External);
        let mut b = module.build(f);
        let entry = b.block("entry");
        let zero = b.const_int(32, 0);
        let phi = b.phi(Type::Int(32), &[]);
        b.add_incoming(phi, entry, zero);
        b.ret(None);
        assert_eq!(
            module.inst(phi),
            Some(&InstKind::Phi {
                incoming: vec![(entry, zero)]
            })
        );
    }

    #[test]
    #[should_panic(expected = "already has a terminator")]
    fn test_double_terminator_panics() {
        let mut module = Module::new();
        let f = module.add_function("f", &[], Type::Void, Linkage::External);
        let mut b = module.build(f);
        b.block("entry");
        b.ret(None);
        b.ret(None);
    }
}
