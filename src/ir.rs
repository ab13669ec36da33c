//! Program representation consumed by the analysis.
//!
//! A [`Module`] owns every value, block, function and global in flat arenas and hands
//! out copyable handles ([`ValueId`], [`BlockId`], [`FuncId`], [`GlobalId`]). Handles
//! are stable for the lifetime of the module, so analysis tables can be keyed by them
//! directly.
//!
//! Instructions are values: an instruction that produces a result is referred to by
//! its [`ValueId`], and so is one that does not (stores, branches), which keeps a
//! single namespace for findings such as "this access is out of bounds".
//!
//! Modules are built through [`Module::add_function`] and the [`FunctionBuilder`]
//! returned by [`Module::build`].

use std::fmt;

use crate::apint::ApInt;
use crate::predicate::IntPredicate;

pub use self::builder::FunctionBuilder;

mod builder;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FuncId(pub u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GlobalId(pub u32);

impl GlobalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Type {
    Int(u32),
    Ptr,
    Float,
    Void,
}

impl Type {
    /// Bit width of an integer type.
    pub fn int_width(self) -> Option<u32> {
        match self {
            Type::Int(width) => Some(width),
            _ => None,
        }
    }

    pub fn is_int(self) -> bool {
        matches!(self, Type::Int(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int(width) => write!(f, "i{}", width),
            Type::Ptr => write!(f, "ptr"),
            Type::Float => write!(f, "float"),
            Type::Void => write!(f, "void"),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl BinaryOp {
    pub fn is_integer(self) -> bool {
        use BinaryOp::*;
        !matches!(self, FAdd | FSub | FMul | FDiv | FRem)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{:?}", self).to_lowercase();
        write!(f, "{}", name)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    BitCast,
    PtrToInt,
    IntToPtr,
    FpToUi,
    FpToSi,
    UiToFp,
    SiToFp,
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{:?}", self).to_lowercase();
        write!(f, "{}", name)
    }
}

/// Target of a call.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Callee {
    Direct(FuncId),
    Indirect(ValueId),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum InstKind {
    Binary {
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Cast {
        op: CastOp,
        value: ValueId,
    },
    ICmp {
        pred: IntPredicate,
        lhs: ValueId,
        rhs: ValueId,
    },
    Select {
        cond: ValueId,
        on_true: ValueId,
        on_false: ValueId,
    },
    Phi {
        incoming: Vec<(BlockId, ValueId)>,
    },
    Load {
        ptr: ValueId,
    },
    Store {
        value: ValueId,
        ptr: ValueId,
    },
    /// Address of an element: `base` offset by `indices`, outermost first.
    ElementPtr {
        base: ValueId,
        indices: Vec<ValueId>,
    },
    Call {
        callee: Callee,
        args: Vec<ValueId>,
    },
    Alloca,
    Ret {
        value: Option<ValueId>,
    },
    Br {
        dest: BlockId,
    },
    CondBr {
        cond: ValueId,
        on_true: BlockId,
        on_false: BlockId,
    },
    Switch {
        cond: ValueId,
        default: BlockId,
        cases: Vec<(ApInt, BlockId)>,
    },
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Ret { .. }
                | InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Switch { .. }
                | InstKind::Unreachable
        )
    }

    /// Successor blocks, in operand order (duplicates kept).
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Br { dest } => vec![*dest],
            InstKind::CondBr { on_true, on_false, .. } => vec![*on_true, *on_false],
            InstKind::Switch { default, cases, .. } => {
                let mut succs = vec![*default];
                succs.extend(cases.iter().map(|&(_, dest)| dest));
                succs
            }
            _ => Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InstKind::Binary { .. } => "binary",
            InstKind::Cast { .. } => "cast",
            InstKind::ICmp { .. } => "icmp",
            InstKind::Select { .. } => "select",
            InstKind::Phi { .. } => "phi",
            InstKind::Load { .. } => "load",
            InstKind::Store { .. } => "store",
            InstKind::ElementPtr { .. } => "elementptr",
            InstKind::Call { .. } => "call",
            InstKind::Alloca => "alloca",
            InstKind::Ret { .. } => "ret",
            InstKind::Br { .. } => "br",
            InstKind::CondBr { .. } => "condbr",
            InstKind::Switch { .. } => "switch",
            InstKind::Unreachable => "unreachable",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    Const(ApInt),
    Argument { func: FuncId, index: usize },
    /// Address of a global variable.
    Global(GlobalId),
    Inst { block: BlockId, kind: InstKind },
}

#[derive(Debug, Clone)]
pub struct ValueData {
    pub ty: Type,
    pub kind: ValueKind,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BlockData {
    pub func: FuncId,
    pub name: String,
    pub insts: Vec<ValueId>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Linkage {
    /// Visible outside the module; callers are not all known.
    External,
    /// Only called from within the module.
    Internal,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<ValueId>,
    pub ret: Type,
    pub linkage: Linkage,
    /// Blocks in layout order; the first is the entry.
    pub blocks: Vec<BlockId>,
}

impl Function {
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum GlobalShape {
    Scalar,
    Array { len: u64 },
}

#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    /// Bit width of the scalar, or of each array element.
    pub width: u32,
    pub shape: GlobalShape,
    /// Constant initializer: one value for a scalar, one per element for an array.
    pub init: Option<Vec<ApInt>>,
    /// The global's address as a value.
    pub addr: ValueId,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    values: Vec<ValueData>,
    blocks: Vec<BlockData>,
    functions: Vec<Function>,
    globals: Vec<Global>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_value(&mut self, data: ValueData) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(data);
        id
    }

    pub(crate) fn push_block(&mut self, data: BlockData) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(data);
        id
    }

    pub(crate) fn block_mut(&mut self, block: BlockId) -> &mut BlockData {
        &mut self.blocks[block.index()]
    }

    pub(crate) fn function_mut(&mut self, func: FuncId) -> &mut Function {
        &mut self.functions[func.index()]
    }

    pub(crate) fn value_mut(&mut self, value: ValueId) -> &mut ValueData {
        &mut self.values[value.index()]
    }

    /// Declares a function. It stays a declaration until blocks are added to it.
    pub fn add_function(&mut self, name: impl Into<String>, params: &[Type], ret: Type, linkage: Linkage) -> FuncId {
        let func = FuncId(self.functions.len() as u32);
        let params = params
            .iter()
            .enumerate()
            .map(|(index, &ty)| {
                self.push_value(ValueData {
                    ty,
                    kind: ValueKind::Argument { func, index },
                    name: None,
                })
            })
            .collect();
        self.functions.push(Function {
            name: name.into(),
            params,
            ret,
            linkage,
            blocks: Vec::new(),
        });
        func
    }

    /// Starts building the body of `func`.
    pub fn build(&mut self, func: FuncId) -> FunctionBuilder<'_> {
        FunctionBuilder::new(self, func)
    }

    pub fn add_global(&mut self, name: impl Into<String>, width: u32, shape: GlobalShape, init: Option<Vec<ApInt>>) -> GlobalId {
        let name = name.into();
        if let Some(values) = &init {
            let expected = match shape {
                GlobalShape::Scalar => 1,
                GlobalShape::Array { len } => len as usize,
            };
            assert_eq!(values.len(), expected, "Initializer of '{}' has the wrong number of elements", name);
            assert!(
                values.iter().all(|v| v.width() == width),
                "Initializer of '{}' has the wrong bit width",
                name
            );
        }
        let global = GlobalId(self.globals.len() as u32);
        let addr = self.push_value(ValueData {
            ty: Type::Ptr,
            kind: ValueKind::Global(global),
            name: Some(name.clone()),
        });
        self.globals.push(Global {
            name,
            width,
            shape,
            init,
            addr,
        });
        global
    }

    /// An integer constant of the given width.
    pub fn const_int(&mut self, width: u32, value: i64) -> ValueId {
        self.const_apint(ApInt::from_i64(width, value))
    }

    pub fn const_apint(&mut self, value: ApInt) -> ValueId {
        self.push_value(ValueData {
            ty: Type::Int(value.width()),
            kind: ValueKind::Const(value),
            name: None,
        })
    }

    /// Attaches a name used in traces.
    pub fn set_name(&mut self, value: ValueId, name: impl Into<String>) {
        self.value_mut(value).name = Some(name.into());
    }
}

// Accessors.
impl Module {
    pub fn value(&self, value: ValueId) -> &ValueData {
        &self.values[value.index()]
    }

    pub fn ty(&self, value: ValueId) -> Type {
        self.value(value).ty
    }

    pub fn int_width(&self, value: ValueId) -> Option<u32> {
        self.ty(value).int_width()
    }

    pub fn block(&self, block: BlockId) -> &BlockData {
        &self.blocks[block.index()]
    }

    pub fn function(&self, func: FuncId) -> &Function {
        &self.functions[func.index()]
    }

    pub fn global(&self, global: GlobalId) -> &Global {
        &self.globals[global.index()]
    }

    pub fn functions(&self) -> impl Iterator<Item = FuncId> + '_ {
        (0..self.functions.len()).map(|i| FuncId(i as u32))
    }

    pub fn globals(&self) -> impl Iterator<Item = GlobalId> + '_ {
        (0..self.globals.len()).map(|i| GlobalId(i as u32))
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions().find(|&f| self.function(f).name == name)
    }

    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.globals().find(|&g| self.global(g).name == name)
    }

    /// The instruction behind `value`, if it is one.
    pub fn inst(&self, value: ValueId) -> Option<&InstKind> {
        match &self.value(value).kind {
            ValueKind::Inst { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn as_const(&self, value: ValueId) -> Option<&ApInt> {
        match &self.value(value).kind {
            ValueKind::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_global(&self, value: ValueId) -> Option<GlobalId> {
        match self.value(value).kind {
            ValueKind::Global(g) => Some(g),
            _ => None,
        }
    }

    pub fn terminator(&self, block: BlockId) -> Option<&InstKind> {
        let last = *self.block(block).insts.last()?;
        self.inst(last).filter(|kind| kind.is_terminator())
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block).map(InstKind::successors).unwrap_or_default()
    }

    /// Human-readable label of a value for traces: its name, or its handle.
    pub fn label(&self, value: ValueId) -> String {
        let data = self.value(value);
        match (&data.name, &data.kind) {
            (Some(name), _) => format!("%{}", name),
            (None, ValueKind::Const(c)) => format!("{} {}", data.ty, c),
            (None, _) => value.to_string(),
        }
    }

    pub fn block_label(&self, block: BlockId) -> String {
        format!("{}:{}", self.function(self.block(block).func).name, self.block(block).name)
    }
}
