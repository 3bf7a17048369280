//! Middle Intermediate Representation (MIR)
//!
//! MIR is the CFG-based form of the procedures that the BMC pass analyses.
//! Control flow is explicit through basic blocks and terminators, and every
//! place is assigned at most once.
//!
//! Functions without a body are declared through [`MirExternFn`]; these are
//! the externally-linked functions whose observed return values a replay
//! harness substitutes.

mod display;

use serde::{Deserialize, Serialize};

/// Index of a basic block inside its function (`0` is the entry block)
pub type BlockId = usize;

/// Name of the path-constraining intrinsic: `verifier.assume(%c)`
pub const ASSUME_FN: &str = "verifier.assume";

/// Negated form: `verifier.assume.not(%c)` constrains paths to `!%c`
pub const ASSUME_NOT_FN: &str = "verifier.assume.not";

/// A MIR program: the host module of the analysed procedures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirProgram {
    pub functions: Vec<MirFunction>,
    /// External function declarations (no body in this module)
    #[serde(default)]
    pub extern_fns: Vec<MirExternFn>,
    #[serde(default)]
    pub data_layout: DataLayout,
}

impl MirProgram {
    /// Look up a function with a body
    pub fn function(&self, name: &str) -> Option<&MirFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Look up an external declaration
    pub fn extern_fn(&self, name: &str) -> Option<&MirExternFn> {
        self.extern_fns.iter().find(|f| f.name == name)
    }

    /// True if `name` is declared with external linkage and has no body here
    pub fn is_external(&self, name: &str) -> bool {
        self.extern_fn(name).is_some() && self.function(name).is_none()
    }
}

/// Target data layout descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLayout {
    pub pointer_bits: u32,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self { pointer_bits: 64 }
    }
}

/// External function declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirExternFn {
    pub name: String,
    pub params: Vec<MirType>,
    pub ret_ty: MirType,
}

/// A MIR function with explicit control flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirFunction {
    pub name: String,
    /// Function parameters with their types
    pub params: Vec<(String, MirType)>,
    pub ret_ty: MirType,
    /// Basic blocks (first block is entry)
    pub blocks: Vec<BasicBlock>,
}

impl MirFunction {
    pub fn entry(&self) -> BlockId {
        0
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id)
    }

    pub fn block_index(&self, label: &str) -> Option<BlockId> {
        self.blocks.iter().position(|b| b.label == label)
    }

    /// Successor blocks in terminator order, duplicates removed
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        let Some(block) = self.blocks.get(id) else {
            return Vec::new();
        };
        let mut succs: Vec<BlockId> = Vec::new();
        for label in block.terminator.targets() {
            if let Some(target) = self.block_index(label)
                && !succs.contains(&target)
            {
                succs.push(target);
            }
        }
        succs
    }

    pub fn predecessors(&self, id: BlockId) -> Vec<BlockId> {
        (0..self.blocks.len())
            .filter(|&b| self.successors(b).contains(&id))
            .collect()
    }

    /// Type of a parameter or of an instruction-defined place
    pub fn place_type(&self, name: &str) -> Option<&MirType> {
        if let Some((_, ty)) = self.params.iter().find(|(p, _)| p == name) {
            return Some(ty);
        }
        self.blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .find_map(|inst| match inst.dest() {
                Some(dest) if dest.name == name => inst.dest_type(),
                _ => None,
            })
    }

    /// Blocks whose terminator is a return
    pub fn return_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.terminator.is_return())
            .map(|(id, _)| id)
    }
}

/// A basic block containing instructions and a terminator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Block label (unique within function)
    pub label: String,
    pub instructions: Vec<MirInst>,
    pub terminator: Terminator,
}

impl BasicBlock {
    /// Call instructions in block order
    pub fn calls(&self) -> impl Iterator<Item = &MirInst> {
        self.instructions
            .iter()
            .filter(|inst| matches!(inst, MirInst::Call { .. }))
    }
}

/// MIR instruction (non-terminating)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MirInst {
    /// `%dest: ty = const value`
    Const {
        dest: Place,
        ty: MirType,
        value: Constant,
    },
    /// `%dest: ty = copy src`
    Copy {
        dest: Place,
        ty: MirType,
        src: Operand,
    },
    /// `%dest: ty = op lhs, rhs`
    BinOp {
        dest: Place,
        ty: MirType,
        op: MirBinOp,
        lhs: Operand,
        rhs: Operand,
    },
    /// `%dest: ty = op src`
    UnaryOp {
        dest: Place,
        ty: MirType,
        op: MirUnaryOp,
        src: Operand,
    },
    /// `%dest: ty = phi [value, label], ...`
    Phi {
        dest: Place,
        ty: MirType,
        values: Vec<(Operand, String)>,
    },
    /// `[%dest: ty =] call callee(args...)`
    ///
    /// `ty` is the result type at the call site (`void` when there is no dest).
    Call {
        dest: Option<Place>,
        ty: MirType,
        callee: Callee,
        args: Vec<Operand>,
    },
}

impl MirInst {
    pub fn dest(&self) -> Option<&Place> {
        match self {
            MirInst::Const { dest, .. }
            | MirInst::Copy { dest, .. }
            | MirInst::BinOp { dest, .. }
            | MirInst::UnaryOp { dest, .. }
            | MirInst::Phi { dest, .. } => Some(dest),
            MirInst::Call { dest, .. } => dest.as_ref(),
        }
    }

    pub fn dest_type(&self) -> Option<&MirType> {
        match self {
            MirInst::Const { ty, .. }
            | MirInst::Copy { ty, .. }
            | MirInst::BinOp { ty, .. }
            | MirInst::UnaryOp { ty, .. }
            | MirInst::Phi { ty, .. } => Some(ty),
            MirInst::Call { dest: Some(_), ty, .. } => Some(ty),
            MirInst::Call { dest: None, .. } => None,
        }
    }

    /// Statically known target of a call, if any
    pub fn called_function(&self) -> Option<&str> {
        match self {
            MirInst::Call {
                callee: Callee::Direct(name),
                ..
            } => Some(name),
            _ => None,
        }
    }
}

/// Call target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Callee {
    /// Statically resolved function name
    Direct(String),
    /// Call through a function pointer
    Indirect(Operand),
}

/// Block terminator (control flow)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    Return(Option<Operand>),
    Goto(String),
    Branch {
        cond: Operand,
        then_label: String,
        else_label: String,
    },
    Unreachable,
}

impl Terminator {
    pub fn is_return(&self) -> bool {
        matches!(self, Terminator::Return(_))
    }

    /// Labels this terminator may jump to
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Terminator::Goto(label) => vec![label.as_str()],
            Terminator::Branch {
                then_label,
                else_label,
                ..
            } => vec![then_label.as_str(), else_label.as_str()],
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        }
    }
}

/// An operand in MIR (either a place or constant)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Place(Place),
    Constant(Constant),
}

impl Operand {
    pub fn place(name: impl Into<String>) -> Self {
        Operand::Place(Place::new(name))
    }

    pub fn int(value: i64) -> Self {
        Operand::Constant(Constant::Int(value))
    }
}

/// A place represents a single-assignment value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
}

impl Place {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Constant value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constant {
    Int(i64),
    Bool(bool),
}

/// MIR binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
}

impl MirBinOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            MirBinOp::Add => "add",
            MirBinOp::Sub => "sub",
            MirBinOp::Mul => "mul",
            MirBinOp::Div => "div",
            MirBinOp::Rem => "rem",
            MirBinOp::Eq => "eq",
            MirBinOp::Ne => "ne",
            MirBinOp::Lt => "lt",
            MirBinOp::Le => "le",
            MirBinOp::Gt => "gt",
            MirBinOp::Ge => "ge",
            MirBinOp::And => "and",
            MirBinOp::Or => "or",
            MirBinOp::Xor => "xor",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Some(match s {
            "add" => MirBinOp::Add,
            "sub" => MirBinOp::Sub,
            "mul" => MirBinOp::Mul,
            "div" => MirBinOp::Div,
            "rem" => MirBinOp::Rem,
            "eq" => MirBinOp::Eq,
            "ne" => MirBinOp::Ne,
            "lt" => MirBinOp::Lt,
            "le" => MirBinOp::Le,
            "gt" => MirBinOp::Gt,
            "ge" => MirBinOp::Ge,
            "and" => MirBinOp::And,
            "or" => MirBinOp::Or,
            "xor" => MirBinOp::Xor,
            _ => return None,
        })
    }
}

/// MIR unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirUnaryOp {
    /// Integer negation
    Neg,
    /// Logical not
    Not,
}

impl MirUnaryOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            MirUnaryOp::Neg => "neg",
            MirUnaryOp::Not => "not",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        match s {
            "neg" => Some(MirUnaryOp::Neg),
            "not" => Some(MirUnaryOp::Not),
            _ => None,
        }
    }
}

/// MIR type system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MirType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Ptr,
    Unit,
}

impl MirType {
    pub fn from_name(s: &str) -> Option<Self> {
        Some(match s {
            "bool" | "i1" => MirType::Bool,
            "i8" => MirType::I8,
            "i16" => MirType::I16,
            "i32" => MirType::I32,
            "i64" => MirType::I64,
            "ptr" => MirType::Ptr,
            "void" => MirType::Unit,
            _ => return None,
        })
    }

    /// Name used in the textual MIR format
    pub fn name(&self) -> &'static str {
        match self {
            MirType::Bool => "bool",
            MirType::Unit => "void",
            other => other.llvm_name(),
        }
    }

    /// LLVM IR type name
    pub fn llvm_name(&self) -> &'static str {
        match self {
            MirType::Bool => "i1",
            MirType::I8 => "i8",
            MirType::I16 => "i16",
            MirType::I32 => "i32",
            MirType::I64 => "i64",
            MirType::Ptr => "ptr",
            MirType::Unit => "void",
        }
    }

    /// Integer-like scalars: the types a replay stub can return
    pub fn is_integer(&self) -> bool {
        self.int_bits().is_some()
    }

    /// Bit width of integer-like scalars
    pub fn int_bits(&self) -> Option<u32> {
        match self {
            MirType::Bool => Some(1),
            MirType::I8 => Some(8),
            MirType::I16 => Some(16),
            MirType::I32 => Some(32),
            MirType::I64 => Some(64),
            MirType::Ptr | MirType::Unit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> MirFunction {
        MirFunction {
            name: "f".to_string(),
            params: vec![("n".to_string(), MirType::I32)],
            ret_ty: MirType::I32,
            blocks: vec![
                BasicBlock {
                    label: "entry".to_string(),
                    instructions: vec![MirInst::BinOp {
                        dest: Place::new("c"),
                        ty: MirType::Bool,
                        op: MirBinOp::Lt,
                        lhs: Operand::place("n"),
                        rhs: Operand::int(0),
                    }],
                    terminator: Terminator::Branch {
                        cond: Operand::place("c"),
                        then_label: "neg".to_string(),
                        else_label: "exit".to_string(),
                    },
                },
                BasicBlock {
                    label: "neg".to_string(),
                    instructions: vec![],
                    terminator: Terminator::Goto("exit".to_string()),
                },
                BasicBlock {
                    label: "exit".to_string(),
                    instructions: vec![],
                    terminator: Terminator::Return(Some(Operand::place("n"))),
                },
            ],
        }
    }

    #[test]
    fn test_successors_and_predecessors() {
        let f = diamond();
        assert_eq!(f.successors(0), vec![1, 2]);
        assert_eq!(f.successors(1), vec![2]);
        assert!(f.successors(2).is_empty());
        assert_eq!(f.predecessors(2), vec![0, 1]);
    }

    #[test]
    fn test_place_type_from_params_and_defs() {
        let f = diamond();
        assert_eq!(f.place_type("n"), Some(&MirType::I32));
        assert_eq!(f.place_type("c"), Some(&MirType::Bool));
        assert_eq!(f.place_type("missing"), None);
    }

    #[test]
    fn test_return_blocks() {
        let f = diamond();
        assert_eq!(f.return_blocks().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_is_external_requires_no_body() {
        let program = MirProgram {
            functions: vec![diamond()],
            extern_fns: vec![
                MirExternFn {
                    name: "nd".to_string(),
                    params: vec![],
                    ret_ty: MirType::I32,
                },
                MirExternFn {
                    name: "f".to_string(),
                    params: vec![MirType::I32],
                    ret_ty: MirType::I32,
                },
            ],
            data_layout: DataLayout::default(),
        };
        assert!(program.is_external("nd"));
        assert!(!program.is_external("f"));
        assert!(!program.is_external("unknown"));
    }

    #[test]
    fn test_type_widths() {
        assert_eq!(MirType::Bool.int_bits(), Some(1));
        assert_eq!(MirType::I16.int_bits(), Some(16));
        assert_eq!(MirType::Ptr.int_bits(), None);
        assert!(!MirType::Unit.is_integer());
        assert_eq!(MirType::from_name("i1"), Some(MirType::Bool));
        assert_eq!(MirType::Bool.llvm_name(), "i1");
    }

    #[test]
    fn test_called_function() {
        let direct = MirInst::Call {
            dest: None,
            ty: MirType::Unit,
            callee: Callee::Direct("g".to_string()),
            args: vec![],
        };
        let indirect = MirInst::Call {
            dest: None,
            ty: MirType::Unit,
            callee: Callee::Indirect(Operand::place("fp")),
            args: vec![],
        };
        assert_eq!(direct.called_function(), Some("g"));
        assert_eq!(indirect.called_function(), None);
    }
}
