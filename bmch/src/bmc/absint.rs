//! Abstract interpretation results consumed by the path engine

use std::collections::{HashMap, HashSet};

use crate::mir::{
    BlockId, Constant, MirBinOp, MirFunction, MirInst, MirUnaryOp, Operand, Terminator,
};

/// Reachability facts proven by an abstract analysis
pub trait AbstractAnalysis {
    /// False only if `block` is proven unreachable from the entry
    fn is_reachable(&self, block: BlockId) -> bool;

    /// False only if control provably never flows from `from` to `to`
    fn is_feasible(&self, from: BlockId, to: BlockId) -> bool;
}

/// Constant propagation over SSA places plus branch reachability
#[derive(Debug, Clone, Default)]
pub struct ConstantBranchAnalysis {
    constants: HashMap<String, Constant>,
    reachable: HashSet<BlockId>,
    feasible: HashSet<(BlockId, BlockId)>,
}

impl ConstantBranchAnalysis {
    pub fn run(func: &MirFunction) -> Self {
        let constants = propagate_constants(func);
        let mut reachable = HashSet::new();
        let mut feasible = HashSet::new();

        let mut stack = Vec::new();
        if !func.blocks.is_empty() {
            stack.push(func.entry());
        }
        while let Some(b) = stack.pop() {
            if !reachable.insert(b) {
                continue;
            }
            let Some(block) = func.block(b) else {
                continue;
            };
            let targets: Vec<&str> = match &block.terminator {
                Terminator::Branch {
                    cond,
                    then_label,
                    else_label,
                } => match value(&constants, cond) {
                    Some(Constant::Bool(true)) => vec![then_label.as_str()],
                    Some(Constant::Bool(false)) => vec![else_label.as_str()],
                    _ => vec![then_label.as_str(), else_label.as_str()],
                },
                other => other.targets(),
            };
            for label in targets {
                if let Some(t) = func.block_index(label) {
                    feasible.insert((b, t));
                    stack.push(t);
                }
            }
        }

        Self {
            constants,
            reachable,
            feasible,
        }
    }

    /// Folded value of a place, if it is constant
    pub fn constant(&self, place: &str) -> Option<&Constant> {
        self.constants.get(place)
    }
}

impl AbstractAnalysis for ConstantBranchAnalysis {
    fn is_reachable(&self, block: BlockId) -> bool {
        self.reachable.contains(&block)
    }

    fn is_feasible(&self, from: BlockId, to: BlockId) -> bool {
        self.feasible.contains(&(from, to))
    }
}

fn value(constants: &HashMap<String, Constant>, op: &Operand) -> Option<Constant> {
    match op {
        Operand::Constant(c) => Some(c.clone()),
        Operand::Place(p) => constants.get(&p.name).cloned(),
    }
}

/// Iterate to a fixed point; SSA places never change once folded
fn propagate_constants(func: &MirFunction) -> HashMap<String, Constant> {
    let mut constants: HashMap<String, Constant> = HashMap::new();
    loop {
        let mut changed = false;
        for inst in func.blocks.iter().flat_map(|b| b.instructions.iter()) {
            let Some(dest) = inst.dest() else {
                continue;
            };
            if constants.contains_key(&dest.name) {
                continue;
            }
            let folded = match inst {
                MirInst::Const { value, .. } => Some(value.clone()),
                MirInst::Copy { src, .. } => value(&constants, src),
                MirInst::BinOp { op, lhs, rhs, .. } => {
                    match (value(&constants, lhs), value(&constants, rhs)) {
                        (Some(l), Some(r)) => fold_binop(*op, &l, &r),
                        _ => None,
                    }
                }
                MirInst::UnaryOp { op, src, .. } => {
                    value(&constants, src).and_then(|c| fold_unary(*op, &c))
                }
                MirInst::Phi { values, .. } => {
                    let incoming: Vec<Option<Constant>> =
                        values.iter().map(|(v, _)| value(&constants, v)).collect();
                    match incoming.first() {
                        Some(Some(first)) if incoming.iter().all(|v| v.as_ref() == Some(first)) => {
                            Some(first.clone())
                        }
                        _ => None,
                    }
                }
                MirInst::Call { .. } => None,
            };
            if let Some(c) = folded {
                constants.insert(dest.name.clone(), c);
                changed = true;
            }
        }
        if !changed {
            return constants;
        }
    }
}

fn fold_binop(op: MirBinOp, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
    match (op, lhs, rhs) {
        (MirBinOp::Add, Constant::Int(a), Constant::Int(b)) => a.checked_add(*b).map(Constant::Int),
        (MirBinOp::Sub, Constant::Int(a), Constant::Int(b)) => a.checked_sub(*b).map(Constant::Int),
        (MirBinOp::Mul, Constant::Int(a), Constant::Int(b)) => a.checked_mul(*b).map(Constant::Int),
        (MirBinOp::Div, Constant::Int(a), Constant::Int(b)) if *b != 0 => {
            a.checked_div_euclid(*b).map(Constant::Int)
        }
        (MirBinOp::Rem, Constant::Int(a), Constant::Int(b)) if *b != 0 => {
            a.checked_rem_euclid(*b).map(Constant::Int)
        }

        (MirBinOp::Eq, a, b) => Some(Constant::Bool(a == b)),
        (MirBinOp::Ne, a, b) => Some(Constant::Bool(a != b)),
        (MirBinOp::Lt, Constant::Int(a), Constant::Int(b)) => Some(Constant::Bool(a < b)),
        (MirBinOp::Le, Constant::Int(a), Constant::Int(b)) => Some(Constant::Bool(a <= b)),
        (MirBinOp::Gt, Constant::Int(a), Constant::Int(b)) => Some(Constant::Bool(a > b)),
        (MirBinOp::Ge, Constant::Int(a), Constant::Int(b)) => Some(Constant::Bool(a >= b)),

        (MirBinOp::And, Constant::Bool(a), Constant::Bool(b)) => Some(Constant::Bool(*a && *b)),
        (MirBinOp::Or, Constant::Bool(a), Constant::Bool(b)) => Some(Constant::Bool(*a || *b)),
        (MirBinOp::Xor, Constant::Bool(a), Constant::Bool(b)) => Some(Constant::Bool(a != b)),

        _ => None,
    }
}

fn fold_unary(op: MirUnaryOp, src: &Constant) -> Option<Constant> {
    match (op, src) {
        (MirUnaryOp::Neg, Constant::Int(a)) => a.checked_neg().map(Constant::Int),
        (MirUnaryOp::Not, Constant::Bool(b)) => Some(Constant::Bool(!b)),
        _ => None,
    }
}
