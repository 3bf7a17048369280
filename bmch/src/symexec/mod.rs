//! Symbolic execution of MIR regions into SMT terms
//!
//! Integers are encoded in the `Int` theory, so overflow is not modelled;
//! values entering from outside the region (parameters, call results) are
//! range-constrained to their bit width instead. `bool` maps to `Bool`.
//! Pointers are integers under [`MemModel::Pointers`] and are left out of
//! the encoding under [`MemModel::Registers`].
//!
//! Two encodings are provided:
//! - [`SymExec::encode_edge`] encodes every path of a checkpoint-graph edge
//!   at once, with one `bb!<label>` Boolean per block;
//! - [`SymExec::encode_path`] encodes a single block sequence.

use std::collections::{HashMap, HashSet};
use std::io;

use num_bigint::BigInt;
use num_traits::One;
use thiserror::Error;
use tracing::debug;

use crate::cpg::CpEdge;
use crate::mir::{
    ASSUME_FN, ASSUME_NOT_FN, BlockId, Callee, Constant, DataLayout, MirBinOp, MirFunction,
    MirInst, MirProgram, MirType, MirUnaryOp, Operand, Terminator,
};
use crate::smt::{Expr, ExprFactory, Sort, symbol};

/// Memory model of the encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemModel {
    /// Only scalar registers are encoded
    Registers,
    /// Pointers are encoded as unsigned integers of the layout's width
    Pointers,
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("unsupported instruction in block '{block}': {reason}")]
    Unsupported { block: String, reason: String },
    #[error("place '%{0}' is defined more than once")]
    Redefinition(String),
    #[error("place '%{0}' is used before its definition")]
    UseBeforeDef(String),
    #[error("loop edge at block '{0}' cannot be encoded")]
    LoopEdge(String),
    #[error("block {0} does not exist")]
    MissingBlock(BlockId),
}

/// Logical encoding of a region or path
#[derive(Debug, Clone, Default)]
pub struct Encoding {
    pub decls: Vec<(String, Sort)>,
    pub assertions: Vec<Expr>,
    /// Blocks covered, in encoding order
    pub blocks: Vec<BlockId>,
    /// Reachability Boolean of each block (edge encodings only)
    pub block_vars: HashMap<BlockId, Expr>,
    /// Constant holding the value of each encoded place
    pub sites: HashMap<String, Expr>,
}

impl Encoding {
    /// Name of the `i`-th assertion, used for unsat cores
    pub fn assertion_name(i: usize) -> String {
        format!("a!{i}")
    }

    pub fn write_header(out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "(set-option :produce-models true)")?;
        writeln!(out, "(set-option :produce-unsat-cores true)")?;
        writeln!(out, "(set-logic QF_NIA)")
    }

    /// Declarations and named assertions
    pub fn write_body(&self, efac: &ExprFactory, out: &mut dyn io::Write) -> io::Result<()> {
        for (name, sort) in &self.decls {
            writeln!(out, "(declare-const {} {})", symbol(name), sort.smtlib())?;
        }
        for (i, a) in self.assertions.iter().enumerate() {
            writeln!(
                out,
                "(assert (! {} :named {}))",
                efac.to_smtlib(*a),
                Self::assertion_name(i)
            )?;
        }
        Ok(())
    }

    /// Complete SMT-LIB2 script ending in `(check-sat)`
    pub fn write_smtlib(&self, efac: &ExprFactory, out: &mut dyn io::Write) -> io::Result<()> {
        Self::write_header(out)?;
        self.write_body(efac, out)?;
        writeln!(out, "(check-sat)")
    }
}

/// Symbolic execution engine bound to a host module
pub struct SymExec<'a> {
    program: &'a MirProgram,
    layout: DataLayout,
    mem: MemModel,
}

impl<'a> SymExec<'a> {
    pub fn new(program: &'a MirProgram, layout: DataLayout, mem: MemModel) -> Self {
        Self {
            program,
            layout,
            mem,
        }
    }

    pub fn program(&self) -> &'a MirProgram {
        self.program
    }

    /// Encode all paths of a checkpoint-graph edge
    pub fn encode_edge(
        &self,
        efac: &mut ExprFactory,
        func: &MirFunction,
        edge: &CpEdge,
    ) -> Result<Encoding, EncodeError> {
        let src = edge.src.block();
        let dst = edge.dst.block();
        if edge.is_loop() {
            return Err(EncodeError::LoopEdge(label(func, src)));
        }
        let mut enc = Encoder::new(self, efac, func);
        enc.params();

        let region: HashSet<BlockId> = edge.blocks.iter().copied().collect();
        for &b in &edge.blocks {
            if func.block(b).is_none() {
                return Err(EncodeError::MissingBlock(b));
            }
            let name = format!("bb!{}", label(func, b));
            let var = enc.declare(&name, Sort::Bool);
            enc.out.block_vars.insert(b, var);
        }

        for &b in &edge.blocks {
            let bb = enc.out.block_vars[&b];
            let mut incoming: Vec<(BlockId, Expr)> = Vec::new();
            if b == src {
                enc.assert(bb);
            } else {
                for p in func.predecessors(b) {
                    if !region.contains(&p) || p == dst {
                        continue;
                    }
                    let cond = enc.edge_cond(p, b)?;
                    let bp = enc.out.block_vars[&p];
                    let taken = enc.efac.and(vec![bp, cond]);
                    incoming.push((p, taken));
                }
                let any = enc.efac.or(incoming.iter().map(|(_, t)| *t).collect());
                let reach = enc.efac.implies(bb, any);
                enc.assert(reach);
            }
            enc.block(b, bb, &PhiSource::Guarded(&incoming))?;
        }

        let bb_dst = enc.out.block_vars[&dst];
        enc.assert(bb_dst);
        enc.out.blocks = edge.blocks.clone();
        debug!(
            target: "bmc",
            "encoded edge {} -> {}: {} blocks, {} assertions",
            label(func, src),
            label(func, dst),
            edge.blocks.len(),
            enc.out.assertions.len()
        );
        Ok(enc.out)
    }

    /// Encode one block sequence; consecutive blocks must be CFG successors
    pub fn encode_path(
        &self,
        efac: &mut ExprFactory,
        func: &MirFunction,
        path: &[BlockId],
    ) -> Result<Encoding, EncodeError> {
        let mut enc = Encoder::new(self, efac, func);
        enc.params();
        let guard = enc.efac.mk_true();

        let mut prev: Option<BlockId> = None;
        for &b in path {
            if func.block(b).is_none() {
                return Err(EncodeError::MissingBlock(b));
            }
            if let Some(p) = prev {
                let cond = enc.edge_cond(p, b)?;
                enc.assert(cond);
            }
            enc.block(b, guard, &PhiSource::Predecessor(prev))?;
            prev = Some(b);
        }
        enc.out.blocks = path.to_vec();
        Ok(enc.out)
    }
}

fn label(func: &MirFunction, b: BlockId) -> String {
    func.block(b)
        .map(|bb| bb.label.clone())
        .unwrap_or_else(|| b.to_string())
}

/// How phi nodes pick their incoming value
enum PhiSource<'g> {
    /// Edge encoding: `(pred, edge taken)` for each in-region predecessor
    Guarded(&'g [(BlockId, Expr)]),
    /// Path encoding: the block executed just before
    Predecessor(Option<BlockId>),
}

struct Encoder<'s, 'e> {
    sem: &'s SymExec<'s>,
    efac: &'e mut ExprFactory,
    func: &'s MirFunction,
    out: Encoding,
    declared: HashSet<String>,
    defined: HashSet<String>,
    havocked: HashSet<String>,
}

impl<'s, 'e> Encoder<'s, 'e> {
    fn new(sem: &'s SymExec<'s>, efac: &'e mut ExprFactory, func: &'s MirFunction) -> Self {
        Self {
            sem,
            efac,
            func,
            out: Encoding::default(),
            declared: HashSet::new(),
            defined: HashSet::new(),
            havocked: HashSet::new(),
        }
    }

    fn sort_of(&self, ty: &MirType) -> Option<Sort> {
        match ty {
            MirType::Bool => Some(Sort::Bool),
            MirType::I8 | MirType::I16 | MirType::I32 | MirType::I64 => Some(Sort::Int),
            MirType::Ptr => match self.sem.mem {
                MemModel::Pointers => Some(Sort::Int),
                MemModel::Registers => None,
            },
            MirType::Unit => None,
        }
    }

    fn declare(&mut self, name: &str, sort: Sort) -> Expr {
        if self.declared.insert(name.to_string()) {
            self.out.decls.push((name.to_string(), sort));
        }
        self.efac.constant(name, sort)
    }

    fn assert(&mut self, e: Expr) {
        if e != self.efac.mk_true() {
            self.out.assertions.push(e);
        }
    }

    fn unsupported(&self, block: BlockId, reason: impl Into<String>) -> EncodeError {
        EncodeError::Unsupported {
            block: label(self.func, block),
            reason: reason.into(),
        }
    }

    /// Constrain a value entering the region to the range of its type
    fn range(&mut self, x: Expr, ty: &MirType) {
        let (lo, hi) = match (ty, ty.int_bits()) {
            (MirType::Bool, _) => return,
            (_, Some(bits)) => {
                let half = BigInt::one() << (bits - 1);
                (-half.clone(), half - BigInt::one())
            }
            (MirType::Ptr, None) => {
                let top = BigInt::one() << self.sem.layout.pointer_bits;
                (BigInt::from(0), top - BigInt::one())
            }
            _ => return,
        };
        let lo = self.efac.big(lo);
        let hi = self.efac.big(hi);
        let above = self.efac.le(lo, x);
        let below = self.efac.le(x, hi);
        let both = self.efac.and(vec![above, below]);
        self.assert(both);
    }

    fn params(&mut self) {
        for (name, ty) in &self.func.params {
            let Some(sort) = self.sort_of(ty) else {
                continue;
            };
            let x = self.declare(&format!("%{name}"), sort);
            self.range(x, ty);
            self.defined.insert(name.clone());
            self.out.sites.insert(name.clone(), x);
        }
    }

    /// Current value of an operand; `None` when it is not encoded
    fn operand(&mut self, op: &Operand) -> Option<Expr> {
        match op {
            Operand::Constant(Constant::Int(n)) => Some(self.efac.int(*n)),
            Operand::Constant(Constant::Bool(b)) => Some(self.efac.bool(*b)),
            Operand::Place(p) => {
                if let Some(e) = self.out.sites.get(&p.name) {
                    return Some(*e);
                }
                // Defined outside the encoded blocks: unconstrained
                let ty = self.func.place_type(&p.name)?;
                let sort = self.sort_of(ty)?;
                let x = self.declare(&format!("%{}", p.name), sort);
                self.havocked.insert(p.name.clone());
                self.out.sites.insert(p.name.clone(), x);
                Some(x)
            }
        }
    }

    fn operand_as(&mut self, op: &Operand, sort: Sort) -> Option<Expr> {
        let e = self.operand(op)?;
        Some(self.efac.coerce(e, sort))
    }

    /// Declare the constant of `dest`; `rhs = None` leaves it unconstrained
    fn define(&mut self, dest: &str, ty: &MirType, rhs: Option<Expr>) -> Result<(), EncodeError> {
        if self.havocked.contains(dest) {
            return Err(EncodeError::UseBeforeDef(dest.to_string()));
        }
        if !self.defined.insert(dest.to_string()) {
            return Err(EncodeError::Redefinition(dest.to_string()));
        }
        let Some(sort) = self.sort_of(ty) else {
            return Ok(());
        };
        let x = self.declare(&format!("%{dest}"), sort);
        self.out.sites.insert(dest.to_string(), x);
        if let Some(rhs) = rhs {
            let rhs = self.efac.coerce(rhs, sort);
            let def = self.efac.eq(x, rhs);
            self.assert(def);
        }
        Ok(())
    }

    /// Condition under which control flows from `p` to `b`
    fn edge_cond(&mut self, p: BlockId, b: BlockId) -> Result<Expr, EncodeError> {
        let Some(pred) = self.func.block(p) else {
            return Err(EncodeError::MissingBlock(p));
        };
        let target = label(self.func, b);
        match &pred.terminator {
            Terminator::Goto(l) if *l == target => Ok(self.efac.mk_true()),
            Terminator::Branch {
                cond,
                then_label,
                else_label,
            } => {
                let to_then = *then_label == target;
                let to_else = *else_label == target;
                if to_then && to_else {
                    return Ok(self.efac.mk_true());
                }
                if !to_then && !to_else {
                    return Ok(self.efac.mk_false());
                }
                let c = match self.operand_as(cond, Sort::Bool) {
                    Some(c) => c,
                    None => {
                        let name = format!("br!{}", pred.label);
                        self.declare(&name, Sort::Bool)
                    }
                };
                Ok(if to_then { c } else { self.efac.not(c) })
            }
            _ => Ok(self.efac.mk_false()),
        }
    }

    fn block(&mut self, b: BlockId, guard: Expr, phis: &PhiSource<'_>) -> Result<(), EncodeError> {
        let func = self.func;
        let Some(bb) = func.block(b) else {
            return Err(EncodeError::MissingBlock(b));
        };
        for inst in &bb.instructions {
            self.instruction(b, inst, guard, phis)?;
        }
        Ok(())
    }

    fn instruction(
        &mut self,
        b: BlockId,
        inst: &MirInst,
        guard: Expr,
        phis: &PhiSource<'_>,
    ) -> Result<(), EncodeError> {
        match inst {
            MirInst::Const { dest, ty, value } => {
                let v = self.operand(&Operand::Constant(value.clone()));
                self.define(&dest.name, ty, v)
            }
            MirInst::Copy { dest, ty, src } => {
                let v = self.operand(src);
                self.define(&dest.name, ty, v)
            }
            MirInst::BinOp {
                dest,
                ty,
                op,
                lhs,
                rhs,
            } => {
                let v = self.binop(b, *op, ty, lhs, rhs)?;
                self.define(&dest.name, ty, v)
            }
            MirInst::UnaryOp { dest, ty, op, src } => {
                let v = match (op, ty) {
                    (MirUnaryOp::Neg, t) if t.is_integer() && *t != MirType::Bool => self
                        .operand_as(src, Sort::Int)
                        .map(|x| self.efac.neg(x)),
                    (MirUnaryOp::Not, MirType::Bool) => self
                        .operand_as(src, Sort::Bool)
                        .map(|x| self.efac.not(x)),
                    _ => {
                        return Err(self.unsupported(
                            b,
                            format!("{} on {}", op.mnemonic(), ty.name()),
                        ));
                    }
                };
                self.define(&dest.name, ty, v)
            }
            MirInst::Phi { dest, ty, values } => self.phi(b, &dest.name, ty, values, phis),
            MirInst::Call {
                dest,
                ty,
                callee,
                args,
            } => {
                if let Callee::Direct(name) = callee
                    && (name == ASSUME_FN || name == ASSUME_NOT_FN)
                {
                    if let Some(c) = args.first().and_then(|a| self.operand_as(a, Sort::Bool)) {
                        let c = if name == ASSUME_NOT_FN {
                            self.efac.not(c)
                        } else {
                            c
                        };
                        let assume = self.efac.implies(guard, c);
                        self.assert(assume);
                    }
                    return Ok(());
                }
                let Some(dest) = dest else {
                    return Ok(());
                };
                self.define(&dest.name, ty, None)?;
                if let Some(x) = self.out.sites.get(&dest.name).copied() {
                    self.range(x, ty);
                }
                Ok(())
            }
        }
    }

    fn binop(
        &mut self,
        b: BlockId,
        op: MirBinOp,
        ty: &MirType,
        lhs: &Operand,
        rhs: &Operand,
    ) -> Result<Option<Expr>, EncodeError> {
        let logical = matches!(op, MirBinOp::And | MirBinOp::Or | MirBinOp::Xor);
        if logical && *ty != MirType::Bool {
            return Err(self.unsupported(b, format!("bitwise {} on {}", op.mnemonic(), ty.name())));
        }
        let (Some(l), Some(r)) = (self.operand(lhs), self.operand(rhs)) else {
            return Ok(None);
        };
        let f = &mut *self.efac;

        if logical {
            let l = f.coerce(l, Sort::Bool);
            let r = f.coerce(r, Sort::Bool);
            return Ok(Some(match op {
                MirBinOp::And => f.and(vec![l, r]),
                MirBinOp::Or => f.or(vec![l, r]),
                _ => f.xor(l, r),
            }));
        }

        if matches!(op, MirBinOp::Eq | MirBinOp::Ne) {
            let (l, r) = if f.sort(l) == Sort::Bool && f.sort(r) == Sort::Bool {
                (l, r)
            } else {
                (f.coerce(l, Sort::Int), f.coerce(r, Sort::Int))
            };
            let eq = f.eq(l, r);
            return Ok(Some(if op == MirBinOp::Eq { eq } else { f.not(eq) }));
        }

        let l = f.coerce(l, Sort::Int);
        let r = f.coerce(r, Sort::Int);
        Ok(Some(match op {
            MirBinOp::Add => f.add(l, r),
            MirBinOp::Sub => f.sub(l, r),
            MirBinOp::Mul => f.mul(l, r),
            MirBinOp::Div => f.div(l, r),
            MirBinOp::Rem => f.modulo(l, r),
            MirBinOp::Lt => f.lt(l, r),
            MirBinOp::Le => f.le(l, r),
            MirBinOp::Gt => f.gt(l, r),
            _ => f.ge(l, r),
        }))
    }

    fn phi(
        &mut self,
        b: BlockId,
        dest: &str,
        ty: &MirType,
        values: &[(Operand, String)],
        phis: &PhiSource<'_>,
    ) -> Result<(), EncodeError> {
        match phis {
            PhiSource::Predecessor(prev) => {
                let incoming = prev.and_then(|p| {
                    let pl = label(self.func, p);
                    values.iter().find(|(_, l)| *l == pl).map(|(v, _)| v)
                });
                let v = match incoming {
                    Some(op) => self.operand(op),
                    None => None,
                };
                self.define(dest, ty, v)
            }
            PhiSource::Guarded(incoming) => {
                self.define(dest, ty, None)?;
                let Some(x) = self.out.sites.get(dest).copied() else {
                    return Ok(());
                };
                let sort = self.efac.sort(x);
                for (op, l) in values {
                    let Some(p) = self.func.block_index(l) else {
                        return Err(self.unsupported(b, format!("phi from unknown block '{l}'")));
                    };
                    let Some((_, taken)) = incoming.iter().find(|(q, _)| *q == p) else {
                        continue;
                    };
                    let taken = *taken;
                    if let Some(v) = self.operand_as(op, sort) {
                        let eq = self.efac.eq(x, v);
                        let imp = self.efac.implies(taken, eq);
                        self.assert(imp);
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpg::{CheckpointGraph, CutPointGraph};
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn program(source: &str) -> MirProgram {
        let tokens = tokenize(source).unwrap();
        parse("test.mir", source, tokens).unwrap()
    }

    fn encode_main(source: &str) -> (ExprFactory, Encoding, MirProgram) {
        let prog = program(source);
        let func = prog.function("main").unwrap().clone();
        let cpg = CutPointGraph::build(&func);
        let dst = func
            .return_blocks()
            .find_map(|b| cpg.checkpoint_of(b))
            .unwrap();
        let edge = cpg.edge(cpg.entry_checkpoint(), dst).unwrap().clone();
        let mut efac = ExprFactory::new();
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let enc = sem.encode_edge(&mut efac, &func, &edge).unwrap();
        (efac, enc, prog)
    }

    fn script(efac: &ExprFactory, enc: &Encoding) -> String {
        let mut out = Vec::new();
        enc.write_smtlib(efac, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_straight_line_encoding() {
        let (efac, enc, _) = encode_main(
            "extern fn nd() -> i8;
             fn main() -> i32 {
             entry:
               %x: i8 = call nd();
               %y: i32 = add %x, 1;
               ret %y;
             }",
        );
        let text = script(&efac, &enc);
        assert!(text.contains("(declare-const bb!entry Bool)"));
        assert!(text.contains("(declare-const %x Int)"));
        assert!(text.contains("(and (<= (- 128) %x) (<= %x 127))"));
        assert!(text.contains("(= %y (+ %x 1))"));
        assert!(text.trim_end().ends_with("(check-sat)"));
        assert_eq!(enc.sites.len(), 2);
    }

    #[test]
    fn test_branch_and_phi_guards() {
        let (efac, enc, _) = encode_main(
            "fn main(%c: bool) -> i32 {
             entry: br %c, a, b;
             a: goto join;
             b: goto join;
             join: %r: i32 = phi [1, a], [2, b]; ret %r;
             }",
        );
        let text = script(&efac, &enc);
        assert!(text.contains("(=> bb!a (and bb!entry %c))"));
        assert!(text.contains("(=> bb!b (and bb!entry (not %c)))"));
        assert!(text.contains("(=> bb!join (or bb!a bb!b))"));
        assert!(text.contains("(=> bb!a (= %r 1))"));
        assert!(text.contains("(=> bb!b (= %r 2))"));
        assert_eq!(enc.block_vars.len(), 4);
    }

    #[test]
    fn test_assume_is_guarded() {
        let (efac, enc, _) = encode_main(
            "fn main(%n: i32) -> void {
             entry:
               %c: bool = gt %n, 10;
               call verifier.assume.not(%c);
               ret;
             }",
        );
        let text = script(&efac, &enc);
        assert!(text.contains("(=> bb!entry (not %c))"));
    }

    #[test]
    fn test_redefinition_is_error() {
        let prog = program(
            "fn main() -> i32 { entry: %x: i32 = const 1; %x: i32 = const 2; ret %x; }",
        );
        let func = prog.function("main").unwrap();
        let mut efac = ExprFactory::new();
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let err = sem.encode_path(&mut efac, func, &[0]).unwrap_err();
        assert!(matches!(err, EncodeError::Redefinition(name) if name == "x"));
    }

    #[test]
    fn test_bitwise_on_integers_unsupported() {
        let prog = program("fn main(%a: i32) -> i32 { entry: %x: i32 = and %a, 1; ret %x; }");
        let func = prog.function("main").unwrap();
        let mut efac = ExprFactory::new();
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let err = sem.encode_path(&mut efac, func, &[0]).unwrap_err();
        assert!(matches!(err, EncodeError::Unsupported { .. }));
    }

    #[test]
    fn test_path_encoding_follows_predecessor() {
        let prog = program(
            "fn main(%c: bool) -> i32 {
             entry: br %c, a, join;
             a: goto join;
             join: %r: i32 = phi [1, a], [2, entry]; ret %r;
             }",
        );
        let func = prog.function("main").unwrap();
        let mut efac = ExprFactory::new();
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let enc = sem.encode_path(&mut efac, func, &[0, 2]).unwrap();
        let mut out = Vec::new();
        enc.write_body(&efac, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("(not %c)"));
        assert!(text.contains("(= %r 2)"));
        assert!(enc.block_vars.is_empty());
    }

    #[test]
    fn test_registers_model_skips_pointers() {
        let prog = program(
            "extern fn alloc() -> ptr;
             fn main() -> void { entry: %p: ptr = call alloc(); ret; }",
        );
        let func = prog.function("main").unwrap();
        let mut efac = ExprFactory::new();
        let regs = SymExec::new(&prog, prog.data_layout, MemModel::Registers);
        let enc = regs.encode_path(&mut efac, func, &[0]).unwrap();
        assert!(enc.sites.is_empty());

        let ptrs = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let enc = ptrs.encode_path(&mut efac, func, &[0]).unwrap();
        assert!(enc.sites.contains_key("p"));
        let mut out = Vec::new();
        enc.write_body(&efac, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("(<= %p 18446744073709551615)"));
    }
}
