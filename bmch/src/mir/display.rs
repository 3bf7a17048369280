//! Textual MIR printing
//!
//! The output is accepted by [`crate::parser::parse`].

use std::fmt;

use super::{
    BasicBlock, Callee, Constant, MirExternFn, MirFunction, MirInst, MirProgram, Operand,
    Terminator,
};

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{n}"),
            Constant::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Place(p) => write!(f, "%{}", p.name),
            Operand::Constant(c) => write!(f, "{c}"),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Operand]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for MirInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(dest), Some(ty)) = (self.dest(), self.dest_type()) {
            write!(f, "%{}: {} = ", dest.name, ty.name())?;
        }
        match self {
            MirInst::Const { value, .. } => write!(f, "const {value}"),
            MirInst::Copy { src, .. } => write!(f, "copy {src}"),
            MirInst::BinOp { op, lhs, rhs, .. } => write!(f, "{} {lhs}, {rhs}", op.mnemonic()),
            MirInst::UnaryOp { op, src, .. } => write!(f, "{} {src}", op.mnemonic()),
            MirInst::Phi { values, .. } => {
                write!(f, "phi ")?;
                for (i, (value, label)) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[{value}, {label}]")?;
                }
                Ok(())
            }
            MirInst::Call { callee, args, .. } => {
                match callee {
                    Callee::Direct(name) => write!(f, "call {name}(")?,
                    Callee::Indirect(target) => write!(f, "call *{target}(")?,
                }
                write_args(f, args)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Return(Some(value)) => write!(f, "ret {value}"),
            Terminator::Return(None) => write!(f, "ret"),
            Terminator::Goto(label) => write!(f, "goto {label}"),
            Terminator::Branch {
                cond,
                then_label,
                else_label,
            } => write!(f, "br {cond}, {then_label}, {else_label}"),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for inst in &self.instructions {
            writeln!(f, "  {inst};")?;
        }
        writeln!(f, "  {};", self.terminator)
    }
}

impl fmt::Display for MirFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, (name, ty)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "%{name}: {}", ty.name())?;
        }
        writeln!(f, ") -> {} {{", self.ret_ty.name())?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for MirExternFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "extern fn {}(", self.name)?;
        for (i, ty) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", ty.name())?;
        }
        write!(f, ") -> {};", self.ret_ty.name())
    }
}

impl fmt::Display for MirProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ext in &self.extern_fns {
            writeln!(f, "{ext}")?;
        }
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 || !self.extern_fns.is_empty() {
                writeln!(f)?;
            }
            write!(f, "{func}")?;
        }
        Ok(())
    }
}
