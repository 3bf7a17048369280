//! Counterexample traces

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::mir::{BasicBlock, BlockId, MirFunction, MirInst};
use crate::smt::{LogicalValue, SolverError};

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("step {step} is out of range for a trace of length {len}")]
    StepOutOfRange { step: usize, len: usize },
    #[error("no counterexample: the last answer was not sat")]
    NoModel,
    #[error("inconsistent model: {0}")]
    InconsistentModel(String),
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Visited blocks and model values of the encoded places
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawTrace {
    pub blocks: Vec<BlockId>,
    pub values: HashMap<String, LogicalValue>,
}

/// Read-only view of a counterexample over its function
#[derive(Debug)]
pub struct CexTrace<'f> {
    func: &'f MirFunction,
    raw: RawTrace,
}

impl<'f> CexTrace<'f> {
    pub fn new(func: &'f MirFunction, raw: RawTrace) -> Self {
        Self { func, raw }
    }

    pub fn function(&self) -> &'f MirFunction {
        self.func
    }

    pub fn len(&self) -> usize {
        self.raw.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.blocks.is_empty()
    }

    pub fn block_id(&self, step: usize) -> Result<BlockId, TraceError> {
        self.raw
            .blocks
            .get(step)
            .copied()
            .ok_or(TraceError::StepOutOfRange {
                step,
                len: self.len(),
            })
    }

    pub fn block(&self, step: usize) -> Result<&'f BasicBlock, TraceError> {
        let id = self.block_id(step)?;
        self.func.block(id).ok_or_else(|| {
            TraceError::InconsistentModel(format!("block {id} is not in '{}'", self.func.name))
        })
    }

    /// Value of `inst` at `step`; `None` if the instruction is not in that
    /// block or its value is not part of the model
    pub fn eval(&self, step: usize, inst: &MirInst) -> Option<LogicalValue> {
        let block = self.block(step).ok()?;
        if !block.instructions.iter().any(|i| i == inst) {
            return None;
        }
        let dest = inst.dest()?;
        self.raw.values.get(&dest.name).cloned()
    }

    pub fn raw(&self) -> &RawTrace {
        &self.raw
    }
}

impl fmt::Display for CexTrace<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in 0..self.len() {
            let Ok(block) = self.block(step) else {
                continue;
            };
            writeln!(f, "[{step}] {}:", block.label)?;
            for inst in &block.instructions {
                if let (Some(dest), Some(value)) = (inst.dest(), self.eval(step, inst)) {
                    writeln!(f, "    %{} = {value}", dest.name)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn function() -> MirFunction {
        let source = "extern fn nd() -> i32;
            fn main() -> i32 {
            entry: %x: i32 = call nd(); goto next;
            next: %y: i32 = call nd(); ret %y;
            }";
        let tokens = tokenize(source).unwrap();
        parse("t.mir", source, tokens).unwrap().functions.remove(0)
    }

    fn raw() -> RawTrace {
        RawTrace {
            blocks: vec![0, 1],
            values: HashMap::from([
                ("x".to_string(), LogicalValue::from(3)),
                ("y".to_string(), LogicalValue::True),
            ]),
        }
    }

    #[test]
    fn test_block_out_of_range() {
        let f = function();
        let trace = CexTrace::new(&f, raw());
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.block(1).unwrap().label, "next");
        assert!(matches!(
            trace.block(2),
            Err(TraceError::StepOutOfRange { step: 2, len: 2 })
        ));
    }

    #[test]
    fn test_eval_is_pure_and_step_scoped() {
        let f = function();
        let trace = CexTrace::new(&f, raw());
        let x = &f.blocks[0].instructions[0];
        let first = trace.eval(0, x);
        assert_eq!(first, Some(LogicalValue::from(3)));
        assert_eq!(trace.eval(0, x), first);
        assert_eq!(trace.eval(1, x), None);
        assert_eq!(trace.eval(5, x), None);
    }

    #[test]
    fn test_display_lists_values() {
        let f = function();
        let trace = CexTrace::new(&f, raw());
        assert_eq!(
            trace.to_string(),
            "[0] entry:\n    %x = 3\n[1] next:\n    %y = true\n"
        );
    }
}
