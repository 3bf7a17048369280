//! Whole-region BMC: one query covering every path between two checkpoints

use std::io;

use tracing::debug;

use super::{BmcEngine, BmcError, EngineKind, RawTrace, TraceError, checkpoint_pair, load};
use crate::cpg::{Checkpoint, CheckpointGraph};
use crate::mir::MirFunction;
use crate::smt::{Expr, SatResult, SolverContext};
use crate::symexec::{Encoding, SymExec};

pub struct MonoBmc<'a> {
    sem: &'a SymExec<'a>,
    func: &'a MirFunction,
    cpg: &'a dyn CheckpointGraph,
    zctx: SolverContext<'a>,
    cps: Vec<Checkpoint>,
    encoding: Option<Encoding>,
    result: Option<SatResult>,
}

impl<'a> MonoBmc<'a> {
    pub fn new(
        sem: &'a SymExec<'a>,
        func: &'a MirFunction,
        cpg: &'a dyn CheckpointGraph,
        zctx: SolverContext<'a>,
    ) -> Self {
        Self {
            sem,
            func,
            cpg,
            zctx,
            cps: Vec::new(),
            encoding: None,
            result: None,
        }
    }
}

impl BmcEngine for MonoBmc<'_> {
    fn kind(&self) -> EngineKind {
        EngineKind::Mono
    }

    fn add_checkpoint(&mut self, cp: Checkpoint) {
        self.cps.push(cp);
    }

    fn checkpoints(&self) -> &[Checkpoint] {
        &self.cps
    }

    fn encode(&mut self) -> Result<(), BmcError> {
        let (src, dst) = checkpoint_pair(&self.cps)?;
        let edge = self.cpg.edge(src, dst).ok_or(BmcError::NoEdge {
            src: src.block(),
            dst: dst.block(),
        })?;
        let enc = self
            .sem
            .encode_edge(self.zctx.efac_mut(), self.func, edge)?;
        self.encoding = Some(enc);
        self.result = None;
        Ok(())
    }

    fn to_smtlib(&self, out: &mut dyn io::Write) -> Result<(), BmcError> {
        let enc = self
            .encoding
            .as_ref()
            .ok_or(BmcError::NotEncoded("to_smtlib"))?;
        enc.write_smtlib(self.zctx.efac(), out)?;
        Ok(())
    }

    fn solve(&mut self) -> Result<SatResult, BmcError> {
        let enc = self.encoding.as_ref().ok_or(BmcError::NotEncoded("solve"))?;
        load(&mut self.zctx, enc)?;
        let result = self.zctx.check()?;
        debug!(target: "bmc", "mono query for '{}': {result}", self.func.name);
        self.result = Some(result.clone());
        Ok(result)
    }

    fn unsat_core(&mut self) -> Result<Vec<Expr>, BmcError> {
        if self.result != Some(SatResult::Unsat) {
            return Ok(Vec::new());
        }
        Ok(self.zctx.unsat_core()?)
    }

    /// Follow the blocks whose reachability Boolean is true from the source
    fn trace(&mut self) -> Result<RawTrace, TraceError> {
        if self.result != Some(SatResult::Sat) {
            return Err(TraceError::NoModel);
        }
        let enc = self.encoding.as_ref().ok_or(TraceError::NoModel)?;
        let (Some(&src), Some(&dst)) = (enc.blocks.first(), enc.blocks.last()) else {
            return Err(TraceError::NoModel);
        };

        let sites: Vec<(String, Expr)> = enc.sites.iter().map(|(n, e)| (n.clone(), *e)).collect();
        let mut terms: Vec<Expr> = enc.blocks.iter().map(|b| enc.block_vars[b]).collect();
        terms.extend(sites.iter().map(|(_, e)| *e));
        let model = self.zctx.model(&terms)?;

        let mut blocks = vec![src];
        let mut cur = src;
        while cur != dst {
            if blocks.len() > enc.blocks.len() {
                return Err(TraceError::InconsistentModel(
                    "reachability Booleans form a cycle".into(),
                ));
            }
            let next = self.func.successors(cur).into_iter().find(|s| {
                enc.block_vars
                    .get(s)
                    .is_some_and(|v| *s != src && model.is_true(*v))
            });
            let Some(next) = next else {
                return Err(TraceError::InconsistentModel(format!(
                    "no reachable successor of block '{}'",
                    self.func.blocks[cur].label
                )));
            };
            blocks.push(next);
            cur = next;
        }

        let values = sites
            .into_iter()
            .filter_map(|(name, e)| model.get(e).map(|v| (name, v.clone())))
            .collect();
        Ok(RawTrace { blocks, values })
    }

    fn pretty(&self, e: Expr) -> String {
        self.zctx.pretty(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpg::CutPointGraph;
    use crate::lexer::tokenize;
    use crate::mir::MirProgram;
    use crate::parser::parse;
    use crate::smt::{ExprFactory, LogicalValue, MockSolver};
    use crate::symexec::MemModel;

    const DIAMOND: &str = "extern fn nd() -> i32;
        fn main(%c: bool) -> i32 {
        entry: br %c, a, b;
        a: %x: i32 = call nd(); goto join;
        b: goto join;
        join: ret 0;
        }";

    fn program() -> MirProgram {
        let tokens = tokenize(DIAMOND).unwrap();
        parse("t.mir", DIAMOND, tokens).unwrap()
    }

    #[test]
    fn test_encode_requires_two_checkpoints() {
        let prog = program();
        let func = prog.function("main").unwrap();
        let cpg = CutPointGraph::build(func);
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let mut efac = ExprFactory::new();
        let mut backend = MockSolver::new(SatResult::Sat);
        let zctx = SolverContext::new(&mut efac, &mut backend);
        let mut bmc = MonoBmc::new(&sem, func, &cpg, zctx);
        bmc.add_checkpoint(cpg.entry_checkpoint());
        assert!(matches!(bmc.encode(), Err(BmcError::Checkpoints(1))));
        assert!(matches!(bmc.solve(), Err(BmcError::NotEncoded("solve"))));
    }

    #[test]
    fn test_trace_follows_true_blocks() {
        let prog = program();
        let func = prog.function("main").unwrap();
        let cpg = CutPointGraph::build(func);
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let mut efac = ExprFactory::new();
        let mut backend = MockSolver::new(SatResult::Sat)
            .assign("bb!entry", true)
            .assign("bb!a", true)
            .assign("bb!join", true)
            .assign("%x", 9);
        let zctx = SolverContext::new(&mut efac, &mut backend);
        let mut bmc = MonoBmc::new(&sem, func, &cpg, zctx);
        bmc.add_checkpoint(cpg.entry_checkpoint());
        bmc.add_checkpoint(cpg.checkpoint_of(3).unwrap());
        bmc.encode().unwrap();
        assert_eq!(bmc.solve().unwrap(), SatResult::Sat);
        let raw = bmc.trace().unwrap();
        assert_eq!(raw.blocks, vec![0, 1, 3]);
        assert_eq!(raw.values.get("x"), Some(&LogicalValue::from(9)));
        assert!(bmc.unsat_core().unwrap().is_empty());
    }

    #[test]
    fn test_trace_without_sat_fails() {
        let prog = program();
        let func = prog.function("main").unwrap();
        let cpg = CutPointGraph::build(func);
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let mut efac = ExprFactory::new();
        let mut backend = MockSolver::new(SatResult::Unsat);
        let zctx = SolverContext::new(&mut efac, &mut backend);
        let mut bmc = MonoBmc::new(&sem, func, &cpg, zctx);
        bmc.add_checkpoint(cpg.entry_checkpoint());
        bmc.add_checkpoint(cpg.checkpoint_of(3).unwrap());
        bmc.encode().unwrap();
        assert_eq!(bmc.solve().unwrap(), SatResult::Unsat);
        assert!(matches!(bmc.trace(), Err(TraceError::NoModel)));
    }
}
