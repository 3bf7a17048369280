//! Path-based BMC: enumerate the paths of a checkpoint edge and solve each
//! one separately

use std::io;

use tracing::debug;

use super::{
    AbstractAnalysis, BmcEngine, BmcError, EngineKind, RawTrace, TargetLibraryInfo, TraceError,
    checkpoint_pair, load,
};
use crate::cpg::{Checkpoint, CheckpointGraph, CpEdge};
use crate::mir::{BlockId, MirFunction};
use crate::smt::{Expr, SatResult, SolverContext};
use crate::symexec::{Encoding, SymExec};

/// Default bound on the number of enumerated paths
pub const DEFAULT_MAX_PATHS: usize = 4096;

pub struct PathBmc<'a> {
    sem: &'a SymExec<'a>,
    func: &'a MirFunction,
    cpg: &'a dyn CheckpointGraph,
    zctx: SolverContext<'a>,
    tli: &'a TargetLibraryInfo,
    absint: Option<&'a dyn AbstractAnalysis>,
    max_paths: usize,
    cps: Vec<Checkpoint>,
    paths: Vec<Vec<BlockId>>,
    encodings: Vec<Encoding>,
    encoded: bool,
    result: Option<SatResult>,
    sat_path: Option<usize>,
}

impl<'a> PathBmc<'a> {
    pub fn new(
        sem: &'a SymExec<'a>,
        func: &'a MirFunction,
        cpg: &'a dyn CheckpointGraph,
        zctx: SolverContext<'a>,
        tli: &'a TargetLibraryInfo,
        absint: Option<&'a dyn AbstractAnalysis>,
    ) -> Self {
        Self {
            sem,
            func,
            cpg,
            zctx,
            tli,
            absint,
            max_paths: DEFAULT_MAX_PATHS,
            cps: Vec::new(),
            paths: Vec::new(),
            encodings: Vec::new(),
            encoded: false,
            result: None,
            sat_path: None,
        }
    }

    pub fn with_max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = max_paths;
        self
    }

    /// Paths that survived pruning, in enumeration order
    pub fn paths(&self) -> &[Vec<BlockId>] {
        &self.paths
    }

    /// Depth-first enumeration of the edge's block sequences from src to dst
    fn enumerate(&self, edge: &CpEdge) -> Result<Vec<Vec<BlockId>>, BmcError> {
        let src = edge.src.block();
        let dst = edge.dst.block();
        if src == dst {
            return Ok(vec![vec![src]]);
        }

        let mut paths = Vec::new();
        let mut stack: Vec<Vec<BlockId>> = vec![vec![src]];
        while let Some(path) = stack.pop() {
            let Some(&last) = path.last() else {
                continue;
            };
            if last == dst {
                paths.push(path);
                if paths.len() > self.max_paths {
                    return Err(BmcError::TooManyPaths(self.max_paths));
                }
                continue;
            }
            // Reverse so the first successor is explored first
            for s in self.func.successors(last).into_iter().rev() {
                if s != src && edge.blocks.contains(&s) {
                    let mut next = path.clone();
                    next.push(s);
                    stack.push(next);
                }
            }
        }
        Ok(paths)
    }

    /// Library functions only; a definition in the program may return
    fn calls_noreturn(&self, block: BlockId) -> bool {
        let program = self.sem.program();
        self.func.block(block).is_some_and(|bb| {
            bb.calls()
                .filter_map(|inst| inst.called_function())
                .any(|name| program.is_external(name) && self.tli.is_noreturn(name))
        })
    }

    fn is_pruned(&self, path: &[BlockId]) -> bool {
        // The destination returns, so a no-return call before it ends the path
        if path.iter().any(|b| self.calls_noreturn(*b)) {
            return true;
        }
        let Some(ai) = self.absint else {
            return false;
        };
        path.iter().any(|b| !ai.is_reachable(*b))
            || path.windows(2).any(|w| !ai.is_feasible(w[0], w[1]))
    }
}

impl BmcEngine for PathBmc<'_> {
    fn kind(&self) -> EngineKind {
        EngineKind::Path
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
        let all = self.enumerate(edge)?;
        let total = all.len();
        let paths: Vec<Vec<BlockId>> = all.into_iter().filter(|p| !self.is_pruned(p)).collect();
        debug!(
            target: "bmc",
            "path engine for '{}': {} paths, {} after pruning",
            self.func.name,
            total,
            paths.len()
        );

        let mut encodings = Vec::with_capacity(paths.len());
        for path in &paths {
            encodings.push(self.sem.encode_path(self.zctx.efac_mut(), self.func, path)?);
        }
        self.paths = paths;
        self.encodings = encodings;
        self.encoded = true;
        self.result = None;
        self.sat_path = None;
        Ok(())
    }

    /// One `push`/`pop` scope per path
    fn to_smtlib(&self, out: &mut dyn io::Write) -> Result<(), BmcError> {
        if !self.encoded {
            return Err(BmcError::NotEncoded("to_smtlib"));
        }
        Encoding::write_header(out)?;
        for (path, enc) in self.paths.iter().zip(&self.encodings) {
            let labels: Vec<&str> = path
                .iter()
                .filter_map(|b| self.func.block(*b).map(|bb| bb.label.as_str()))
                .collect();
            writeln!(out, "; path: {}", labels.join(" -> "))?;
            writeln!(out, "(push 1)")?;
            enc.write_body(self.zctx.efac(), out)?;
            writeln!(out, "(check-sat)")?;
            writeln!(out, "(pop 1)")?;
        }
        Ok(())
    }

    fn solve(&mut self) -> Result<SatResult, BmcError> {
        if !self.encoded {
            return Err(BmcError::NotEncoded("solve"));
        }
        let mut unknown: Option<String> = None;
        for (i, enc) in self.encodings.iter().enumerate() {
            load(&mut self.zctx, enc)?;
            match self.zctx.check()? {
                SatResult::Sat => {
                    debug!(target: "bmc", "path {i} of '{}' is feasible", self.func.name);
                    self.sat_path = Some(i);
                    self.result = Some(SatResult::Sat);
                    return Ok(SatResult::Sat);
                }
                SatResult::Unsat => {}
                SatResult::Unknown(reason) => {
                    unknown.get_or_insert(reason);
                }
            }
        }
        let result = match unknown {
            Some(reason) => SatResult::Unknown(reason),
            None => SatResult::Unsat,
        };
        self.result = Some(result.clone());
        Ok(result)
    }

    /// Core of the last path checked
    fn unsat_core(&mut self) -> Result<Vec<Expr>, BmcError> {
        if self.result != Some(SatResult::Unsat) || self.encodings.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.zctx.unsat_core()?)
    }

    fn trace(&mut self) -> Result<RawTrace, TraceError> {
        let Some(i) = self.sat_path else {
            return Err(TraceError::NoModel);
        };
        let (Some(path), Some(enc)) = (self.paths.get(i), self.encodings.get(i)) else {
            return Err(TraceError::NoModel);
        };
        let sites: Vec<(String, Expr)> = enc.sites.iter().map(|(n, e)| (n.clone(), *e)).collect();
        let terms: Vec<Expr> = sites.iter().map(|(_, e)| *e).collect();
        let model = self.zctx.model(&terms)?;
        let values = sites
            .into_iter()
            .filter_map(|(name, e)| model.get(e).map(|v| (name, v.clone())))
            .collect();
        Ok(RawTrace {
            blocks: path.clone(),
            values,
        })
    }

    fn pretty(&self, e: Expr) -> String {
        self.zctx.pretty(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmc::ConstantBranchAnalysis;
    use crate::cpg::CutPointGraph;
    use crate::lexer::tokenize;
    use crate::mir::MirProgram;
    use crate::parser::parse;
    use crate::smt::{ExprFactory, MockSolver};
    use crate::symexec::MemModel;

    fn program(source: &str) -> MirProgram {
        let tokens = tokenize(source).unwrap();
        parse("t.mir", source, tokens).unwrap()
    }

    const BRANCHY: &str = "extern fn abort() -> void;
        fn main(%c: bool) -> i32 {
        entry:
          %k: bool = const false;
          br %c, a, b;
        a: call abort(); goto join;
        b: br %k, c, join;
        c: goto join;
        join: ret 0;
        }";

    #[test]
    fn test_enumerates_and_prunes_paths() {
        let prog = program(BRANCHY);
        let func = prog.function("main").unwrap();
        let cpg = CutPointGraph::build(func);
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let tli = TargetLibraryInfo::default();
        let ai = ConstantBranchAnalysis::run(func);
        let mut efac = ExprFactory::new();
        let mut backend = MockSolver::new(SatResult::Unsat);
        let zctx = SolverContext::new(&mut efac, &mut backend);
        let mut bmc = PathBmc::new(&sem, func, &cpg, zctx, &tli, Some(&ai));
        bmc.add_checkpoint(cpg.entry_checkpoint());
        bmc.add_checkpoint(cpg.checkpoint_of(4).unwrap());
        bmc.encode().unwrap();
        // entry-a-join calls abort; entry-b-c-join is a constant-false branch
        assert_eq!(bmc.paths(), &[vec![0, 2, 4]]);
        assert_eq!(bmc.solve().unwrap(), SatResult::Unsat);
    }

    #[test]
    fn test_without_analysis_only_tli_prunes() {
        let prog = program(BRANCHY);
        let func = prog.function("main").unwrap();
        let cpg = CutPointGraph::build(func);
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let tli = TargetLibraryInfo::default();
        let mut efac = ExprFactory::new();
        let mut backend = MockSolver::new(SatResult::Unsat);
        let zctx = SolverContext::new(&mut efac, &mut backend);
        let mut bmc = PathBmc::new(&sem, func, &cpg, zctx, &tli, None);
        bmc.add_checkpoint(cpg.entry_checkpoint());
        bmc.add_checkpoint(cpg.checkpoint_of(4).unwrap());
        bmc.encode().unwrap();
        assert_eq!(bmc.paths(), &[vec![0, 2, 3, 4], vec![0, 2, 4]]);
    }

    #[test]
    fn test_first_sat_path_wins() {
        let prog = program(
            "fn main(%c: bool) -> i32 {
             entry: br %c, a, b;
             a: goto join;
             b: goto join;
             join: ret 0;
             }",
        );
        let func = prog.function("main").unwrap();
        let cpg = CutPointGraph::build(func);
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let tli = TargetLibraryInfo::default();
        let mut efac = ExprFactory::new();
        let mut backend = MockSolver::new(SatResult::Sat)
            .with_results(vec![SatResult::Unsat, SatResult::Sat]);
        {
            let zctx = SolverContext::new(&mut efac, &mut backend);
            let mut bmc = PathBmc::new(&sem, func, &cpg, zctx, &tli, None);
            bmc.add_checkpoint(cpg.entry_checkpoint());
            bmc.add_checkpoint(cpg.checkpoint_of(3).unwrap());
            bmc.encode().unwrap();
            assert_eq!(bmc.solve().unwrap(), SatResult::Sat);
            assert_eq!(bmc.trace().unwrap().blocks, vec![0, 2, 3]);
        }
        assert_eq!(backend.checks, 2);
    }

    #[test]
    fn test_unknown_path_makes_result_unknown() {
        let prog = program(
            "fn main(%c: bool) -> i32 {
             entry: br %c, a, join;
             a: goto join;
             join: ret 0;
             }",
        );
        let func = prog.function("main").unwrap();
        let cpg = CutPointGraph::build(func);
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let tli = TargetLibraryInfo::default();
        let mut efac = ExprFactory::new();
        let mut backend = MockSolver::new(SatResult::Unsat)
            .with_results(vec![SatResult::Unknown("timeout".into())]);
        let zctx = SolverContext::new(&mut efac, &mut backend);
        let mut bmc = PathBmc::new(&sem, func, &cpg, zctx, &tli, None);
        bmc.add_checkpoint(cpg.entry_checkpoint());
        bmc.add_checkpoint(cpg.checkpoint_of(2).unwrap());
        bmc.encode().unwrap();
        assert!(matches!(bmc.solve().unwrap(), SatResult::Unknown(r) if r == "timeout"));
    }

    #[test]
    fn test_too_many_paths() {
        let prog = program(
            "fn main(%c: bool) -> i32 {
             entry: br %c, a, b;
             a: goto join;
             b: goto join;
             join: ret 0;
             }",
        );
        let func = prog.function("main").unwrap();
        let cpg = CutPointGraph::build(func);
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let tli = TargetLibraryInfo::default();
        let mut efac = ExprFactory::new();
        let mut backend = MockSolver::new(SatResult::Unsat);
        let zctx = SolverContext::new(&mut efac, &mut backend);
        let mut bmc = PathBmc::new(&sem, func, &cpg, zctx, &tli, None).with_max_paths(1);
        bmc.add_checkpoint(cpg.entry_checkpoint());
        bmc.add_checkpoint(cpg.checkpoint_of(3).unwrap());
        assert!(matches!(bmc.encode(), Err(BmcError::TooManyPaths(1))));
    }

    #[test]
    fn test_smtlib_scopes_each_path() {
        let prog = program(
            "fn main(%c: bool) -> i32 {
             entry: br %c, a, join;
             a: goto join;
             join: ret 0;
             }",
        );
        let func = prog.function("main").unwrap();
        let cpg = CutPointGraph::build(func);
        let sem = SymExec::new(&prog, prog.data_layout, MemModel::Pointers);
        let tli = TargetLibraryInfo::default();
        let mut efac = ExprFactory::new();
        let mut backend = MockSolver::new(SatResult::Unsat);
        let zctx = SolverContext::new(&mut efac, &mut backend);
        let mut bmc = PathBmc::new(&sem, func, &cpg, zctx, &tli, None);
        bmc.add_checkpoint(cpg.entry_checkpoint());
        bmc.add_checkpoint(cpg.checkpoint_of(2).unwrap());
        let mut out = Vec::new();
        assert!(bmc.to_smtlib(&mut out).is_err());
        bmc.encode().unwrap();
        bmc.to_smtlib(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("(push 1)").count(), 2);
        assert!(text.contains("; path: entry -> a -> join"));
        assert!(text.contains("; path: entry -> join"));
    }
}
