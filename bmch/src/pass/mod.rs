//! The BMC pass: checks one function from its entry to its return
//!
//! The pass picks the entry checkpoint and the checkpoint of the first
//! returning block, hands the pair to the selected engine, and reports the
//! solver's answer as a single `sat` / `unsat` / `unknown` line. Functions
//! without such a pair are skipped with a warning. The pass never modifies the
//! program.

use std::io::Write;

use serde::Serialize;
use tracing::{debug, info};

use crate::bmc::{
    AbstractAnalysis, BmcEngine, CexTrace, ConstantBranchAnalysis, EngineKind, MonoBmc, PathBmc,
    RawTrace, TargetLibraryInfo,
};
use crate::config::BmcConfig;
use crate::cpg::{CheckpointGraph, CutPointGraph};
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::harness::{HarnessModule, HarnessSynthesizer, OriginalFnFilter};
use crate::mir::{BlockId, MirFunction, MirProgram};
use crate::smt::{ExprFactory, SatResult, Solver, SolverContext};
use crate::stats::Stats;
use crate::symexec::{MemModel, SymExec};

/// What happened to one function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BmcOutcome {
    Skipped,
    EncodedOnly,
    Sat,
    Unsat,
    Unknown,
}

/// Result of checking one function
#[derive(Debug, Clone, Serialize)]
pub struct BmcRun {
    pub function: String,
    pub engine: EngineKind,
    pub outcome: BmcOutcome,
    /// Blocks of the checkpoints handed to the engine
    pub checkpoints: Vec<BlockId>,
    /// Counterexample, after a sat answer
    pub trace: Option<RawTrace>,
    #[serde(skip)]
    pub harness: Option<HarnessModule>,
}

impl BmcRun {
    fn skipped(func: &MirFunction, engine: EngineKind) -> Self {
        Self {
            function: func.name.clone(),
            engine,
            outcome: BmcOutcome::Skipped,
            checkpoints: Vec::new(),
            trace: None,
            harness: None,
        }
    }
}

/// Output sinks of a pass run
pub struct PassContext<'a> {
    /// Receives the `sat` / `unsat` / `unknown` line
    pub out: &'a mut dyn Write,
    /// Receives the SMT-LIB2 encoding when present
    pub smt_out: Option<&'a mut dyn Write>,
    pub diag: &'a mut Diagnostics,
    pub stats: &'a mut Stats,
}

#[derive(Debug, Clone)]
pub struct BmcPass {
    engine: EngineKind,
    entry: String,
    solve: bool,
    unsat_core: bool,
    abstract_interpretation: bool,
    cex: bool,
    harness: Option<OriginalFnFilter>,
    tli: TargetLibraryInfo,
}

impl Default for BmcPass {
    fn default() -> Self {
        Self::from_config(&BmcConfig::default())
    }
}

impl BmcPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &BmcConfig) -> Self {
        Self {
            engine: config.engine,
            entry: config.entry.clone(),
            solve: config.solve,
            unsat_core: config.unsat_core,
            abstract_interpretation: config.abstract_interpretation,
            cex: false,
            harness: None,
            tli: TargetLibraryInfo::default(),
        }
    }

    pub fn with_engine(mut self, engine: EngineKind) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    /// When false the pass stops after encoding
    pub fn with_solve(mut self, solve: bool) -> Self {
        self.solve = solve;
        self
    }

    pub fn with_unsat_core(mut self, enabled: bool) -> Self {
        self.unsat_core = enabled;
        self
    }

    pub fn with_abstract_interpretation(mut self, enabled: bool) -> Self {
        self.abstract_interpretation = enabled;
        self
    }

    /// Keep the counterexample trace after a sat answer
    pub fn with_cex(mut self, enabled: bool) -> Self {
        self.cex = enabled;
        self
    }

    /// Synthesize a replay harness after a sat answer
    pub fn with_harness(mut self, filter: OriginalFnFilter) -> Self {
        self.harness = Some(filter);
        self
    }

    /// Check the entry function; `None` if the program has no such function
    pub fn run(
        &self,
        program: &MirProgram,
        solver: &mut dyn Solver,
        ctx: &mut PassContext<'_>,
    ) -> Result<Option<BmcRun>> {
        let Some(func) = program.function(&self.entry) else {
            ctx.diag
                .warn(format!("BmcPass: function '{}' not found", self.entry));
            return Ok(None);
        };
        self.run_on_function(program, func, solver, ctx).map(Some)
    }

    /// Pass entry point; the program is never changed
    pub fn run_on_module(
        &self,
        program: &MirProgram,
        solver: &mut dyn Solver,
        ctx: &mut PassContext<'_>,
    ) -> Result<bool> {
        self.run(program, solver, ctx)?;
        Ok(false)
    }

    pub fn run_on_function(
        &self,
        program: &MirProgram,
        func: &MirFunction,
        solver: &mut dyn Solver,
        ctx: &mut PassContext<'_>,
    ) -> Result<BmcRun> {
        self.check(program, func, solver, ctx)
    }

    fn check(
        &self,
        program: &MirProgram,
        func: &MirFunction,
        solver: &mut dyn Solver,
        ctx: &mut PassContext<'_>,
    ) -> Result<BmcRun> {
        let never_returns = |diag: &mut Diagnostics| {
            diag.warn(format!("BmcPass: function '{}' never returns", func.name));
            BmcRun::skipped(func, self.engine)
        };

        if func.blocks.is_empty() {
            return Ok(never_returns(ctx.diag));
        }
        let cpg = CutPointGraph::build(func);
        let src = cpg.entry_checkpoint();
        let Some(dst) = func
            .return_blocks()
            .find_map(|b| cpg.checkpoint_of(b))
        else {
            return Ok(never_returns(ctx.diag));
        };
        if !cpg.has_edge(src, dst) {
            return Ok(never_returns(ctx.diag));
        }

        let sem = SymExec::new(program, program.data_layout, MemModel::Pointers);
        let mut efac = ExprFactory::new();
        let zctx = SolverContext::new(&mut efac, solver);
        let analysis = (self.engine == EngineKind::Path && self.abstract_interpretation)
            .then(|| ConstantBranchAnalysis::run(func));
        let mut engine: Box<dyn BmcEngine + '_> = match self.engine {
            EngineKind::Mono => Box::new(MonoBmc::new(&sem, func, &cpg, zctx)),
            EngineKind::Path => Box::new(PathBmc::new(
                &sem,
                func,
                &cpg,
                zctx,
                &self.tli,
                analysis.as_ref().map(|a| a as &dyn AbstractAnalysis),
            )),
        };
        debug!(target: "bmc", "checking '{}' with the {} engine", func.name, self.engine);

        engine.add_checkpoint(src);
        engine.add_checkpoint(dst);
        let checkpoints = engine.checkpoints().iter().map(|cp| cp.block()).collect();
        let mut run = BmcRun {
            function: func.name.clone(),
            engine: engine.kind(),
            outcome: BmcOutcome::EncodedOnly,
            checkpoints,
            trace: None,
            harness: None,
        };

        engine.encode()?;
        if let Some(out) = ctx.smt_out.as_deref_mut() {
            engine.to_smtlib(out)?;
        }
        if !self.solve {
            return Ok(run);
        }

        ctx.stats.resume("BMC");
        let result = engine.solve();
        ctx.stats.stop("BMC");
        match result? {
            SatResult::Sat => {
                writeln!(ctx.out, "sat")?;
                ctx.stats.sset("Result", "FALSE");
                run.outcome = BmcOutcome::Sat;

                if !self.cex && self.harness.is_none() {
                    return Ok(run);
                }
                let raw = match engine.trace() {
                    Ok(raw) => raw,
                    Err(e) => {
                        ctx.diag.warn(format!(
                            "BmcPass: no counterexample for function '{}': {e}",
                            func.name
                        ));
                        return Ok(run);
                    }
                };
                let trace = CexTrace::new(func, raw);
                debug!(target: "cex", "counterexample for '{}':\n{trace}", func.name);
                if let Some(filter) = &self.harness {
                    let synth = HarnessSynthesizer::new(program).with_filter(filter.clone());
                    run.harness = Some(synth.synthesize(&trace, ctx.diag));
                }
                run.trace = Some(trace.raw().clone());
            }
            SatResult::Unsat => {
                writeln!(ctx.out, "unsat")?;
                ctx.stats.sset("Result", "TRUE");
                run.outcome = BmcOutcome::Unsat;

                if self.unsat_core {
                    let core = engine.unsat_core()?;
                    info!(target: "bmc", "CORE BEGIN");
                    for e in core {
                        info!(target: "bmc", "{}", engine.pretty(e));
                    }
                    info!(target: "bmc", "CORE END");
                }
            }
            SatResult::Unknown(reason) => {
                writeln!(ctx.out, "unknown")?;
                debug!(target: "bmc", "solver gave up on '{}': {reason}", func.name);
                run.outcome = BmcOutcome::Unknown;
            }
        }
        Ok(run)
    }
}
