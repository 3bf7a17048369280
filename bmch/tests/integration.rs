//! Integration tests for bmch
//!
//! Tests the full pipeline including:
//! - Loading programs and building checkpoint graphs
//! - The BMC pass with a scripted solver and with z3 (when installed)
//! - Harness synthesis, emission and replay
//! - The command-line interface

use std::collections::HashMap;
use std::process::Command;

use bmch::bmc::EngineKind;
use bmch::diagnostics::Diagnostics;
use bmch::harness::{ArrayProvider, HarnessEmitter, HarnessRuntime, OriginalFnFilter};
use bmch::mir::MirProgram;
use bmch::pass::{BmcOutcome, BmcPass, BmcRun, PassContext};
use bmch::smt::{LogicalValue, SatResult, Solver, SolverError, Sort, Z3Solver};
use bmch::stats::Stats;

/// Solver that answers every check the same way and reads model values from
/// a table; unlisted constants get a default of their sort
struct ScriptedSolver {
    answer: SatResult,
    model: HashMap<String, LogicalValue>,
    declared: Vec<(String, Sort)>,
    checks: usize,
}

impl ScriptedSolver {
    fn new(answer: SatResult) -> Self {
        Self {
            answer,
            model: HashMap::new(),
            declared: Vec::new(),
            checks: 0,
        }
    }

    fn with(mut self, name: &str, value: impl Into<LogicalValue>) -> Self {
        self.model.insert(name.to_string(), value.into());
        self
    }
}

impl Solver for ScriptedSolver {
    fn declare(&mut self, name: &str, sort: Sort) -> Result<(), SolverError> {
        self.declared.push((name.to_string(), sort));
        Ok(())
    }

    fn assert(&mut self, _term: &str, _name: Option<&str>) -> Result<(), SolverError> {
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, SolverError> {
        self.checks += 1;
        Ok(self.answer.clone())
    }

    fn get_values(&mut self, terms: &[String]) -> Result<Vec<LogicalValue>, SolverError> {
        Ok(terms
            .iter()
            .map(|t| match self.model.get(t) {
                Some(v) => v.clone(),
                None => match self.declared.iter().find(|(n, _)| n == t) {
                    Some((_, Sort::Bool)) => LogicalValue::False,
                    _ => LogicalValue::from(0),
                },
            })
            .collect())
    }

    fn unsat_core(&mut self) -> Result<Vec<String>, SolverError> {
        Ok(Vec::new())
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        self.declared.clear();
        Ok(())
    }
}

/// Helper to load a textual MIR program
fn program(source: &str) -> MirProgram {
    bmch::load_program("test.mir", source).expect("program should parse")
}

/// Helper to run the pass and collect its stdout, warnings and stats
fn run_pass(
    pass: &BmcPass,
    prog: &MirProgram,
    solver: &mut dyn Solver,
) -> (Option<BmcRun>, String, Diagnostics, Stats) {
    let mut out: Vec<u8> = Vec::new();
    let mut diag = Diagnostics::silent();
    let mut stats = Stats::new();
    let run = {
        let mut ctx = PassContext {
            out: &mut out,
            smt_out: None,
            diag: &mut diag,
            stats: &mut stats,
        };
        pass.run(prog, solver, &mut ctx).expect("pass should succeed")
    };
    (run, String::from_utf8(out).unwrap(), diag, stats)
}

fn z3_available() -> bool {
    if Z3Solver::is_available("z3") {
        true
    } else {
        eprintln!("z3 not found, skipping");
        false
    }
}

fn bmch() -> Command {
    Command::new(env!("CARGO_BIN_EXE_bmch"))
}

const THREE_CALLS: &str = "extern fn read_input() -> i32;
extern fn verifier.nondet() -> i32;
fn main() -> i32 {
entry:
  %a: i32 = call read_input();
  %n: i32 = call verifier.nondet();
  goto second;
second:
  %b: i32 = call read_input();
  %c: i32 = call read_input();
  %s: i32 = add %b, %c;
  ret %s;
}";

const PINNED: &str = "extern fn nd() -> i32;
fn main() -> i32 {
entry:
  %x: i32 = call nd();
  %is42: bool = eq %x, 42;
  call verifier.assume(%is42);
  %y: i32 = call nd();
  %lo: bool = lt %y, -3;
  call verifier.assume(%lo);
  %hi: bool = gt %y, -5;
  call verifier.assume(%hi);
  ret %y;
}";

const CONTRADICTION: &str = "extern fn nd() -> i32;
fn main() -> i32 {
entry:
  %x: i32 = call nd();
  %big: bool = gt %x, 10;
  call verifier.assume(%big);
  %mid: bool = gt %x, 5;
  call verifier.assume.not(%mid);
  ret %x;
}";

// ============================================
// Harness Pipeline Tests
// ============================================

#[test]
fn test_harness_replays_calls_in_trace_order() {
    let prog = program(THREE_CALLS);
    let mut solver = ScriptedSolver::new(SatResult::Sat)
        .with("bb!entry", true)
        .with("bb!second", true)
        .with("%a", 7)
        .with("%n", 1000)
        .with("%b", -2)
        .with("%c", 2147483647);
    let pass = BmcPass::new().with_harness(OriginalFnFilter::default());
    let (run, out, diag, stats) = run_pass(&pass, &prog, &mut solver);
    let run = run.unwrap();

    assert_eq!(out, "sat\n");
    assert_eq!(stats.get("Result"), Some("FALSE"));
    assert!(diag.is_empty());

    let module = run.harness.unwrap();
    assert_eq!(module.stubs.len(), 1);
    let stub = &module.stubs[0];
    assert_eq!(stub.name, "read_input");
    let recorded: Vec<i64> = stub.values.iter().map(|v| v.value()).collect();
    assert_eq!(recorded, vec![7, -2, 2147483647]);

    let mut rt = HarnessRuntime::new(&module, ArrayProvider);
    let replayed: Vec<i64> = (0..3)
        .filter_map(|_| rt.call("read_input"))
        .map(|v| v.value())
        .collect();
    assert_eq!(replayed, recorded);
    assert_eq!(rt.call("verifier.nondet"), None);

    let ir = HarnessEmitter::new().emit(&module).unwrap();
    assert!(ir.contains("@.harness.read_input.values = private constant [3 x i32] [i32 7, i32 -2, i32 2147483647]"));
    assert!(ir.contains("declare i32 @get_value_i32(i32, ptr, i32)"));
    assert!(ir.contains("define i32 @read_input() {"));
    assert!(!ir.contains("verifier.nondet"));
}

#[test]
fn test_unsat_records_true() {
    let prog = program(CONTRADICTION);
    for engine in [EngineKind::Mono, EngineKind::Path] {
        let mut solver = ScriptedSolver::new(SatResult::Unsat);
        let pass = BmcPass::new().with_engine(engine);
        let (run, out, _, stats) = run_pass(&pass, &prog, &mut solver);
        assert_eq!(run.unwrap().outcome, BmcOutcome::Unsat);
        assert_eq!(out, "unsat\n");
        assert_eq!(stats.get("Result"), Some("TRUE"));
        assert_eq!(solver.checks, 1);
    }
}

#[test]
fn test_never_returning_entry_is_skipped() {
    let prog = program(
        "extern fn abort() -> void;
         fn main() -> i32 {
         entry: call abort(); unreachable;
         }",
    );
    let mut solver = ScriptedSolver::new(SatResult::Sat);
    let (run, out, diag, stats) = run_pass(&BmcPass::new(), &prog, &mut solver);
    assert_eq!(run.unwrap().outcome, BmcOutcome::Skipped);
    assert!(out.is_empty());
    assert_eq!(stats.get("Result"), None);
    assert_eq!(solver.checks, 0);
    assert!(solver.declared.is_empty());
    assert_eq!(
        diag.warnings(),
        &["WARNING: BmcPass: function 'main' never returns"]
    );
}

// ============================================
// Solver Tests (z3)
// ============================================

#[test]
fn test_z3_sat_produces_replayable_harness() {
    if !z3_available() {
        return;
    }
    let prog = program(PINNED);
    for engine in [EngineKind::Mono, EngineKind::Path] {
        let mut solver = Z3Solver::new();
        let pass = BmcPass::new()
            .with_engine(engine)
            .with_harness(OriginalFnFilter::default());
        let (run, out, _, stats) = run_pass(&pass, &prog, &mut solver);
        let run = run.unwrap();
        assert_eq!(out, "sat\n");
        assert_eq!(stats.get("Result"), Some("FALSE"));

        let module = run.harness.unwrap();
        let mut rt = HarnessRuntime::new(&module, ArrayProvider);
        assert_eq!(rt.call("nd").map(|v| v.value()), Some(42));
        assert_eq!(rt.call("nd").map(|v| v.value()), Some(-4));
        assert_eq!(rt.call("nd").map(|v| v.value()), Some(0));
    }
}

#[test]
fn test_z3_contradiction_is_unsat() {
    if !z3_available() {
        return;
    }
    let prog = program(CONTRADICTION);
    for engine in [EngineKind::Mono, EngineKind::Path] {
        let mut solver = Z3Solver::new();
        let pass = BmcPass::new().with_engine(engine).with_unsat_core(true);
        let (run, out, _, stats) = run_pass(&pass, &prog, &mut solver);
        assert_eq!(run.unwrap().outcome, BmcOutcome::Unsat);
        assert_eq!(out, "unsat\n");
        assert_eq!(stats.get("Result"), Some("TRUE"));
    }
}

// ============================================
// CLI Tests
// ============================================

#[test]
fn test_cli_cpg() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.mir");
    std::fs::write(&path, THREE_CALLS).unwrap();

    let output = bmch().arg("cpg").arg(&path).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("fn main: checkpoints [entry, second]\n"));
    assert!(stdout.contains("  entry -> second: [entry, second]\n"));
}

#[test]
fn test_cli_encode_only_writes_smtlib() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.mir");
    let smt = dir.path().join("prog.smt2");
    std::fs::write(&path, PINNED).unwrap();

    let output = bmch()
        .args(["bmc", "--no-solve", "--z3", "no-such-z3-binary", "--smt-out"])
        .arg(&smt)
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    let text = std::fs::read_to_string(&smt).unwrap();
    assert!(text.contains("(set-logic QF_NIA)"));
    assert!(text.contains("(check-sat)"));
}

#[test]
fn test_cli_config_file_selects_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.mir");
    let config = dir.path().join("bmch.toml");
    let smt = dir.path().join("prog.smt2");
    std::fs::write(&path, THREE_CALLS).unwrap();
    std::fs::write(&config, "engine = \"path\"\nsolve = false\n").unwrap();

    let output = bmch()
        .arg("bmc")
        .arg("--config")
        .arg(&config)
        .arg("--smt-out")
        .arg(&smt)
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = std::fs::read_to_string(&smt).unwrap();
    assert!(text.contains("; path: entry -> second"));
}

#[test]
fn test_cli_parse_error_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.mir");
    std::fs::write(&path, "fn main() -> i32 { entry: ret }").unwrap();

    let output = bmch().arg("parse").arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_cli_parse_json_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let mir = dir.path().join("prog.mir");
    let json = dir.path().join("prog.json");
    std::fs::write(&mir, THREE_CALLS).unwrap();

    let output = bmch().arg("parse").arg(&mir).output().unwrap();
    assert!(output.status.success());
    std::fs::write(&json, &output.stdout).unwrap();

    let reparsed: MirProgram = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reparsed.functions.len(), 1);
    assert_eq!(reparsed.extern_fns.len(), 2);

    let output = bmch().arg("cpg").arg(&json).output().unwrap();
    assert!(output.status.success());
}
