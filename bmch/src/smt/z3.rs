//! z3 process backend speaking SMT-LIB2 over stdin/stdout

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tracing::trace;

use super::expr::Sort;
use super::sexp::{self, Sexp, paren_balance};
use super::solver::{SatResult, Solver, SolverError};
use super::value::LogicalValue;

const PREAMBLE: [&str; 2] = [
    "(set-option :produce-models true)",
    "(set-option :produce-unsat-cores true)",
];

/// z3 driven as an interactive subprocess (`z3 -in -smt2`)
///
/// The process is spawned on first use, so a solver that is never queried
/// never starts z3.
pub struct Z3Solver {
    command: String,
    timeout_ms: Option<u64>,
    process: Option<Z3Process>,
}

struct Z3Process {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Z3Solver {
    pub fn new() -> Self {
        Self::with_command("z3")
    }

    pub fn with_command(cmd: &str) -> Self {
        Self {
            command: cmd.to_string(),
            timeout_ms: None,
            process: None,
        }
    }

    /// Per-query timeout passed to z3 as `-t:<ms>`; zero disables it
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_ms = (timeout_secs > 0).then(|| timeout_secs.saturating_mul(1000));
        self
    }

    /// True if `cmd -version` runs successfully
    pub fn is_available(cmd: &str) -> bool {
        Command::new(cmd)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    fn process(&mut self) -> Result<&mut Z3Process, SolverError> {
        if self.process.is_none() {
            self.process = Some(self.spawn()?);
        }
        self.process
            .as_mut()
            .ok_or_else(|| SolverError::Solver("z3 process not running".into()))
    }

    fn spawn(&self) -> Result<Z3Process, SolverError> {
        let mut args = vec!["-in".to_string(), "-smt2".to_string()];
        if let Some(ms) = self.timeout_ms {
            args.push(format!("-t:{ms}"));
        }

        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SolverError::NotFound(format!("{}: {e}", self.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SolverError::Solver("failed to capture z3 stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SolverError::Solver("failed to capture z3 stdout".into()))?;

        let mut process = Z3Process {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };
        for option in PREAMBLE {
            process.send(option)?;
        }
        Ok(process)
    }

    fn send(&mut self, cmd: &str) -> Result<(), SolverError> {
        self.process()?.send(cmd)
    }

    fn query(&mut self, cmd: &str) -> Result<String, SolverError> {
        let process = self.process()?;
        process.send(cmd)?;
        let response = process.read_response()?;
        if response.starts_with("(error") {
            return Err(SolverError::Solver(response));
        }
        Ok(response)
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Z3Process {
    fn send(&mut self, cmd: &str) -> Result<(), SolverError> {
        trace!(target: "bmc", "z3 <- {cmd}");
        writeln!(self.stdin, "{cmd}")?;
        self.stdin.flush()?;
        Ok(())
    }

    /// Read one complete response: an atom line or a balanced s-expression
    fn read_response(&mut self) -> Result<String, SolverError> {
        let mut response = String::new();
        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err(SolverError::Solver(format!(
                    "z3 closed its output; partial response: {}",
                    response.trim()
                )));
            }
            if response.is_empty() && line.trim().is_empty() {
                continue;
            }
            response.push_str(&line);
            if paren_balance(&response) <= 0 {
                break;
            }
        }
        let response = response.trim().to_string();
        trace!(target: "bmc", "z3 -> {response}");
        Ok(response)
    }
}

impl Drop for Z3Process {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "(exit)");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

impl Solver for Z3Solver {
    fn declare(&mut self, name: &str, sort: Sort) -> Result<(), SolverError> {
        self.send(&format!("(declare-const {name} {})", sort.smtlib()))
    }

    fn assert(&mut self, term: &str, name: Option<&str>) -> Result<(), SolverError> {
        match name {
            Some(name) => self.send(&format!("(assert (! {term} :named {name}))")),
            None => self.send(&format!("(assert {term})")),
        }
    }

    fn check_sat(&mut self) -> Result<SatResult, SolverError> {
        let response = self.query("(check-sat)")?;
        Ok(parse_check_sat(&response))
    }

    fn get_values(&mut self, terms: &[String]) -> Result<Vec<LogicalValue>, SolverError> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let response = self.query(&format!("(get-value ({}))", terms.join(" ")))?;
        parse_get_value(&response)
    }

    fn unsat_core(&mut self) -> Result<Vec<String>, SolverError> {
        let response = self.query("(get-unsat-core)")?;
        let sexp = sexp::parse(&response)?;
        let items = sexp
            .as_list()
            .ok_or_else(|| SolverError::Parse(format!("unsat core is not a list: {response}")))?;
        Ok(items
            .iter()
            .filter_map(|s| s.as_atom().map(str::to_string))
            .collect())
    }

    fn reset(&mut self) -> Result<(), SolverError> {
        if self.process.is_none() {
            return Ok(());
        }
        self.send("(reset)")?;
        for option in PREAMBLE {
            self.send(option)?;
        }
        Ok(())
    }
}

/// Anything other than `sat` / `unsat` is reported as unknown
fn parse_check_sat(response: &str) -> SatResult {
    match response {
        "sat" => SatResult::Sat,
        "unsat" => SatResult::Unsat,
        "unknown" => SatResult::Unknown("z3 returned unknown".into()),
        other => SatResult::Unknown(format!("unrecognised solver answer: {other}")),
    }
}

/// `((t1 v1) (t2 v2) ...)` into `[v1, v2, ...]`
fn parse_get_value(response: &str) -> Result<Vec<LogicalValue>, SolverError> {
    let sexp = sexp::parse(response)?;
    let pairs = sexp
        .as_list()
        .ok_or_else(|| SolverError::Parse(format!("expected value list: {response}")))?;
    pairs
        .iter()
        .map(|pair| match pair {
            Sexp::List(items) if items.len() == 2 => Ok(LogicalValue::from_sexp(&items[1])),
            other => Err(SolverError::Parse(format!("malformed value pair: {other}"))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_sat() {
        assert_eq!(parse_check_sat("sat"), SatResult::Sat);
        assert_eq!(parse_check_sat("unsat"), SatResult::Unsat);
        assert!(matches!(parse_check_sat("unknown"), SatResult::Unknown(_)));
        assert!(matches!(parse_check_sat("timeout"), SatResult::Unknown(r) if r.contains("timeout")));
    }

    #[test]
    fn test_parse_get_value() {
        let values = parse_get_value("((%x (- 3)) (bb!entry true) (|%y z| 12))").unwrap();
        assert_eq!(
            values,
            vec![LogicalValue::from(-3), LogicalValue::True, LogicalValue::from(12)]
        );
    }

    #[test]
    fn test_parse_get_value_rejects_malformed() {
        assert!(parse_get_value("(x 1)").is_err());
        assert!(parse_get_value("sat").is_err());
    }

    #[test]
    fn test_unspawned_solver_resets_without_process() {
        let mut solver = Z3Solver::with_command("definitely-not-a-solver-binary");
        assert!(solver.reset().is_ok());
        assert!(matches!(solver.check_sat(), Err(SolverError::NotFound(_))));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        assert!(!Z3Solver::is_available("definitely-not-a-solver-binary"));
    }
}
