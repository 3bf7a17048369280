//! Solver abstraction and the per-run solver context

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::debug;

use super::expr::{Expr, ExprFactory, Sort, symbol};
use super::value::LogicalValue;

/// Result of a satisfiability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown(String),
}

impl fmt::Display for SatResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SatResult::Sat => write!(f, "sat"),
            SatResult::Unsat => write!(f, "unsat"),
            SatResult::Unknown(_) => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("solver not found: {0}")]
    NotFound(String),
    #[error("solver error: {0}")]
    Solver(String),
    #[error("failed to parse solver output: {0}")]
    Parse(String),
}

/// Incremental SMT-LIB2 solver backend
///
/// Terms cross this boundary already rendered, so backends stay independent
/// of the term factory.
pub trait Solver {
    fn declare(&mut self, name: &str, sort: Sort) -> Result<(), SolverError>;

    /// Assert a rendered term, optionally named for unsat-core extraction
    fn assert(&mut self, term: &str, name: Option<&str>) -> Result<(), SolverError>;

    fn check_sat(&mut self) -> Result<SatResult, SolverError>;

    /// Values of the given rendered terms in the current model, in order
    fn get_values(&mut self, terms: &[String]) -> Result<Vec<LogicalValue>, SolverError>;

    /// Names of the assertions in the last unsat core
    fn unsat_core(&mut self) -> Result<Vec<String>, SolverError>;

    fn reset(&mut self) -> Result<(), SolverError>;
}

/// Solver model restricted to the queried terms
#[derive(Debug, Clone, Default)]
pub struct Model {
    values: HashMap<Expr, LogicalValue>,
}

impl Model {
    pub fn get(&self, e: Expr) -> Option<&LogicalValue> {
        self.values.get(&e)
    }

    pub fn is_true(&self, e: Expr) -> bool {
        matches!(self.values.get(&e), Some(LogicalValue::True))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A solver backend bound to the term factory of one run
pub struct SolverContext<'a> {
    efac: &'a mut ExprFactory,
    backend: &'a mut dyn Solver,
    named: Vec<(String, Expr)>,
}

impl<'a> SolverContext<'a> {
    pub fn new(efac: &'a mut ExprFactory, backend: &'a mut dyn Solver) -> Self {
        Self {
            efac,
            backend,
            named: Vec::new(),
        }
    }

    pub fn efac(&self) -> &ExprFactory {
        &*self.efac
    }

    pub fn efac_mut(&mut self) -> &mut ExprFactory {
        &mut *self.efac
    }

    /// Pretty-print a term for diagnostics
    pub fn pretty(&self, e: Expr) -> String {
        self.efac.to_smtlib(e)
    }

    pub fn reset(&mut self) -> Result<(), SolverError> {
        self.named.clear();
        self.backend.reset()
    }

    pub fn declare(&mut self, name: &str, sort: Sort) -> Result<(), SolverError> {
        self.backend.declare(&symbol(name), sort)
    }

    /// Assert a term under the given name
    pub fn assert_named(&mut self, e: Expr, name: &str) -> Result<(), SolverError> {
        let term = self.efac.to_smtlib(e);
        self.backend.assert(&term, Some(name))?;
        self.named.push((name.to_string(), e));
        Ok(())
    }

    pub fn check(&mut self) -> Result<SatResult, SolverError> {
        let result = self.backend.check_sat()?;
        debug!(target: "bmc", "solver answered {result}");
        Ok(result)
    }

    /// Query the model for a set of terms
    pub fn model(&mut self, terms: &[Expr]) -> Result<Model, SolverError> {
        if terms.is_empty() {
            return Ok(Model::default());
        }
        let rendered: Vec<String> = terms.iter().map(|e| self.efac.to_smtlib(*e)).collect();
        let values = self.backend.get_values(&rendered)?;
        if values.len() != terms.len() {
            return Err(SolverError::Parse(format!(
                "expected {} values, got {}",
                terms.len(),
                values.len()
            )));
        }
        Ok(Model {
            values: terms.iter().copied().zip(values).collect(),
        })
    }

    /// Assertions of the last unsat core, mapped back to terms
    pub fn unsat_core(&mut self) -> Result<Vec<Expr>, SolverError> {
        let names = self.backend.unsat_core()?;
        Ok(names
            .iter()
            .filter_map(|n| self.named.iter().find(|(m, _)| m == n).map(|(_, e)| *e))
            .collect())
    }
}
