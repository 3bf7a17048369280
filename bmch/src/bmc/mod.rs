//! Bounded model checking engines
//!
//! An engine is given two checkpoints, encodes every path between them with
//! [`SymExec`](crate::symexec::SymExec), and decides whether the destination
//! is reachable. [`MonoBmc`] encodes the whole region in one query;
//! [`PathBmc`] enumerates the region's paths and solves them one at a time.

mod absint;
mod mono;
mod path;
mod tli;
mod trace;

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::symexec::EncodeError;
pub use absint::{AbstractAnalysis, ConstantBranchAnalysis};
pub use mono::MonoBmc;
pub use path::PathBmc;
pub use tli::TargetLibraryInfo;
pub use trace::{CexTrace, RawTrace, TraceError};

use crate::cpg::Checkpoint;
use crate::mir::BlockId;
use crate::smt::{Expr, SatResult, SolverContext, SolverError};
use crate::symexec::Encoding;

/// Engine variant, selected once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Whole-region encoding, one solver query
    #[default]
    Mono,
    /// Path-by-path encoding
    Path,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Mono => write!(f, "mono"),
            EngineKind::Path => write!(f, "path"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BmcError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("expected 2 checkpoints, found {0}")]
    Checkpoints(usize),
    #[error("no checkpoint edge from block {src} to block {dst}")]
    NoEdge { src: BlockId, dst: BlockId },
    #[error("encode() must run before {0}()")]
    NotEncoded(&'static str),
    #[error("more than {0} paths between the checkpoints")]
    TooManyPaths(usize),
    #[error("failed to write encoding: {0}")]
    Io(#[from] io::Error),
}

/// Common interface of the BMC engines
pub trait BmcEngine {
    fn kind(&self) -> EngineKind;

    fn add_checkpoint(&mut self, cp: Checkpoint);

    fn checkpoints(&self) -> &[Checkpoint];

    fn encode(&mut self) -> Result<(), BmcError>;

    /// Write the encoding as an SMT-LIB2 script
    fn to_smtlib(&self, out: &mut dyn io::Write) -> Result<(), BmcError>;

    fn solve(&mut self) -> Result<SatResult, BmcError>;

    /// Assertions of an unsat core; empty unless the last answer was unsat
    fn unsat_core(&mut self) -> Result<Vec<Expr>, BmcError>;

    /// Raw counterexample; only valid after a sat answer
    fn trace(&mut self) -> Result<RawTrace, TraceError>;

    /// Render a term for diagnostics
    fn pretty(&self, e: Expr) -> String;
}

fn checkpoint_pair(cps: &[Checkpoint]) -> Result<(Checkpoint, Checkpoint), BmcError> {
    match cps {
        [src, dst] => Ok((*src, *dst)),
        other => Err(BmcError::Checkpoints(other.len())),
    }
}

/// Replace the solver state with one encoding
fn load(zctx: &mut SolverContext<'_>, enc: &Encoding) -> Result<(), SolverError> {
    zctx.reset()?;
    for (name, sort) in &enc.decls {
        zctx.declare(name, *sort)?;
    }
    for (i, a) in enc.assertions.iter().enumerate() {
        zctx.assert_named(*a, &Encoding::assertion_name(i))?;
    }
    Ok(())
}
