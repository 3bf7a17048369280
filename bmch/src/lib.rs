//! bmch: bounded model checking with counterexample replay harnesses
//!
//! A program in textual MIR is parsed, the checkpoint graph of the entry
//! function is built, and the path from the entry to the return checkpoint is
//! encoded for an SMT solver. A satisfying model becomes a counterexample
//! trace, and from it a harness module that replays the external calls of
//! the trace.

pub mod bmc;
pub mod config;
pub mod cpg;
pub mod diagnostics;
pub mod error;
pub mod harness;
pub mod lexer;
pub mod mir;
pub mod parser;
pub mod pass;
pub mod smt;
pub mod span;
pub mod stats;
pub mod symexec;

pub use error::{BmchError, Result};
pub use span::Span;

use mir::MirProgram;

/// Tokenize and parse a textual MIR program
pub fn load_program(filename: &str, source: &str) -> Result<MirProgram> {
    let tokens = lexer::tokenize(source)?;
    parser::parse(filename, source, tokens)
}
