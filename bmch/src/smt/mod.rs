//! SMT terms, solver abstraction and the z3 backend
//!
//! Encodings are built as hash-consed terms in an [`ExprFactory`], rendered
//! to SMT-LIB2 text and handed to a [`Solver`] through a [`SolverContext`].

mod expr;
pub mod sexp;
mod solver;
mod value;
mod z3;

pub use expr::{Expr, ExprFactory, ExprNode, Op, Sort, symbol};
pub use solver::{Model, SatResult, Solver, SolverContext, SolverError};
pub use value::LogicalValue;
pub use z3::Z3Solver;

#[cfg(test)]
pub(crate) use solver::mock::MockSolver;
