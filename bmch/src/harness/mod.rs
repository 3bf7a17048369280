//! Replay harness synthesis
//!
//! A counterexample fixes the values returned by every external call along
//! its path. The harness is a module that defines each such external
//! function as a stub handing back the recorded values in call order, so the
//! original procedure can be linked against it and re-executed outside the
//! verifier.
//!
//! For each callee the module holds:
//! - `@.harness.<callee>.values`: the observed values, in trace order
//! - `@.harness.<callee>.counter`: an `i32` cell starting at 0
//! - `@<callee>`: the stub, which bumps the counter and returns
//!   `get_value_<ty>(counter, values, len)`
//!
//! The `get_value_<ty>` providers are only declared; see [`emit`] for the
//! optional default definitions and [`replay`] for an in-process runtime.

mod emit;
mod replay;

use std::fmt;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{One, ToPrimitive};
use tracing::debug;

pub use emit::{EmitError, HarnessEmitter};
pub use replay::{ArrayProvider, HarnessRuntime, ValueProvider};

use crate::bmc::CexTrace;
use crate::diagnostics::Diagnostics;
use crate::mir::{MirProgram, MirType};
use crate::smt::LogicalValue;

/// Decides which callees are functions of the original program
///
/// Names containing a separator character belong to the toolchain
/// (`verifier.assume`, `llvm.memcpy`, ...) and are never stubbed. Only
/// callees declared without a body in the host module qualify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalFnFilter {
    separators: Vec<char>,
}

impl Default for OriginalFnFilter {
    fn default() -> Self {
        Self {
            separators: vec!['.'],
        }
    }
}

impl OriginalFnFilter {
    pub fn new(separators: impl IntoIterator<Item = char>) -> Self {
        Self {
            separators: separators.into_iter().collect(),
        }
    }

    pub fn separators(&self) -> &[char] {
        &self.separators
    }

    pub fn accepts(&self, program: &MirProgram, name: &str) -> bool {
        !name.contains(self.separators.as_slice()) && program.is_external(name)
    }
}

/// Integer constant of a fixed bit width
///
/// Values wrap to the width and read back as two's complement, except at
/// width 1 where they are 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntConstant {
    bits: u32,
    value: i64,
}

impl IntConstant {
    pub fn new(bits: u32, value: i64) -> Self {
        Self::from_raw(bits, value as u64)
    }

    pub fn zero(bits: u32) -> Self {
        Self { bits, value: 0 }
    }

    /// Wrap an arbitrary-precision integer to `bits`
    pub fn from_bigint(bits: u32, n: &BigInt) -> Self {
        let mask = (BigInt::one() << bits.min(64)) - BigInt::one();
        let masked = n & &mask;
        Self::from_raw(bits, masked.to_u64().unwrap_or_default())
    }

    fn from_raw(bits: u32, raw: u64) -> Self {
        let bits = bits.clamp(1, 64);
        let value = match bits {
            1 => (raw & 1) as i64,
            64 => raw as i64,
            _ => {
                let shift = 64 - bits;
                ((raw << shift) as i64) >> shift
            }
        };
        Self { bits, value }
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

impl fmt::Display for IntConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bits == 1 {
            write!(f, "{}", self.value != 0)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// Replay stub for one external callee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stub {
    /// The callee's own name
    pub name: String,
    pub params: Vec<MirType>,
    pub ret_ty: MirType,
    /// Recorded return values in call order
    pub values: Vec<IntConstant>,
    /// Name of the constant array global
    pub table: String,
    /// Name of the counter global
    pub counter: String,
    /// Value provider called by the stub
    pub provider: String,
}

/// Declaration of a `get_value_<ty>` provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDecl {
    pub name: String,
    pub ret_ty: MirType,
}

/// Description of a synthesized harness module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessModule {
    pub name: String,
    pub stubs: Vec<Stub>,
    /// One entry per distinct stub return type, in first-use order
    pub providers: Vec<ProviderDecl>,
}

impl HarnessModule {
    pub fn stub(&self, name: &str) -> Option<&Stub> {
        self.stubs.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }
}

/// Prefix of every value provider symbol
pub const PROVIDER_PREFIX: &str = "get_value_";

/// Name of the value provider for a return type
pub fn provider_name(ty: &MirType) -> String {
    format!("{PROVIDER_PREFIX}{}", ty.llvm_name())
}

/// Turn a model value into a constant of the callee's width
///
/// Unmodelled values become 0 with a warning naming `callee`.
pub fn value_to_constant(
    callee: &str,
    value: &LogicalValue,
    bits: u32,
    diag: &mut Diagnostics,
) -> IntConstant {
    match value {
        LogicalValue::True => IntConstant::new(bits, 1),
        LogicalValue::False => IntConstant::zero(bits),
        LogicalValue::Int(n) => IntConstant::from_bigint(bits, n),
        other => {
            diag.warn(format!("Not handled value for '{callee}': {other}"));
            IntConstant::zero(bits)
        }
    }
}

/// Builds a [`HarnessModule`] from a counterexample
pub struct HarnessSynthesizer<'p> {
    program: &'p MirProgram,
    filter: OriginalFnFilter,
}

impl<'p> HarnessSynthesizer<'p> {
    pub fn new(program: &'p MirProgram) -> Self {
        Self {
            program,
            filter: OriginalFnFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: OriginalFnFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Values returned by original external calls, grouped by callee in
    /// first-call order
    pub fn observe(&self, trace: &CexTrace<'_>) -> IndexMap<String, Vec<LogicalValue>> {
        let mut observed: IndexMap<String, Vec<LogicalValue>> = IndexMap::new();
        for step in 0..trace.len() {
            let Ok(block) = trace.block(step) else {
                continue;
            };
            for inst in block.calls() {
                // Indirect calls have no statically known target
                let Some(callee) = inst.called_function() else {
                    continue;
                };
                if !self.filter.accepts(self.program, callee) {
                    continue;
                }
                let Some(value) = trace.eval(step, inst) else {
                    continue;
                };
                observed.entry(callee.to_string()).or_default().push(value);
            }
        }
        observed
    }

    pub fn synthesize(&self, trace: &CexTrace<'_>, diag: &mut Diagnostics) -> HarnessModule {
        let mut stubs = Vec::new();
        let mut providers: Vec<ProviderDecl> = Vec::new();

        for (name, values) in self.observe(trace) {
            let Some(decl) = self.program.extern_fn(&name) else {
                continue;
            };
            // A stub would clash with the provider declarations
            if name.starts_with(PROVIDER_PREFIX) {
                diag.warn(format!("Skipping function with reserved provider name: {name}"));
                continue;
            }
            let Some(bits) = decl.ret_ty.int_bits() else {
                diag.warn(format!("Skipping non-integer function: {name}"));
                continue;
            };

            let provider = provider_name(&decl.ret_ty);
            if !providers.iter().any(|p| p.name == provider) {
                providers.push(ProviderDecl {
                    name: provider.clone(),
                    ret_ty: decl.ret_ty,
                });
            }
            let values = values
                .iter()
                .map(|v| value_to_constant(&name, v, bits, diag))
                .collect();
            stubs.push(Stub {
                table: format!(".harness.{name}.values"),
                counter: format!(".harness.{name}.counter"),
                name,
                params: decl.params.clone(),
                ret_ty: decl.ret_ty,
                values,
                provider,
            });
        }

        debug!(target: "cex", "harness: {} stubs for '{}'", stubs.len(), trace.function().name);
        HarnessModule {
            name: "harness".to_string(),
            stubs,
            providers,
        }
    }
}
