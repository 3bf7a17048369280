//! LLVM IR text for harness modules
//!
//! The output links against the original program in place of its external
//! declarations. Providers are declared only, unless default definitions are
//! requested.

use std::fmt::Write;

use thiserror::Error;

use super::{HarnessModule, ProviderDecl, Stub};

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("Formatting error: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Renders a [`HarnessModule`] as a `.ll` file
#[derive(Debug, Clone, Default)]
pub struct HarnessEmitter {
    default_providers: bool,
}

impl HarnessEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also define `get_value_<ty>` as a bounds-checked array load
    pub fn with_default_providers(mut self, enabled: bool) -> Self {
        self.default_providers = enabled;
        self
    }

    pub fn emit(&self, module: &HarnessModule) -> Result<String, EmitError> {
        let mut out = String::new();
        writeln!(out, "; ModuleID = '{}'", module.name)?;
        writeln!(out, "source_filename = \"{}\"", module.name)?;

        if !module.stubs.is_empty() {
            writeln!(out)?;
        }
        for stub in &module.stubs {
            self.emit_globals(&mut out, stub)?;
        }

        if !module.providers.is_empty() {
            writeln!(out)?;
        }
        for provider in &module.providers {
            if self.default_providers {
                self.emit_provider(&mut out, provider)?;
            } else {
                let ty = provider.ret_ty.llvm_name();
                writeln!(out, "declare {ty} @{}(i32, ptr, i32)", provider.name)?;
            }
        }

        for stub in &module.stubs {
            writeln!(out)?;
            self.emit_stub(&mut out, stub)?;
        }
        Ok(out)
    }

    fn emit_globals(&self, out: &mut String, stub: &Stub) -> Result<(), EmitError> {
        let ty = stub.ret_ty.llvm_name();
        let elems: Vec<String> = stub.values.iter().map(|v| format!("{ty} {v}")).collect();
        writeln!(
            out,
            "@{} = private constant [{} x {ty}] [{}]",
            stub.table,
            stub.values.len(),
            elems.join(", ")
        )?;
        writeln!(out, "@{} = private global i32 0", stub.counter)?;
        Ok(())
    }

    fn emit_stub(&self, out: &mut String, stub: &Stub) -> Result<(), EmitError> {
        let ty = stub.ret_ty.llvm_name();
        let params: Vec<String> = stub
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} %a{i}", p.llvm_name()))
            .collect();

        writeln!(out, "define {ty} @{}({}) {{", stub.name, params.join(", "))?;
        writeln!(out, "entry:")?;
        writeln!(out, "  %cnt = load i32, ptr @{}", stub.counter)?;
        writeln!(out, "  %next = add i32 %cnt, 1")?;
        writeln!(out, "  store i32 %next, ptr @{}", stub.counter)?;
        writeln!(
            out,
            "  %val = call {ty} @{}(i32 %cnt, ptr @{}, i32 {})",
            stub.provider,
            stub.table,
            stub.values.len()
        )?;
        writeln!(out, "  ret {ty} %val")?;
        writeln!(out, "}}")?;
        Ok(())
    }

    fn emit_provider(&self, out: &mut String, provider: &ProviderDecl) -> Result<(), EmitError> {
        let ty = provider.ret_ty.llvm_name();
        writeln!(
            out,
            "define {ty} @{}(i32 %idx, ptr %arr, i32 %len) {{",
            provider.name
        )?;
        writeln!(out, "entry:")?;
        writeln!(out, "  %in = icmp ult i32 %idx, %len")?;
        writeln!(out, "  br i1 %in, label %load, label %out")?;
        writeln!(out, "load:")?;
        writeln!(out, "  %slot = getelementptr inbounds {ty}, ptr %arr, i32 %idx")?;
        writeln!(out, "  %v = load {ty}, ptr %slot")?;
        writeln!(out, "  ret {ty} %v")?;
        writeln!(out, "out:")?;
        writeln!(out, "  ret {ty} 0")?;
        writeln!(out, "}}")?;
        Ok(())
    }
}
