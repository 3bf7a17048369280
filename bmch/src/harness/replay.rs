//! In-process replay of a harness module
//!
//! Each runtime owns fresh counters, so the same module can be replayed any
//! number of times.

use std::collections::HashMap;

use super::{HarnessModule, IntConstant};

/// Implementation of the `get_value_<ty>` providers
pub trait ValueProvider {
    /// Value for call number `idx` of a stub whose recorded values are `values`
    fn get_value(&self, bits: u32, idx: u32, values: &[IntConstant]) -> IntConstant;
}

/// The default provider: the recorded value, or 0 once they run out
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayProvider;

impl ValueProvider for ArrayProvider {
    fn get_value(&self, bits: u32, idx: u32, values: &[IntConstant]) -> IntConstant {
        values
            .get(idx as usize)
            .copied()
            .unwrap_or(IntConstant::zero(bits))
    }
}

/// Executes stubs of a [`HarnessModule`]
pub struct HarnessRuntime<'m, P: ValueProvider> {
    module: &'m HarnessModule,
    provider: P,
    counters: HashMap<&'m str, u32>,
}

impl<'m, P: ValueProvider> HarnessRuntime<'m, P> {
    pub fn new(module: &'m HarnessModule, provider: P) -> Self {
        let counters = module
            .stubs
            .iter()
            .map(|s| (s.counter.as_str(), 0))
            .collect();
        Self {
            module,
            provider,
            counters,
        }
    }

    /// Call the stub `name`; `None` if the module has no such stub
    ///
    /// The counter advances on every call, also past the recorded values.
    pub fn call(&mut self, name: &str) -> Option<IntConstant> {
        let module = self.module;
        let stub = module.stub(name)?;
        let counter = self.counters.entry(stub.counter.as_str()).or_insert(0);
        let idx = *counter;
        *counter = counter.wrapping_add(1);
        let bits = stub.ret_ty.int_bits()?;
        Some(self.provider.get_value(bits, idx, &stub.values))
    }

    /// Current value of a stub's counter
    pub fn counter(&self, name: &str) -> Option<u32> {
        let stub = self.module.stub(name)?;
        self.counters.get(stub.counter.as_str()).copied()
    }
}
