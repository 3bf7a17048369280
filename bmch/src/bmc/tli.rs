//! Target library information

use std::collections::BTreeSet;

/// Knowledge about standard library functions of the target
#[derive(Debug, Clone)]
pub struct TargetLibraryInfo {
    noreturn: BTreeSet<String>,
}

impl Default for TargetLibraryInfo {
    fn default() -> Self {
        let noreturn = [
            "abort",
            "exit",
            "_exit",
            "_Exit",
            "quick_exit",
            "__assert_fail",
            "longjmp",
            "pthread_exit",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        Self { noreturn }
    }
}

impl TargetLibraryInfo {
    pub fn with_noreturn(mut self, name: impl Into<String>) -> Self {
        self.noreturn.insert(name.into());
        self
    }

    /// A call to this function never returns to its caller
    pub fn is_noreturn(&self, name: &str) -> bool {
        self.noreturn.contains(name)
    }
}
