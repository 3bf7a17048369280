//! `bmch.toml` configuration
//!
//! ```toml
//! engine = "path"
//! entry = "main"
//!
//! [solver]
//! path = "z3"
//! timeout_secs = 30
//!
//! [harness]
//! separators = "."
//! default_providers = false
//! ```
//!
//! Every key is optional. Command-line flags override file values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bmc::EngineKind;
use crate::error::{BmchError, Result};
use crate::harness::OriginalFnFilter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BmcConfig {
    pub engine: EngineKind,
    /// Function to check
    pub entry: String,
    /// Ask the solver; when false only the encoding is produced
    pub solve: bool,
    /// Extract an unsat core after an unsat answer
    pub unsat_core: bool,
    /// Run the constant-branch analysis for the path engine
    pub abstract_interpretation: bool,
    pub solver: SolverConfig,
    pub harness: HarnessConfig,
}

impl Default for BmcConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            entry: "main".to_string(),
            solve: true,
            unsat_core: false,
            abstract_interpretation: true,
            solver: SolverConfig::default(),
            harness: HarnessConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub path: String,
    /// Passed to the solver process; unlimited when absent
    pub timeout_secs: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            path: "z3".to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Characters marking a callee as not part of the original program
    pub separators: String,
    /// Define the `get_value_<ty>` providers instead of declaring them
    pub default_providers: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            separators: ".".to_string(),
            default_providers: false,
        }
    }
}

impl HarnessConfig {
    pub fn filter(&self) -> OriginalFnFilter {
        OriginalFnFilter::new(self.separators.chars())
    }
}

impl BmcConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| BmchError::config_error(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            BmchError::io_error(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = BmcConfig::from_toml_str("").unwrap();
        assert_eq!(config, BmcConfig::default());
        assert_eq!(config.entry, "main");
        assert_eq!(config.solver.path, "z3");
        assert_eq!(config.harness.filter(), OriginalFnFilter::default());
    }

    #[test]
    fn test_partial_config() {
        let config = BmcConfig::from_toml_str(
            r#"
            engine = "path"
            unsat_core = true

            [solver]
            timeout_secs = 5

            [harness]
            separators = ".$"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine, EngineKind::Path);
        assert!(config.unsat_core);
        assert_eq!(config.solver.timeout_secs, Some(5));
        assert_eq!(config.solver.path, "z3");
        assert_eq!(config.harness.filter().separators(), &['.', '$']);
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let err = BmcConfig::from_toml_str("engin = \"mono\"").unwrap_err();
        assert!(matches!(err, BmchError::Config { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BmcConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, BmchError::Io { .. }));
    }
}
