//! User-facing `WARNING:` diagnostics
//!
//! Warnings are recorded so callers and tests can inspect them, and echoed to
//! stderr unless the sink is silent.

/// Collected warnings of one run
#[derive(Debug, Clone)]
pub struct Diagnostics {
    warnings: Vec<String>,
    echo: bool,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// Record and print to stderr
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            echo: true,
        }
    }

    /// Record only
    pub fn silent() -> Self {
        Self {
            warnings: Vec::new(),
            echo: false,
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let line = format!("WARNING: {}", message.into());
        if self.echo {
            eprintln!("{line}");
        }
        self.warnings.push(line);
    }

    /// Full `WARNING:` lines in emission order
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}
