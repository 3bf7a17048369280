//! Error types and reporting

use crate::bmc::BmcError;
use crate::harness::EmitError;
use crate::smt::SolverError;
use crate::span::Span;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, BmchError>;

/// Top-level error for loading programs and running the BMC pipeline
#[derive(Debug, Error)]
pub enum BmchError {
    #[error("Lexer error at {span:?}: {message}")]
    Lexer { message: String, span: Span },

    #[error("Parser error at {span:?}: {message}")]
    Parser { message: String, span: Span },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Config error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Bmc(#[from] BmcError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl BmchError {
    pub fn lexer(message: impl Into<String>, span: Span) -> Self {
        Self::Lexer {
            message: message.into(),
            span,
        }
    }

    pub fn parser(message: impl Into<String>, span: Span) -> Self {
        Self::Parser {
            message: message.into(),
            span,
        }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Lexer { span, .. } | Self::Parser { span, .. } => Some(*span),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Lexer { message, .. }
            | Self::Parser { message, .. }
            | Self::Io { message }
            | Self::Config { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for BmchError {
    fn from(e: std::io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

/// Report error with ariadne
pub fn report_error(filename: &str, source: &str, error: &BmchError) {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let kind = match error {
        BmchError::Lexer { .. } => "Lexer",
        BmchError::Parser { .. } => "Parser",
        BmchError::Io { .. } => "IO",
        BmchError::Config { .. } => "Config",
        BmchError::Bmc(_) => "BMC",
        BmchError::Solver(_) => "Solver",
        BmchError::Emit(_) => "Emit",
    };

    let printed = if let Some(span) = error.span() {
        Report::build(ReportKind::Error, (filename, span.start..span.end))
            .with_message(format!("{kind} error"))
            .with_label(
                Label::new((filename, span.start..span.end))
                    .with_message(error.message())
                    .with_color(Color::Red),
            )
            .finish()
            .eprint((filename, Source::from(source)))
    } else {
        Report::build(ReportKind::Error, (filename, 0..0))
            .with_message(format!("{kind} error: {}", error.message()))
            .finish()
            .eprint((filename, Source::from(source)))
    };

    if printed.is_err() {
        eprintln!("{kind} error: {}", error.message());
    }
}
