//! Compile-time error plumbing.
//!
//! Every phase has its own error enum with stable `E…` codes; this module
//! folds them into the one list a compile returns. Each entry carries the
//! file it came from (when known) and a byte span so hosts can render
//! uniform diagnostics.

use std::fmt;

use crate::analyzer::AnalyzeError;
use crate::emitter::EmitError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::token::Span;
use thiserror::Error;

/// One diagnostic from any phase.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CompileErrorKind {
    #[error("{0}")]
    Lex(#[from] LexError),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Analyze(#[from] AnalyzeError),
    #[error("{0}")]
    Emit(#[from] EmitError),
    #[error("error[E304]: import cycle through '{0}'")]
    CyclicImport(String),
    #[error("error[E309]: cannot read '{path}': {message}")]
    Io { path: String, message: String },
}

/// A diagnostic plus where it happened.
#[derive(Clone, Debug, PartialEq)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    /// Display path of the file, when the error is tied to one.
    pub file: Option<String>,
    pub span: Option<Span>,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.file, &self.span) {
            (Some(file), Some(span)) => {
                write!(f, "{}:{}..{}: {}", file, span.start, span.end, self.kind)
            }
            (Some(file), None) => write!(f, "{}: {}", file, self.kind),
            _ => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for CompileError {}

/// Everything a failed compile has to say.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Errors(pub Vec<CompileError>);

impl Errors {
    pub fn push(&mut self, error: CompileError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompileError> {
        self.0.iter()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}
