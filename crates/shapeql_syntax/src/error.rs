//! Syntax errors.

use miette::{Diagnostic as MietteDiagnostic, SourceSpan};
use shapeql_core::{diagnostics::codes, Diagnostic, Span};
use thiserror::Error;

/// Malformed request text. Always a caller error; never worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
#[error("syntax error at byte {position}: expected {expected}, found {found}")]
#[diagnostic(code(shapeql::syntax))]
pub struct SyntaxError {
    /// Byte offset of the offending token.
    pub position: u32,
    /// What the parser was looking for.
    pub expected: String,
    /// What it found instead.
    pub found: String,
    #[label("here")]
    pub span: SourceSpan,
}

impl SyntaxError {
    pub fn new(span: Span, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            position: span.start,
            expected: expected.into(),
            found: found.into(),
            span: span.into(),
        }
    }

    /// Converts into a core diagnostic.
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        let span = Span::new(
            self.position,
            self.position + u32::try_from(self.span.len()).unwrap_or(0),
        );
        Diagnostic::error(
            codes::SYNTAX,
            format!("expected {}, found {}", self.expected, self.found),
        )
        .with_span(span, "here")
    }
}
