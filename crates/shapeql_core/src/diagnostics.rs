//! Diagnostic reporting for shapeql.
//!
//! Syntax and validation failures are converted into [`Diagnostic`]s so that a
//! transport can report every problem in a request with one uniform shape.

use crate::span::Span;

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    /// An error that prevents the request from executing.
    Error,
}

/// A label attached to a diagnostic.
#[derive(Debug, Clone)]
pub struct Label {
    /// The span this label points to.
    pub span: Span,
    /// The label message.
    pub message: String,
}

impl Label {
    /// Creates a new label.
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

/// A diagnostic message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level.
    pub severity: DiagnosticSeverity,
    /// Error code, one of [`codes`].
    pub code: &'static str,
    /// Short title.
    pub title: String,
    /// Response path the diagnostic applies to, if any.
    pub path: Vec<String>,
    /// Labels pointing to request text locations.
    pub labels: Vec<Label>,
}

impl Diagnostic {
    /// Creates a new error diagnostic.
    pub fn error(code: &'static str, title: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            code,
            title: title.into(),
            path: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Sets the response path.
    #[must_use]
    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = path;
        self
    }

    /// Adds a label at a span.
    #[must_use]
    pub fn with_span(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::new(span, message));
        self
    }

    /// Returns the primary span, if any.
    pub fn primary_span(&self) -> Option<Span> {
        self.labels.first().map(|l| l.span)
    }

    /// Renders a one-line message, resolving the primary span against `source`.
    pub fn render(&self, source: &str) -> String {
        let mut out = format!("[{}] {}", self.code, self.title);
        if !self.path.is_empty() {
            out.push_str(" at ");
            out.push_str(&self.path.join("."));
        }
        if let Some(label) = self.labels.first() {
            out.push_str(&format!(" ({}: {})", label.span.locate(source), label.message));
        }
        out
    }
}

/// A collection of diagnostics.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    /// Creates a new empty diagnostic bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a diagnostic.
    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Returns true if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Returns the number of errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Returns an iterator over all diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Returns an iterator over errors.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == DiagnosticSeverity::Error)
    }

    /// Returns true if there are no diagnostics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Returns the number of diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }
}

impl Extend<Diagnostic> for DiagnosticBag {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.diagnostics.extend(iter);
    }
}

impl IntoIterator for DiagnosticBag {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

/// Diagnostic codes.
pub mod codes {
    pub const SYNTAX: &str = "E0001";
    pub const FIELD_NOT_FOUND: &str = "E0010";
    pub const UNKNOWN_ARGUMENT: &str = "E0011";
    pub const UNKNOWN_DIRECTIVE: &str = "E0012";
    pub const CONFLICTING_FIELDS: &str = "E0013";
    pub const ARGUMENT_TYPE: &str = "E0020";
    pub const MISSING_REQUIRED_ARGUMENT: &str = "E0021";
    pub const UNEXPECTED_SELECTION: &str = "E0030";
    pub const MISSING_SELECTION: &str = "E0031";
    pub const UNSUPPORTED_OPERATION: &str = "E0040";
    pub const INVALID_SUBSCRIPTION: &str = "E0041";
}
