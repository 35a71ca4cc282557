//! Error types for the runtime.
//!
//! Errors fall into four families:
//! - [`SchemaError`]: raised while a schema is being built
//! - [`CompileError`]: raised while a request is compiled against a schema
//! - [`ResolverError`]: returned by resolvers, surfaced as [`FieldError`]s
//! - [`BroadcastError`]: raised by event channels

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shapeql_core::diagnostics::codes;
use shapeql_core::{Diagnostic, DiagnosticBag};
use shapeql_syntax::{OperationKind, SyntaxError};
use thiserror::Error;

/// Errors raised while building a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("type `{0}` is already defined")]
    DuplicateType(String),

    #[error("field `{field}` is already defined on `{type_name}`")]
    DuplicateField { type_name: String, field: String },

    #[error("`{referenced_by}` references undefined type `{type_name}`")]
    UnknownType {
        type_name: String,
        referenced_by: String,
    },

    #[error("`{referenced_by}` uses `{type_name}`, which is not an output type")]
    InvalidOutputType {
        type_name: String,
        referenced_by: String,
    },

    #[error("`{referenced_by}` uses `{type_name}`, which is not an input type")]
    InvalidInputType {
        type_name: String,
        referenced_by: String,
    },

    #[error("resolver for `{type_name}.{field}` expects a `{declared}` source")]
    ResolverSourceMismatch {
        type_name: String,
        field: String,
        declared: String,
    },

    #[error("root query type `{0}` is not defined")]
    MissingQueryType(String),

    #[error("subscription field `{0}` has no event source")]
    MissingEventSource(String),
}

/// A request that does not fit the schema.
///
/// Every variant carries the response path of the offending field, made of
/// output names (aliases where given).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("field `{field_name}` not found on type `{type_name}`")]
    FieldNotFound {
        path: Vec<String>,
        type_name: String,
        field_name: String,
    },

    #[error("unknown argument `{argument}`")]
    UnknownArgument { path: Vec<String>, argument: String },

    #[error("argument `{argument}` expects `{expected}`, found {found}")]
    ArgumentType {
        path: Vec<String>,
        argument: String,
        expected: String,
        found: String,
    },

    #[error("missing required argument `{argument}`")]
    MissingRequiredArgument { path: Vec<String>, argument: String },

    #[error("field `{field_name}` on `{type_name}` is a scalar and takes no selection")]
    UnexpectedSelection {
        path: Vec<String>,
        type_name: String,
        field_name: String,
    },

    #[error("field `{field_name}` on `{type_name}` needs a selection of subfields")]
    MissingSelection {
        path: Vec<String>,
        type_name: String,
        field_name: String,
    },

    #[error("unknown directive `@{directive}`")]
    UnknownDirective { path: Vec<String>, directive: String },

    #[error("`{response_name}` is requested twice with different fields or arguments")]
    ConflictingFields {
        path: Vec<String>,
        response_name: String,
    },

    #[error("schema does not support {operation} operations")]
    UnsupportedOperation { operation: OperationKind },

    #[error("invalid subscription: {reason}")]
    InvalidSubscription { path: Vec<String>, reason: String },
}

impl CompileError {
    /// Response path of the offending field. Empty for operation-level errors.
    pub fn path(&self) -> &[String] {
        match self {
            Self::FieldNotFound { path, .. }
            | Self::UnknownArgument { path, .. }
            | Self::ArgumentType { path, .. }
            | Self::MissingRequiredArgument { path, .. }
            | Self::UnexpectedSelection { path, .. }
            | Self::MissingSelection { path, .. }
            | Self::UnknownDirective { path, .. }
            | Self::ConflictingFields { path, .. }
            | Self::InvalidSubscription { path, .. } => path,
            Self::UnsupportedOperation { .. } => &[],
        }
    }

    /// Diagnostic code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::FieldNotFound { .. } => codes::FIELD_NOT_FOUND,
            Self::UnknownArgument { .. } => codes::UNKNOWN_ARGUMENT,
            Self::ArgumentType { .. } => codes::ARGUMENT_TYPE,
            Self::MissingRequiredArgument { .. } => codes::MISSING_REQUIRED_ARGUMENT,
            Self::UnexpectedSelection { .. } => codes::UNEXPECTED_SELECTION,
            Self::MissingSelection { .. } => codes::MISSING_SELECTION,
            Self::UnknownDirective { .. } => codes::UNKNOWN_DIRECTIVE,
            Self::ConflictingFields { .. } => codes::CONFLICTING_FIELDS,
            Self::UnsupportedOperation { .. } => codes::UNSUPPORTED_OPERATION,
            Self::InvalidSubscription { .. } => codes::INVALID_SUBSCRIPTION,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.code(), self.to_string()).with_path(self.path().to_vec())
    }

    /// Converts into a response error.
    pub fn to_field_error(&self) -> FieldError {
        let path = self
            .path()
            .iter()
            .cloned()
            .map(PathSegment::Field)
            .collect::<Vec<_>>();
        let error = FieldError::new(self.to_string()).with_code(self.code());
        if path.is_empty() {
            error
        } else {
            error.with_path(path)
        }
    }
}

/// A request that was rejected before any resolver ran.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("request failed validation with {} error(s)", .0.len())]
    Validation(Vec<CompileError>),

    #[error(transparent)]
    Subscription(#[from] BroadcastError),
}

impl RequestError {
    pub fn diagnostics(&self) -> DiagnosticBag {
        let mut bag = DiagnosticBag::new();
        match self {
            Self::Syntax(error) => bag.add(error.to_diagnostic()),
            Self::Validation(errors) => bag.extend(errors.iter().map(CompileError::to_diagnostic)),
            Self::Subscription(error) => {
                bag.add(Diagnostic::error(codes::INVALID_SUBSCRIPTION, error.to_string()));
            }
        }
        bag
    }

    /// The structured error list a transport reports in place of data.
    pub fn to_field_errors(&self) -> Vec<FieldError> {
        match self {
            Self::Syntax(error) => vec![FieldError::new(error.to_string()).with_code(codes::SYNTAX)],
            Self::Validation(errors) => errors.iter().map(CompileError::to_field_error).collect(),
            Self::Subscription(error) => {
                vec![FieldError::new(error.to_string()).with_code(codes::INVALID_SUBSCRIPTION)]
            }
        }
    }
}

impl From<Vec<CompileError>> for RequestError {
    fn from(errors: Vec<CompileError>) -> Self {
        Self::Validation(errors)
    }
}

/// Resolver errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("missing required argument: {0}")]
    MissingArgument(String),

    #[error("failed to parse argument '{0}': {1}")]
    ArgumentParse(String, String),

    #[error("{0}")]
    Custom(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ResolverError {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::FieldNotFound(_) => "FIELD_NOT_FOUND",
            Self::MissingArgument(_) | Self::ArgumentParse(..) => "BAD_ARGUMENT",
            Self::Custom(_) => "RESOLVER_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Event channel errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// The channel was failed or completed and accepts nothing further.
    #[error("event channel is terminated")]
    Terminated,

    /// The event source failed. Delivered once to every subscriber.
    #[error("event source failed: {0}")]
    Source(String),
}

/// A field error carried in a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// The error message.
    pub message: String,
    /// The path to the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// Error extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<IndexMap<String, serde_json::Value>>,
}

/// A path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl FieldError {
    /// Creates a new field error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    /// Adds a path to the error.
    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }

    /// Adds an extension.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value);
        self
    }

    /// Sets the error code extension.
    #[must_use]
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_extension("code", serde_json::Value::String(code.into()))
    }

    /// The `code` extension, if set.
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|extensions| extensions.get("code"))
            .and_then(serde_json::Value::as_str)
    }

    pub(crate) fn from_resolver(error: &ResolverError, path: Vec<PathSegment>) -> Self {
        Self::new(error.to_string())
            .with_path(path)
            .with_code(error.code())
    }
}
