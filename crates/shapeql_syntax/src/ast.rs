//! The requested-field tree produced by the parser.
//!
//! Every node owns its strings, so a parsed [`Operation`] outlives the request
//! text it came from and can be cached or moved across tasks.

use shapeql_core::Span;

/// One top-level query, mutation or subscription request.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<Name>,
    pub variables: Vec<VariableDefinition>,
    pub selection: Vec<RequestedField>,
    pub span: Span,
}

impl Operation {
    /// Counts every requested field in the tree, top-level included.
    #[must_use]
    pub fn field_count(&self) -> usize {
        fn count(fields: &[RequestedField]) -> usize {
            fields.iter().map(|f| 1 + count(&f.selection)).sum()
        }
        count(&self.selection)
    }
}

/// Type of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variable definition: `$id: Int = 3`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: Name,
    pub ty: TypeAnnotation,
    pub default_value: Option<Value>,
    pub span: Span,
}

/// Declared type of a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeAnnotation {
    /// `Int`
    Named(Name),
    /// `[Int]`
    List(Box<TypeAnnotation>, Span),
    /// `Int!`
    NonNull(Box<TypeAnnotation>, Span),
}

/// A field the caller asked for.
///
/// `selection` is empty for scalar leaves; the grammar never produces an
/// empty `{ }` block.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestedField {
    pub alias: Option<Name>,
    pub name: Name,
    pub arguments: Vec<Argument>,
    pub directives: Vec<Directive>,
    pub selection: Vec<RequestedField>,
    pub span: Span,
}

impl RequestedField {
    /// The key this field appears under in the response.
    #[must_use]
    pub fn response_name(&self) -> &str {
        self.alias.as_ref().unwrap_or(&self.name).value.as_str()
    }

    #[must_use]
    pub fn has_selection(&self) -> bool {
        !self.selection.is_empty()
    }

    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name.value == name)
    }
}

/// Directive usage: `@skip(if: $hide)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: Name,
    pub arguments: Vec<Argument>,
    pub span: Span,
}

/// Argument: `name: value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Name,
    pub value: Value,
    pub span: Span,
}

/// A literal or variable reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Variable(Name),
    Int(i64, Span),
    Float(f64, Span),
    String(String, Span),
    Boolean(bool, Span),
    Null(Span),
    Enum(Name),
    List(Vec<Value>, Span),
    Object(Vec<(Name, Value)>, Span),
}

impl Value {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Variable(name) | Self::Enum(name) => name.span,
            Self::Int(_, span)
            | Self::Float(_, span)
            | Self::String(_, span)
            | Self::Boolean(_, span)
            | Self::Null(span)
            | Self::List(_, span)
            | Self::Object(_, span) => *span,
        }
    }

    /// Short description of the literal's kind, for error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Variable(_) => "variable",
            Self::Int(..) => "Int",
            Self::Float(..) => "Float",
            Self::String(..) => "String",
            Self::Boolean(..) => "Boolean",
            Self::Null(_) => "null",
            Self::Enum(_) => "enum value",
            Self::List(..) => "list",
            Self::Object(..) => "object",
        }
    }
}

/// Name with span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub value: String,
    pub span: Span,
}

impl Name {
    pub fn new(value: impl Into<String>, span: Span) -> Self {
        Self {
            value: value.into(),
            span,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}
