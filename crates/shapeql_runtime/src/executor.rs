//! Plan execution.
//!
//! The executor walks a [`ProjectionPlan`] over a root value, calling each
//! node's resolver and assembling the result in the node's shape.
//!
//! - Query top-level fields may run concurrently; they are expected to be
//!   free of side effects.
//! - Mutation top-level fields run one after another, in request order.
//! - An object that resolves to `null` stops the walk: none of its
//!   sub-plan's resolvers run.

use crate::error::{FieldError, PathSegment, RequestError};
use crate::plan::{PlanNode, ProjectionPlan, ResultKind};
use crate::resolver::{Resolved, ValueIter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shapeql_syntax::OperationKind;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executor configuration.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Run query top-level fields as concurrent tasks.
    pub parallel_queries: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallel_queries: true,
        }
    }
}

/// The plan executor.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    /// Creates a new executor.
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes `plan` against `root`.
    ///
    /// Resolver failures never abort the request: the failing field is
    /// `null` and an error with its path is reported. A failure anywhere in
    /// a mutation field nulls that whole top-level field.
    pub async fn execute(&self, plan: &ProjectionPlan, root: &Value, ctx: &Context) -> Response {
        let mut errors = Vec::new();
        let mut values = Vec::with_capacity(plan.fields.len());

        let parallel = plan.kind == OperationKind::Query
            && self.config.parallel_queries
            && plan.fields.len() > 1;
        if parallel {
            let handles: Vec<_> = plan
                .fields
                .iter()
                .map(|node| {
                    let node = Arc::clone(node);
                    let root = root.clone();
                    let ctx = ctx.clone();
                    tokio::spawn(async move { execute_root_field(&node, &root, &ctx, false).await })
                })
                .collect();
            for (node, handle) in plan.fields.iter().zip(handles) {
                match handle.await {
                    Ok((value, field_errors)) => {
                        values.push(value);
                        errors.extend(field_errors);
                    }
                    Err(join_error) => {
                        error!(field = %node.response_name, error = %join_error, "field task failed");
                        values.push(Value::Null);
                        errors.push(
                            FieldError::new(format!("field task failed: {join_error}"))
                                .with_path(vec![PathSegment::Field(node.response_name.clone())])
                                .with_code("INTERNAL_ERROR"),
                        );
                    }
                }
            }
        } else {
            let atomic = plan.kind == OperationKind::Mutation;
            for node in &plan.fields {
                let (value, field_errors) = execute_root_field(node, root, ctx, atomic).await;
                values.push(value);
                errors.extend(field_errors);
            }
        }

        debug!(
            operation = %plan.kind,
            fields = plan.fields.len(),
            errors = errors.len(),
            "executed plan"
        );
        Response {
            data: Some(plan.shape.instantiate(values)),
            errors: (!errors.is_empty()).then_some(errors),
        }
    }
}

async fn execute_root_field(
    node: &PlanNode,
    root: &Value,
    ctx: &Context,
    atomic: bool,
) -> (Value, Vec<FieldError>) {
    let mut errors = Vec::new();
    let value = resolve_node(node, root, ctx, Vec::new(), &mut errors).await;
    if atomic && !errors.is_empty() {
        (Value::Null, errors)
    } else {
        (value, errors)
    }
}

fn resolve_node<'a>(
    node: &'a PlanNode,
    source: &'a Value,
    ctx: &'a Context,
    mut path: Vec<PathSegment>,
    errors: &'a mut Vec<FieldError>,
) -> BoxFuture<'a, Value> {
    Box::pin(async move {
        path.push(PathSegment::Field(node.response_name.clone()));
        match node.field.resolver.resolve(source, &node.arguments, ctx).await {
            Ok(resolved) => complete(node, &node.kind, resolved, ctx, path, errors).await,
            Err(error) => {
                debug!(field = %node.response_name, error = %error, "resolver failed");
                errors.push(FieldError::from_resolver(&error, path));
                Value::Null
            }
        }
    })
}

fn complete<'a>(
    node: &'a PlanNode,
    kind: &'a ResultKind,
    resolved: Resolved,
    ctx: &'a Context,
    path: Vec<PathSegment>,
    errors: &'a mut Vec<FieldError>,
) -> BoxFuture<'a, Value> {
    Box::pin(async move {
        match kind {
            ResultKind::Scalar => resolved.into_value(),
            ResultKind::Object => match resolved.into_value() {
                Value::Null => Value::Null,
                value @ Value::Object(_) => project(node, &value, ctx, path, errors).await,
                other => {
                    errors.push(
                        FieldError::new(format!(
                            "expected an object for `{}`, found {}",
                            node.field.ty.base_name(),
                            kind_of(&other)
                        ))
                        .with_path(path)
                        .with_code("INVALID_RESULT"),
                    );
                    Value::Null
                }
            },
            ResultKind::List(inner) => {
                let items: ValueIter = match resolved {
                    Resolved::Seq(items) => items,
                    Resolved::Value(Value::Null) => return Value::Null,
                    Resolved::Value(Value::Array(items)) => Box::new(items.into_iter()),
                    Resolved::Value(other) => {
                        errors.push(
                            FieldError::new(format!("expected a list, found {}", kind_of(&other)))
                                .with_path(path)
                                .with_code("INVALID_RESULT"),
                        );
                        return Value::Null;
                    }
                };
                let mut out = Vec::new();
                for (index, item) in items.enumerate() {
                    let mut item_path = path.clone();
                    item_path.push(PathSegment::Index(index));
                    let value = complete(node, inner, Resolved::Value(item), ctx, item_path, &mut *errors).await;
                    out.push(value);
                }
                Value::Array(out)
            }
        }
    })
}

async fn project(
    node: &PlanNode,
    source: &Value,
    ctx: &Context,
    path: Vec<PathSegment>,
    errors: &mut Vec<FieldError>,
) -> Value {
    let mut values = Vec::with_capacity(node.children.len());
    for child in &node.children {
        values.push(resolve_node(child, source, ctx, path.clone(), &mut *errors).await);
    }
    match &node.shape {
        Some(shape) => shape.instantiate(values),
        None => Value::Object(
            node.children
                .iter()
                .map(|child| child.response_name.clone())
                .zip(values)
                .collect(),
        ),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Execution context.
///
/// Request-scoped data made available to every resolver, such as the
/// identity of the caller.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Request-scoped data.
    pub data: HashMap<String, Value>,
}

impl Context {
    /// Creates a new context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value in the context.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.data.insert(key.into(), v);
        }
    }

    /// Builder form of [`Context::set`].
    #[must_use]
    pub fn with<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Self {
        self.set(key, value);
        self
    }

    /// Gets a value from the context.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Execution response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Response {
    /// The data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// The errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl Response {
    /// Creates a successful response with data.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// Creates an error response with multiple errors.
    pub fn errors(errors: Vec<FieldError>) -> Self {
        Self {
            data: None,
            errors: Some(errors),
        }
    }

    /// Returns true if the response has errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Serializes to a JSON value.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<RequestError> for Response {
    fn from(error: RequestError) -> Self {
        Self::errors(error.to_field_errors())
    }
}
