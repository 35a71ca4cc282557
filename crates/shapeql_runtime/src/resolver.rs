//! Resolver system.
//!
//! A resolver turns a source value plus bound arguments into a field value.
//! Fields registered without a resolver read the property of the same name
//! from their source object.

use crate::error::ResolverError;
use crate::executor::Context;
use indexmap::IndexMap;
use serde_json::Value;
use shapeql_core::ArgumentTracker;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A lazily pulled sequence of element values.
pub type ValueIter = Box<dyn Iterator<Item = Value> + Send>;

/// What a resolver produced.
///
/// `Value::Null` is the absent value: an object field that resolves to it is
/// emitted as `null` and none of its sub-plan runs.
pub enum Resolved {
    Value(Value),
    /// Elements are pulled one at a time while the list is shaped.
    Seq(ValueIter),
}

impl Resolved {
    /// The absent value.
    pub const fn absent() -> Self {
        Self::Value(Value::Null)
    }

    pub fn seq<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: Send + 'static,
    {
        Self::Seq(Box::new(items.into_iter()))
    }

    /// Materializes the result, draining a sequence into an array.
    pub fn into_value(self) -> Value {
        match self {
            Self::Value(value) => value,
            Self::Seq(items) => Value::Array(items.collect()),
        }
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Seq(_) => f.write_str("Seq(..)"),
        }
    }
}

/// Arguments bound for one field.
///
/// Declared defaults are present in the map but not marked as set, so a
/// resolver can tell "caller passed the default value" from "caller passed
/// nothing".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolverArgs {
    args: IndexMap<String, Value>,
    set: ArgumentTracker,
    inputs: IndexMap<String, ArgumentTracker>,
}

impl ResolverArgs {
    /// Creates new resolver args.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates resolver args from caller-supplied pairs. Every pair is
    /// marked as set.
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        let mut args = Self::new();
        for (name, value) in pairs {
            args.set(name, value);
        }
        args
    }

    /// Gets an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets an argument as a specific type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument, returning an error if not found.
    pub fn require<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        self.args
            .get(name)
            .ok_or_else(|| ResolverError::MissingArgument(name.to_string()))
            .and_then(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| ResolverError::ArgumentParse(name.to_string(), e.to_string()))
            })
    }

    /// True when the caller supplied `name` explicitly.
    pub fn is_set(&self, name: &str) -> bool {
        self.set.is_set(name)
    }

    /// True when the caller supplied `field` inside the input object passed
    /// as argument `name`. Nested input objects use dotted argument paths,
    /// e.g. `input.author`.
    pub fn input_is_set(&self, name: &str, field: &str) -> bool {
        self.inputs
            .get(name)
            .is_some_and(|tracker| tracker.is_set(field))
    }

    /// Tracker of the input object passed as argument `name`.
    pub fn input_tracker(&self, name: &str) -> Option<&ArgumentTracker> {
        self.inputs.get(name)
    }

    /// Returns all arguments in declaration order.
    pub fn all(&self) -> &IndexMap<String, Value> {
        &self.args
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Sets an argument and marks it as explicitly supplied.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.set.mark_as_set(&name);
        self.args.insert(name, value);
    }

    /// Sets an argument from its declared default, leaving it unmarked.
    pub fn set_default(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }

    pub(crate) fn track_input(&mut self, name: impl Into<String>, tracker: ArgumentTracker) {
        self.inputs.insert(name.into(), tracker);
    }
}

/// Result type for resolvers.
pub type ResolverResult = Result<Resolved, ResolverError>;

/// Future type for async resolvers.
pub type ResolverFuture<'a> = Pin<Box<dyn Future<Output = ResolverResult> + Send + 'a>>;

/// Trait for field resolvers.
pub trait Resolver: Send + Sync {
    /// Resolves a field value from its source.
    fn resolve<'a>(
        &'a self,
        source: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
    ) -> ResolverFuture<'a>;

    /// The type this resolver expects as its source, if it cares.
    ///
    /// The schema builder rejects a resolver attached to a field of any
    /// other type.
    fn source_type(&self) -> Option<&str> {
        None
    }
}

/// A sync resolver function.
pub type SyncResolverFn =
    Arc<dyn Fn(&Value, &ResolverArgs, &Context) -> ResolverResult + Send + Sync>;

/// A wrapper for sync resolver functions.
pub struct FnResolver {
    func: SyncResolverFn,
    source_type: Option<String>,
}

impl FnResolver {
    /// Creates a new function resolver.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context) -> ResolverResult + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(f),
            source_type: None,
        }
    }

    /// Declares the source type this resolver reads from.
    #[must_use]
    pub fn on_type(mut self, type_name: impl Into<String>) -> Self {
        self.source_type = Some(type_name.into());
        self
    }
}

impl Resolver for FnResolver {
    fn resolve<'a>(
        &'a self,
        source: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
    ) -> ResolverFuture<'a> {
        let result = (self.func)(source, args, ctx);
        Box::pin(async move { result })
    }

    fn source_type(&self) -> Option<&str> {
        self.source_type.as_deref()
    }
}

/// An async resolver function.
pub type AsyncResolverFn = Arc<
    dyn Fn(Value, ResolverArgs, Context) -> Pin<Box<dyn Future<Output = ResolverResult> + Send>>
        + Send
        + Sync,
>;

/// A wrapper for async resolver functions.
pub struct AsyncFnResolver {
    func: AsyncResolverFn,
    source_type: Option<String>,
}

impl AsyncFnResolver {
    /// Creates a new async function resolver.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, ResolverArgs, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        Self {
            func: Arc::new(move |source, args, ctx| Box::pin(f(source, args, ctx))),
            source_type: None,
        }
    }

    #[must_use]
    pub fn on_type(mut self, type_name: impl Into<String>) -> Self {
        self.source_type = Some(type_name.into());
        self
    }
}

impl Resolver for AsyncFnResolver {
    fn resolve<'a>(
        &'a self,
        source: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
    ) -> ResolverFuture<'a> {
        let fut = (self.func)(source.clone(), args.clone(), ctx.clone());
        Box::pin(fut)
    }

    fn source_type(&self) -> Option<&str> {
        self.source_type.as_deref()
    }
}

/// Reads a property of the source object.
///
/// Falls back to the `snake_case` spelling of the property, so a `createdAt`
/// field can read a `created_at` key. A null source resolves to null.
#[derive(Debug, Clone)]
pub struct PropertyResolver {
    property: String,
    fallback: Option<String>,
}

impl PropertyResolver {
    pub fn new(property: impl Into<String>) -> Self {
        let property = property.into();
        let snake = to_snake_case(&property);
        let fallback = (snake != property).then_some(snake);
        Self { property, fallback }
    }

    fn read(&self, source: &Value) -> Result<Value, ResolverError> {
        match source {
            Value::Null => Ok(Value::Null),
            Value::Object(map) => Ok(map
                .get(&self.property)
                .or_else(|| self.fallback.as_ref().and_then(|key| map.get(key)))
                .cloned()
                .unwrap_or(Value::Null)),
            _ => Err(ResolverError::FieldNotFound(self.property.clone())),
        }
    }
}

impl Resolver for PropertyResolver {
    fn resolve<'a>(
        &'a self,
        source: &'a Value,
        _args: &'a ResolverArgs,
        _ctx: &'a Context,
    ) -> ResolverFuture<'a> {
        let result = self.read(source).map(Resolved::Value);
        Box::pin(async move { result })
    }
}

/// Returns the source value unchanged.
///
/// Subscription fields use this to expose the published event itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl Resolver for IdentityResolver {
    fn resolve<'a>(
        &'a self,
        source: &'a Value,
        _args: &'a ResolverArgs,
        _ctx: &'a Context,
    ) -> ResolverFuture<'a> {
        let value = source.clone();
        Box::pin(async move { Ok(Resolved::Value(value)) })
    }
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
