//! Runtime for shapeql.
//!
//! This crate compiles requests into projection plans and runs them:
//! - `schema`: Schema definition and building
//! - `resolver`: Field resolvers
//! - `binding`: Argument binding and coercion
//! - `shape`: Deduplicated result shapes
//! - `plan`: Projection plans
//! - `compiler`: Request validation and plan compilation
//! - `executor`: Plan execution
//! - `broadcast`: Multi-subscriber event channels
//! - `subscription`: Per-subscription event reshaping
//! - `engine`: Parse, compile, cache, execute, subscribe
//! - `config`: Engine configuration

mod binding;
pub mod broadcast;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod plan;
pub mod resolver;
pub mod schema;
pub mod shape;
pub mod subscription;

pub use broadcast::{Broadcaster, EventStream, Notification, SubscriptionHandle};
pub use compiler::PlanCompiler;
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, PlanCache, Variables};
pub use error::{
    BroadcastError, CompileError, FieldError, PathSegment, RequestError, ResolverError,
    SchemaError,
};
pub use executor::{Context, Executor, ExecutorConfig, Response};
pub use plan::{PlanNode, ProjectionPlan, ResultKind};
pub use resolver::{
    AsyncFnResolver, FnResolver, IdentityResolver, PropertyResolver, Resolved, Resolver,
    ResolverArgs, ResolverFuture, ResolverResult,
};
pub use schema::{
    FieldDef, InputFieldDef, InputObjectDef, ObjectDef, ScalarType, Schema, SchemaBuilder,
    TypeDef, TypeRef,
};
pub use shape::{Shape, ShapeCache, ShapeField, ShapeId};
pub use subscription::{ContextFactory, SubscriptionStream};

pub use shapeql_syntax::OperationKind;
