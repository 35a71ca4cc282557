//! The request engine.
//!
//! [`Engine`] ties the pieces together for a host: parse, compile (with a
//! plan cache), execute, and subscribe.

use crate::compiler::PlanCompiler;
use crate::config::EngineConfig;
use crate::error::{CompileError, RequestError};
use crate::executor::{Context, Executor, Response};
use crate::plan::ProjectionPlan;
use crate::schema::Schema;
use crate::shape::ShapeCache;
use crate::subscription::{ContextFactory, SubscriptionStream};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use shapeql_syntax::{format, OperationKind, Parser};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info_span, Instrument};

/// Request variables.
pub type Variables = Map<String, Value>;

/// Compiled plans keyed by canonical request text and variables.
#[derive(Debug)]
pub struct PlanCache {
    plans: Mutex<IndexMap<String, Arc<ProjectionPlan>>>,
    capacity: usize,
}

impl PlanCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            plans: Mutex::new(IndexMap::new()),
            capacity,
        }
    }

    /// Cache key for a request. Formatting first makes requests that
    /// differ only in whitespace, commas, or comments share an entry.
    pub fn key(canonical: &str, variables: &Variables) -> String {
        let variables = serde_json::to_string(variables).unwrap_or_default();
        format!("{canonical}\n{variables}")
    }

    pub fn get(&self, key: &str) -> Option<Arc<ProjectionPlan>> {
        self.plans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: String, plan: Arc<ProjectionPlan>) {
        if self.capacity == 0 {
            return;
        }
        let mut plans = self.plans.lock().unwrap_or_else(PoisonError::into_inner);
        if !plans.contains_key(&key) && plans.len() >= self.capacity {
            plans.shift_remove_index(0);
        }
        plans.insert(key, plan);
    }

    pub fn len(&self) -> usize {
        self.plans.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compiles and runs requests against one schema.
#[derive(Debug)]
pub struct Engine {
    schema: Arc<Schema>,
    shapes: Arc<ShapeCache>,
    plans: Option<PlanCache>,
    executor: Executor,
    config: EngineConfig,
}

impl Engine {
    pub fn new(schema: impl Into<Arc<Schema>>) -> Self {
        Self::with_config(schema, EngineConfig::default())
    }

    pub fn with_config(schema: impl Into<Arc<Schema>>, config: EngineConfig) -> Self {
        Self {
            schema: schema.into(),
            shapes: Arc::new(ShapeCache::new()),
            plans: config
                .plan_cache
                .then(|| PlanCache::new(config.plan_cache_capacity)),
            executor: Executor::new(config.executor_config()),
            config,
        }
    }

    /// Shares `shapes` with other engines, so their plans share shapes too.
    #[must_use]
    pub fn with_shape_cache(mut self, shapes: Arc<ShapeCache>) -> Self {
        self.shapes = shapes;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn shapes(&self) -> &Arc<ShapeCache> {
        &self.shapes
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plan_cache(&self) -> Option<&PlanCache> {
        self.plans.as_ref()
    }

    /// Parses and compiles `request`.
    pub fn compile(
        &self,
        request: &str,
        variables: &Variables,
    ) -> Result<Arc<ProjectionPlan>, RequestError> {
        let operation = Parser::new(request)
            .with_max_depth(self.config.max_depth)
            .parse_request()?;

        let key = self
            .plans
            .as_ref()
            .map(|_| PlanCache::key(&format(&operation), variables));
        if let (Some(cache), Some(key)) = (&self.plans, &key) {
            if let Some(plan) = cache.get(key) {
                debug!(operation = %plan.kind, "plan cache hit");
                return Ok(plan);
            }
        }

        let plan = PlanCompiler::new(&self.schema, &self.shapes)
            .compile(&operation, variables)
            .map(Arc::new)?;

        if let (Some(cache), Some(key)) = (&self.plans, key) {
            cache.insert(key, Arc::clone(&plan));
        }
        Ok(plan)
    }

    /// Compiles and executes a query or mutation.
    ///
    /// A request that fails to parse or compile produces a response with
    /// errors and no data; no resolver runs.
    pub async fn execute(
        &self,
        request: &str,
        variables: &Variables,
        root: &Value,
        ctx: &Context,
    ) -> Response {
        let plan = match self.compile(request, variables) {
            Ok(plan) => plan,
            Err(error) => {
                debug!(error = %error, "request rejected");
                return Response::from(error);
            }
        };
        let span = info_span!("execute", operation = %plan.kind, name = plan.name.as_deref());
        self.executor.execute(&plan, root, ctx).instrument(span).await
    }

    /// Compiles a subscription and starts delivering shaped events.
    ///
    /// `context` builds the request context for each event.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn subscribe<F>(
        &self,
        request: &str,
        variables: &Variables,
        context: F,
    ) -> Result<SubscriptionStream, RequestError>
    where
        F: Fn() -> Context + Send + Sync + 'static,
    {
        let plan = self.compile(request, variables)?;
        if plan.kind != OperationKind::Subscription {
            return Err(RequestError::Validation(vec![
                CompileError::InvalidSubscription {
                    path: Vec::new(),
                    reason: format!("expected a subscription, found a {}", plan.kind),
                },
            ]));
        }

        let source = plan
            .fields
            .first()
            .and_then(|node| node.field.event_source.clone())
            .ok_or_else(|| {
                RequestError::Validation(vec![CompileError::InvalidSubscription {
                    path: Vec::new(),
                    reason: "root field has no event source".to_string(),
                }])
            })?;
        let events = source.stream()?;
        debug!(name = ?plan.name, "subscription started");

        let context: ContextFactory = Arc::new(context);
        Ok(SubscriptionStream::spawn(
            plan,
            events,
            self.executor.clone(),
            context,
        ))
    }
}
