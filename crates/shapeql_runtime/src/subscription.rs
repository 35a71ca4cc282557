//! Subscription delivery.
//!
//! A subscription compiles once and then reshapes every event published on
//! its root field's channel with that one plan. Each subscription owns a
//! task that receives events in publish order and emits shaped responses
//! in the same order.

use crate::broadcast::{EventStream, SubscriptionHandle};
use crate::error::BroadcastError;
use crate::executor::{Context, Executor, Response};
use crate::plan::ProjectionPlan;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Builds the request context for each event.
pub type ContextFactory = Arc<dyn Fn() -> Context + Send + Sync>;

/// Shaped events of one subscription.
#[derive(Debug)]
pub struct SubscriptionStream {
    plan: Arc<ProjectionPlan>,
    receiver: mpsc::UnboundedReceiver<Result<Response, BroadcastError>>,
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

impl SubscriptionStream {
    /// Starts reshaping `events` with `plan`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub(crate) fn spawn(
        plan: Arc<ProjectionPlan>,
        mut events: EventStream<Value>,
        executor: Executor,
        context: ContextFactory,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = events.handle();
        let task_plan = Arc::clone(&plan);

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let item = match event {
                    Ok(event) => {
                        let ctx = context();
                        Ok(executor.execute(&task_plan, &event, &ctx).await)
                    }
                    Err(error) => Err(error),
                };
                let terminal = item.is_err();
                if sender.send(item).is_err() {
                    trace!("subscriber went away");
                    events.cancel();
                    return;
                }
                if terminal {
                    break;
                }
            }
            debug!(operation = ?task_plan.name, "subscription ended");
        });

        Self {
            plan,
            receiver,
            handle,
            task,
        }
    }

    /// Waits for the next shaped event.
    ///
    /// Yields `Some(Err(..))` once if the source fails, and `None` after the
    /// source completes or the subscription is cancelled.
    pub async fn next(&mut self) -> Option<Result<Response, BroadcastError>> {
        self.receiver.recv().await
    }

    /// Stops the subscription. Events already shaped are still yielded.
    pub fn cancel(&self) -> bool {
        self.handle.unsubscribe()
    }

    pub fn plan(&self) -> &ProjectionPlan {
        &self.plan
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        self.handle.unsubscribe();
        self.task.abort();
    }
}
