//! Task Registry
//!
//! Maps handler names to task factories. A received [`Task`] names its handler;
//! the registry builds the matching [`Invocable`] from the payload and
//! initializes it against the local [`ServiceContext`]. Either step failing is a
//! task initialization failure.

use crate::invocation::task::{Invocable, ServiceContext, Task, TaskFuture};

use anyhow::Result;
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Builds a task object from its JSON payload.
pub type TaskFactory = Arc<dyn Fn(Value) -> Result<Box<dyn Invocable>> + Send + Sync>;

type HandlerFn = Arc<dyn Fn(Value) -> TaskFuture + Send + Sync>;

pub struct TaskRegistry {
    factories: DashMap<String, TaskFactory>,
}

impl TaskRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers an async closure as a handler.
    ///
    /// The closure receives the task payload and returns the result value.
    pub fn register<F, Fut>(&self, handler_name: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        // Type-erase the future so different closures share one map.
        let handler: HandlerFn = Arc::new(move |payload| Box::pin(handler(payload)) as TaskFuture);

        self.register_factory(handler_name, move |payload| {
            Ok(Box::new(ClosureTask {
                handler: handler.clone(),
                payload: Some(payload),
            }) as Box<dyn Invocable>)
        });
    }

    /// Registers a factory for tasks that need their own `init` or
    /// `run_canceled` behaviour.
    pub fn register_factory<F>(&self, handler_name: &str, factory: F)
    where
        F: Fn(Value) -> Result<Box<dyn Invocable>> + Send + Sync + 'static,
    {
        self.factories
            .insert(handler_name.to_string(), Arc::new(factory));

        tracing::info!("Registered task handler: {}", handler_name);
    }

    /// Builds and initializes the task object for `task`.
    pub fn instantiate(&self, task: &Task, ctx: &ServiceContext) -> Result<Box<dyn Invocable>> {
        let factory = self
            .factories
            .get(&task.handler)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| anyhow::anyhow!("Unknown task handler: {}", task.handler))?;

        let mut invocable = factory(task.payload.clone())?;
        invocable.init(ctx)?;
        Ok(invocable)
    }

    pub fn list_handlers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn has_handler(&self, handler_name: &str) -> bool {
        self.factories.contains_key(handler_name)
    }

    pub fn handler_count(&self) -> usize {
        self.factories.len()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }
}

struct ClosureTask {
    handler: HandlerFn,
    payload: Option<Value>,
}

impl Invocable for ClosureTask {
    fn run(&mut self) -> TaskFuture {
        let payload = self.payload.take().unwrap_or(Value::Null);
        (self.handler)(payload)
    }
}
