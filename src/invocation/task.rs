//! Task model.
//!
//! A [`Task`] is what travels: the name of a registered handler, a JSON payload
//! and the [`TaskOptions`] capability record. On the receiving member the
//! registry turns it into an [`Invocable`], the object that actually runs.

use crate::error::InvocationError;
use crate::membership::service::MembershipService;
use crate::membership::types::MemberId;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Future produced by a running task.
pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// Where a task lands in the worker queue.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPriority {
    /// Appended to the back of the queue.
    #[default]
    Standard,
    /// Pushed to the front of the queue.
    First,
    /// Bypasses the queue entirely.
    Immediate,
}

/// Optional task capabilities, carried alongside the task on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskOptions {
    /// Responses to the sending member must leave in request arrival order.
    pub respond_in_order: bool,
    pub priority: SchedulingPriority,
    /// Limit on queue wait and on run time at the executing member.
    pub execution_timeout_ms: Option<u64>,
    /// Overrides the service-wide request timeout at the caller.
    pub request_timeout_ms: Option<u64>,
    /// Affinity key. Informational only; carried for diagnostics.
    pub associated_key: Option<String>,
    /// The task reports failures as ordinary values, so a failed member's
    /// exception is stored in the query result without being logged.
    pub exceptions_as_values: bool,
}

impl TaskOptions {
    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Name of the handler registered on the executing members.
    pub handler: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub options: TaskOptions,
}

impl Task {
    pub fn new(handler: impl Into<String>, payload: Value) -> Self {
        Self {
            handler: handler.into(),
            payload,
            options: TaskOptions::default(),
        }
    }

    pub fn in_order(mut self) -> Self {
        self.options.respond_in_order = true;
        self
    }

    pub fn with_priority(mut self, priority: SchedulingPriority) -> Self {
        self.options.priority = priority;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.options.execution_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_associated_key(mut self, key: impl Into<String>) -> Self {
        self.options.associated_key = Some(key.into());
        self
    }

    pub fn exceptions_as_values(mut self) -> Self {
        self.options.exceptions_as_values = true;
        self
    }

    /// A task without a handler name counts as absent.
    pub fn validate(&self) -> Result<(), InvocationError> {
        if self.handler.trim().is_empty() {
            return Err(InvocationError::InvalidArgument(
                "Task must be specified".to_string(),
            ));
        }
        Ok(())
    }
}

/// What a task sees of the service it runs in.
#[derive(Clone)]
pub struct ServiceContext {
    pub service_name: String,
    pub local_member: MemberId,
    pub membership: Arc<MembershipService>,
}

/// The executable side of a task.
///
/// Only [`run`](Invocable::run) is mandatory. `init` runs on the receive loop
/// before the task is scheduled; `run_canceled` is called when the worker pool
/// gives up on the task because its execution deadline passed.
pub trait Invocable: Send + 'static {
    fn init(&mut self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn run(&mut self) -> TaskFuture;

    /// `abandoned` is true when the task had started and ran too long, false
    /// when it never left the queue.
    fn run_canceled(&mut self, _abandoned: bool) {}
}
