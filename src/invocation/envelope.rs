//! Envelope Definitions
//!
//! The closed set of messages exchanged between invocation services. Dispatch at
//! the receiving side is an exhaustive `match` on [`Envelope`].

use super::task::Task;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Correlates a response with the poll that issued the request.
pub type PollId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    /// The task could not be decoded at the receiver.
    Deserialization,
    /// No handler, or the handler refused to initialize.
    TaskInit,
    /// The task ran and failed.
    TaskExecution,
    /// Canceled or abandoned by the worker pool.
    RequestTimeout,
    /// The response itself could not be encoded.
    Serialization,
}

/// A failure produced at a remote member, carried back as data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteException {
    pub kind: ExceptionKind,
    pub message: String,
}

impl RemoteException {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteException {}

/// Result of one member's execution. Either a value or an exception, never both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Result(Value),
    Exception(RemoteException),
}

impl Outcome {
    pub fn result(&self) -> Option<&Value> {
        match self {
            Outcome::Result(value) => Some(value),
            Outcome::Exception(_) => None,
        }
    }

    pub fn exception(&self) -> Option<&RemoteException> {
        match self {
            Outcome::Result(_) => None,
            Outcome::Exception(e) => Some(e),
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Outcome::Exception(_))
    }
}

impl From<anyhow::Result<Value>> for Outcome {
    fn from(result: anyhow::Result<Value>) -> Self {
        match result {
            Ok(value) => Outcome::Result(value),
            Err(e) => Outcome::Exception(RemoteException::new(
                ExceptionKind::TaskExecution,
                format!("{:#}", e),
            )),
        }
    }
}

/// Task as received. Decoding failures are flagged here instead of failing the
/// whole envelope, so the receiver can still answer.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPayload {
    Decoded(Task),
    Undecodable(String),
}

impl TaskPayload {
    pub fn task(&self) -> Option<&Task> {
        match self {
            TaskPayload::Decoded(task) => Some(task),
            TaskPayload::Undecodable(_) => None,
        }
    }
}

/// Fire-and-forget execution. No response is produced.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationMessage {
    pub task: TaskPayload,
}

/// Request expecting exactly one response per target member.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub poll_id: PollId,
    pub task: TaskPayload,
    pub is_query: bool,
    pub respond_in_order: bool,
    /// Set when the issuing poll reports to an observer. The observer itself
    /// stays with the poll on the issuing member.
    pub has_observer: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResponse {
    pub poll_id: PollId,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Message(InvocationMessage),
    Request(InvocationRequest),
    Response(InvocationResponse),
}

impl Envelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Message(_) => "InvocationMessage",
            Envelope::Request(_) => "InvocationRequest",
            Envelope::Response(_) => "InvocationResponse",
        }
    }
}
