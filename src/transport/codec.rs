//! Wire codec.
//!
//! Frames are bincode-encoded [`WireFrame`]s. Tasks and result values are nested
//! as JSON byte strings: bincode cannot carry self-describing JSON values, and
//! nesting lets a receiver decode the frame header even when the task inside is
//! unreadable.

use super::TransportError;
use crate::invocation::envelope::{
    Envelope, ExceptionKind, InvocationMessage, InvocationRequest, InvocationResponse, Outcome,
    PollId, RemoteException, TaskPayload,
};

use serde::{Deserialize, Serialize};

/// Largest frame the codec will produce. Fits a single UDP datagram.
pub const MAX_FRAME_LEN: usize = 60 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum WireFrame {
    Message {
        task: Vec<u8>,
    },
    Request {
        poll_id: PollId,
        is_query: bool,
        respond_in_order: bool,
        has_observer: bool,
        task: Vec<u8>,
    },
    Response {
        poll_id: PollId,
        outcome: WireOutcome,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum WireOutcome {
    Result(Vec<u8>),
    Exception(RemoteException),
}

pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, TransportError> {
    let frame = match envelope {
        Envelope::Message(msg) => WireFrame::Message {
            task: encode_task(&msg.task)?,
        },
        Envelope::Request(req) => WireFrame::Request {
            poll_id: req.poll_id,
            is_query: req.is_query,
            respond_in_order: req.respond_in_order,
            has_observer: req.has_observer,
            task: encode_task(&req.task)?,
        },
        Envelope::Response(resp) => WireFrame::Response {
            poll_id: resp.poll_id,
            outcome: match &resp.outcome {
                Outcome::Result(value) => WireOutcome::Result(
                    serde_json::to_vec(value).map_err(|e| TransportError::Encode(e.to_string()))?,
                ),
                Outcome::Exception(e) => WireOutcome::Exception(e.clone()),
            },
        },
    };

    encode_frame(&frame)
}

pub(crate) fn encode_frame(frame: &WireFrame) -> Result<Vec<u8>, TransportError> {
    let bytes = bincode::serialize(frame).map_err(|e| TransportError::Encode(e.to_string()))?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(TransportError::Encode(format!(
            "frame of {} bytes exceeds the {} byte limit",
            bytes.len(),
            MAX_FRAME_LEN
        )));
    }
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<Envelope, TransportError> {
    let frame: WireFrame =
        bincode::deserialize(bytes).map_err(|e| TransportError::Decode(e.to_string()))?;

    let envelope = match frame {
        WireFrame::Message { task } => Envelope::Message(InvocationMessage {
            task: decode_task(&task),
        }),
        WireFrame::Request {
            poll_id,
            is_query,
            respond_in_order,
            has_observer,
            task,
        } => Envelope::Request(InvocationRequest {
            poll_id,
            task: decode_task(&task),
            is_query,
            respond_in_order,
            has_observer,
        }),
        WireFrame::Response { poll_id, outcome } => Envelope::Response(InvocationResponse {
            poll_id,
            outcome: match outcome {
                WireOutcome::Result(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(value) => Outcome::Result(value),
                    Err(e) => Outcome::Exception(RemoteException::new(
                        ExceptionKind::Deserialization,
                        format!("failed to decode result: {}", e),
                    )),
                },
                WireOutcome::Exception(e) => Outcome::Exception(e),
            },
        }),
    };

    Ok(envelope)
}

fn encode_task(task: &TaskPayload) -> Result<Vec<u8>, TransportError> {
    match task {
        TaskPayload::Decoded(task) => {
            serde_json::to_vec(task).map_err(|e| TransportError::Encode(e.to_string()))
        }
        TaskPayload::Undecodable(reason) => Err(TransportError::Encode(format!(
            "cannot forward an undecodable task: {}",
            reason
        ))),
    }
}

fn decode_task(bytes: &[u8]) -> TaskPayload {
    match serde_json::from_slice(bytes) {
        Ok(task) => TaskPayload::Decoded(task),
        Err(e) => {
            tracing::warn!("Failure to deserialize a task ({} bytes): {}", bytes.len(), e);
            TaskPayload::Undecodable(e.to_string())
        }
    }
}
