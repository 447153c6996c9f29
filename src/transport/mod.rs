//! Transport Module
//!
//! The boundary between the invocation service and the network. The service
//! hands envelopes to a [`Transport`] and receives raw frames from an [`Inbox`];
//! decoding happens on the service's receive loop so that a frame whose task
//! cannot be decoded can still be answered.
//!
//! ## Submodules
//! - **`codec`**: bincode frame layout with JSON-encoded tasks and results.
//! - **`local`**: in-process cluster used for embedding and tests.
//! - **`udp`**: datagram transport used by the node binary.

pub mod codec;
pub mod local;
pub mod udp;

use crate::invocation::envelope::Envelope;
use crate::membership::types::MemberId;

use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode envelope: {0}")]
    Encode(String),

    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("unknown member {0}")]
    UnknownMember(MemberId),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport closed")]
    Closed,
}

/// A frame received from another member, not yet decoded.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub from: MemberId,
    pub bytes: Vec<u8>,
}

pub type Inbox = mpsc::UnboundedReceiver<InboundFrame>;

/// Outbound side of the transport.
///
/// `send` must not block: it encodes and queues. Delivery is reliable
/// point-to-point but independent `send` calls carry no ordering guarantee
/// relative to each other beyond what the implementation documents.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, to: &[MemberId], envelope: &Envelope) -> Result<(), TransportError>;

    /// Frames queued toward `member` and not yet written.
    fn backlog(&self, _member: &MemberId) -> usize {
        0
    }
}

#[cfg(test)]
mod tests;
