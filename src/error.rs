//! Caller-facing error taxonomy.
//!
//! Only failures a caller can act on live here. Task-level failures on the
//! receiving member never surface as errors: they travel back as
//! [`RemoteException`](crate::invocation::envelope::RemoteException) values inside a
//! response, and departed members simply disappear from result maps.

use crate::invocation::envelope::Outcome;
use crate::membership::types::MemberId;
use crate::transport::TransportError;

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvocationError {
    /// Rejected synchronously, nothing was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The poll was force-closed past its deadline. `partial` holds whatever
    /// members answered before the deadline.
    #[error("request timed out after {elapsed_ms} milliseconds")]
    RequestTimeout {
        elapsed_ms: u64,
        partial: HashMap<MemberId, Outcome>,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invocation service is not running")]
    ServiceStopped,
}

impl InvocationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, InvocationError::RequestTimeout { .. })
    }
}

pub type Result<T, E = InvocationError> = std::result::Result<T, E>;
