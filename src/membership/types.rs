use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

/// Opaque identity of a cluster participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A member running the invocation service.
///
/// `addr` is only meaningful to network transports; in-process clusters leave
/// it empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub addr: Option<SocketAddr>,

    #[serde(skip)]
    pub joined_at: Option<Instant>,
}

impl Member {
    pub fn new(id: MemberId, addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            addr,
            joined_at: Some(Instant::now()),
        }
    }
}

/// Membership change notification delivered to the invocation service.
#[derive(Debug, Clone)]
pub enum MemberEvent {
    Joined(Member),
    Left(MemberId),
}
