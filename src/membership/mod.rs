//! Membership Module
//!
//! Tracks which members run the invocation service and notifies subscribers when
//! members join or leave. Detection of failures is external; this module only
//! records the outcome and fans it out.
//!
//! ## Core Pieces
//! - **`MemberId` / `Member`**: comparable, hashable identity plus optional network address.
//! - **`MemberEvent`**: `Joined` / `Left` notifications delivered over a broadcast channel.
//! - **`MembershipService`**: concurrent member registry used for default target sets.

pub mod service;
pub mod types;

#[cfg(test)]
mod tests;
