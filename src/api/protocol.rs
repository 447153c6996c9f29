//! HTTP Protocol Definitions
//!
//! DTOs for the node's HTTP control surface. Member ids are rendered as plain
//! strings so the JSON maps stay readable.

use crate::invocation::envelope::Outcome;
use crate::invocation::task::Task;
use crate::membership::types::MemberId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ENDPOINT_QUERY: &str = "/invoke/query";
pub const ENDPOINT_EXECUTE: &str = "/invoke/execute";
pub const ENDPOINT_MEMBERS: &str = "/members";
pub const ENDPOINT_STATS: &str = "/stats";

#[derive(Debug, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub task: Task,
    /// Target members. Absent means every service member.
    #[serde(default)]
    pub members: Option<Vec<MemberId>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: BTreeMap<String, Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembersResponse {
    pub local: MemberId,
    pub members: Vec<MemberId>,
}
