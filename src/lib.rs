//! Clustered Invocation Service Library
//!
//! Runs tasks on selected members of a cluster and collects their outcomes.
//! The binary executable (`main.rs`) wires these modules into a node.
//!
//! ## Architecture Modules
//! - **`invocation`**: the invocation engine. Polls on the calling side, the
//!   per-sender ordered-delivery buffer on the executing side, and the service
//!   that dispatches envelopes between the two.
//! - **`executor`**: task registry and worker pool used to run received tasks.
//! - **`membership`**: member identity and join/leave notifications.
//! - **`transport`**: wire codec plus in-process and UDP transports.
//! - **`api`**: HTTP control surface for external callers.
//! - **`config`** / **`error`**: service configuration and caller-facing errors.

pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod invocation;
pub mod membership;
pub mod transport;
