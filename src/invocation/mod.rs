//! Invocation Module
//!
//! Runs tasks on a chosen set of cluster members and gathers what they return.
//!
//! ## Modes
//! - **Fire-and-forget**: `InvocationMessage`, no response.
//! - **Observed**: `InvocationRequest` whose per-member outcomes are reported to
//!   an `InvocationObserver` as they arrive.
//! - **Query**: `InvocationRequest` whose caller blocks until every target
//!   member answered or left, or until the request timeout passes.
//!
//! ## Submodules
//! - **`task`**: the travelling task description and the `Invocable` trait.
//! - **`envelope`**: the closed set of wire messages and the `Outcome` type.
//! - **`poll`**: caller-side bookkeeping for one outstanding request.
//! - **`ordered`**: per-sender buffer that releases responses in arrival order.
//! - **`service`**: the engine tying transport, membership and executor together.

pub mod envelope;
pub mod ordered;
pub mod poll;
pub mod service;
pub mod task;
